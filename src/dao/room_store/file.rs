//! File-backed store: one JSON document per logical key, grouped in a
//! directory per room. Writes go through a temp file and a rename so a
//! single-key write is atomic.

use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::fs;

use crate::dao::{
    room_store::RoomStore,
    storage::{StorageError, StorageResult},
};

/// Durable `RoomStore` rooted at a data directory.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|err| StorageError::unavailable(format!("creating {}", root.display()), err))?;
        Ok(Self { root })
    }

    fn document_path(&self, room_id: &str, key: &str) -> PathBuf {
        self.root
            .join(room_id)
            .join(format!("{}.json", encode_key(key)))
    }
}

/// Encode a logical key into a safe file name. Anything outside
/// `[A-Za-z0-9._:-]` is percent-encoded so identity names cannot escape the
/// room directory.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b':' | b'-' => {
                encoded.push(byte as char);
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

/// Invert [`encode_key`]. Malformed escapes are kept verbatim.
fn decode_key(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%'
            && index + 2 < bytes.len()
            && let Ok(hex) = std::str::from_utf8(&bytes[index + 1..index + 3])
            && let Ok(byte) = u8::from_str_radix(hex, 16)
        {
            decoded.push(byte);
            index += 3;
            continue;
        }
        decoded.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

async fn read_document(path: PathBuf, key: String) -> StorageResult<Option<Value>> {
    match fs::read(&path).await {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes)
                .map_err(|source| StorageError::Corrupt { key, source })?;
            Ok(Some(value))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(StorageError::unavailable(
            format!("reading {}", path.display()),
            err,
        )),
    }
}

async fn write_document(path: PathBuf, value: Value) -> StorageResult<()> {
    let parent = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&parent)
        .await
        .map_err(|err| StorageError::unavailable(format!("creating {}", parent.display()), err))?;

    let payload = serde_json::to_vec(&value)
        .map_err(|err| StorageError::unavailable("serializing document".into(), err))?;
    let temp = path.with_extension("json.tmp");
    fs::write(&temp, payload)
        .await
        .map_err(|err| StorageError::unavailable(format!("writing {}", temp.display()), err))?;
    fs::rename(&temp, &path)
        .await
        .map_err(|err| StorageError::unavailable(format!("renaming {}", path.display()), err))
}

impl RoomStore for FileStore {
    fn read(&self, room_id: &str, key: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let path = self.document_path(room_id, key);
        let key = key.to_string();
        Box::pin(read_document(path, key))
    }

    fn write(
        &self,
        room_id: &str,
        key: &str,
        value: Value,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.document_path(room_id, key);
        Box::pin(write_document(path, value))
    }

    fn delete(&self, room_id: &str, key: &str) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.document_path(room_id, key);
        Box::pin(async move {
            match fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(StorageError::unavailable(
                    format!("deleting {}", path.display()),
                    err,
                )),
            }
        })
    }

    fn list_keys(
        &self,
        room_id: &str,
        prefix: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let directory = self.root.join(room_id);
        let prefix = prefix.to_string();
        Box::pin(async move {
            let mut reader = match fs::read_dir(&directory).await {
                Ok(reader) => reader,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(err) => {
                    return Err(StorageError::unavailable(
                        format!("listing {}", directory.display()),
                        err,
                    ));
                }
            };

            let mut keys = Vec::new();
            while let Some(dirent) = reader.next_entry().await.map_err(|err| {
                StorageError::unavailable(format!("listing {}", directory.display()), err)
            })? {
                let name = dirent.file_name().to_string_lossy().into_owned();
                let Some(stem) = name.strip_suffix(".json") else {
                    continue;
                };
                let key = decode_key(stem);
                if key.starts_with(&prefix) {
                    keys.push(key);
                }
            }
            keys.sort();
            Ok(keys)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let root = self.root.clone();
        Box::pin(async move {
            fs::metadata(&root)
                .await
                .map_err(|err| StorageError::unavailable(format!("probing {}", root.display()), err))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::room_store::keys;
    use serde_json::json;

    #[test]
    fn key_encoding_round_trips() {
        for key in ["state", "identity:amy", "identity:a b/../c", "identity:ümlaut"] {
            assert_eq!(decode_key(&encode_key(key)), key);
        }
        assert!(!encode_key("identity:a/../b").contains('/'));
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).await.unwrap();
            store.write("room", keys::STATE, json!({"x": 1})).await.unwrap();
        }

        let store = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(
            store.read("room", keys::STATE).await.unwrap(),
            Some(json!({"x": 1}))
        );

        let listed = store.list_keys("room", "").await.unwrap();
        assert_eq!(listed, vec!["state"]);

        store.delete("room", keys::STATE).await.unwrap();
        store.delete("room", keys::STATE).await.unwrap();
        assert!(store.read("room", keys::STATE).await.unwrap().is_none());
    }
}
