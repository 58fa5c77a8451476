//! In-memory store backend, used by tests and as a no-persistence fallback.

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

use crate::dao::{room_store::RoomStore, storage::StorageResult};

/// Volatile `RoomStore` keyed by `(room, key)`.
#[derive(Default)]
pub struct MemoryStore {
    documents: Arc<DashMap<(String, String), Value>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoomStore for MemoryStore {
    fn read(&self, room_id: &str, key: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let documents = self.documents.clone();
        let address = (room_id.to_string(), key.to_string());
        Box::pin(async move { Ok(documents.get(&address).map(|entry| entry.value().clone())) })
    }

    fn write(
        &self,
        room_id: &str,
        key: &str,
        value: Value,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let documents = self.documents.clone();
        let address = (room_id.to_string(), key.to_string());
        Box::pin(async move {
            documents.insert(address, value);
            Ok(())
        })
    }

    fn delete(&self, room_id: &str, key: &str) -> BoxFuture<'static, StorageResult<()>> {
        let documents = self.documents.clone();
        let address = (room_id.to_string(), key.to_string());
        Box::pin(async move {
            documents.remove(&address);
            Ok(())
        })
    }

    fn list_keys(
        &self,
        room_id: &str,
        prefix: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let documents = self.documents.clone();
        let room = room_id.to_string();
        let prefix = prefix.to_string();
        Box::pin(async move {
            let mut keys: Vec<String> = documents
                .iter()
                .filter(|entry| entry.key().0 == room && entry.key().1.starts_with(&prefix))
                .map(|entry| entry.key().1.clone())
                .collect();
            keys.sort();
            Ok(keys)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::room_store::keys;
    use serde_json::json;

    #[tokio::test]
    async fn read_write_delete_round_trip() {
        let store = MemoryStore::new();
        assert!(store.read("r", keys::STATE).await.unwrap().is_none());

        store.write("r", keys::STATE, json!({"a": 1})).await.unwrap();
        assert_eq!(
            store.read("r", keys::STATE).await.unwrap(),
            Some(json!({"a": 1}))
        );

        // Rooms are isolated.
        assert!(store.read("other", keys::STATE).await.unwrap().is_none());

        store.delete("r", keys::STATE).await.unwrap();
        assert!(store.read("r", keys::STATE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_keys_filters_by_prefix() {
        let store = MemoryStore::new();
        store.write("r", &keys::identity("amy"), json!({})).await.unwrap();
        store.write("r", &keys::identity("bob"), json!({})).await.unwrap();
        store.write("r", keys::STATE, json!({})).await.unwrap();

        let listed = store.list_keys("r", keys::IDENTITY_PREFIX).await.unwrap();
        assert_eq!(listed, vec!["identity:amy", "identity:bob"]);
    }
}
