//! Abstraction over the per-room durable key/value store.
//!
//! The store offers no cross-key transactional guarantees beyond a single
//! key write; the coordinator relies on write-through caching and
//! single-writer ordering instead.

pub mod file;
pub mod memory;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::dao::storage::StorageResult;

/// Logical per-room document keys.
pub mod keys {
    /// Queue state document.
    pub const STATE: &str = "state";
    /// Vote ledger document.
    pub const VOTES: &str = "votes";
    /// Append-only performance history.
    pub const PERFORMANCES: &str = "performances";
    /// Room configuration.
    pub const CONFIG: &str = "config";
    /// Room admin secret.
    pub const ADMIN: &str = "admin";
    /// Map of user id to personal song stack.
    pub const USER_STACKS: &str = "user_stacks";
    /// Prefix shared by all identity documents.
    pub const IDENTITY_PREFIX: &str = "identity:";

    /// Key for one claimed identity, addressed by normalized name.
    pub fn identity(normalized_name: &str) -> String {
        format!("{IDENTITY_PREFIX}{normalized_name}")
    }
}

/// Byte-oriented (JSON document) persistence for room state.
pub trait RoomStore: Send + Sync {
    /// Read one document, `None` when the key was never written.
    fn read(&self, room_id: &str, key: &str) -> BoxFuture<'static, StorageResult<Option<Value>>>;
    /// Write one document. Atomic per key only.
    fn write(&self, room_id: &str, key: &str, value: Value)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Delete one document; deleting an absent key is not an error.
    fn delete(&self, room_id: &str, key: &str) -> BoxFuture<'static, StorageResult<()>>;
    /// List keys of a room matching a prefix.
    fn list_keys(&self, room_id: &str, prefix: &str)
    -> BoxFuture<'static, StorageResult<Vec<String>>>;
    /// Probe whether the backend can serve requests.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
