/// Legacy persisted-schema migration.
pub mod migrate;
/// Persisted entity definitions.
pub mod models;
/// Room state storage and retrieval operations.
pub mod room_store;
/// Storage abstraction layer.
pub mod storage;
