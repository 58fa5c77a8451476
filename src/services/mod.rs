/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Identity claims and performance history.
pub mod identity_service;
/// Room lifecycle and queue operations.
pub mod room_service;
/// External media search with per-room caching.
pub mod search_service;
/// File storage supervisor with backoff and degraded-mode toggling.
pub mod storage_supervisor;
/// WebSocket connection and message handling.
pub mod websocket_service;
