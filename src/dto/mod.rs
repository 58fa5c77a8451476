/// HTTP request/response DTOs and discriminated result shapes.
pub mod api;
/// Snapshots shared by the WebSocket and HTTP surfaces.
pub mod common;
/// Health check payload.
pub mod health;
/// Validation helpers for DTOs.
pub mod validation;
/// WebSocket message unions for both directions.
pub mod ws;
