//! Health check payload.

use serde::Serialize;
use utoipa::ToSchema;

/// Health probe response.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall service status, `ok` or `degraded`.
    pub status: &'static str,
    /// Whether the durable storage backend is reachable.
    pub storage_available: bool,
}

impl HealthResponse {
    /// Healthy payload: storage installed and responding.
    pub fn ok() -> Self {
        Self {
            status: "ok",
            storage_available: true,
        }
    }

    /// Degraded payload: serving reads-of-nothing until storage returns.
    pub fn degraded() -> Self {
        Self {
            status: "degraded",
            storage_available: false,
        }
    }
}
