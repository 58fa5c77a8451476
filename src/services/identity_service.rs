//! Identity claims, PIN verification and performance history lookups.

use crate::{
    dto::api::{ClaimRequest, ClaimResult, VerifyIdentityRequest, VerifyResult},
    error::ServiceError,
    identity::{PopularSong, SingerHistory},
    state::{SharedState, now_ms},
};

/// Claim a display name, binding a salted PIN hash to it.
pub async fn claim(
    state: &SharedState,
    room_id: &str,
    request: &ClaimRequest,
    caller: &str,
) -> Result<ClaimResult, ServiceError> {
    let mut guard = state.coordinator(room_id).await?;
    guard
        .claim_identity(&request.name, &request.pin, caller, now_ms())
        .await
}

/// Verify a PIN against a claimed name.
pub async fn verify(
    state: &SharedState,
    room_id: &str,
    request: &VerifyIdentityRequest,
    caller: &str,
) -> Result<VerifyResult, ServiceError> {
    let mut guard = state.coordinator(room_id).await?;
    guard
        .verify_identity(&request.name, &request.pin, caller, now_ms())
        .await
}

/// Whether a name has an identity record.
pub async fn claimed(
    state: &SharedState,
    room_id: &str,
    name: &str,
) -> Result<bool, ServiceError> {
    let mut guard = state.coordinator(room_id).await?;
    guard.identity_claimed(name).await
}

/// Aggregated history for one singer.
pub async fn history(
    state: &SharedState,
    room_id: &str,
    name: &str,
) -> Result<SingerHistory, ServiceError> {
    let guard = state.coordinator(room_id).await?;
    Ok(guard.history(name))
}

/// Songs ranked by completed play count.
pub async fn popular(
    state: &SharedState,
    room_id: &str,
    limit: Option<usize>,
) -> Result<Vec<PopularSong>, ServiceError> {
    let guard = state.coordinator(room_id).await?;
    Ok(guard.popular(limit.unwrap_or(20)))
}
