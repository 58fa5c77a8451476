use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Path, Query, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::api::{
        ClaimRequest, ClaimResult, ClaimedResponse, PopularQuery, VerifyIdentityRequest,
        VerifyResult,
    },
    error::AppError,
    identity::{PopularSong, SingerHistory},
    services::identity_service,
    state::SharedState,
};

/// Routes handling identity claims and performance history.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms/{room_id}/identity/claim", post(claim))
        .route("/rooms/{room_id}/identity/verify", post(verify))
        .route("/rooms/{room_id}/identity/{name}", get(claimed))
        .route("/rooms/{room_id}/singers/{name}/history", get(history))
        .route("/rooms/{room_id}/popular", get(popular))
}

/// Claim a display name with a 6-digit PIN.
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/identity/claim",
    tag = "identity",
    params(("room_id" = String, Path, description = "Room identifier")),
    request_body = ClaimRequest,
    responses(
        (status = 200, description = "Discriminated claim outcome", body = ClaimResult),
        (status = 429, description = "Too many PIN attempts")
    )
)]
pub async fn claim(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Valid(Json(payload)): Valid<Json<ClaimRequest>>,
) -> Result<Json<ClaimResult>, AppError> {
    let caller = peer.ip().to_string();
    let result = identity_service::claim(&state, &room_id, &payload, &caller).await?;
    Ok(Json(result))
}

/// Verify a PIN against a claimed name.
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/identity/verify",
    tag = "identity",
    params(("room_id" = String, Path, description = "Room identifier")),
    request_body = VerifyIdentityRequest,
    responses(
        (status = 200, description = "Verification outcome", body = VerifyResult),
        (status = 429, description = "Too many PIN attempts")
    )
)]
pub async fn verify(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Valid(Json(payload)): Valid<Json<VerifyIdentityRequest>>,
) -> Result<Json<VerifyResult>, AppError> {
    let caller = peer.ip().to_string();
    let result = identity_service::verify(&state, &room_id, &payload, &caller).await?;
    Ok(Json(result))
}

/// Probe whether a name is claimed.
#[utoipa::path(
    get,
    path = "/rooms/{room_id}/identity/{name}",
    tag = "identity",
    params(
        ("room_id" = String, Path, description = "Room identifier"),
        ("name" = String, Path, description = "Display name to probe")
    ),
    responses((status = 200, description = "Claim probe", body = ClaimedResponse))
)]
pub async fn claimed(
    State(state): State<SharedState>,
    Path((room_id, name)): Path<(String, String)>,
) -> Result<Json<ClaimedResponse>, AppError> {
    let claimed = identity_service::claimed(&state, &room_id, &name).await?;
    Ok(Json(ClaimedResponse { name, claimed }))
}

/// Aggregated history for one singer.
#[utoipa::path(
    get,
    path = "/rooms/{room_id}/singers/{name}/history",
    tag = "identity",
    params(
        ("room_id" = String, Path, description = "Room identifier"),
        ("name" = String, Path, description = "Singer display name")
    ),
    responses((status = 200, description = "Per-singer history", body = SingerHistory))
)]
pub async fn history(
    State(state): State<SharedState>,
    Path((room_id, name)): Path<(String, String)>,
) -> Result<Json<SingerHistory>, AppError> {
    let history = identity_service::history(&state, &room_id, &name).await?;
    Ok(Json(history))
}

/// Songs ranked by completed play count.
#[utoipa::path(
    get,
    path = "/rooms/{room_id}/popular",
    tag = "identity",
    params(
        ("room_id" = String, Path, description = "Room identifier"),
        ("limit" = Option<usize>, Query, description = "Maximum ranked songs, clamped into 1..=100")
    ),
    responses((status = 200, description = "Ranked songs", body = [PopularSong]))
)]
pub async fn popular(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Query(query): Query<PopularQuery>,
) -> Result<Json<Vec<PopularSong>>, AppError> {
    let ranked = identity_service::popular(&state, &room_id, query.limit).await?;
    Ok(Json(ranked))
}
