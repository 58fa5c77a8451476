use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::{
        api::{
            AdminAddRequest, AdvanceResult, JoinRequest, JoinResult, NextRequest, RemoveRequest,
            ReorderRequest, SkipRequest, VoteRequest, VoteResponse,
        },
        common::RoomSnapshot,
        ws::ServerMessage,
    },
    error::AppError,
    routes::admin_access,
    services::room_service,
    state::SharedState,
};

/// Routes handling live queue operations and the polling fallback.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms/{room_id}/state", get(room_state))
        .route("/rooms/{room_id}/queue/join", post(join))
        .route("/rooms/{room_id}/queue/vote", post(vote))
        .route("/rooms/{room_id}/queue/remove", post(remove))
        .route("/rooms/{room_id}/queue/skip", post(skip))
        .route("/rooms/{room_id}/queue/next", post(next))
        .route("/rooms/{room_id}/queue/reorder", post(reorder))
        .route("/rooms/{room_id}/queue/add", post(admin_add))
}

/// Authoritative room snapshot for clients without a WebSocket.
#[utoipa::path(
    get,
    path = "/rooms/{room_id}/state",
    tag = "queue",
    params(("room_id" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Current room state", body = RoomSnapshot),
        (status = 404, description = "Room does not exist")
    )
)]
pub async fn room_state(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomSnapshot>, AppError> {
    let snapshot = room_service::room_state(&state, &room_id).await?;
    Ok(Json(snapshot))
}

/// Join the live queue.
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/queue/join",
    tag = "queue",
    params(("room_id" = String, Path, description = "Room identifier")),
    request_body = JoinRequest,
    responses(
        (status = 200, description = "Discriminated join outcome", body = JoinResult),
        (status = 429, description = "Too many join attempts")
    )
)]
pub async fn join(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Valid(Json(payload)): Valid<Json<JoinRequest>>,
) -> Result<Json<JoinResult>, AppError> {
    let caller = peer.ip().to_string();
    let result = room_service::join(&state, &room_id, &payload, &caller).await?;
    Ok(Json(result))
}

/// Cast, flip or retract a vote on a queued entry.
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/queue/vote",
    tag = "queue",
    params(("room_id" = String, Path, description = "Room identifier")),
    request_body = VoteRequest,
    responses(
        (status = 200, description = "New vote total", body = VoteResponse),
        (status = 404, description = "Entry not in queue")
    )
)]
pub async fn vote(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Valid(Json(payload)): Valid<Json<VoteRequest>>,
) -> Result<Json<VoteResponse>, AppError> {
    let caller = peer.ip().to_string();
    let response = room_service::vote(&state, &room_id, &payload, &caller).await?;
    Ok(Json(response))
}

/// Remove an entry (admin, or the entry's own singer via `userName`).
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/queue/remove",
    tag = "queue",
    params(("room_id" = String, Path, description = "Room identifier")),
    request_body = RemoveRequest,
    responses(
        (status = 200, description = "State after removal", body = RoomSnapshot),
        (status = 401, description = "Not the owner and not an admin")
    )
)]
pub async fn remove(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<RemoveRequest>,
) -> Result<Json<RoomSnapshot>, AppError> {
    let access = admin_access(&headers);
    let snapshot = room_service::remove(&state, &room_id, &payload, access).await?;
    Ok(Json(snapshot))
}

/// Skip the current performance (admin or the current singer).
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/queue/skip",
    tag = "queue",
    params(("room_id" = String, Path, description = "Room identifier")),
    request_body = SkipRequest,
    responses((status = 200, description = "Discriminated advance outcome", body = AdvanceResult))
)]
pub async fn skip(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<SkipRequest>,
) -> Result<Json<AdvanceResult>, AppError> {
    let access = admin_access(&headers);
    let result = room_service::skip(&state, &room_id, &payload, access).await?;
    Ok(Json(result))
}

/// Advance the queue, idempotent via `expectedCurrentId`.
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/queue/next",
    tag = "queue",
    params(("room_id" = String, Path, description = "Room identifier")),
    request_body = NextRequest,
    responses((status = 200, description = "Discriminated advance outcome", body = AdvanceResult))
)]
pub async fn next(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Json(payload): Json<NextRequest>,
) -> Result<Json<AdvanceResult>, AppError> {
    let result = room_service::next(&state, &room_id, &payload).await?;
    Ok(Json(result))
}

/// Move an entry to a new queue position (admin only).
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/queue/reorder",
    tag = "queue",
    params(("room_id" = String, Path, description = "Room identifier")),
    request_body = ReorderRequest,
    responses(
        (status = 200, description = "State after the move", body = RoomSnapshot),
        (status = 401, description = "Missing or invalid admin credentials")
    )
)]
pub async fn reorder(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ReorderRequest>,
) -> Result<Json<RoomSnapshot>, AppError> {
    let access = admin_access(&headers);
    let snapshot = room_service::reorder(&state, &room_id, &payload, access).await?;
    Ok(Json(snapshot))
}

/// Add an entry on someone's behalf (admin only).
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/queue/add",
    tag = "queue",
    params(("room_id" = String, Path, description = "Room identifier")),
    request_body = AdminAddRequest,
    responses(
        (status = 200, description = "Joined broadcast payload", body = ServerMessage),
        (status = 401, description = "Missing or invalid admin credentials"),
        (status = 409, description = "Queue is full")
    )
)]
pub async fn admin_add(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Valid(Json(payload)): Valid<Json<AdminAddRequest>>,
) -> Result<Json<ServerMessage>, AppError> {
    let access = admin_access(&headers);
    let (entry, position) = room_service::admin_add(&state, &room_id, &payload, access).await?;
    Ok(Json(ServerMessage::Joined { entry, position }))
}
