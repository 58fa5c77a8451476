use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
    routing::{get, post, put},
};
use axum_valid::Valid;

use crate::{
    dao::models::RoomConfig,
    dto::api::{AdminVerifyRequest, AdminVerifyResult, CreateRoomRequest, ExistsResponse, UpdateConfigRequest},
    error::AppError,
    routes::admin_access,
    services::room_service,
    state::SharedState,
};

/// Routes handling room lifecycle and configuration.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{room_id}/exists", get(room_exists))
        .route("/rooms/{room_id}/config", get(get_config))
        .route("/rooms/{room_id}/config", put(put_config))
        .route("/rooms/{room_id}/admin/verify", post(verify_admin))
}

/// Create a new room with its admin PIN.
#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 200, description = "Room created", body = RoomConfig),
        (status = 409, description = "Room id already exists or is reserved")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateRoomRequest>>,
) -> Result<Json<RoomConfig>, AppError> {
    let config = room_service::create_room(&state, payload).await?;
    Ok(Json(config))
}

/// Probe whether a room exists.
#[utoipa::path(
    get,
    path = "/rooms/{room_id}/exists",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room identifier")),
    responses((status = 200, description = "Existence probe", body = ExistsResponse))
)]
pub async fn room_exists(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<ExistsResponse>, AppError> {
    let exists = room_service::room_exists(&state, &room_id).await?;
    Ok(Json(ExistsResponse { room_id, exists }))
}

/// Fetch the current room settings.
#[utoipa::path(
    get,
    path = "/rooms/{room_id}/config",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Room settings", body = RoomConfig),
        (status = 404, description = "Room does not exist")
    )
)]
pub async fn get_config(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomConfig>, AppError> {
    let config = room_service::room_config(&state, &room_id).await?;
    Ok(Json(config))
}

/// Update room settings (admin only).
#[utoipa::path(
    put,
    path = "/rooms/{room_id}/config",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room identifier")),
    request_body = UpdateConfigRequest,
    responses(
        (status = 200, description = "Updated settings", body = RoomConfig),
        (status = 401, description = "Missing or invalid admin credentials")
    )
)]
pub async fn put_config(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpdateConfigRequest>,
) -> Result<Json<RoomConfig>, AppError> {
    let access = admin_access(&headers);
    let config = room_service::update_config(&state, &room_id, payload, access).await?;
    Ok(Json(config))
}

/// Verify the room admin PIN and obtain a session token.
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/admin/verify",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room identifier")),
    request_body = AdminVerifyRequest,
    responses(
        (status = 200, description = "Verification outcome", body = AdminVerifyResult),
        (status = 429, description = "Too many PIN attempts")
    )
)]
pub async fn verify_admin(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Valid(Json(payload)): Valid<Json<AdminVerifyRequest>>,
) -> Result<Json<AdminVerifyResult>, AppError> {
    let caller = peer.ip().to_string();
    let result = room_service::verify_admin(&state, &room_id, &payload.pin, &caller).await?;
    Ok(Json(result))
}
