use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dao::models::StackedSong,
    dto::api::{StackAddRequest, StackReorderRequest, StackResult},
    error::AppError,
    services::room_service,
    state::SharedState,
};

/// Routes handling personal song stacks (contribution-scoped rooms).
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms/{room_id}/stacks/{user_id}", get(get_stack))
        .route("/rooms/{room_id}/stacks/{user_id}", post(add_to_stack))
        .route(
            "/rooms/{room_id}/stacks/{user_id}/songs/{song_id}",
            delete(remove_from_stack),
        )
        .route("/rooms/{room_id}/stacks/{user_id}/order", put(reorder_stack))
}

/// Fetch a user's personal stack, FIFO order.
#[utoipa::path(
    get,
    path = "/rooms/{room_id}/stacks/{user_id}",
    tag = "stacks",
    params(
        ("room_id" = String, Path, description = "Room identifier"),
        ("user_id" = String, Path, description = "Stack owner")
    ),
    responses((status = 200, description = "Stack contents", body = [StackedSong]))
)]
pub async fn get_stack(
    State(state): State<SharedState>,
    Path((room_id, user_id)): Path<(String, String)>,
) -> Result<Json<Vec<StackedSong>>, AppError> {
    let stack = room_service::stack(&state, &room_id, &user_id).await?;
    Ok(Json(stack))
}

/// Append a song to a user's stack.
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/stacks/{user_id}",
    tag = "stacks",
    params(
        ("room_id" = String, Path, description = "Room identifier"),
        ("user_id" = String, Path, description = "Stack owner")
    ),
    request_body = StackAddRequest,
    responses((status = 200, description = "Discriminated stack outcome", body = StackResult))
)]
pub async fn add_to_stack(
    State(state): State<SharedState>,
    Path((room_id, user_id)): Path<(String, String)>,
    Valid(Json(payload)): Valid<Json<StackAddRequest>>,
) -> Result<Json<StackResult>, AppError> {
    let result = room_service::stack_add(
        &state,
        &room_id,
        &user_id,
        &payload.media_id,
        &payload.title,
        payload.source.as_deref(),
    )
    .await?;
    Ok(Json(result))
}

/// Remove one song from a user's stack.
#[utoipa::path(
    delete,
    path = "/rooms/{room_id}/stacks/{user_id}/songs/{song_id}",
    tag = "stacks",
    params(
        ("room_id" = String, Path, description = "Room identifier"),
        ("user_id" = String, Path, description = "Stack owner"),
        ("song_id" = Uuid, Path, description = "Stacked song to remove")
    ),
    responses(
        (status = 200, description = "Discriminated stack outcome", body = StackResult),
        (status = 404, description = "Song not in stack")
    )
)]
pub async fn remove_from_stack(
    State(state): State<SharedState>,
    Path((room_id, user_id, song_id)): Path<(String, String, Uuid)>,
) -> Result<Json<StackResult>, AppError> {
    let result = room_service::stack_remove(&state, &room_id, &user_id, song_id).await?;
    Ok(Json(result))
}

/// Replace the order of a user's stack.
#[utoipa::path(
    put,
    path = "/rooms/{room_id}/stacks/{user_id}/order",
    tag = "stacks",
    params(
        ("room_id" = String, Path, description = "Room identifier"),
        ("user_id" = String, Path, description = "Stack owner")
    ),
    request_body = StackReorderRequest,
    responses(
        (status = 200, description = "Discriminated stack outcome", body = StackResult),
        (status = 400, description = "Ids are not a permutation of the stack")
    )
)]
pub async fn reorder_stack(
    State(state): State<SharedState>,
    Path((room_id, user_id)): Path<(String, String)>,
    Json(payload): Json<StackReorderRequest>,
) -> Result<Json<StackResult>, AppError> {
    let result =
        room_service::stack_reorder(&state, &room_id, &user_id, &payload.song_ids).await?;
    Ok(Json(result))
}
