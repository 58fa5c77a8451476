use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Path, Query, State},
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::api::SearchQuery,
    error::AppError,
    services::search_service,
    state::{SharedState, search_cache::SearchResult},
};

/// Routes handling external media search.
pub fn router() -> Router<SharedState> {
    Router::new().route("/rooms/{room_id}/search", get(search))
}

/// Search the external media API, rate-limited and cached per room.
#[utoipa::path(
    get,
    path = "/rooms/{room_id}/search",
    tag = "search",
    params(
        ("room_id" = String, Path, description = "Room identifier"),
        ("q" = String, Query, description = "Free-text query")
    ),
    responses(
        (status = 200, description = "Flattened search results", body = [SearchResult]),
        (status = 429, description = "Too many searches"),
        (status = 502, description = "Upstream failed or timed out")
    )
)]
pub async fn search(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Valid(Query(query)): Valid<Query<SearchQuery>>,
) -> Result<Json<Vec<SearchResult>>, AppError> {
    let caller = peer.ip().to_string();
    let results = search_service::search(&state, &room_id, &query.q, &caller).await?;
    Ok(Json(results))
}
