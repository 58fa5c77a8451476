//! OpenAPI documentation generation.

use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the room coordinator.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::create_room,
        crate::routes::rooms::room_exists,
        crate::routes::rooms::get_config,
        crate::routes::rooms::put_config,
        crate::routes::rooms::verify_admin,
        crate::routes::queue::room_state,
        crate::routes::queue::join,
        crate::routes::queue::vote,
        crate::routes::queue::remove,
        crate::routes::queue::skip,
        crate::routes::queue::next,
        crate::routes::queue::reorder,
        crate::routes::queue::admin_add,
        crate::routes::identity::claim,
        crate::routes::identity::verify,
        crate::routes::identity::claimed,
        crate::routes::identity::history,
        crate::routes::identity::popular,
        crate::routes::search::search,
        crate::routes::stacks::get_stack,
        crate::routes::stacks::add_to_stack,
        crate::routes::stacks::remove_from_stack,
        crate::routes::stacks::reorder_stack,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::common::RoomSnapshot,
            crate::dto::api::CreateRoomRequest,
            crate::dto::api::ExistsResponse,
            crate::dto::api::JoinRequest,
            crate::dto::api::JoinResult,
            crate::dto::api::VoteRequest,
            crate::dto::api::VoteResponse,
            crate::dto::api::RemoveRequest,
            crate::dto::api::SkipRequest,
            crate::dto::api::NextRequest,
            crate::dto::api::AdvanceResult,
            crate::dto::api::ReorderRequest,
            crate::dto::api::AdminAddRequest,
            crate::dto::api::ClaimRequest,
            crate::dto::api::ClaimResult,
            crate::dto::api::VerifyIdentityRequest,
            crate::dto::api::VerifyResult,
            crate::dto::api::ClaimedResponse,
            crate::dto::api::AdminVerifyRequest,
            crate::dto::api::AdminVerifyResult,
            crate::dto::api::UpdateConfigRequest,
            crate::dto::api::StackAddRequest,
            crate::dto::api::StackResult,
            crate::dto::api::StackReorderRequest,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dao::models::RoomConfig,
            crate::dao::models::RoomMode,
            crate::dao::models::StackedSong,
            crate::dao::models::PlaybackState,
            crate::queue::Entry,
            crate::identity::SingerHistory,
            crate::identity::Performance,
            crate::identity::PerformanceOutcome,
            crate::identity::PopularSong,
            crate::state::search_cache::SearchResult,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room lifecycle and configuration"),
        (name = "queue", description = "Live queue operations"),
        (name = "identity", description = "Name claims and performance history"),
        (name = "search", description = "External media search"),
        (name = "stacks", description = "Personal song stacks"),
        (name = "ws", description = "Room WebSocket channel"),
    )
)]
pub struct ApiDoc;
