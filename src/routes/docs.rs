//! Interactive API documentation for the room coordinator.

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Mount the Swagger UI at `/docs`, backed by the aggregated OpenAPI
/// document covering the room, queue, identity, search and stack surfaces.
pub fn router(state: SharedState) -> Router<SharedState> {
    let swagger = SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi());

    Router::new().merge(swagger).with_state(state)
}
