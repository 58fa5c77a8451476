//! HTTP route composition and shared request helpers.

use axum::{Router, http::HeaderMap};

use crate::state::{SharedState, room::AdminAccess};

pub mod docs;
pub mod health;
pub mod identity;
pub mod queue;
pub mod rooms;
pub mod search;
pub mod stacks;
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(rooms::router())
        .merge(queue::router())
        .merge(identity::router())
        .merge(search::router())
        .merge(stacks::router())
        .merge(websocket::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}

/// Pull admin credentials out of the request headers: a session token from
/// `x-admin-token`, and the legacy unauthenticated intent flag from
/// `x-admin: true` (honored only for rooms with no configured admin).
pub(crate) fn admin_access(headers: &HeaderMap) -> AdminAccess {
    AdminAccess {
        token: headers
            .get("x-admin-token")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        legacy_intent: headers
            .get("x-admin")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case("true")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn admin_access_reads_both_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-admin", HeaderValue::from_static("TRUE"));
        headers.insert("x-admin-token", HeaderValue::from_static("tok"));

        let access = admin_access(&headers);
        assert!(access.legacy_intent);
        assert_eq!(access.token.as_deref(), Some("tok"));

        let empty = admin_access(&HeaderMap::new());
        assert!(!empty.legacy_intent);
        assert!(empty.token.is_none());
    }

    #[test]
    fn admin_intent_requires_literal_true() {
        let mut headers = HeaderMap::new();
        headers.insert("x-admin", HeaderValue::from_static("1"));
        assert!(!admin_access(&headers).legacy_intent);
    }
}
