//! External media search with a per-room TTL cache.
//!
//! The upstream call happens with the room lock released; only the
//! rate-limit/cache gate and the result insertion run under it, so a slow
//! upstream never blocks the room's mutations.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    error::ServiceError,
    state::{SharedState, now_ms, search_cache::SearchResult},
};

const MAX_RESULTS: usize = 10;

/// Search the external media API, serving from the room's cache when fresh.
pub async fn search(
    state: &SharedState,
    room_id: &str,
    query: &str,
    caller: &str,
) -> Result<Vec<SearchResult>, ServiceError> {
    {
        let mut guard = state.coordinator(room_id).await?;
        if let Some(cached) = guard.search_gate(query, caller, now_ms())? {
            debug!(room = %room_id, query, "search cache hit");
            return Ok(cached);
        }
    }

    let results = fetch_upstream(state, query).await?;

    let mut guard = state.coordinator(room_id).await?;
    guard.cache_search_results(query, results.clone(), now_ms());
    Ok(results)
}

async fn fetch_upstream(
    state: &SharedState,
    query: &str,
) -> Result<Vec<SearchResult>, ServiceError> {
    let config = state.config();
    let mut request = state
        .http()
        .get(&config.search_api_url)
        .query(&[
            ("part", "snippet"),
            ("type", "video"),
            ("maxResults", "10"),
            ("q", query),
        ]);
    if let Some(key) = &config.search_api_key {
        request = request.query(&[("key", key.as_str())]);
    }

    let timeout = Duration::from_millis(config.search_timeout_ms);
    let response = tokio::time::timeout(timeout, request.send())
        .await
        .map_err(|_| ServiceError::Upstream("search upstream timed out".into()))?
        .map_err(|err| ServiceError::Upstream(format!("search request failed: {err}")))?;

    if !response.status().is_success() {
        return Err(ServiceError::Upstream(format!(
            "search upstream returned {}",
            response.status()
        )));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|err| ServiceError::Upstream(format!("unreadable search response: {err}")))?;
    Ok(flatten_results(&body))
}

/// Flatten the upstream response, tolerating shape drift: items missing an id
/// or title are skipped, never fatal.
fn flatten_results(body: &Value) -> Vec<SearchResult> {
    let Some(items) = body.get("items").and_then(Value::as_array) else {
        warn!("search response carried no items array");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(flatten_item)
        .take(MAX_RESULTS)
        .collect()
}

fn flatten_item(item: &Value) -> Option<SearchResult> {
    let media_id = item
        .get("id")
        .and_then(|id| id.get("videoId").or(Some(id)))
        .and_then(Value::as_str)?
        .to_string();
    let snippet = item.get("snippet")?;
    let title = snippet.get("title").and_then(Value::as_str)?.to_string();

    Some(SearchResult {
        media_id,
        title,
        channel: snippet
            .get("channelTitle")
            .and_then(Value::as_str)
            .map(str::to_string),
        thumbnail: snippet
            .pointer("/thumbnails/default/url")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_nested_video_ids() {
        let body = json!({
            "items": [
                {
                    "id": {"videoId": "abc"},
                    "snippet": {
                        "title": "Song A",
                        "channelTitle": "Channel",
                        "thumbnails": {"default": {"url": "http://t/a.jpg"}}
                    }
                },
                {
                    "id": "plain-id",
                    "snippet": {"title": "Song B"}
                }
            ]
        });

        let results = flatten_results(&body);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].media_id, "abc");
        assert_eq!(results[0].channel.as_deref(), Some("Channel"));
        assert_eq!(results[0].thumbnail.as_deref(), Some("http://t/a.jpg"));
        assert_eq!(results[1].media_id, "plain-id");
        assert!(results[1].channel.is_none());
    }

    #[test]
    fn malformed_items_are_skipped_not_fatal() {
        let body = json!({
            "items": [
                {"id": {"videoId": "ok"}, "snippet": {"title": "fine"}},
                {"id": {"videoId": "no-snippet"}},
                {"snippet": {"title": "no id"}},
                42
            ]
        });
        let results = flatten_results(&body);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].media_id, "ok");
    }

    #[test]
    fn missing_items_yields_empty() {
        assert!(flatten_results(&json!({"error": "quota"})).is_empty());
        assert!(flatten_results(&json!(null)).is_empty());
    }
}
