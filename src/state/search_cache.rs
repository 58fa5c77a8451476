//! TTL cache for external search results, pruned opportunistically.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One flattened search result from the upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Media identifier usable in a join request.
    pub media_id: String,
    /// Result title.
    pub title: String,
    /// Channel or uploader name, when the upstream exposed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Thumbnail URL, when the upstream exposed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedQuery {
    results: Vec<SearchResult>,
    expires_at_ms: i64,
}

/// Cache from normalized query string to results with a fixed TTL.
///
/// Expired entries are only swept once the map grows past the prune
/// threshold, never on every request.
#[derive(Debug)]
pub struct SearchCache {
    entries: HashMap<String, CachedQuery>,
    ttl_ms: i64,
    prune_threshold: usize,
}

impl SearchCache {
    /// Create an empty cache with the given TTL and prune threshold.
    pub fn new(ttl_ms: i64, prune_threshold: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_ms,
            prune_threshold,
        }
    }

    /// Normalize a query the same way cache keys are stored.
    pub fn normalize(query: &str) -> String {
        query.trim().to_lowercase()
    }

    /// Look up a fresh cached result for the query.
    pub fn get(&self, query: &str, now_ms: i64) -> Option<&[SearchResult]> {
        self.entries
            .get(&Self::normalize(query))
            .filter(|cached| cached.expires_at_ms > now_ms)
            .map(|cached| cached.results.as_slice())
    }

    /// Store results for the query, pruning expired entries if the cache has
    /// grown past the threshold.
    pub fn insert(&mut self, query: &str, results: Vec<SearchResult>, now_ms: i64) {
        if self.entries.len() >= self.prune_threshold {
            self.entries.retain(|_, cached| cached.expires_at_ms > now_ms);
        }
        self.entries.insert(
            Self::normalize(query),
            CachedQuery {
                results,
                expires_at_ms: now_ms + self.ttl_ms,
            },
        );
    }

    /// Number of live cache slots, including not-yet-pruned expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str) -> SearchResult {
        SearchResult {
            media_id: id.to_string(),
            title: format!("title {id}"),
            channel: None,
            thumbnail: None,
        }
    }

    #[test]
    fn hit_requires_same_normalized_query() {
        let mut cache = SearchCache::new(1000, 64);
        cache.insert("  Bohemian Rhapsody ", vec![result("a")], 0);

        assert!(cache.get("bohemian rhapsody", 10).is_some());
        assert!(cache.get("BOHEMIAN RHAPSODY", 10).is_some());
        assert!(cache.get("other", 10).is_none());
    }

    #[test]
    fn entries_expire_after_ttl() {
        let mut cache = SearchCache::new(1000, 64);
        cache.insert("q", vec![result("a")], 0);
        assert!(cache.get("q", 999).is_some());
        assert!(cache.get("q", 1000).is_none());
    }

    #[test]
    fn prune_runs_only_past_threshold() {
        let mut cache = SearchCache::new(10, 3);
        cache.insert("a", vec![], 0);
        cache.insert("b", vec![], 0);
        // Both expired now, but below threshold nothing is swept.
        cache.insert("c", vec![], 100);
        assert_eq!(cache.len(), 3);
        // Crossing the threshold sweeps the stale slots.
        cache.insert("d", vec![], 200);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("d", 205).is_some());
    }
}
