//! Application-level configuration: operational limits, TTLs and the search
//! upstream endpoint.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/encore.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ENCORE_BACK_CONFIG_PATH";

/// Per-category fixed-window rate limits (attempts per 60s window).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    /// PIN verification attempts.
    pub pin: u32,
    /// External search calls.
    pub search: u32,
    /// Queue join attempts.
    pub join: u32,
    /// Vote submissions.
    pub vote: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            pin: 10,
            search: 20,
            join: 10,
            vote: 40,
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Rate limits per operation category.
    pub rate_limits: RateLimits,
    /// Admin session lifetime in milliseconds.
    pub admin_session_ms: i64,
    /// Search cache TTL in milliseconds.
    pub search_ttl_ms: i64,
    /// Search cache size past which expired entries are swept.
    pub search_cache_prune_threshold: usize,
    /// Bounded wait for the search upstream, in milliseconds.
    pub search_timeout_ms: u64,
    /// Base URL of the external search API.
    pub search_api_url: String,
    /// Optional API key forwarded to the search upstream.
    pub search_api_key: Option<String>,
    /// Room id that exists without explicit creation and has no admin.
    pub legacy_room_id: String,
    /// Room ids that can never be created.
    pub reserved_room_ids: Vec<String>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to
    /// built-in defaults, then apply environment overrides for the search
    /// upstream.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded configuration");
                    raw.into()
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        if let Ok(url) = env::var("SEARCH_API_URL") {
            config.search_api_url = url;
        }
        if let Ok(key) = env::var("SEARCH_API_KEY") {
            config.search_api_key = Some(key);
        }
        config
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rate_limits: RateLimits::default(),
            admin_session_ms: 6 * 60 * 60 * 1000,
            search_ttl_ms: 5 * 60 * 1000,
            search_cache_prune_threshold: 64,
            search_timeout_ms: 8_000,
            search_api_url: "https://www.googleapis.com/youtube/v3/search".into(),
            search_api_key: None,
            legacy_room_id: "karaoke".into(),
            reserved_room_ids: ["api", "ws", "docs", "admin", "health", "static", "www"]
                .map(String::from)
                .to_vec(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// JSON representation of the configuration file.
struct RawConfig {
    rate_limits: RateLimits,
    admin_session_hours: i64,
    search_ttl_minutes: i64,
    search_cache_prune_threshold: usize,
    search_timeout_ms: u64,
    search_api_url: String,
    search_api_key: Option<String>,
    legacy_room_id: String,
    reserved_room_ids: Vec<String>,
}

impl Default for RawConfig {
    fn default() -> Self {
        let defaults = AppConfig::default();
        Self {
            rate_limits: defaults.rate_limits,
            admin_session_hours: 6,
            search_ttl_minutes: 5,
            search_cache_prune_threshold: defaults.search_cache_prune_threshold,
            search_timeout_ms: defaults.search_timeout_ms,
            search_api_url: defaults.search_api_url,
            search_api_key: defaults.search_api_key,
            legacy_room_id: defaults.legacy_room_id,
            reserved_room_ids: defaults.reserved_room_ids,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        Self {
            rate_limits: raw.rate_limits,
            admin_session_ms: raw.admin_session_hours * 60 * 60 * 1000,
            search_ttl_ms: raw.search_ttl_minutes * 60 * 1000,
            search_cache_prune_threshold: raw.search_cache_prune_threshold,
            search_timeout_ms: raw.search_timeout_ms,
            search_api_url: raw.search_api_url,
            search_api_key: raw.search_api_key,
            legacy_room_id: raw.legacy_room_id,
            reserved_room_ids: raw.reserved_room_ids,
        }
    }
}

fn resolve_config_path() -> PathBuf {
    env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_config_converts_units() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"adminSessionHours": 2, "searchTtlMinutes": 1, "rateLimits": {"pin": 3}}"#,
        )
        .unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.admin_session_ms, 2 * 60 * 60 * 1000);
        assert_eq!(config.search_ttl_ms, 60 * 1000);
        assert_eq!(config.rate_limits.pin, 3);
        // Unspecified categories keep their defaults.
        assert_eq!(config.rate_limits.vote, RateLimits::default().vote);
    }

    #[test]
    fn defaults_reserve_routing_prefixes() {
        let config = AppConfig::default();
        assert!(config.reserved_room_ids.contains(&"api".to_string()));
        assert_eq!(config.legacy_room_id, "karaoke");
    }
}
