//! Persisted per-room entities shared across layers.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Queue ordering / eligibility mode of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RoomMode {
    /// One song per caseless display name; epoch-first ordering.
    NameScoped,
    /// Vote-first ordering with per-user pending-song stacks.
    ContributionScoped,
}

/// Per-room settings. The room id is immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomConfig {
    /// Room identifier (2-30 chars, lowercase alphanumerics and hyphens).
    pub room_id: String,
    /// Active ordering/eligibility mode.
    pub mode: RoomMode,
    /// Maximum number of queued entries.
    pub max_queue_size: usize,
    /// Maximum pending songs per user stack (contribution-scoped mode).
    pub max_stack_size: usize,
    /// Whether voting is enabled in this room.
    pub allow_voting: bool,
    /// Creation timestamp, Unix epoch milliseconds.
    pub created_at_ms: i64,
}

impl RoomConfig {
    /// Default settings applied to the implicit legacy room and used as the
    /// baseline for newly created rooms.
    pub fn defaults(room_id: &str, now_ms: i64) -> Self {
        Self {
            room_id: room_id.to_string(),
            mode: RoomMode::NameScoped,
            max_queue_size: 50,
            max_stack_size: 10,
            allow_voting: true,
            created_at_ms: now_ms,
        }
    }
}

/// Room-level admin secret; exactly one per created room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomAdmin {
    /// Hex SHA-256 of `salt ∥ pin`.
    pub pin_hash: String,
    /// Hex-encoded random salt.
    pub salt: String,
    /// Creation timestamp, Unix epoch milliseconds.
    pub created_at_ms: i64,
}

/// One pending song in a user's personal stack (contribution-scoped mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StackedSong {
    /// Stable identifier for the stacked song.
    pub id: Uuid,
    /// Media identifier to promote into the queue later.
    pub media_id: String,
    /// Song title.
    pub title: String,
    /// Media source tag.
    pub source: String,
    /// When the song was stacked, Unix epoch milliseconds.
    pub added_at_ms: i64,
}

/// Shared synchronized playback clock, broadcast whenever it changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    /// Media currently playing, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
    /// When playback of the current media started, Unix epoch milliseconds.
    pub started_at_ms: i64,
    /// Position within the media in seconds at `started_at_ms`.
    pub position_seconds: f64,
    /// Whether playback is running.
    pub playing: bool,
}
