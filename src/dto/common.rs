//! Snapshots shared by the WebSocket push channel and the HTTP fallback.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dao::models::PlaybackState,
    queue::{Entry, QueueState},
};

/// Full room snapshot pushed to subscribers and served over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// Queue entries in playback order.
    pub queue: Vec<Entry>,
    /// Monotonic epoch counter.
    pub current_epoch: u64,
    /// Entry currently performing, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now_playing: Option<Entry>,
    /// Shared playback clock.
    pub playback: PlaybackState,
    /// Whether an external playback relay is subscribed to this room.
    pub relay_connected: bool,
}

impl RoomSnapshot {
    /// Assemble a snapshot from the coordinator's live state.
    pub fn assemble(state: &QueueState, playback: &PlaybackState, relay_connected: bool) -> Self {
        Self {
            queue: state.entries.clone(),
            current_epoch: state.current_epoch,
            now_playing: state.now_playing.clone(),
            playback: playback.clone(),
            relay_connected,
        }
    }
}
