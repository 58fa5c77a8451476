//! WebSocket message unions for both directions, discriminated by `type`.
//!
//! Both enums are closed: a new variant fails to compile until the single
//! dispatch point in the websocket service handles it.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{PlaybackState, StackedSong},
    dto::common::RoomSnapshot,
    queue::Entry,
};

/// Role a connection declares when subscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ClientRole {
    /// Ordinary display/control surface.
    Viewer,
    /// External playback relay; suppresses the embedded playback path.
    Relay,
}

/// Messages accepted from room WebSocket clients.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Declare the client role; required before receiving broadcasts.
    Subscribe {
        /// Role of this connection.
        client_role: ClientRole,
    },
    /// Clock-synchronization probe carrying the caller's local time.
    Ping {
        /// Client timestamp in its own clock, milliseconds.
        client_time: i64,
    },
    /// Ask for a fresh playback sync frame.
    SyncRequest,
    /// Join the queue.
    Join {
        /// Singer display name.
        name: String,
        /// Media to perform.
        media_id: String,
        /// Song title.
        title: String,
        /// Media source tag; defaults to `youtube`.
        #[serde(default)]
        source: Option<String>,
        /// PIN for a claimed name.
        #[serde(default)]
        pin: Option<String>,
        /// Owning user id (contribution-scoped rooms).
        #[serde(default)]
        user_id: Option<String>,
    },
    /// Cast, flip or retract a vote.
    Vote {
        /// Entry voted on.
        entry_id: Uuid,
        /// Stable voter identifier.
        voter_id: String,
        /// Direction in {-1, 0, 1}.
        direction: i8,
    },
    /// Remove an entry from the queue.
    Remove {
        /// Entry to remove.
        entry_id: Uuid,
        /// Privileged-intent flag (honored only for rooms with no admin).
        #[serde(default)]
        is_admin: bool,
        /// Admin session token for rooms with a configured admin.
        #[serde(default)]
        admin_token: Option<String>,
        /// Name of the requesting user, for owner self-removal.
        #[serde(default)]
        user_name: Option<String>,
    },
    /// Skip the current performance.
    Skip {
        /// Privileged-intent flag (honored only for rooms with no admin).
        #[serde(default)]
        is_admin: bool,
        /// Admin session token for rooms with a configured admin.
        #[serde(default)]
        admin_token: Option<String>,
        /// Name of the requesting user, for self-skip.
        #[serde(default)]
        user_name: Option<String>,
    },
    /// Advance the queue, guarded by the expected current entry id.
    Next {
        /// Entry the caller believes is currently playing.
        #[serde(default)]
        expected_current_id: Option<Uuid>,
    },
    /// Move an entry to a new queue position (admin only).
    Reorder {
        /// Entry to move.
        entry_id: Uuid,
        /// Target position, clamped into the queue bounds.
        new_position: usize,
        /// Admin session token for rooms with a configured admin.
        #[serde(default)]
        admin_token: Option<String>,
        /// Privileged-intent flag (honored only for rooms with no admin).
        #[serde(default)]
        is_admin: bool,
    },
    /// Add an entry on someone's behalf (admin only).
    AdminAdd {
        /// Singer display name.
        name: String,
        /// Media to perform.
        media_id: String,
        /// Song title.
        title: String,
        /// Admin session token for rooms with a configured admin.
        #[serde(default)]
        admin_token: Option<String>,
        /// Privileged-intent flag (honored only for rooms with no admin).
        #[serde(default)]
        is_admin: bool,
    },
    /// A playback surface reports the current media finished.
    MediaEnded {
        /// Media id the surface believes just finished.
        media_id: String,
    },
    /// A playback surface reports the current media failed.
    MediaError {
        /// Media id that failed.
        media_id: String,
        /// Failure description.
        reason: String,
    },
    /// Add a song to the caller's personal stack (contribution-scoped).
    AddSong {
        /// Token identifying the user session.
        session_token: String,
        /// Media to stack.
        media_id: String,
        /// Song title.
        title: String,
        /// Media source tag; defaults to `youtube`.
        #[serde(default)]
        source: Option<String>,
    },
    /// Remove a song from the caller's personal stack.
    RemoveFromStack {
        /// Token identifying the user session.
        session_token: String,
        /// Stacked song to remove.
        song_id: Uuid,
    },
    /// Reorder the caller's personal stack.
    ReorderStack {
        /// Token identifying the user session.
        session_token: String,
        /// Complete permutation of the stack's song ids.
        song_ids: Vec<Uuid>,
    },
}

/// Messages pushed to room WebSocket clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Full room state snapshot.
    State {
        /// Queue entries in playback order.
        queue: Vec<Entry>,
        /// Monotonic epoch counter.
        current_epoch: u64,
        /// Entry currently performing, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        now_playing: Option<Entry>,
        /// Shared playback clock.
        playback: PlaybackState,
        /// Whether a playback relay is subscribed.
        relay_connected: bool,
    },
    /// Acknowledges a successful join.
    Joined {
        /// The created entry.
        entry: Entry,
        /// Zero-based position in the queue.
        position: usize,
    },
    /// A vote was applied.
    Voted {
        /// Entry voted on.
        entry_id: Uuid,
        /// New aggregated total.
        new_total: i64,
    },
    /// An entry was removed.
    Removed {
        /// Removed entry id.
        entry_id: Uuid,
    },
    /// The queue advanced.
    Advanced {
        /// New current performance, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        now_playing: Option<Entry>,
        /// Epoch counter after the advance.
        current_epoch: u64,
    },
    /// Playback clock update.
    Sync {
        /// Shared playback clock.
        playback: PlaybackState,
    },
    /// Clock-synchronization reply.
    Pong {
        /// Coordinator timestamp, milliseconds.
        server_time: i64,
        /// Echo of the caller's original timestamp.
        client_time: i64,
    },
    /// Relay presence changed.
    RelayStatus {
        /// Whether a relay is currently subscribed.
        connected: bool,
    },
    /// A user's personal stack changed.
    StackUpdated {
        /// Owner of the stack.
        user_id: String,
        /// New stack contents, FIFO order.
        stack: Vec<StackedSong>,
    },
    /// A stacked song was promoted into the live queue.
    PromotedToQueue {
        /// Owner of the stack.
        user_id: String,
        /// Entry created from the promoted song.
        entry: Entry,
        /// Stack contents after the promotion.
        remaining_stack: Vec<StackedSong>,
    },
    /// A client message failed; the connection stays open.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

impl ServerMessage {
    /// Build a `state` broadcast from a snapshot.
    pub fn state(snapshot: &RoomSnapshot) -> Self {
        ServerMessage::State {
            queue: snapshot.queue.clone(),
            current_epoch: snapshot.current_epoch,
            now_playing: snapshot.now_playing.clone(),
            playback: snapshot.playback.clone(),
            relay_connected: snapshot.relay_connected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_type_discriminator() {
        let parsed: ClientMessage =
            serde_json::from_str(r#"{"type":"ping","clientTime":123}"#).unwrap();
        assert!(matches!(parsed, ClientMessage::Ping { client_time: 123 }));

        let parsed: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","clientRole":"relay"}"#).unwrap();
        assert!(matches!(
            parsed,
            ClientMessage::Subscribe {
                client_role: ClientRole::Relay
            }
        ));

        let parsed: ClientMessage = serde_json::from_str(
            r#"{"type":"join","name":"Amy","mediaId":"abc","title":"Song"}"#,
        )
        .unwrap();
        assert!(matches!(parsed, ClientMessage::Join { .. }));
    }

    #[test]
    fn server_messages_serialize_tagged() {
        let message = ServerMessage::Pong {
            server_time: 5,
            client_time: 3,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "pong");
        assert_eq!(json["serverTime"], 5);
    }
}
