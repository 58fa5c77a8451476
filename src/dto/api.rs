//! HTTP request/response DTOs for the discrete (polling fallback) surface.
//!
//! Every response is a discriminated result shape so callers can branch on
//! the exact outcome instead of a bare boolean.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{RoomMode, StackedSong},
    dto::{
        common::RoomSnapshot,
        validation::{validate_pin, validate_room_id},
    },
    queue::Entry,
};

/// Create a new room with its admin PIN.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    /// Room identifier.
    #[validate(custom(function = "validate_room_id"))]
    pub room_id: String,
    /// Six-digit admin PIN for the room.
    #[validate(custom(function = "validate_pin"))]
    pub admin_pin: String,
    /// Initial mode; defaults to name-scoped.
    #[serde(default)]
    pub mode: Option<RoomMode>,
}

/// Join the live queue.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Singer display name.
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    /// Media to perform.
    #[validate(length(min = 1))]
    pub media_id: String,
    /// Song title.
    pub title: String,
    /// Media source tag; defaults to `youtube`.
    #[serde(default)]
    pub source: Option<String>,
    /// PIN for a claimed name.
    #[serde(default)]
    pub pin: Option<String>,
    /// Owning user id (contribution-scoped rooms).
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Discriminated join outcome.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "result", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum JoinResult {
    /// The entry is in the queue.
    Joined {
        /// Created entry.
        entry: Entry,
        /// Zero-based queue position after sorting.
        position: usize,
        /// Whether this name has never completed a performance here; used to
        /// prompt a first-time singer to claim the name.
        first_time: bool,
    },
    /// The name is claimed; present a PIN and retry.
    RequiresPin,
    /// The presented PIN did not match the claimed name.
    WrongPin,
    /// The name already has a queued entry.
    AlreadyInQueue,
    /// The name is currently performing.
    NowPlaying,
    /// The queue is at capacity.
    QueueFull,
    /// Contribution-scoped: the user already has an entry, so the song
    /// landed on their personal stack.
    Stacked {
        /// Stack contents after the addition, FIFO order.
        stack: Vec<StackedSong>,
    },
    /// Contribution-scoped: the user's personal stack is full.
    StackFull,
}

/// Cast, flip or retract a vote.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    /// Entry voted on.
    pub entry_id: Uuid,
    /// Stable voter identifier.
    #[validate(length(min = 1, max = 100))]
    pub voter_id: String,
    /// Direction in {-1, 0, 1}.
    pub direction: i8,
}

/// Vote acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    /// Entry voted on.
    pub entry_id: Uuid,
    /// New aggregated total.
    pub new_total: i64,
}

/// Remove an entry from the queue.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoveRequest {
    /// Entry to remove.
    pub entry_id: Uuid,
    /// Name of the requesting user, for owner self-removal.
    #[serde(default)]
    pub user_name: Option<String>,
}

/// Skip the current performance.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SkipRequest {
    /// Name of the requesting user, for self-skip.
    #[serde(default)]
    pub user_name: Option<String>,
}

/// Advance the queue, guarded by the expected current entry id.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NextRequest {
    /// Entry the caller believes is currently playing; `null` asserts that
    /// nothing is playing yet.
    #[serde(default)]
    pub expected_current_id: Option<Uuid>,
}

/// Discriminated advance outcome. A state mismatch is a silent no-op signal,
/// not an error: the authoritative state rides along either way.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "result", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AdvanceResult {
    /// The queue advanced.
    Advanced {
        /// Authoritative room state after the advance.
        state: RoomSnapshot,
    },
    /// The caller's expectation was stale; nothing was mutated.
    StateMismatch {
        /// Authoritative room state.
        state: RoomSnapshot,
    },
}

/// Move an entry to a new queue position (admin only).
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    /// Entry to move.
    pub entry_id: Uuid,
    /// Target position, clamped into the queue bounds.
    pub new_position: usize,
}

/// Add an entry on someone's behalf (admin only).
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminAddRequest {
    /// Singer display name.
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    /// Media to perform.
    #[validate(length(min = 1))]
    pub media_id: String,
    /// Song title.
    pub title: String,
    /// Media source tag; defaults to `youtube`.
    #[serde(default)]
    pub source: Option<String>,
}

/// Claim a display name with a PIN.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    /// Display name to claim.
    #[validate(length(min = 1, max = 30))]
    pub name: String,
    /// Six-digit PIN to bind to the name.
    #[validate(custom(function = "validate_pin"))]
    pub pin: String,
}

/// Discriminated claim outcome.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "result", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClaimResult {
    /// The name is now claimed by the caller.
    Claimed {
        /// Normalized form the claim is stored under.
        normalized_name: String,
    },
    /// Someone already claimed this name.
    AlreadyClaimed,
}

/// Verify a PIN against a claimed name.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyIdentityRequest {
    /// Claimed display name.
    #[validate(length(min = 1, max = 30))]
    pub name: String,
    /// PIN to check.
    #[validate(custom(function = "validate_pin"))]
    pub pin: String,
}

/// Discriminated identity verification outcome.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum VerifyResult {
    /// The PIN matches the claim.
    Valid,
    /// The PIN does not match.
    Invalid,
    /// The name has never been claimed.
    Unclaimed,
}

/// Identity-claimed probe response.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedResponse {
    /// Name that was probed.
    pub name: String,
    /// Whether an identity record exists for it.
    pub claimed: bool,
}

/// Room existence probe response.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExistsResponse {
    /// Room id that was probed.
    pub room_id: String,
    /// Whether the room exists.
    pub exists: bool,
}

/// Verify the room admin PIN.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminVerifyRequest {
    /// Admin PIN to check.
    #[validate(custom(function = "validate_pin"))]
    pub pin: String,
}

/// Discriminated admin verification outcome.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "result", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AdminVerifyResult {
    /// PIN accepted; a session token was issued.
    Ok {
        /// Bearer token for subsequent privileged calls.
        token: String,
        /// Session expiry, Unix epoch milliseconds.
        expires_at_ms: i64,
    },
    /// PIN rejected.
    WrongPin,
}

/// Partial room configuration update (admin only).
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfigRequest {
    /// New mode; switching triggers a one-time re-sort of the live queue.
    #[serde(default)]
    pub mode: Option<RoomMode>,
    /// New queue capacity.
    #[serde(default)]
    pub max_queue_size: Option<usize>,
    /// New per-user stack bound.
    #[serde(default)]
    pub max_stack_size: Option<usize>,
    /// Enable or disable voting.
    #[serde(default)]
    pub allow_voting: Option<bool>,
}

/// Add a song to a personal stack.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StackAddRequest {
    /// Media to stack.
    #[validate(length(min = 1))]
    pub media_id: String,
    /// Song title.
    pub title: String,
    /// Media source tag; defaults to `youtube`.
    #[serde(default)]
    pub source: Option<String>,
}

/// Discriminated stack mutation outcome.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "result", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StackResult {
    /// The stack was updated.
    Updated {
        /// Stack contents after the mutation, FIFO order.
        stack: Vec<StackedSong>,
    },
    /// The stack is at its configured bound.
    StackFull,
}

/// Replace the order of a personal stack.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StackReorderRequest {
    /// Complete permutation of the stack's song ids.
    pub song_ids: Vec<Uuid>,
}

/// Search query parameters.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SearchQuery {
    /// Free-text query.
    #[validate(length(min = 1, max = 200))]
    pub q: String,
}

/// Popular-songs query parameters.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PopularQuery {
    /// Maximum number of ranked songs; clamped into 1..=100.
    #[serde(default)]
    pub limit: Option<usize>,
}
