//! Room lifecycle and queue operations behind the per-room coordinator lock.

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::{
        models::{RoomAdmin, RoomConfig},
        room_store::keys,
    },
    dto::{
        api::{
            AdminAddRequest, AdminVerifyResult, AdvanceResult, CreateRoomRequest, JoinRequest,
            JoinResult, NextRequest, RemoveRequest, ReorderRequest, SkipRequest,
            UpdateConfigRequest, VoteRequest, VoteResponse,
        },
        common::RoomSnapshot,
    },
    error::ServiceError,
    identity::{hash_pin, random_salt},
    queue::Entry,
    state::{SharedState, now_ms, room::AdminAccess, room::AdvanceTrigger, room::JoinSubmission},
};

/// Create a new room: a config and an admin secret written together.
///
/// The legacy room id and reserved routing prefixes can never be created.
pub async fn create_room(
    state: &SharedState,
    request: CreateRoomRequest,
) -> Result<RoomConfig, ServiceError> {
    let room_id = request.room_id.as_str();
    if room_id == state.config().legacy_room_id {
        return Err(ServiceError::Conflict(format!(
            "room id `{room_id}` is reserved for the legacy room"
        )));
    }
    if state
        .config()
        .reserved_room_ids
        .iter()
        .any(|reserved| reserved == room_id)
    {
        return Err(ServiceError::InvalidInput(format!(
            "room id `{room_id}` is reserved"
        )));
    }

    let store = state.store().await.ok_or(ServiceError::Degraded)?;
    if store.read(room_id, keys::CONFIG).await?.is_some() {
        return Err(ServiceError::Conflict(format!(
            "room `{room_id}` already exists"
        )));
    }

    let now = now_ms();
    let mut config = RoomConfig::defaults(room_id, now);
    if let Some(mode) = request.mode {
        config.mode = mode;
    }
    let salt = random_salt();
    let admin = RoomAdmin {
        pin_hash: hash_pin(&salt, &request.admin_pin),
        salt,
        created_at_ms: now,
    };

    store
        .write(room_id, keys::CONFIG, json!(config))
        .await?;
    store.write(room_id, keys::ADMIN, json!(admin)).await?;

    info!(room = %room_id, mode = ?config.mode, "room created");
    Ok(config)
}

/// Whether the room exists (created, or the implicit legacy room).
pub async fn room_exists(state: &SharedState, room_id: &str) -> Result<bool, ServiceError> {
    state.room_exists(room_id).await
}

/// Authoritative snapshot for the HTTP polling fallback.
pub async fn room_state(state: &SharedState, room_id: &str) -> Result<RoomSnapshot, ServiceError> {
    let guard = state.coordinator(room_id).await?;
    Ok(guard.snapshot())
}

/// Current room settings.
pub async fn room_config(state: &SharedState, room_id: &str) -> Result<RoomConfig, ServiceError> {
    let guard = state.coordinator(room_id).await?;
    Ok(guard.room_config().clone())
}

/// Apply a partial settings update (admin only).
pub async fn update_config(
    state: &SharedState,
    room_id: &str,
    request: UpdateConfigRequest,
    access: AdminAccess,
) -> Result<RoomConfig, ServiceError> {
    let mut guard = state.coordinator(room_id).await?;
    guard
        .update_config(
            request.mode,
            request.max_queue_size,
            request.max_stack_size,
            request.allow_voting,
            &access,
            now_ms(),
        )
        .await
}

/// Verify the room admin PIN and issue a session token.
pub async fn verify_admin(
    state: &SharedState,
    room_id: &str,
    pin: &str,
    caller: &str,
) -> Result<AdminVerifyResult, ServiceError> {
    let mut guard = state.coordinator(room_id).await?;
    guard.verify_admin_pin(pin, caller, now_ms())
}

/// Join the live queue (or the caller's personal stack).
pub async fn join(
    state: &SharedState,
    room_id: &str,
    request: &JoinRequest,
    caller: &str,
) -> Result<JoinResult, ServiceError> {
    let mut guard = state.coordinator(room_id).await?;
    guard
        .join(
            JoinSubmission {
                name: &request.name,
                media_id: &request.media_id,
                title: &request.title,
                source: request.source.as_deref(),
                pin: request.pin.as_deref(),
                user_id: request.user_id.as_deref(),
            },
            caller,
            now_ms(),
        )
        .await
}

/// Cast, flip or retract a vote.
pub async fn vote(
    state: &SharedState,
    room_id: &str,
    request: &VoteRequest,
    caller: &str,
) -> Result<VoteResponse, ServiceError> {
    let mut guard = state.coordinator(room_id).await?;
    let new_total = guard
        .vote(
            request.entry_id,
            &request.voter_id,
            request.direction,
            caller,
            now_ms(),
        )
        .await?;
    Ok(VoteResponse {
        entry_id: request.entry_id,
        new_total,
    })
}

/// Remove an entry (admin or the entry's own singer).
pub async fn remove(
    state: &SharedState,
    room_id: &str,
    request: &RemoveRequest,
    access: AdminAccess,
) -> Result<RoomSnapshot, ServiceError> {
    let mut guard = state.coordinator(room_id).await?;
    guard
        .remove(
            request.entry_id,
            &access,
            request.user_name.as_deref(),
            now_ms(),
        )
        .await?;
    Ok(guard.snapshot())
}

/// Skip the current performance.
pub async fn skip(
    state: &SharedState,
    room_id: &str,
    request: &SkipRequest,
    access: AdminAccess,
) -> Result<AdvanceResult, ServiceError> {
    let mut guard = state.coordinator(room_id).await?;
    guard
        .skip(&access, request.user_name.as_deref(), now_ms())
        .await
}

/// Advance the queue, guarded by the caller's expected current id.
pub async fn next(
    state: &SharedState,
    room_id: &str,
    request: &NextRequest,
) -> Result<AdvanceResult, ServiceError> {
    let mut guard = state.coordinator(room_id).await?;
    guard
        .advance(
            AdvanceTrigger::Next {
                expected_current_id: request.expected_current_id,
            },
            now_ms(),
        )
        .await
}

/// Move an entry to a new position (admin only).
pub async fn reorder(
    state: &SharedState,
    room_id: &str,
    request: &ReorderRequest,
    access: AdminAccess,
) -> Result<RoomSnapshot, ServiceError> {
    let mut guard = state.coordinator(room_id).await?;
    guard
        .reorder(request.entry_id, request.new_position, &access, now_ms())
        .await
}

/// Add an entry on someone's behalf (admin only).
pub async fn admin_add(
    state: &SharedState,
    room_id: &str,
    request: &AdminAddRequest,
    access: AdminAccess,
) -> Result<(Entry, usize), ServiceError> {
    let mut guard = state.coordinator(room_id).await?;
    guard
        .admin_add(
            &request.name,
            &request.media_id,
            &request.title,
            request.source.as_deref(),
            &access,
            now_ms(),
        )
        .await
}

/// A user's personal stack.
pub async fn stack(
    state: &SharedState,
    room_id: &str,
    user_id: &str,
) -> Result<Vec<crate::dao::models::StackedSong>, ServiceError> {
    let guard = state.coordinator(room_id).await?;
    Ok(guard.stack(user_id))
}

/// Append a song to a personal stack.
pub async fn stack_add(
    state: &SharedState,
    room_id: &str,
    user_id: &str,
    media_id: &str,
    title: &str,
    source: Option<&str>,
) -> Result<crate::dto::api::StackResult, ServiceError> {
    let mut guard = state.coordinator(room_id).await?;
    guard
        .stack_push(user_id, media_id, title, source, now_ms())
        .await
}

/// Remove one song from a personal stack.
pub async fn stack_remove(
    state: &SharedState,
    room_id: &str,
    user_id: &str,
    song_id: Uuid,
) -> Result<crate::dto::api::StackResult, ServiceError> {
    let mut guard = state.coordinator(room_id).await?;
    guard.stack_remove(user_id, song_id).await
}

/// Replace the order of a personal stack.
pub async fn stack_reorder(
    state: &SharedState,
    room_id: &str,
    user_id: &str,
    song_ids: &[Uuid],
) -> Result<crate::dto::api::StackResult, ServiceError> {
    let mut guard = state.coordinator(room_id).await?;
    guard.stack_reorder(user_id, song_ids).await
}
