//! WebSocket connection lifecycle and message dispatch for one room.
//!
//! Each connection gets a dedicated writer task so broadcasts keep flowing
//! while we await inbound frames. Handling failures become `error` events on
//! the same connection; the socket only closes when the peer goes away.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        api::{AdvanceResult, JoinResult},
        ws::{ClientMessage, ServerMessage},
    },
    error::ServiceError,
    state::{
        SharedState, now_ms,
        room::{AdminAccess, AdvanceTrigger, JoinSubmission},
    },
};

/// Handle the full lifecycle of one room WebSocket connection.
///
/// `caller` is the peer address string used as the rate-limit key.
pub async fn handle_socket(
    state: SharedState,
    socket: WebSocket,
    room_id: String,
    caller: String,
) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    // Loading the coordinator here surfaces unknown rooms and degraded mode
    // before the client sees any state.
    let connection_id = match state.coordinator(&room_id).await {
        Ok(mut guard) => {
            let connection_id = guard.register_connection(outbound_tx.clone());
            send_message(&outbound_tx, &ServerMessage::state(&guard.snapshot()));
            send_message(&outbound_tx, &guard.sync_frame());
            connection_id
        }
        Err(err) => {
            warn!(room = %room_id, error = %err, "rejecting websocket connection");
            send_message(
                &outbound_tx,
                &ServerMessage::Error {
                    message: err.to_string(),
                },
            );
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    info!(room = %room_id, connection = %connection_id, "websocket connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let parsed = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        send_message(
                            &outbound_tx,
                            &ServerMessage::Error {
                                message: format!("unparseable message: {err}"),
                            },
                        );
                        continue;
                    }
                };

                if let Err(err) =
                    handle_message(&state, &room_id, connection_id, &caller, parsed, &outbound_tx)
                        .await
                {
                    warn!(room = %room_id, connection = %connection_id, error = %err, "message handling failed");
                    send_message(
                        &outbound_tx,
                        &ServerMessage::Error {
                            message: err.to_string(),
                        },
                    );
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(room = %room_id, connection = %connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    if let Ok(mut guard) = state.coordinator(&room_id).await {
        guard.drop_connection(connection_id);
    }
    info!(room = %room_id, connection = %connection_id, "websocket disconnected");

    finalize(writer_task, outbound_tx).await;
}

async fn handle_message(
    state: &SharedState,
    room_id: &str,
    connection_id: Uuid,
    caller: &str,
    message: ClientMessage,
    tx: &mpsc::UnboundedSender<Message>,
) -> Result<(), ServiceError> {
    match message {
        // The clock probe never takes the room lock.
        ClientMessage::Ping { client_time } => {
            send_message(
                tx,
                &ServerMessage::Pong {
                    server_time: now_ms(),
                    client_time,
                },
            );
            Ok(())
        }
        ClientMessage::Subscribe { client_role } => {
            let mut guard = state.coordinator(room_id).await?;
            guard.subscribe(connection_id, client_role);
            send_message(tx, &ServerMessage::state(&guard.snapshot()));
            Ok(())
        }
        ClientMessage::SyncRequest => {
            let guard = state.coordinator(room_id).await?;
            send_message(tx, &guard.sync_frame());
            Ok(())
        }
        ClientMessage::Join {
            name,
            media_id,
            title,
            source,
            pin,
            user_id,
        } => {
            let mut guard = state.coordinator(room_id).await?;
            let result = guard
                .join(
                    JoinSubmission {
                        name: &name,
                        media_id: &media_id,
                        title: &title,
                        source: source.as_deref(),
                        pin: pin.as_deref(),
                        user_id: user_id.as_deref(),
                    },
                    caller,
                    now_ms(),
                )
                .await?;
            // Successful outcomes were already broadcast under the lock; the
            // rejections only concern this connection.
            if let Some(message) = join_rejection(&result) {
                send_message(tx, &ServerMessage::Error { message });
            }
            Ok(())
        }
        ClientMessage::Vote {
            entry_id,
            voter_id,
            direction,
        } => {
            let mut guard = state.coordinator(room_id).await?;
            guard
                .vote(entry_id, &voter_id, direction, caller, now_ms())
                .await?;
            Ok(())
        }
        ClientMessage::Remove {
            entry_id,
            is_admin,
            admin_token,
            user_name,
        } => {
            let mut guard = state.coordinator(room_id).await?;
            guard
                .remove(
                    entry_id,
                    &access(admin_token, is_admin),
                    user_name.as_deref(),
                    now_ms(),
                )
                .await?;
            Ok(())
        }
        ClientMessage::Skip {
            is_admin,
            admin_token,
            user_name,
        } => {
            let mut guard = state.coordinator(room_id).await?;
            let result = guard
                .skip(&access(admin_token, is_admin), user_name.as_deref(), now_ms())
                .await?;
            reply_if_stale(tx, &result);
            Ok(())
        }
        ClientMessage::Next {
            expected_current_id,
        } => {
            let mut guard = state.coordinator(room_id).await?;
            let result = guard
                .advance(AdvanceTrigger::Next { expected_current_id }, now_ms())
                .await?;
            reply_if_stale(tx, &result);
            Ok(())
        }
        ClientMessage::MediaEnded { media_id } => {
            let mut guard = state.coordinator(room_id).await?;
            let result = guard
                .advance(AdvanceTrigger::MediaEnded { media_id }, now_ms())
                .await?;
            reply_if_stale(tx, &result);
            Ok(())
        }
        ClientMessage::MediaError { media_id, reason } => {
            let mut guard = state.coordinator(room_id).await?;
            let result = guard
                .advance(AdvanceTrigger::MediaError { media_id, reason }, now_ms())
                .await?;
            reply_if_stale(tx, &result);
            Ok(())
        }
        ClientMessage::Reorder {
            entry_id,
            new_position,
            admin_token,
            is_admin,
        } => {
            let mut guard = state.coordinator(room_id).await?;
            guard
                .reorder(entry_id, new_position, &access(admin_token, is_admin), now_ms())
                .await?;
            Ok(())
        }
        ClientMessage::AdminAdd {
            name,
            media_id,
            title,
            admin_token,
            is_admin,
        } => {
            let mut guard = state.coordinator(room_id).await?;
            guard
                .admin_add(
                    &name,
                    &media_id,
                    &title,
                    None,
                    &access(admin_token, is_admin),
                    now_ms(),
                )
                .await?;
            Ok(())
        }
        ClientMessage::AddSong {
            session_token,
            media_id,
            title,
            source,
        } => {
            let mut guard = state.coordinator(room_id).await?;
            guard
                .stack_push(&session_token, &media_id, &title, source.as_deref(), now_ms())
                .await?;
            Ok(())
        }
        ClientMessage::RemoveFromStack {
            session_token,
            song_id,
        } => {
            let mut guard = state.coordinator(room_id).await?;
            guard.stack_remove(&session_token, song_id).await?;
            Ok(())
        }
        ClientMessage::ReorderStack {
            session_token,
            song_ids,
        } => {
            let mut guard = state.coordinator(room_id).await?;
            guard.stack_reorder(&session_token, &song_ids).await?;
            Ok(())
        }
    }
}

fn access(token: Option<String>, legacy_intent: bool) -> AdminAccess {
    AdminAccess {
        token,
        legacy_intent,
    }
}

/// A stale advance trigger mutates nothing and broadcasts nothing; hand the
/// authoritative state back on the connection that sent it.
fn reply_if_stale(tx: &mpsc::UnboundedSender<Message>, result: &AdvanceResult) {
    if let AdvanceResult::StateMismatch { state } = result {
        send_message(tx, &ServerMessage::state(state));
        send_message(
            tx,
            &ServerMessage::Sync {
                playback: state.playback.clone(),
            },
        );
    }
}

fn join_rejection(result: &JoinResult) -> Option<String> {
    match result {
        JoinResult::Joined { .. } | JoinResult::Stacked { .. } => None,
        JoinResult::RequiresPin => Some("name is claimed; a PIN is required".into()),
        JoinResult::WrongPin => Some("wrong PIN for this name".into()),
        JoinResult::AlreadyInQueue => Some("this name already has a queued entry".into()),
        JoinResult::NowPlaying => Some("this name is currently performing".into()),
        JoinResult::QueueFull => Some("the queue is full".into()),
        JoinResult::StackFull => Some("your personal stack is full".into()),
    }
}

/// Serialize a payload and push it onto the connection's writer channel.
fn send_message(tx: &mpsc::UnboundedSender<Message>, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload.into()));
        }
        Err(err) => warn!(error = %err, "failed to serialize websocket message"),
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::{config::AppConfig, dao::room_store::memory::MemoryStore, state::AppState};

    #[tokio::test]
    async fn stale_next_gets_state_and_sync_on_same_connection() {
        let state = AppState::new(AppConfig::default());
        state.install_store(Arc::new(MemoryStore::new())).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Nothing is playing, so a guard naming a concrete id is stale.
        handle_message(
            &state,
            "karaoke",
            Uuid::new_v4(),
            "caller",
            ClientMessage::Next {
                expected_current_id: Some(Uuid::new_v4()),
            },
            &tx,
        )
        .await
        .unwrap();

        let mut kinds = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            let frame: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            kinds.push(frame["type"].as_str().unwrap().to_string());
        }
        assert_eq!(kinds, ["state", "sync"]);
    }

    #[tokio::test]
    async fn matched_next_sends_no_private_reply() {
        let state = AppState::new(AppConfig::default());
        state.install_store(Arc::new(MemoryStore::new())).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        // An unregistered sender: the advance succeeds and is broadcast to
        // subscribers, with no direct frame back on this channel.
        handle_message(
            &state,
            "karaoke",
            Uuid::new_v4(),
            "caller",
            ClientMessage::Next {
                expected_current_id: None,
            },
            &tx,
        )
        .await
        .unwrap();

        assert!(rx.try_recv().is_err());
    }
}
