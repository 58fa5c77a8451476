//! The room coordinator: single-writer owner of one room's durable and
//! ephemeral state.
//!
//! All mutations for a room run behind one lock and persist write-through
//! before broadcasting, so state pushes always follow mutation order.
//! Admin sessions, rate-limit windows, the search cache and the connection
//! registry are plain fields constructed empty at load time and never
//! persisted; losing them on restart is part of the contract.

use std::{collections::HashMap, sync::Arc};

use axum::extract::ws::Message;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        migrate::{migrate_performances, migrate_state},
        models::{PlaybackState, RoomAdmin, RoomConfig, RoomMode, StackedSong},
        room_store::{RoomStore, keys},
    },
    dto::{
        api::{AdminVerifyResult, AdvanceResult, ClaimResult, JoinResult, StackResult, VerifyResult},
        common::RoomSnapshot,
        ws::{ClientRole, ServerMessage},
    },
    error::ServiceError,
    identity::{
        Identity, Performance, PerformanceOutcome, PopularSong, SingerHistory, hash_pin,
        is_first_performance, normalize_name, popular_songs, singer_history,
    },
    queue::{
        CURRENT_SCHEMA_VERSION, Entry, JoinRejection, QueueState, VoteLedger, apply_vote,
        sort_by_votes, sort_queue,
    },
    state::{
        rate_limit::{RateCategory, RateLimiter},
        search_cache::{SearchCache, SearchResult},
    },
};

/// Ephemeral elevated-privilege grant. Lives only in coordinator memory.
#[derive(Debug, Clone)]
pub struct AdminSession {
    /// Bearer token handed to the caller.
    pub token: String,
    /// Issue timestamp, Unix epoch milliseconds.
    pub created_at_ms: i64,
    /// Expiry timestamp, Unix epoch milliseconds.
    pub expires_at_ms: i64,
}

/// Credentials a caller presented for a privileged operation.
#[derive(Debug, Clone, Default)]
pub struct AdminAccess {
    /// Bearer token from an [`AdminSession`].
    pub token: Option<String>,
    /// Legacy unauthenticated privileged-intent flag, honored only for
    /// rooms with no configured admin.
    pub legacy_intent: bool,
}

/// The three independent sources that can advance the queue.
#[derive(Debug, Clone)]
pub enum AdvanceTrigger {
    /// Explicit "next" with an expected-current-id guard. `None` asserts
    /// that nothing is playing yet.
    Next {
        /// Entry the caller believes is currently playing.
        expected_current_id: Option<Uuid>,
    },
    /// Explicit skip by the singer or an admin.
    Skip {
        /// Whether an admin requested the skip.
        by_admin: bool,
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
}

/// Fields of a join request after DTO validation.
#[derive(Debug, Clone, Copy)]
pub struct JoinSubmission<'a> {
    /// Singer display name.
    pub name: &'a str,
    /// Media to perform.
    pub media_id: &'a str,
    /// Song title.
    pub title: &'a str,
    /// Media source tag.
    pub source: Option<&'a str>,
    /// PIN presented for a claimed name.
    pub pin: Option<&'a str>,
    /// Owning user id (contribution-scoped rooms).
    pub user_id: Option<&'a str>,
}

/// Handle used to push messages to one connected client.
struct ClientConnection {
    id: Uuid,
    role: Option<ClientRole>,
    tx: mpsc::UnboundedSender<Message>,
}

/// Single-writer owner of one room's state.
pub struct RoomCoordinator {
    room_id: String,
    store: Arc<dyn RoomStore>,
    app_config: Arc<AppConfig>,

    // Durable, read-through cached, write-through persisted.
    state: QueueState,
    votes: VoteLedger,
    performances: Vec<Performance>,
    config: RoomConfig,
    admin: Option<RoomAdmin>,
    stacks: IndexMap<String, Vec<StackedSong>>,
    identities: HashMap<String, Option<Identity>>,

    // Ephemeral; reconstructed empty on every load.
    playback: PlaybackState,
    sessions: HashMap<String, AdminSession>,
    limiter: RateLimiter,
    search_cache: SearchCache,
    clients: Vec<ClientConnection>,
    relay_connected: bool,
}

impl RoomCoordinator {
    /// Load a room's persisted state, migrating legacy shapes, and build a
    /// coordinator with fresh ephemeral state.
    ///
    /// Fails with `NotFound` for rooms that were never created, except the
    /// implicit legacy room which loads with default settings and no admin.
    pub async fn load(
        room_id: &str,
        store: Arc<dyn RoomStore>,
        app_config: Arc<AppConfig>,
        now: i64,
    ) -> Result<Self, ServiceError> {
        let config = match store.read(room_id, keys::CONFIG).await? {
            Some(doc) => serde_json::from_value(doc)
                .map_err(|err| ServiceError::Internal(format!("corrupt room config: {err}")))?,
            None if room_id == app_config.legacy_room_id => RoomConfig::defaults(room_id, now),
            None => {
                return Err(ServiceError::NotFound(format!(
                    "room `{room_id}` does not exist"
                )));
            }
        };

        let admin = store
            .read(room_id, keys::ADMIN)
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(|err| ServiceError::Internal(format!("corrupt room admin: {err}")))?;

        let state_doc = store.read(room_id, keys::STATE).await?;
        let state_was_current = matches!(
            &state_doc,
            Some(Value::Object(map))
                if map.get("schemaVersion").and_then(Value::as_u64)
                    == Some(CURRENT_SCHEMA_VERSION as u64)
        );
        let state_needs_rewrite = state_doc.is_some() && !state_was_current;
        let mut state = state_doc
            .map(migrate_state)
            .transpose()?
            .unwrap_or_default();

        let votes = store
            .read(room_id, keys::VOTES)
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(|err| ServiceError::Internal(format!("corrupt vote ledger: {err}")))?
            .unwrap_or_default();

        let performances_doc = store.read(room_id, keys::PERFORMANCES).await?;
        let performances_were_current = !matches!(
            &performances_doc,
            Some(Value::Array(records))
                if records.first().is_some_and(|record| {
                    record.get("url").is_some() || record.get("songUrl").is_some()
                })
        );
        let performances = performances_doc
            .map(migrate_performances)
            .transpose()?
            .unwrap_or_default();

        let stacks = store
            .read(room_id, keys::USER_STACKS)
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(|err| ServiceError::Internal(format!("corrupt user stacks: {err}")))?
            .unwrap_or_default();

        match config.mode {
            RoomMode::NameScoped => sort_queue(&mut state.entries),
            RoomMode::ContributionScoped => sort_by_votes(&mut state.entries),
        }

        // The shared clock restarts with the process; a present performer
        // simply restarts their song now.
        let playback = match &state.now_playing {
            Some(entry) => PlaybackState {
                media_id: Some(entry.media_id.clone()),
                started_at_ms: now,
                position_seconds: 0.0,
                playing: true,
            },
            None => PlaybackState::default(),
        };

        let coordinator = Self {
            room_id: room_id.to_string(),
            store,
            search_cache: SearchCache::new(
                app_config.search_ttl_ms,
                app_config.search_cache_prune_threshold,
            ),
            app_config,
            state,
            votes,
            performances,
            config,
            admin,
            stacks,
            identities: HashMap::new(),
            playback,
            sessions: HashMap::new(),
            limiter: RateLimiter::new(),
            clients: Vec::new(),
            relay_connected: false,
        };

        // Migrated shapes are rewritten once so the next load sniffs nothing.
        if state_needs_rewrite {
            info!(room = %coordinator.room_id, "migrated legacy queue state");
            coordinator.persist_state().await?;
        }
        if !performances_were_current {
            info!(room = %coordinator.room_id, "migrated legacy performance history");
            coordinator.persist_performances().await?;
        }

        Ok(coordinator)
    }

    /// Room id this coordinator owns.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Current room settings.
    pub fn room_config(&self) -> &RoomConfig {
        &self.config
    }

    /// Full performance history, oldest first.
    pub fn performances(&self) -> &[Performance] {
        &self.performances
    }

    /// Assemble the authoritative room snapshot.
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot::assemble(&self.state, &self.playback, self.relay_connected)
    }

    /// Current playback clock frame.
    pub fn sync_frame(&self) -> ServerMessage {
        ServerMessage::Sync {
            playback: self.playback.clone(),
        }
    }

    // ---- connection registry -------------------------------------------

    /// Register a live connection and return its id. The connection only
    /// receives broadcasts once it subscribes.
    pub fn register_connection(&mut self, tx: mpsc::UnboundedSender<Message>) -> Uuid {
        let id = Uuid::new_v4();
        self.clients.push(ClientConnection { id, role: None, tx });
        id
    }

    /// Mark a connection as subscribed with the declared role.
    pub fn subscribe(&mut self, connection_id: Uuid, role: ClientRole) {
        if let Some(client) = self
            .clients
            .iter_mut()
            .find(|client| client.id == connection_id)
        {
            client.role = Some(role);
        }
        self.sync_relay_flag();
    }

    /// Remove a connection from the registry.
    pub fn drop_connection(&mut self, connection_id: Uuid) {
        self.clients.retain(|client| client.id != connection_id);
        self.sync_relay_flag();
    }

    /// Number of live (registered) connections.
    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    /// Whether a playback relay is currently subscribed.
    pub fn relay_connected(&self) -> bool {
        self.relay_connected
    }

    /// Push a message to every subscribed connection, best effort: a failed
    /// send drops that connection and never aborts delivery to the rest.
    pub fn broadcast(&mut self, message: &ServerMessage) {
        self.send_to_subscribed(message);
        self.sync_relay_flag();
    }

    fn send_to_subscribed(&mut self, message: &ServerMessage) {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(room = %self.room_id, error = %err, "failed to serialize broadcast");
                return;
            }
        };
        let before = self.clients.len();
        self.clients.retain(|client| {
            if client.role.is_none() {
                return true;
            }
            client.tx.send(Message::Text(payload.clone().into())).is_ok()
        });
        let dropped = before - self.clients.len();
        if dropped > 0 {
            debug!(room = %self.room_id, dropped, "dropped dead connections during broadcast");
        }
    }

    fn sync_relay_flag(&mut self) {
        loop {
            let connected = self
                .clients
                .iter()
                .any(|client| client.role == Some(ClientRole::Relay));
            if connected == self.relay_connected {
                break;
            }
            self.relay_connected = connected;
            self.send_to_subscribed(&ServerMessage::RelayStatus { connected });
        }
    }

    // ---- queue operations ----------------------------------------------

    /// Join the queue (or, in contribution-scoped rooms with a live entry,
    /// land on the caller's personal stack).
    pub async fn join(
        &mut self,
        submission: JoinSubmission<'_>,
        caller: &str,
        now: i64,
    ) -> Result<JoinResult, ServiceError> {
        if !self.limiter.try_acquire(
            caller,
            RateCategory::Join,
            self.app_config.rate_limits.join,
            now,
        ) {
            return Err(ServiceError::RateLimited("too many join attempts".into()));
        }

        let name = submission.name.trim();
        if name.is_empty() || submission.media_id.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "name and mediaId are required".into(),
            ));
        }

        // A claimed name needs its PIN; unclaimed names are free for anyone.
        if let Some(identity) = self.identity(name).await? {
            match submission.pin {
                None => return Ok(JoinResult::RequiresPin),
                Some(pin) if !identity.verify(pin) => return Ok(JoinResult::WrongPin),
                Some(_) => {}
            }
        }

        if self.config.mode == RoomMode::ContributionScoped {
            let user_id = submission.user_id.ok_or_else(|| {
                ServiceError::InvalidInput("userId is required in this room".into())
            })?;
            if self.user_has_live_entry(user_id) {
                return self
                    .stack_push(
                        user_id,
                        submission.media_id,
                        submission.title,
                        submission.source,
                        now,
                    )
                    .await
                    .map(|result| match result {
                        StackResult::Updated { stack } => JoinResult::Stacked { stack },
                        StackResult::StackFull => JoinResult::StackFull,
                    });
            }
        } else {
            match self.state.can_join(name) {
                Err(JoinRejection::NameInQueue) => return Ok(JoinResult::AlreadyInQueue),
                Err(JoinRejection::NamePlaying) => return Ok(JoinResult::NowPlaying),
                Ok(()) => {}
            }
        }

        if self.state.entries.len() >= self.config.max_queue_size {
            return Ok(JoinResult::QueueFull);
        }

        let mut entry = Entry::new(
            name,
            submission.media_id,
            submission.title,
            submission.source.unwrap_or("youtube"),
            self.state.current_epoch,
            now,
        );
        entry.owner_user_id = submission.user_id.map(str::to_string);

        self.state.entries.push(entry.clone());
        self.resort();
        self.persist_state().await?;

        let position = self
            .state
            .entries
            .iter()
            .position(|queued| queued.id == entry.id)
            .unwrap_or(0);
        let first_time = is_first_performance(&self.performances, name);

        let state_message = ServerMessage::state(&self.snapshot());
        self.broadcast(&state_message);
        self.broadcast(&ServerMessage::Joined {
            entry: entry.clone(),
            position,
        });

        info!(room = %self.room_id, name, position, "entry joined queue");
        Ok(JoinResult::Joined {
            entry,
            position,
            first_time,
        })
    }

    /// Apply a vote and re-sort the queue, persisting ledger and state
    /// together.
    pub async fn vote(
        &mut self,
        entry_id: Uuid,
        voter_id: &str,
        direction: i8,
        caller: &str,
        now: i64,
    ) -> Result<i64, ServiceError> {
        if !self.config.allow_voting {
            return Err(ServiceError::InvalidInput(
                "voting is disabled in this room".into(),
            ));
        }
        if !self.limiter.try_acquire(
            caller,
            RateCategory::Vote,
            self.app_config.rate_limits.vote,
            now,
        ) {
            return Err(ServiceError::RateLimited("too many votes".into()));
        }

        let entry = self
            .state
            .entries
            .iter_mut()
            .find(|entry| entry.id == entry_id)
            .ok_or_else(|| ServiceError::NotFound(format!("entry `{entry_id}` not found")))?;

        let new_total = apply_vote(entry, &mut self.votes, voter_id, direction)
            .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

        self.resort();
        self.persist_votes().await?;
        self.persist_state().await?;

        let state_message = ServerMessage::state(&self.snapshot());
        self.broadcast(&ServerMessage::Voted {
            entry_id,
            new_total,
        });
        self.broadcast(&state_message);
        Ok(new_total)
    }

    /// Remove an entry; allowed for admins and for the entry's own singer.
    pub async fn remove(
        &mut self,
        entry_id: Uuid,
        access: &AdminAccess,
        user_name: Option<&str>,
        now: i64,
    ) -> Result<(), ServiceError> {
        let by_admin = self.authorize_admin(access, now).is_ok();
        if !by_admin {
            let owner = self
                .state
                .entries
                .iter()
                .find(|entry| entry.id == entry_id)
                .map(|entry| normalize_name(&entry.display_name));
            let requester = user_name.map(normalize_name);
            if owner.is_none() || requester != owner {
                return Err(ServiceError::Unauthorized(
                    "only the entry's singer or an admin may remove it".into(),
                ));
            }
        }

        self.state
            .remove(entry_id)
            .map_err(|err| ServiceError::NotFound(err.to_string()))?;
        self.votes.clear_entry(entry_id);

        self.persist_state().await?;
        self.persist_votes().await?;

        let state_message = ServerMessage::state(&self.snapshot());
        self.broadcast(&ServerMessage::Removed { entry_id });
        self.broadcast(&state_message);
        Ok(())
    }

    /// Skip the current performance. Admins may always skip; otherwise the
    /// caller must be the current singer.
    pub async fn skip(
        &mut self,
        access: &AdminAccess,
        user_name: Option<&str>,
        now: i64,
    ) -> Result<AdvanceResult, ServiceError> {
        let by_admin = self.authorize_admin(access, now).is_ok();
        if !by_admin {
            let playing = self
                .state
                .now_playing
                .as_ref()
                .map(|entry| normalize_name(&entry.display_name));
            let requester = user_name.map(normalize_name);
            if playing.is_some() && requester != playing {
                return Err(ServiceError::Unauthorized(
                    "only the current singer or an admin may skip".into(),
                ));
            }
        }
        self.advance(AdvanceTrigger::Skip { by_admin }, now).await
    }

    /// Advance the queue if the trigger's expectation matches live state.
    ///
    /// A mismatch mutates nothing and returns the authoritative state; this
    /// is what keeps duplicate end-of-song reports from double-advancing.
    pub async fn advance(
        &mut self,
        trigger: AdvanceTrigger,
        now: i64,
    ) -> Result<AdvanceResult, ServiceError> {
        let current = self.state.now_playing.as_ref();
        let matches = match &trigger {
            AdvanceTrigger::Next {
                expected_current_id,
            } => current.map(|entry| entry.id) == *expected_current_id,
            AdvanceTrigger::Skip { .. } => current.is_some(),
            AdvanceTrigger::MediaEnded { media_id }
            | AdvanceTrigger::MediaError { media_id, .. } => {
                current.is_some_and(|entry| entry.media_id == *media_id)
            }
        };
        if !matches {
            debug!(room = %self.room_id, ?trigger, "stale advance trigger ignored");
            return Ok(AdvanceResult::StateMismatch {
                state: self.snapshot(),
            });
        }

        let displaced = self.state.advance();
        if let Some(displaced) = &displaced {
            let outcome = match &trigger {
                AdvanceTrigger::Next { .. } | AdvanceTrigger::MediaEnded { .. } => {
                    PerformanceOutcome::Completed
                }
                AdvanceTrigger::Skip { by_admin: true } => PerformanceOutcome::SkippedByAdmin,
                AdvanceTrigger::Skip { by_admin: false } => PerformanceOutcome::SkippedBySinger,
                AdvanceTrigger::MediaError { reason, .. } => PerformanceOutcome::Errored {
                    reason: reason.clone(),
                },
            };
            self.performances
                .push(Performance::record(displaced, outcome, now));
            self.votes.clear_entry(displaced.id);
        }

        // The only implicit queue mutation: after the new head is chosen,
        // the finished singer's next stacked song joins the queue and waits
        // for a later advance.
        let mut promotion: Option<(String, Entry, Vec<StackedSong>)> = None;
        if self.config.mode == RoomMode::ContributionScoped
            && let Some(finished) = &displaced
            && let Some(owner) = finished.owner_user_id.clone()
            && let Some(stack) = self.stacks.get_mut(&owner)
            && !stack.is_empty()
        {
            let song = stack.remove(0);
            let remaining = stack.clone();
            let mut entry = Entry::new(
                &finished.display_name,
                &song.media_id,
                &song.title,
                &song.source,
                self.state.current_epoch,
                now,
            );
            entry.owner_user_id = Some(owner.clone());
            self.state.entries.push(entry.clone());
            sort_by_votes(&mut self.state.entries);
            promotion = Some((owner, entry, remaining));
        }

        self.playback = match &self.state.now_playing {
            Some(entry) => PlaybackState {
                media_id: Some(entry.media_id.clone()),
                started_at_ms: now,
                position_seconds: 0.0,
                playing: true,
            },
            None => PlaybackState::default(),
        };

        self.persist_state().await?;
        self.persist_votes().await?;
        self.persist_performances().await?;
        if promotion.is_some() {
            self.persist_stacks().await?;
        }

        if let Some((user_id, entry, remaining_stack)) = promotion {
            self.broadcast(&ServerMessage::PromotedToQueue {
                user_id,
                entry,
                remaining_stack,
            });
        }
        let snapshot = self.snapshot();
        self.broadcast(&ServerMessage::state(&snapshot));
        let sync = self.sync_frame();
        self.broadcast(&sync);
        self.broadcast(&ServerMessage::Advanced {
            now_playing: snapshot.now_playing.clone(),
            current_epoch: snapshot.current_epoch,
        });

        info!(
            room = %self.room_id,
            epoch = snapshot.current_epoch,
            playing = snapshot.now_playing.as_ref().map(|e| e.display_name.as_str()),
            "queue advanced"
        );
        Ok(AdvanceResult::Advanced { state: snapshot })
    }

    /// Move an entry to a new position (admin only), rebasing its sort keys.
    pub async fn reorder(
        &mut self,
        entry_id: Uuid,
        new_position: usize,
        access: &AdminAccess,
        now: i64,
    ) -> Result<RoomSnapshot, ServiceError> {
        self.authorize_admin(access, now)?;
        crate::queue::reorder(&mut self.state.entries, entry_id, new_position)
            .map_err(|err| ServiceError::NotFound(err.to_string()))?;
        self.resort();
        self.persist_state().await?;

        let snapshot = self.snapshot();
        self.broadcast(&ServerMessage::state(&snapshot));
        Ok(snapshot)
    }

    /// Add an entry on someone's behalf (admin only); skips eligibility
    /// checks but not the queue capacity.
    pub async fn admin_add(
        &mut self,
        name: &str,
        media_id: &str,
        title: &str,
        source: Option<&str>,
        access: &AdminAccess,
        now: i64,
    ) -> Result<(Entry, usize), ServiceError> {
        self.authorize_admin(access, now)?;
        if self.state.entries.len() >= self.config.max_queue_size {
            return Err(ServiceError::Conflict("queue is full".into()));
        }

        let entry = Entry::new(
            name,
            media_id,
            title,
            source.unwrap_or("youtube"),
            self.state.current_epoch,
            now,
        );
        self.state.entries.push(entry.clone());
        self.resort();
        self.persist_state().await?;

        let position = self
            .state
            .entries
            .iter()
            .position(|queued| queued.id == entry.id)
            .unwrap_or(0);
        let state_message = ServerMessage::state(&self.snapshot());
        self.broadcast(&state_message);
        Ok((entry, position))
    }

    fn resort(&mut self) {
        match self.config.mode {
            RoomMode::NameScoped => sort_queue(&mut self.state.entries),
            RoomMode::ContributionScoped => sort_by_votes(&mut self.state.entries),
        }
    }

    fn user_has_live_entry(&self, user_id: &str) -> bool {
        let in_queue = self
            .state
            .entries
            .iter()
            .any(|entry| entry.owner_user_id.as_deref() == Some(user_id));
        let playing = self
            .state
            .now_playing
            .as_ref()
            .is_some_and(|entry| entry.owner_user_id.as_deref() == Some(user_id));
        in_queue || playing
    }

    // ---- admin sessions -------------------------------------------------

    /// Check privileged access: rooms with an admin need a live session
    /// token; rooms without one honor the legacy intent flag.
    pub fn authorize_admin(
        &mut self,
        access: &AdminAccess,
        now: i64,
    ) -> Result<(), ServiceError> {
        match &self.admin {
            Some(_) => {
                self.sessions.retain(|_, session| session.expires_at_ms > now);
                let token = access.token.as_deref().ok_or_else(|| {
                    ServiceError::Unauthorized("admin session token required".into())
                })?;
                if self.sessions.contains_key(token) {
                    Ok(())
                } else {
                    Err(ServiceError::Unauthorized(
                        "invalid or expired admin session".into(),
                    ))
                }
            }
            // Deliberately permissive fallback kept for the legacy room;
            // new rooms always configure an admin at creation.
            None if access.legacy_intent => Ok(()),
            None => Err(ServiceError::Unauthorized("admin intent required".into())),
        }
    }

    /// Verify the room admin PIN, issuing a session token on success.
    pub fn verify_admin_pin(
        &mut self,
        pin: &str,
        caller: &str,
        now: i64,
    ) -> Result<AdminVerifyResult, ServiceError> {
        if !self.limiter.try_acquire(
            caller,
            RateCategory::Pin,
            self.app_config.rate_limits.pin,
            now,
        ) {
            return Err(ServiceError::RateLimited("too many PIN attempts".into()));
        }

        let admin = self.admin.as_ref().ok_or_else(|| {
            ServiceError::NotFound("room has no configured admin".into())
        })?;
        if hash_pin(&admin.salt, pin) != admin.pin_hash {
            return Ok(AdminVerifyResult::WrongPin);
        }

        self.limiter.clear(caller, RateCategory::Pin);
        let token = Uuid::new_v4().simple().to_string();
        let expires_at_ms = now + self.app_config.admin_session_ms;
        self.sessions.insert(
            token.clone(),
            AdminSession {
                token: token.clone(),
                created_at_ms: now,
                expires_at_ms,
            },
        );
        info!(room = %self.room_id, "admin session issued");
        Ok(AdminVerifyResult::Ok {
            token,
            expires_at_ms,
        })
    }

    // ---- room configuration ---------------------------------------------

    /// Apply a partial configuration update (admin only). A mode switch
    /// re-sorts the live queue once.
    pub async fn update_config(
        &mut self,
        mode: Option<RoomMode>,
        max_queue_size: Option<usize>,
        max_stack_size: Option<usize>,
        allow_voting: Option<bool>,
        access: &AdminAccess,
        now: i64,
    ) -> Result<RoomConfig, ServiceError> {
        self.authorize_admin(access, now)?;

        let mode_changed = mode.is_some_and(|new_mode| new_mode != self.config.mode);
        if let Some(mode) = mode {
            self.config.mode = mode;
        }
        if let Some(size) = max_queue_size {
            self.config.max_queue_size = size;
        }
        if let Some(size) = max_stack_size {
            self.config.max_stack_size = size;
        }
        if let Some(allow) = allow_voting {
            self.config.allow_voting = allow;
        }

        if mode_changed {
            self.resort();
            self.persist_state().await?;
        }
        self.persist_config().await?;

        let state_message = ServerMessage::state(&self.snapshot());
        self.broadcast(&state_message);
        Ok(self.config.clone())
    }

    // ---- identities ------------------------------------------------------

    /// Claim a display name, binding a salted PIN hash to it.
    pub async fn claim_identity(
        &mut self,
        name: &str,
        pin: &str,
        caller: &str,
        now: i64,
    ) -> Result<ClaimResult, ServiceError> {
        if !self.limiter.try_acquire(
            caller,
            RateCategory::Pin,
            self.app_config.rate_limits.pin,
            now,
        ) {
            return Err(ServiceError::RateLimited("too many PIN attempts".into()));
        }

        if self.identity(name).await?.is_some() {
            return Ok(ClaimResult::AlreadyClaimed);
        }

        let identity = Identity::claim(name, pin, now);
        let normalized = identity.normalized_name.clone();
        self.store
            .write(
                &self.room_id,
                &keys::identity(&normalized),
                to_doc(&identity)?,
            )
            .await?;
        self.identities.insert(normalized.clone(), Some(identity));
        info!(room = %self.room_id, name = %normalized, "identity claimed");
        Ok(ClaimResult::Claimed {
            normalized_name: normalized,
        })
    }

    /// Verify a PIN against a claimed name. Success clears the caller's PIN
    /// rate-limit window.
    pub async fn verify_identity(
        &mut self,
        name: &str,
        pin: &str,
        caller: &str,
        now: i64,
    ) -> Result<VerifyResult, ServiceError> {
        if !self.limiter.try_acquire(
            caller,
            RateCategory::Pin,
            self.app_config.rate_limits.pin,
            now,
        ) {
            return Err(ServiceError::RateLimited("too many PIN attempts".into()));
        }

        let Some(identity) = self.identity(name).await? else {
            return Ok(VerifyResult::Unclaimed);
        };
        if identity.verify(pin) {
            self.limiter.clear(caller, RateCategory::Pin);
            Ok(VerifyResult::Valid)
        } else {
            Ok(VerifyResult::Invalid)
        }
    }

    /// Whether the name has an identity record.
    pub async fn identity_claimed(&mut self, name: &str) -> Result<bool, ServiceError> {
        Ok(self.identity(name).await?.is_some())
    }

    async fn identity(&mut self, name: &str) -> Result<Option<Identity>, ServiceError> {
        let normalized = normalize_name(name);
        if let Some(cached) = self.identities.get(&normalized) {
            return Ok(cached.clone());
        }
        let identity = self
            .store
            .read(&self.room_id, &keys::identity(&normalized))
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(|err| ServiceError::Internal(format!("corrupt identity: {err}")))?;
        self.identities.insert(normalized, identity.clone());
        Ok(identity)
    }

    // ---- history ---------------------------------------------------------

    /// Aggregated history for one singer.
    pub fn history(&self, name: &str) -> SingerHistory {
        singer_history(&self.performances, name)
    }

    /// Songs ranked by completed play count.
    pub fn popular(&self, limit: usize) -> Vec<PopularSong> {
        popular_songs(&self.performances, limit)
    }

    // ---- personal stacks -------------------------------------------------

    /// A user's personal stack, FIFO order.
    pub fn stack(&self, user_id: &str) -> Vec<StackedSong> {
        self.stacks.get(user_id).cloned().unwrap_or_default()
    }

    /// Append a song to a user's stack, bounded by the configured size.
    pub async fn stack_push(
        &mut self,
        user_id: &str,
        media_id: &str,
        title: &str,
        source: Option<&str>,
        now: i64,
    ) -> Result<StackResult, ServiceError> {
        let max = self.config.max_stack_size;
        let stack = self.stacks.entry(user_id.to_string()).or_default();
        if stack.len() >= max {
            return Ok(StackResult::StackFull);
        }
        stack.push(StackedSong {
            id: Uuid::new_v4(),
            media_id: media_id.trim().to_string(),
            title: title.trim().to_string(),
            source: source.unwrap_or("youtube").to_string(),
            added_at_ms: now,
        });
        let stack = stack.clone();
        self.persist_stacks().await?;
        self.broadcast(&ServerMessage::StackUpdated {
            user_id: user_id.to_string(),
            stack: stack.clone(),
        });
        Ok(StackResult::Updated { stack })
    }

    /// Remove one song from a user's stack.
    pub async fn stack_remove(
        &mut self,
        user_id: &str,
        song_id: Uuid,
    ) -> Result<StackResult, ServiceError> {
        let stack = self
            .stacks
            .get_mut(user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("no stack for `{user_id}`")))?;
        let index = stack
            .iter()
            .position(|song| song.id == song_id)
            .ok_or_else(|| ServiceError::NotFound(format!("song `{song_id}` not in stack")))?;
        stack.remove(index);
        let stack = stack.clone();
        self.persist_stacks().await?;
        self.broadcast(&ServerMessage::StackUpdated {
            user_id: user_id.to_string(),
            stack: stack.clone(),
        });
        Ok(StackResult::Updated { stack })
    }

    /// Replace the order of a user's stack; `song_ids` must be a complete
    /// permutation of the current contents.
    pub async fn stack_reorder(
        &mut self,
        user_id: &str,
        song_ids: &[Uuid],
    ) -> Result<StackResult, ServiceError> {
        let stack = self
            .stacks
            .get_mut(user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("no stack for `{user_id}`")))?;

        if song_ids.len() != stack.len()
            || !stack.iter().all(|song| song_ids.contains(&song.id))
        {
            return Err(ServiceError::InvalidInput(
                "songIds must be a permutation of the current stack".into(),
            ));
        }

        stack.sort_by_key(|song| {
            song_ids
                .iter()
                .position(|id| *id == song.id)
                .unwrap_or(usize::MAX)
        });
        let stack = stack.clone();
        self.persist_stacks().await?;
        self.broadcast(&ServerMessage::StackUpdated {
            user_id: user_id.to_string(),
            stack: stack.clone(),
        });
        Ok(StackResult::Updated { stack })
    }

    // ---- search gate -----------------------------------------------------

    /// Rate-limit a search attempt and return the cached results on a hit.
    pub fn search_gate(
        &mut self,
        query: &str,
        caller: &str,
        now: i64,
    ) -> Result<Option<Vec<SearchResult>>, ServiceError> {
        if !self.limiter.try_acquire(
            caller,
            RateCategory::Search,
            self.app_config.rate_limits.search,
            now,
        ) {
            return Err(ServiceError::RateLimited("too many searches".into()));
        }
        Ok(self.search_cache.get(query, now).map(<[SearchResult]>::to_vec))
    }

    /// Store fresh upstream results in the cache.
    pub fn cache_search_results(&mut self, query: &str, results: Vec<SearchResult>, now: i64) {
        self.search_cache.insert(query, results, now);
    }

    // ---- persistence -----------------------------------------------------

    async fn persist_state(&self) -> Result<(), ServiceError> {
        self.store
            .write(&self.room_id, keys::STATE, to_doc(&self.state)?)
            .await?;
        Ok(())
    }

    async fn persist_votes(&self) -> Result<(), ServiceError> {
        self.store
            .write(&self.room_id, keys::VOTES, to_doc(&self.votes)?)
            .await?;
        Ok(())
    }

    async fn persist_performances(&self) -> Result<(), ServiceError> {
        self.store
            .write(&self.room_id, keys::PERFORMANCES, to_doc(&self.performances)?)
            .await?;
        Ok(())
    }

    async fn persist_stacks(&self) -> Result<(), ServiceError> {
        self.store
            .write(&self.room_id, keys::USER_STACKS, to_doc(&self.stacks)?)
            .await?;
        Ok(())
    }

    async fn persist_config(&self) -> Result<(), ServiceError> {
        self.store
            .write(&self.room_id, keys::CONFIG, to_doc(&self.config)?)
            .await?;
        Ok(())
    }
}

fn to_doc<T: serde::Serialize>(value: &T) -> Result<Value, ServiceError> {
    serde_json::to_value(value)
        .map_err(|err| ServiceError::Internal(format!("serializing document: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::room_store::memory::MemoryStore;
    use serde_json::json;

    const LEGACY_ROOM: &str = "karaoke";

    async fn legacy_coordinator() -> (RoomCoordinator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let coordinator = RoomCoordinator::load(
            LEGACY_ROOM,
            store.clone(),
            Arc::new(AppConfig::default()),
            1_000,
        )
        .await
        .unwrap();
        (coordinator, store)
    }

    fn submission<'a>(name: &'a str, media: &'a str) -> JoinSubmission<'a> {
        JoinSubmission {
            name,
            media_id: media,
            title: "a song",
            source: None,
            pin: None,
            user_id: None,
        }
    }

    fn legacy_admin() -> AdminAccess {
        AdminAccess {
            token: None,
            legacy_intent: true,
        }
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let err = RoomCoordinator::load("nope", store, Arc::new(AppConfig::default()), 0)
            .await
            .err();
        assert!(matches!(err, Some(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn join_then_advance_then_idempotent_next() {
        let (mut room, _store) = legacy_coordinator().await;

        let joined = room.join(submission("Amy", "m1"), "c1", 1_000).await.unwrap();
        let amy = match joined {
            JoinResult::Joined { entry, position, .. } => {
                assert_eq!(position, 0);
                entry
            }
            other => panic!("expected join, got {other:?}"),
        };
        room.join(submission("Bob", "m2"), "c2", 2_000).await.unwrap();

        // Nothing playing yet: next with no expectation starts the queue.
        let advanced = room
            .advance(AdvanceTrigger::Next { expected_current_id: None }, 3_000)
            .await
            .unwrap();
        let AdvanceResult::Advanced { state } = advanced else {
            panic!("expected advance");
        };
        assert_eq!(state.now_playing.as_ref().unwrap().id, amy.id);
        assert_eq!(state.current_epoch, 1);
        assert_eq!(state.playback.media_id.as_deref(), Some("m1"));

        // A duplicate of the same trigger is a silent no-op, twice.
        for _ in 0..2 {
            let result = room
                .advance(AdvanceTrigger::Next { expected_current_id: None }, 4_000)
                .await
                .unwrap();
            assert!(matches!(result, AdvanceResult::StateMismatch { .. }));
        }
        assert_eq!(room.snapshot().current_epoch, 1);

        // The matching guard advances to Bob and archives Amy as completed.
        let result = room
            .advance(
                AdvanceTrigger::Next { expected_current_id: Some(amy.id) },
                5_000,
            )
            .await
            .unwrap();
        let AdvanceResult::Advanced { state } = result else {
            panic!("expected advance");
        };
        assert_eq!(
            state.now_playing.as_ref().unwrap().display_name,
            "Bob"
        );
        assert_eq!(room.performances().len(), 1);
        assert_eq!(room.performances()[0].name, "Amy");
        assert_eq!(room.performances()[0].outcome, PerformanceOutcome::Completed);

        // Replaying the now-stale guard mismatches both times.
        for _ in 0..2 {
            let result = room
                .advance(
                    AdvanceTrigger::Next { expected_current_id: Some(amy.id) },
                    6_000,
                )
                .await
                .unwrap();
            assert!(matches!(result, AdvanceResult::StateMismatch { .. }));
        }
    }

    #[tokio::test]
    async fn media_ended_guard_matches_media_id() {
        let (mut room, _store) = legacy_coordinator().await;
        room.join(submission("Amy", "m1"), "c", 1_000).await.unwrap();
        room.advance(AdvanceTrigger::Next { expected_current_id: None }, 2_000)
            .await
            .unwrap();

        let stale = room
            .advance(AdvanceTrigger::MediaEnded { media_id: "other".into() }, 3_000)
            .await
            .unwrap();
        assert!(matches!(stale, AdvanceResult::StateMismatch { .. }));

        let done = room
            .advance(AdvanceTrigger::MediaEnded { media_id: "m1".into() }, 4_000)
            .await
            .unwrap();
        assert!(matches!(done, AdvanceResult::Advanced { .. }));
        assert!(room.snapshot().now_playing.is_none());
        assert!(room.snapshot().playback.media_id.is_none());
    }

    #[tokio::test]
    async fn media_error_archives_errored_outcome() {
        let (mut room, _store) = legacy_coordinator().await;
        room.join(submission("Amy", "m1"), "c", 1_000).await.unwrap();
        room.advance(AdvanceTrigger::Next { expected_current_id: None }, 2_000)
            .await
            .unwrap();
        room.advance(
            AdvanceTrigger::MediaError {
                media_id: "m1".into(),
                reason: "embed blocked".into(),
            },
            3_000,
        )
        .await
        .unwrap();

        assert_eq!(
            room.performances()[0].outcome,
            PerformanceOutcome::Errored { reason: "embed blocked".into() }
        );
    }

    #[tokio::test]
    async fn duplicate_name_join_rejected_case_insensitively() {
        let (mut room, _store) = legacy_coordinator().await;
        room.join(submission("Amy", "m1"), "c", 1_000).await.unwrap();

        let result = room.join(submission("  aMy ", "m2"), "c", 2_000).await.unwrap();
        assert!(matches!(result, JoinResult::AlreadyInQueue));

        room.advance(AdvanceTrigger::Next { expected_current_id: None }, 3_000)
            .await
            .unwrap();
        let result = room.join(submission("AMY", "m3"), "c", 4_000).await.unwrap();
        assert!(matches!(result, JoinResult::NowPlaying));
    }

    #[tokio::test]
    async fn claimed_name_needs_pin_to_join() {
        let (mut room, _store) = legacy_coordinator().await;
        let claimed = room.claim_identity("Amy", "123456", "c", 1_000).await.unwrap();
        assert!(matches!(claimed, ClaimResult::Claimed { .. }));

        let result = room.join(submission("amy", "m1"), "c", 2_000).await.unwrap();
        assert!(matches!(result, JoinResult::RequiresPin));

        let mut with_wrong = submission("amy", "m1");
        with_wrong.pin = Some("000000");
        let result = room.join(with_wrong, "c", 3_000).await.unwrap();
        assert!(matches!(result, JoinResult::WrongPin));

        let mut with_pin = submission("amy", "m1");
        with_pin.pin = Some("123456");
        let result = room.join(with_pin, "c", 4_000).await.unwrap();
        assert!(matches!(result, JoinResult::Joined { .. }));

        let again = room.claim_identity("AMY", "999999", "c", 5_000).await.unwrap();
        assert!(matches!(again, ClaimResult::AlreadyClaimed));
    }

    #[tokio::test]
    async fn first_time_flag_clears_only_after_completed_performance() {
        let (mut room, _store) = legacy_coordinator().await;

        let JoinResult::Joined { first_time, .. } =
            room.join(submission("Amy", "m1"), "c", 1_000).await.unwrap()
        else {
            panic!("join failed");
        };
        assert!(first_time);

        // A skipped performance does not count as a completed one.
        room.advance(AdvanceTrigger::Next { expected_current_id: None }, 2_000)
            .await
            .unwrap();
        room.skip(&legacy_admin(), None, 3_000).await.unwrap();
        let JoinResult::Joined { first_time, .. } =
            room.join(submission("amy", "m2"), "c", 4_000).await.unwrap()
        else {
            panic!("join failed");
        };
        assert!(first_time);

        room.advance(AdvanceTrigger::Next { expected_current_id: None }, 5_000)
            .await
            .unwrap();
        room.advance(AdvanceTrigger::MediaEnded { media_id: "m2".into() }, 6_000)
            .await
            .unwrap();
        let JoinResult::Joined { first_time, .. } =
            room.join(submission("AMY", "m3"), "c", 7_000).await.unwrap()
        else {
            panic!("join failed");
        };
        assert!(!first_time);
    }

    #[tokio::test]
    async fn vote_updates_order_and_persists_ledger() {
        let (mut room, store) = legacy_coordinator().await;
        let JoinResult::Joined { entry: bob, .. } =
            room.join(submission("Bob", "m1"), "c", 1_000).await.unwrap()
        else {
            panic!("join failed");
        };
        let JoinResult::Joined { entry: amy, .. } =
            room.join(submission("Amy", "m2"), "c", 2_000).await.unwrap()
        else {
            panic!("join failed");
        };

        let total = room.vote(amy.id, "voter-1", 1, "c", 3_000).await.unwrap();
        assert_eq!(total, 1);
        // Votes break the epoch tie: Amy moves ahead of Bob.
        assert_eq!(room.snapshot().queue[0].id, amy.id);

        let missing = room.vote(Uuid::new_v4(), "voter-1", 1, "c", 3_500).await;
        assert!(matches!(missing, Err(ServiceError::NotFound(_))));

        let votes_doc = store.read(LEGACY_ROOM, keys::VOTES).await.unwrap().unwrap();
        let ledger: VoteLedger = serde_json::from_value(votes_doc).unwrap();
        assert_eq!(ledger.direction_of(amy.id, "voter-1"), 1);
        assert_eq!(ledger.direction_of(bob.id, "voter-1"), 0);
    }

    #[tokio::test]
    async fn remove_requires_owner_or_admin() {
        let (mut room, _store) = legacy_coordinator().await;
        let JoinResult::Joined { entry, .. } =
            room.join(submission("Amy", "m1"), "c", 1_000).await.unwrap()
        else {
            panic!("join failed");
        };

        let denied = room
            .remove(entry.id, &AdminAccess::default(), Some("Bob"), 2_000)
            .await;
        assert!(matches!(denied, Err(ServiceError::Unauthorized(_))));

        room.remove(entry.id, &AdminAccess::default(), Some(" AMY "), 3_000)
            .await
            .unwrap();
        assert!(room.snapshot().queue.is_empty());

        let missing = room
            .remove(entry.id, &legacy_admin(), None, 4_000)
            .await;
        assert!(matches!(missing, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn contribution_mode_stacks_and_promotes() {
        let (mut room, _store) = legacy_coordinator().await;
        room.update_config(
            Some(RoomMode::ContributionScoped),
            None,
            None,
            None,
            &legacy_admin(),
            500,
        )
        .await
        .unwrap();

        let mut first = submission("Amy", "m1");
        first.user_id = Some("user-1");
        let JoinResult::Joined { entry, .. } = room.join(first, "c", 1_000).await.unwrap() else {
            panic!("join failed");
        };

        // Second song while the first is queued lands on the stack.
        let mut second = submission("Amy", "m2");
        second.user_id = Some("user-1");
        let stacked = room.join(second, "c", 2_000).await.unwrap();
        let JoinResult::Stacked { stack } = stacked else {
            panic!("expected stacked, got {stacked:?}");
        };
        assert_eq!(stack.len(), 1);
        assert_eq!(stack[0].media_id, "m2");

        room.advance(AdvanceTrigger::Next { expected_current_id: None }, 3_000)
            .await
            .unwrap();
        assert_eq!(room.snapshot().now_playing.as_ref().unwrap().id, entry.id);

        // Finishing the performance promotes the stack head into the queue
        // after the next head was chosen: with nothing else queued, the
        // promoted song waits for a later advance instead of auto-playing.
        let result = room
            .advance(AdvanceTrigger::MediaEnded { media_id: "m1".into() }, 4_000)
            .await
            .unwrap();
        let AdvanceResult::Advanced { state } = result else {
            panic!("expected advance");
        };
        assert!(state.now_playing.is_none());
        assert_eq!(state.queue.len(), 1);
        assert_eq!(state.queue[0].media_id, "m2");
        assert!(room.stack("user-1").is_empty());

        let result = room
            .advance(AdvanceTrigger::Next { expected_current_id: None }, 5_000)
            .await
            .unwrap();
        let AdvanceResult::Advanced { state } = result else {
            panic!("expected advance");
        };
        assert_eq!(state.now_playing.as_ref().unwrap().media_id, "m2");
    }

    #[tokio::test]
    async fn stack_is_bounded_and_reorderable() {
        let (mut room, _store) = legacy_coordinator().await;
        room.update_config(
            Some(RoomMode::ContributionScoped),
            None,
            Some(2),
            None,
            &legacy_admin(),
            500,
        )
        .await
        .unwrap();

        room.stack_push("u", "m1", "one", None, 1_000).await.unwrap();
        room.stack_push("u", "m2", "two", None, 2_000).await.unwrap();
        let full = room.stack_push("u", "m3", "three", None, 3_000).await.unwrap();
        assert!(matches!(full, StackResult::StackFull));

        let stack = room.stack("u");
        let reordered = room
            .stack_reorder("u", &[stack[1].id, stack[0].id])
            .await
            .unwrap();
        let StackResult::Updated { stack } = reordered else {
            panic!("expected update");
        };
        assert_eq!(stack[0].media_id, "m2");

        let bad = room.stack_reorder("u", &[stack[0].id]).await;
        assert!(matches!(bad, Err(ServiceError::InvalidInput(_))));

        room.stack_remove("u", stack[0].id).await.unwrap();
        assert_eq!(room.stack("u").len(), 1);
    }

    #[tokio::test]
    async fn admin_sessions_are_ephemeral() {
        let store = Arc::new(MemoryStore::new());
        let app_config = Arc::new(AppConfig::default());

        // Seed a created room with an admin secret.
        let admin = RoomAdmin {
            pin_hash: hash_pin("salt", "123456"),
            salt: "salt".into(),
            created_at_ms: 0,
        };
        store
            .write("club", keys::ADMIN, serde_json::to_value(&admin).unwrap())
            .await
            .unwrap();
        store
            .write(
                "club",
                keys::CONFIG,
                serde_json::to_value(RoomConfig::defaults("club", 0)).unwrap(),
            )
            .await
            .unwrap();

        let mut room = RoomCoordinator::load("club", store.clone(), app_config.clone(), 0)
            .await
            .unwrap();

        let wrong = room.verify_admin_pin("999999", "c", 1_000).unwrap();
        assert!(matches!(wrong, AdminVerifyResult::WrongPin));
        let AdminVerifyResult::Ok { token, .. } =
            room.verify_admin_pin("123456", "c", 1_000).unwrap()
        else {
            panic!("expected session");
        };

        let access = AdminAccess {
            token: Some(token.clone()),
            legacy_intent: false,
        };
        assert!(room.authorize_admin(&access, 2_000).is_ok());
        // The legacy intent flag is never honored once an admin exists.
        assert!(room.authorize_admin(&legacy_admin(), 2_000).is_err());

        // Sessions expire after the configured window.
        let late = 2_000 + app_config.admin_session_ms;
        assert!(room.authorize_admin(&access, late).is_err());

        // A fresh coordinator (process restart) knows nothing of the token.
        let mut reloaded = RoomCoordinator::load("club", store, app_config, late)
            .await
            .unwrap();
        assert!(reloaded.authorize_admin(&access, 2_000).is_err());
    }

    #[tokio::test]
    async fn pin_rate_limit_clears_on_success() {
        let (mut room, _store) = legacy_coordinator().await;
        room.claim_identity("Amy", "123456", "claimer", 0).await.unwrap();

        let limit = AppConfig::default().rate_limits.pin;
        for attempt in 0..limit - 1 {
            let result = room
                .verify_identity("Amy", "000000", "attacker", attempt as i64)
                .await
                .unwrap();
            assert!(matches!(result, VerifyResult::Invalid));
        }
        // Window exhausted (the claim used one slot for `claimer` only).
        let ok = room
            .verify_identity("Amy", "123456", "attacker", 50)
            .await
            .unwrap();
        assert!(matches!(ok, VerifyResult::Valid));
        // Success cleared the window; more attempts fit immediately.
        let again = room
            .verify_identity("Amy", "123456", "attacker", 51)
            .await
            .unwrap();
        assert!(matches!(again, VerifyResult::Valid));
    }

    #[tokio::test]
    async fn broadcast_drops_dead_connections_without_aborting() {
        let (mut room, _store) = legacy_coordinator().await;

        let (alive_tx, mut alive_rx) = mpsc::unbounded_channel();
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        let alive = room.register_connection(alive_tx);
        let dead = room.register_connection(dead_tx);
        room.subscribe(alive, ClientRole::Viewer);
        room.subscribe(dead, ClientRole::Viewer);
        drop(dead_rx);

        room.broadcast(&ServerMessage::RelayStatus { connected: false });
        assert_eq!(room.connection_count(), 1);
        assert!(alive_rx.try_recv().is_ok());

        let _ = dead;
    }

    #[tokio::test]
    async fn relay_subscription_toggles_status() {
        let (mut room, _store) = legacy_coordinator().await;
        assert!(!room.relay_connected());

        let (viewer_tx, mut viewer_rx) = mpsc::unbounded_channel();
        let viewer = room.register_connection(viewer_tx);
        room.subscribe(viewer, ClientRole::Viewer);
        assert!(!room.relay_connected());

        let (relay_tx, relay_rx) = mpsc::unbounded_channel();
        let relay = room.register_connection(relay_tx);
        room.subscribe(relay, ClientRole::Relay);
        assert!(room.relay_connected());

        // The viewer was told about the relay.
        let frame = viewer_rx.try_recv().unwrap();
        let Message::Text(text) = frame else {
            panic!("expected text frame");
        };
        let message: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(message["type"], "relayStatus");
        assert_eq!(message["connected"], true);

        drop(relay_rx);
        room.drop_connection(relay);
        assert!(!room.relay_connected());
    }

    #[tokio::test]
    async fn legacy_state_migrates_once_on_load() {
        let store = Arc::new(MemoryStore::new());
        store
            .write(
                LEGACY_ROOM,
                keys::STATE,
                json!([
                    {"singer": "Amy", "url": "https://www.youtube.com/watch?v=abc", "title": "A", "addedAt": 10},
                    {"singer": "Bob", "url": "https://youtu.be/def", "title": "B", "addedAt": 20}
                ]),
            )
            .await
            .unwrap();

        let room = RoomCoordinator::load(
            LEGACY_ROOM,
            store.clone(),
            Arc::new(AppConfig::default()),
            0,
        )
        .await
        .unwrap();
        assert_eq!(room.snapshot().queue.len(), 2);
        assert_eq!(room.snapshot().queue[0].media_id, "abc");

        // The migrated shape was written back with the current version tag.
        let doc = store.read(LEGACY_ROOM, keys::STATE).await.unwrap().unwrap();
        assert_eq!(doc["schemaVersion"], CURRENT_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn mode_switch_resorts_live_queue() {
        let (mut room, _store) = legacy_coordinator().await;
        let JoinResult::Joined { entry: first, .. } =
            room.join(submission("Amy", "m1"), "c", 1_000).await.unwrap()
        else {
            panic!("join failed");
        };
        // Bob joins a later epoch tier by advancing first.
        room.advance(AdvanceTrigger::Next { expected_current_id: None }, 1_500)
            .await
            .unwrap();
        let JoinResult::Joined { entry: second, .. } =
            room.join(submission("Bob", "m2"), "c", 2_000).await.unwrap()
        else {
            panic!("join failed");
        };
        let JoinResult::Joined { entry: third, .. } =
            room.join(submission("Cat", "m3"), "c", 3_000).await.unwrap()
        else {
            panic!("join failed");
        };
        room.vote(third.id, "v", 1, "c", 4_000).await.unwrap();

        // Name-scoped: same epoch, votes break the tie.
        assert_eq!(room.snapshot().queue[0].id, third.id);

        room.update_config(
            Some(RoomMode::ContributionScoped),
            None,
            None,
            None,
            &legacy_admin(),
            5_000,
        )
        .await
        .unwrap();
        // Vote-first ordering still ranks Cat ahead; Bob before nothing else
        // changed.
        let queue = room.snapshot().queue;
        assert_eq!(queue[0].id, third.id);
        assert_eq!(queue[1].id, second.id);
        let _ = first;
    }

    #[tokio::test]
    async fn search_gate_caches_and_limits() {
        let (mut room, _store) = legacy_coordinator().await;
        let results = vec![SearchResult {
            media_id: "m".into(),
            title: "t".into(),
            channel: None,
            thumbnail: None,
        }];

        assert!(room.search_gate("Queen", "c", 0).unwrap().is_none());
        room.cache_search_results("Queen", results.clone(), 0);
        assert_eq!(room.search_gate("  qUeEn ", "c", 10).unwrap(), Some(results));

        let limit = AppConfig::default().rate_limits.search;
        for i in 2..limit {
            room.search_gate("q", "c", i as i64).unwrap();
        }
        assert!(matches!(
            room.search_gate("q", "c", 99).err(),
            Some(ServiceError::RateLimited(_))
        ));
    }
}
