//! Central application state: storage slot, degraded-mode flag and the
//! per-room coordinator registry.

pub mod rate_limit;
pub mod room;
pub mod search_cache;

use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, watch};

use crate::{
    config::AppConfig,
    dao::room_store::RoomStore,
    error::ServiceError,
    state::room::RoomCoordinator,
};

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Current time in Unix epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

/// One room slot: the coordinator is loaded lazily on first access and
/// owned by whoever holds the lock, serializing all mutations per room.
struct Room {
    coordinator: Arc<Mutex<Option<RoomCoordinator>>>,
}

/// Central application state storing the room registry and storage handle.
pub struct AppState {
    store: RwLock<Option<Arc<dyn RoomStore>>>,
    degraded: watch::Sender<bool>,
    rooms: DashMap<String, Arc<Room>>,
    config: Arc<AppConfig>,
    http: reqwest::Client,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be
    /// cloned cheaply. The application starts in degraded mode until a
    /// storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            degraded: degraded_tx,
            rooms: DashMap::new(),
            config: Arc::new(config),
            http: reqwest::Client::new(),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &Arc<AppConfig> {
        &self.config
    }

    /// HTTP client used for the external search upstream.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn RoomStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a storage backend and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn RoomStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        let _ = self.degraded.send(false);
    }

    /// Remove the storage backend and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        let _ = self.degraded.send(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Lock a room's coordinator, loading persisted state (and running
    /// schema migration) on first access.
    ///
    /// The returned guard serializes all mutations for the room; holding it
    /// across persist awaits is what makes the coordinator single-writer.
    pub async fn coordinator(&self, room_id: &str) -> Result<RoomGuard, ServiceError> {
        let store = self.store().await.ok_or(ServiceError::Degraded)?;
        let slot = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                Arc::new(Room {
                    coordinator: Arc::new(Mutex::new(None)),
                })
            })
            .clone();

        let mut guard = slot.coordinator.clone().lock_owned().await;
        if guard.is_none() {
            match RoomCoordinator::load(room_id, store, self.config.clone(), now_ms()).await {
                Ok(coordinator) => *guard = Some(coordinator),
                Err(err) => {
                    drop(guard);
                    // A slot that never loaded must not linger in the
                    // registry: probes of unknown ids would accumulate
                    // forever. Only remove it while it is still unloaded.
                    self.rooms.remove_if(room_id, |_, room| {
                        room.coordinator
                            .try_lock()
                            .map(|slot| slot.is_none())
                            .unwrap_or(false)
                    });
                    return Err(err);
                }
            }
        }
        Ok(RoomGuard { guard })
    }

    /// Number of room slots currently tracked.
    #[cfg(test)]
    pub(crate) fn tracked_rooms(&self) -> usize {
        self.rooms.len()
    }

    /// Whether the room exists: a config document was written, or it is the
    /// implicit legacy room.
    pub async fn room_exists(&self, room_id: &str) -> Result<bool, ServiceError> {
        if room_id == self.config.legacy_room_id {
            return Ok(true);
        }
        let store = self.store().await.ok_or(ServiceError::Degraded)?;
        let config = store
            .read(room_id, crate::dao::room_store::keys::CONFIG)
            .await?;
        Ok(config.is_some())
    }
}

/// Exclusive access to one room's loaded coordinator.
pub struct RoomGuard {
    guard: OwnedMutexGuard<Option<RoomCoordinator>>,
}

impl Deref for RoomGuard {
    type Target = RoomCoordinator;

    fn deref(&self) -> &RoomCoordinator {
        self.guard.as_ref().expect("coordinator loaded before guard handout")
    }
}

impl DerefMut for RoomGuard {
    fn deref_mut(&mut self) -> &mut RoomCoordinator {
        self.guard.as_mut().expect("coordinator loaded before guard handout")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::room_store::memory::MemoryStore;

    #[tokio::test]
    async fn unknown_rooms_leave_no_registry_slot() {
        let state = AppState::new(AppConfig::default());
        state.install_store(Arc::new(MemoryStore::new())).await;

        for attempt in 0..3 {
            let err = state.coordinator(&format!("ghost-{attempt}")).await.err();
            assert!(matches!(err, Some(ServiceError::NotFound(_))));
        }
        assert_eq!(state.tracked_rooms(), 0);

        // A loadable room keeps its slot.
        state.coordinator("karaoke").await.unwrap();
        assert_eq!(state.tracked_rooms(), 1);
    }
}
