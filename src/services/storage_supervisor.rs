//! Background supervisor for the file storage backend.
//!
//! Opens the data directory with exponential backoff, installs the store
//! when healthy, and flips the application into degraded mode whenever the
//! backend stops responding.

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{dao::room_store::file::FileStore, state::SharedState};

const INITIAL_DELAY: Duration = Duration::from_millis(1000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTHY_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Supervise the file store: retry opening in the background and toggle
/// degraded mode when the data directory becomes unusable.
pub async fn run(state: SharedState, data_dir: PathBuf) {
    let mut delay = INITIAL_DELAY;

    loop {
        if let Some(store) = state.store().await {
            match store.health_check().await {
                Ok(()) => {
                    // Healthy backend: reset the backoff and probe lazily.
                    delay = INITIAL_DELAY;
                    sleep(HEALTHY_PROBE_INTERVAL).await;
                }
                Err(err) => {
                    warn!(error = %err, "storage health check failed; entering degraded mode");
                    state.clear_store().await;
                    sleep(delay).await;
                    delay = (delay * 2).min(MAX_DELAY);
                }
            }
            continue;
        }

        match FileStore::open(data_dir.clone()).await {
            Ok(store) => {
                info!(dir = %data_dir.display(), "storage ready; leaving degraded mode");
                state.install_store(Arc::new(store)).await;
                delay = INITIAL_DELAY;
            }
            Err(err) => {
                warn!(dir = %data_dir.display(), error = %err, "failed to open data directory");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}
