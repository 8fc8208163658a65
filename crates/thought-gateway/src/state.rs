use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thought_config::AppConfig;
use thought_db::{StorageGateway, ThoughtStore};
use tracing::{info, warn};

use crate::ingest::IngestPipeline;
use crate::updater::Updater;

/// Shared application state accessible from all request handlers.
pub struct AppState {
    pub config: AppConfig,
    pub store: ThoughtStore,
    pub pipeline: IngestPipeline,
    pub updater: Updater,
    update_running: AtomicBool,
}

impl AppState {
    pub fn new(config: AppConfig, gateway: StorageGateway) -> Self {
        let store = ThoughtStore::new(gateway.clone());
        let updater = Updater::new(
            &config.update,
            gateway,
            config.resolved_migrations_dir(),
        );

        Self {
            pipeline: IngestPipeline::new(store.clone()),
            store,
            updater,
            config,
            update_running: AtomicBool::new(false),
        }
    }

    /// Start the self-update in a background task. Returns `false` if one is
    /// already running. The outcome is only logged.
    pub fn spawn_update(self: &Arc<Self>) -> bool {
        if self
            .update_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let state = Arc::clone(self);
        tokio::spawn(async move {
            let worker = Arc::clone(&state);
            let task = tokio::spawn(async move { worker.updater.update().await });

            match task.await {
                Ok(Ok(outcome)) => info!(
                    built = outcome.built,
                    migrations = outcome.migrations_applied.len(),
                    "background update finished"
                ),
                Ok(Err(e)) => warn!("background update failed: {e}"),
                Err(e) => warn!("background update task aborted: {e}"),
            }
            state.update_running.store(false, Ordering::SeqCst);
        });

        true
    }
}

pub type SharedState = Arc<AppState>;
