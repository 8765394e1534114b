use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument};

use crate::host::HostMessage;

use super::{backend::StatsBackend, entities::StatsData};

/// Writes snapshots requested by [StatsStore::persist](super::stats_store::StatsStore::persist)
/// without holding up the tracker. Runs until the store is dropped, writing the last pending
/// snapshot before it returns.
pub struct PersistenceModule {
    snapshots: watch::Receiver<StatsData>,
    backend: Arc<dyn StatsBackend>,
    warnings: Option<mpsc::Sender<HostMessage>>,
    failing: bool,
}

impl PersistenceModule {
    pub fn new(
        snapshots: watch::Receiver<StatsData>,
        backend: Arc<dyn StatsBackend>,
        warnings: Option<mpsc::Sender<HostMessage>>,
    ) -> Self {
        Self {
            snapshots,
            backend,
            warnings,
            failing: false,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) -> Result<()> {
        while self.snapshots.changed().await.is_ok() {
            let snapshot = self.snapshots.borrow_and_update().clone();
            match self.backend.save(&snapshot).await {
                Ok(()) => {
                    debug!("Persisted stats");
                    if self.failing {
                        self.failing = false;
                        info!("Saving stats works again");
                        self.notify(HostMessage::info("Time tracking data is being saved again."))
                            .await;
                    }
                }
                Err(e) => {
                    error!("Failed to save stats {e:?}");
                    // One warning per streak of failures, the next tick retries anyway.
                    if !self.failing {
                        self.failing = true;
                        self.notify(HostMessage::warning(format!(
                            "Failed to save time tracking data: {e}"
                        )))
                        .await;
                    }
                }
            }
        }
        debug!("Stats store closed, stopping persistence");
        Ok(())
    }

    async fn notify(&self, message: HostMessage) {
        if let Some(warnings) = &self.warnings {
            if warnings.send(message).await.is_err() {
                debug!("Host output is closed, dropping notification");
            }
        }
    }
}
