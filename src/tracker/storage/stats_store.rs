use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::host::HostMessage;

use super::{
    backend::StatsBackend,
    entities::{DayBucket, ProjectStats, StatsData},
    persistence::PersistenceModule,
};

/// In-memory owner of the accounting structure. Memory is the source of truth; the backend is
/// only written through [StatsStore::persist] and read on load and refresh.
pub struct StatsStore {
    backend: Arc<dyn StatsBackend>,
    data: StatsData,
    snapshots: watch::Sender<StatsData>,
}

impl StatsStore {
    /// Loads the stored structure. A missing or unreadable payload results in an empty history
    /// instead of an error.
    pub async fn load(backend: Arc<dyn StatsBackend>) -> Self {
        let data = match backend.load().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                info!("No stats stored yet, starting with an empty history");
                StatsData::default()
            }
            Err(e) => {
                warn!("Stored stats are unreadable, starting with an empty history {e:?}");
                StatsData::default()
            }
        };
        let (snapshots, _) = watch::channel(data.clone());
        Self {
            backend,
            data,
            snapshots,
        }
    }

    /// Creates the module that writes requested snapshots. Only snapshots persisted after this
    /// call are written.
    pub fn persistence(&self, warnings: Option<mpsc::Sender<HostMessage>>) -> PersistenceModule {
        PersistenceModule::new(self.snapshots.subscribe(), self.backend.clone(), warnings)
    }

    pub fn ensure_bucket(&mut self, project: &str, date_key: &str) -> &DayBucket {
        self.data.ensure_bucket(project, date_key)
    }

    /// Adds `duration_ms` to the bucket and, when an extension is known, to its file entry.
    pub fn accrue(
        &mut self,
        project: &str,
        date_key: &str,
        duration_ms: u64,
        extension: Option<&str>,
    ) -> &DayBucket {
        let bucket = self.data.ensure_bucket(project, date_key);
        bucket.total_time += duration_ms;
        if let Some(extension) = extension.filter(|v| !v.is_empty()) {
            bucket.file_stats.add(extension, duration_ms);
        }
        bucket
    }

    /// Hands the current structure over to the [PersistenceModule]. Never waits for the write;
    /// if one is still running only the newest snapshot is written afterwards.
    pub fn persist(&self) {
        self.snapshots.send_replace(self.data.clone());
    }

    /// Writes the structure and waits for the result.
    pub async fn flush(&self) -> Result<()> {
        self.backend.save(&self.data).await
    }

    /// Picks up data another tracker instance may have written since we last looked. Failing to
    /// read keeps memory as it is.
    pub async fn refresh(&mut self) {
        match self.backend.load().await {
            Ok(Some(stored)) => self.data.merge_max(stored),
            Ok(None) => {}
            Err(e) => debug!("Skipping refresh, stored stats are unreadable {e:?}"),
        }
    }

    /// Every day recorded for `project`. Unknown projects have no days.
    pub fn read(&self, project: &str) -> ProjectStats {
        self.data.project(project).cloned().unwrap_or_default()
    }

    pub fn bucket(&self, project: &str, date_key: &str) -> Option<&DayBucket> {
        self.data.project(project).and_then(|v| v.day(date_key))
    }

    pub fn data(&self) -> &StatsData {
        &self.data
    }
}
