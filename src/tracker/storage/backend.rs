use std::{io::ErrorKind, path::PathBuf, sync::Mutex, time::Duration};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    sync::RwLock,
    time::{sleep, Instant},
};
use tracing::debug;

use super::entities::{decode, encode, StatsData};

/// Storage medium for the accounting structure. The tracker only ever replaces the whole
/// structure, so the contract is a plain load/save pair.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatsBackend: Send + Sync {
    /// Returns `None` when nothing has been stored yet.
    async fn load(&self) -> Result<Option<StatsData>>;

    async fn save(&self, data: &StatsData) -> Result<()>;
}

const LOCK_RETRY: Duration = Duration::from_millis(10);
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
enum LockKind {
    Shared,
    Exclusive,
}

/// Keeps the structure in a single JSON file. Several editor windows may run a tracker each, so
/// reads take a shared lock and writes an exclusive one.
///
/// The file lock is polled rather than waited on: a blocking `flock` would stall the event loop
/// thread, and with it the writer that holds the lock. Access from the same process is ordered
/// by `access` before the file lock is even tried.
pub struct JsonFileBackend {
    path: PathBuf,
    access: RwLock<()>,
}

impl JsonFileBackend {
    pub fn new(path: PathBuf) -> Result<Self, std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            access: RwLock::new(()),
        })
    }

    async fn lock(file: &File, kind: LockKind) -> Result<()> {
        let deadline = Instant::now() + LOCK_TIMEOUT;
        loop {
            let attempt = match kind {
                LockKind::Shared => file.try_lock_shared(),
                LockKind::Exclusive => file.try_lock_exclusive(),
            };
            match attempt {
                Ok(()) => return Ok(()),
                Err(e) if !is_contended(&e) => Err(e)?,
                Err(_) if Instant::now() >= deadline => {
                    bail!("Stats file is still locked after {LOCK_TIMEOUT:?}")
                }
                Err(_) => sleep(LOCK_RETRY).await,
            }
        }
    }

    async fn read_locked(file: &mut File) -> Result<String> {
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;
        Ok(contents)
    }

    async fn overwrite_locked(file: &mut File, contents: &str) -> Result<()> {
        file.set_len(0).await?;
        file.rewind().await?;
        file.write_all(contents.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
        || (e.raw_os_error().is_some()
            && e.raw_os_error() == fs4::lock_contended_error().raw_os_error())
}

#[async_trait]
impl StatsBackend for JsonFileBackend {
    async fn load(&self) -> Result<Option<StatsData>> {
        let _access = self.access.read().await;
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => Err(e)?,
        };

        Self::lock(&file, LockKind::Shared).await?;
        let contents = Self::read_locked(&mut file).await;
        file.unlock_async().await?;
        let contents = contents?;

        if contents.trim().is_empty() {
            debug!("Stats file {:?} is empty", self.path);
            return Ok(None);
        }
        Ok(Some(decode(&contents)?))
    }

    async fn save(&self, data: &StatsData) -> Result<()> {
        let contents = encode(data)?;
        let _access = self.access.write().await;
        let mut file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await?;

        Self::lock(&file, LockKind::Exclusive).await?;
        let result = Self::overwrite_locked(&mut file, &contents).await;
        file.unlock_async().await?;
        result
    }
}

/// Backend that keeps the serialized form in memory. Useful for embedding the tracker where the
/// host owns persistence, and for tests that need to plant a specific payload.
#[derive(Default)]
pub struct MemoryBackend {
    contents: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(contents.into())),
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.lock().ok().and_then(|v| v.clone())
    }
}

#[async_trait]
impl StatsBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<StatsData>> {
        let contents = self
            .contents
            .lock()
            .map_err(|_| anyhow!("Memory backend lock was poisoned"))?
            .clone();
        contents.as_deref().map(decode).transpose()
    }

    async fn save(&self, data: &StatsData) -> Result<()> {
        let encoded = encode(data)?;
        *self
            .contents
            .lock()
            .map_err(|_| anyhow!("Memory backend lock was poisoned"))? = Some(encoded);
        Ok(())
    }
}
