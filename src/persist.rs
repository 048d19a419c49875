//! ==============================================================================
//! persist.rs - durable mirror of the pending queue
//! ==============================================================================
//!
//! purpose:
//!     the in-memory queue is authoritative. every mutation hands a snapshot
//!     to a write-behind task which serializes it into a QueueStore slot.
//!     nobody awaits those writes; failures are logged and the next
//!     successful write catches the mirror up.
//!
//! structure:
//!     - QueueStore: load once at startup, save on every mutation
//!     - JsonFileQueueStore: json array on disk, temp file + rename
//!     - MemoryQueueStore: process-local slot (tests, ephemeral runs)
//!     - WriteBehind: mpsc hand-off to a detached tokio task
//!
//! ==============================================================================

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::Measurement;
use crate::error::PersistenceError;

#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn save(&self, queue: &[Measurement]) -> Result<(), PersistenceError>;

    /// empty when nothing was ever saved
    async fn load(&self) -> Result<Vec<Measurement>, PersistenceError>;
}

// ==============================================================================
// json file store
// ==============================================================================

pub struct JsonFileQueueStore {
    path: PathBuf,
}

impl JsonFileQueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl QueueStore for JsonFileQueueStore {
    async fn save(&self, queue: &[Measurement]) -> Result<(), PersistenceError> {
        let payload = serde_json::to_vec_pretty(queue).map_err(PersistenceError::Encode)?;

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn load(&self) -> Result<Vec<Measurement>, PersistenceError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw).map_err(PersistenceError::Decode)
    }
}

// ==============================================================================
// in-memory store
// ==============================================================================

#[derive(Default)]
pub struct MemoryQueueStore {
    slot: Mutex<Option<Vec<Measurement>>>,
    failing: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(queue: Vec<Measurement>) -> Self {
        Self {
            slot: Mutex::new(Some(queue)),
            ..Self::default()
        }
    }

    /// make every save fail with an i/o error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn contents(&self) -> Option<Vec<Measurement>> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn save(&self, queue: &[Measurement]) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "store offline").into());
        }
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "slot poisoned"))?;
        *slot = Some(queue.to_vec());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<Vec<Measurement>, PersistenceError> {
        Ok(self.contents().unwrap_or_default())
    }
}

// ==============================================================================
// write-behind task
// ==============================================================================

/// detached writer; snapshots are applied in the order they were handed over
pub struct WriteBehind {
    tx: mpsc::UnboundedSender<Vec<Measurement>>,
    handle: JoinHandle<()>,
}

impl WriteBehind {
    pub fn spawn(store: Arc<dyn QueueStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<Measurement>>();

        let handle = tokio::spawn(async move {
            while let Some(mut snapshot) = rx.recv().await {
                // only the newest snapshot matters
                while let Ok(newer) = rx.try_recv() {
                    snapshot = newer;
                }
                match store.save(&snapshot).await {
                    Ok(()) => tracing::debug!("[QUEUE] mirrored {} pending entries", snapshot.len()),
                    Err(e) => tracing::warn!("[QUEUE] ⚠ failed to persist pending entries: {}", e),
                }
            }
        });

        Self { tx, handle }
    }

    pub fn submit(&self, snapshot: Vec<Measurement>) {
        if self.tx.send(snapshot).is_err() {
            tracing::warn!("[QUEUE] ⚠ write-behind task is gone, snapshot dropped");
        }
    }

    /// close the channel and wait for the final write
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            tracing::warn!("[QUEUE] ⚠ write-behind task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn entry(count: u64) -> Measurement {
        Measurement::new("default", count, DateTime::from_timestamp(count as i64, 0).unwrap())
    }

    #[tokio::test]
    async fn write_behind_keeps_only_newest_snapshot() {
        let store = Arc::new(MemoryQueueStore::new());
        let writer = WriteBehind::spawn(store.clone());

        // the writer task has not been polled yet, so all three are queued
        writer.submit(vec![entry(1)]);
        writer.submit(vec![entry(1), entry(2)]);
        writer.submit(vec![entry(2)]);
        writer.close().await;

        assert_eq!(store.save_count(), 1);
        assert_eq!(store.contents(), Some(vec![entry(2)]));
    }

    #[tokio::test]
    async fn json_store_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileQueueStore::new(dir.path().join("pending.json"));

        store.save(&[entry(3)]).await.unwrap();

        assert!(!store.temp_path().exists());
        assert_eq!(store.load().await.unwrap(), vec![entry(3)]);
    }
}
