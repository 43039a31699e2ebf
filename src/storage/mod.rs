//! Artifact store - temporary buffers for in-flight and completed downloads.
//!
//! The store hands out an [`ArtifactWriter`] per fetch attempt, seals a finished
//! writer into an immutable [`Artifact`], opens sealed artifacts for streaming,
//! and reclaims them on release or once their retention window has passed.
//!
//! All accounting lives behind one mutex that is never held across an await.
//! Reclamation of an artifact that is being read is deferred until its last
//! [`ArtifactReader`] is dropped. Files are unlinked on the runtime's blocking
//! pool, off the caller's thread; [`ArtifactStore::flush_removals`] waits for them.

mod artifact;
mod reader;
mod writer;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use artifact::{Artifact, ArtifactHandle};
pub use reader::ArtifactReader;
pub use writer::ArtifactWriter;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::StorageError;
use crate::types::{ArtifactId, JobId, MediaKind};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Extension used for staging files that have not been sealed
const STAGING_EXTENSION: &str = "part";

/// Point-in-time storage accounting
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Bytes accounted to sealed artifacts and in-flight writers
    pub used_bytes: u64,
    /// Configured ceiling
    pub capacity_bytes: u64,
    /// Sealed artifacts still held
    pub artifacts: usize,
    /// Writers created but not yet sealed or discarded
    pub in_flight: usize,
    /// Writers dropped without being sealed
    pub discarded: u64,
    /// Readers currently streaming
    pub active_readers: usize,
}

struct Entry {
    artifact: Artifact,
    readers: usize,
    released: bool,
}

#[derive(Default)]
struct StoreState {
    used_bytes: u64,
    in_flight: usize,
    discarded: u64,
    entries: HashMap<ArtifactId, Entry>,
}

struct StoreInner {
    config: StorageConfig,
    state: Mutex<StoreState>,
    next_id: AtomicU64,
    /// File removals spawned but not yet finished
    pending_removals: AtomicUsize,
    removals_idle: Notify,
}

/// Artifact store (cloneable handle; clones share state)
#[derive(Clone)]
pub struct ArtifactStore {
    inner: Arc<StoreInner>,
}

impl ArtifactStore {
    /// Create a store, preparing the artifact directory for the disk backend
    ///
    /// Files left in the directory by a previous process are purged: nothing is
    /// persisted across restarts, so they can never be delivered.
    pub async fn new(config: StorageConfig) -> Result<Self, StorageError> {
        if config.backend == StorageBackend::Disk {
            tokio::fs::create_dir_all(&config.artifact_dir).await?;
            let purged = purge_stale_files(&config.artifact_dir).await?;
            if purged > 0 {
                tracing::info!(
                    purged,
                    dir = %config.artifact_dir.display(),
                    "Removed stale artifact files from a previous run"
                );
            }
        }

        Ok(Self {
            inner: Arc::new(StoreInner {
                config,
                state: Mutex::new(StoreState::default()),
                next_id: AtomicU64::new(1),
                pending_removals: AtomicUsize::new(0),
                removals_idle: Notify::new(),
            }),
        })
    }

    /// Storage configuration
    pub fn config(&self) -> &StorageConfig {
        &self.inner.config
    }

    /// Fail with `Exhausted` if the capacity ceiling has been reached
    pub fn check_capacity(&self) -> Result<(), StorageError> {
        let state = self.lock();
        self.ensure_room(&state, 0)
    }

    /// Allocate backing storage for one fetch attempt
    pub async fn create(&self, job_id: JobId, kind: MediaKind) -> Result<ArtifactWriter, StorageError> {
        self.check_capacity()?;

        if self.inner.config.backend == StorageBackend::Disk
            && self.inner.config.min_free_disk_bytes > 0
        {
            let available = crate::utils::get_available_space(&self.inner.config.artifact_dir)?;
            if available < self.inner.config.min_free_disk_bytes {
                return Err(StorageError::DiskSpaceLow {
                    available,
                    reserve: self.inner.config.min_free_disk_bytes,
                });
            }
        }

        let id = ArtifactId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        self.lock().in_flight += 1;

        let writer = match self.inner.config.backend {
            StorageBackend::Disk => {
                let path = self.staging_path(id);
                match tokio::fs::File::create(&path).await {
                    Ok(file) => ArtifactWriter::file(self.clone(), id, job_id, kind, file, path),
                    Err(e) => {
                        self.lock().in_flight -= 1;
                        return Err(e.into());
                    }
                }
            }
            StorageBackend::Memory => ArtifactWriter::memory(self.clone(), id, job_id, kind),
        };

        tracing::debug!(artifact_id = %id, job_id = %job_id, "Artifact writer created");
        Ok(writer)
    }

    /// Seal a finished writer into an immutable artifact named after `title`
    pub async fn seal(&self, writer: ArtifactWriter, title: &str) -> Result<Artifact, StorageError> {
        writer.seal(title).await
    }

    /// Open a sealed artifact for streaming
    pub async fn open(&self, artifact: &Artifact) -> Result<ArtifactReader, StorageError> {
        {
            let mut state = self.lock();
            match state.entries.get_mut(&artifact.id) {
                Some(entry) if !entry.released => entry.readers += 1,
                _ => return Err(StorageError::NotFound(artifact.id)),
            }
        }

        let lease = reader::ReadLease::new(self.clone(), artifact.id);
        ArtifactReader::open(artifact.clone(), lease).await
    }

    /// Release an artifact's storage
    ///
    /// Idempotent: releasing twice, or releasing an unknown id, does nothing and
    /// returns `false`. If readers are mid-stream the backing storage is removed
    /// when the last one finishes.
    pub fn release(&self, id: ArtifactId) -> bool {
        let removed = {
            let mut state = self.lock();
            match state.entries.get_mut(&id) {
                Some(entry) if !entry.released => {
                    entry.released = true;
                    if entry.readers == 0 {
                        Self::remove_entry(&mut state, id)
                    } else {
                        tracing::debug!(
                            artifact_id = %id,
                            readers = entry.readers,
                            "Release deferred until readers finish"
                        );
                        None
                    }
                }
                _ => return false,
            }
        };

        if let Some(artifact) = removed {
            self.delete_backing(&artifact);
        }
        true
    }

    /// Release every artifact sealed at or before `now - retention`
    ///
    /// Returns the artifacts that were released by this call.
    pub fn reap_expired(&self, now: DateTime<Utc>) -> Vec<Artifact> {
        let retention = chrono::Duration::from_std(self.inner.config.retention)
            .unwrap_or(chrono::Duration::MAX);

        let expired: Vec<Artifact> = {
            let state = self.lock();
            state
                .entries
                .values()
                .filter(|e| {
                    !e.released
                        && e
                            .artifact
                            .created_at
                            .checked_add_signed(retention)
                            .is_some_and(|expiry| expiry <= now)
                })
                .map(|e| e.artifact.clone())
                .collect()
        };

        expired
            .into_iter()
            .filter(|artifact| self.release(artifact.id))
            .collect()
    }

    /// Release everything (shutdown), returning once the files are gone
    pub async fn release_all(&self) -> usize {
        let ids: Vec<ArtifactId> = self.lock().entries.keys().copied().collect();
        let released = ids.into_iter().filter(|id| self.release(*id)).count();
        self.flush_removals().await;
        released
    }

    /// Wait until every file removal started so far has finished
    pub async fn flush_removals(&self) {
        loop {
            let idle = self.inner.removals_idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.inner.pending_removals.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Whether a sealed artifact is still held (released-but-being-read counts as held)
    pub fn contains(&self, id: ArtifactId) -> bool {
        self.lock().entries.contains_key(&id)
    }

    /// Current accounting
    pub fn stats(&self) -> StorageStats {
        let state = self.lock();
        StorageStats {
            used_bytes: state.used_bytes,
            capacity_bytes: self.inner.config.capacity_bytes,
            artifacts: state.entries.len(),
            in_flight: state.in_flight,
            discarded: state.discarded,
            active_readers: state.entries.values().map(|e| e.readers).sum(),
        }
    }

    // -- crate-internal accounting used by writers and readers ---------------

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // A poisoned lock only means a panic happened mid-update of plain counters;
        // the data is still usable.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_room(&self, state: &StoreState, requested: u64) -> Result<(), StorageError> {
        let capacity = self.inner.config.capacity_bytes;
        if state.used_bytes >= capacity || state.used_bytes.saturating_add(requested) > capacity {
            return Err(StorageError::Exhausted {
                requested,
                used: state.used_bytes,
                capacity,
            });
        }
        Ok(())
    }

    /// Account `bytes` more for an in-flight writer
    fn reserve(&self, bytes: u64) -> Result<(), StorageError> {
        let mut state = self.lock();
        self.ensure_room(&state, bytes)?;
        state.used_bytes += bytes;
        Ok(())
    }

    /// Undo an unsealed writer: return its bytes and count the discard
    fn discard(&self, reserved: u64) {
        let mut state = self.lock();
        state.used_bytes = state.used_bytes.saturating_sub(reserved);
        state.in_flight = state.in_flight.saturating_sub(1);
        state.discarded += 1;
    }

    /// Register a sealed artifact; its bytes stay accounted
    fn register(&self, artifact: Artifact) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.entries.insert(
            artifact.id,
            Entry {
                artifact,
                readers: 0,
                released: false,
            },
        );
    }

    /// Drop one reader; finish a deferred release if it was the last
    fn end_read(&self, id: ArtifactId) {
        let removed = {
            let mut state = self.lock();
            match state.entries.get_mut(&id) {
                Some(entry) => {
                    entry.readers = entry.readers.saturating_sub(1);
                    if entry.readers == 0 && entry.released {
                        Self::remove_entry(&mut state, id)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };

        if let Some(artifact) = removed {
            self.delete_backing(&artifact);
        }
    }

    /// Remove a reclaimed artifact's file; memory buffers go away with their last clone
    fn delete_backing(&self, artifact: &Artifact) {
        if let ArtifactHandle::File(path) = &artifact.handle {
            self.remove_file_quietly(path.clone());
        }
    }

    /// Unlink `path` on the runtime if there is one, inline otherwise
    ///
    /// Called from `Drop` impls, so it must not block or await.
    fn remove_file_quietly(&self, path: PathBuf) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log_removal_failure(&path, std::fs::remove_file(&path));
            return;
        };

        self.inner.pending_removals.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            log_removal_failure(&path, tokio::fs::remove_file(&path).await);
            if inner.pending_removals.fetch_sub(1, Ordering::SeqCst) == 1 {
                inner.removals_idle.notify_waiters();
            }
        });
    }

    fn remove_entry(state: &mut StoreState, id: ArtifactId) -> Option<Artifact> {
        let entry = state.entries.remove(&id)?;
        state.used_bytes = state.used_bytes.saturating_sub(entry.artifact.size_bytes);
        tracing::debug!(
            artifact_id = %id,
            job_id = %entry.artifact.job_id,
            size_bytes = entry.artifact.size_bytes,
            "Artifact reclaimed"
        );
        Some(entry.artifact)
    }

    fn staging_path(&self, id: ArtifactId) -> PathBuf {
        self.inner
            .config
            .artifact_dir
            .join(format!("{}.{}", id, STAGING_EXTENSION))
    }

    fn sealed_path(&self, id: ArtifactId, kind: MediaKind) -> PathBuf {
        self.inner
            .config
            .artifact_dir
            .join(format!("{}.{}", id, kind.container().extension()))
    }
}

fn log_removal_failure(path: &Path, result: std::io::Result<()>) {
    if let Err(e) = result
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove artifact file");
    }
}

/// Delete files this store could have produced (`<id>.part|mp4|mp3`)
async fn purge_stale_files(dir: &Path) -> std::io::Result<usize> {
    let mut purged = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let ours = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| stem.parse::<u64>().is_ok())
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| matches!(ext, STAGING_EXTENSION | "mp4" | "mp3"));

        if ours && entry.file_type().await?.is_file() {
            tokio::fs::remove_file(&path).await?;
            purged += 1;
        }
    }
    Ok(purged)
}
