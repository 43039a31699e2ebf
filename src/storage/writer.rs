//! Per-attempt artifact writer.

use super::{Artifact, ArtifactHandle, ArtifactStore};
use crate::error::StorageError;
use crate::types::{ArtifactId, JobId, MediaKind};
use bytes::{Bytes, BytesMut};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

enum Sink {
    File {
        file: Option<tokio::fs::File>,
        path: PathBuf,
    },
    Memory(BytesMut),
}

/// Exclusive write handle for one fetch attempt
///
/// Dropping a writer that was never sealed discards its output and returns its
/// bytes to the store. Because sealing consumes the writer, each writer is
/// either sealed or discarded exactly once.
pub struct ArtifactWriter {
    store: ArtifactStore,
    id: ArtifactId,
    job_id: JobId,
    kind: MediaKind,
    sink: Sink,
    reserved: u64,
    sealed: bool,
}

impl ArtifactWriter {
    pub(super) fn file(
        store: ArtifactStore,
        id: ArtifactId,
        job_id: JobId,
        kind: MediaKind,
        file: tokio::fs::File,
        path: PathBuf,
    ) -> Self {
        Self {
            store,
            id,
            job_id,
            kind,
            sink: Sink::File {
                file: Some(file),
                path,
            },
            reserved: 0,
            sealed: false,
        }
    }

    pub(super) fn memory(store: ArtifactStore, id: ArtifactId, job_id: JobId, kind: MediaKind) -> Self {
        Self {
            store,
            id,
            job_id,
            kind,
            sink: Sink::Memory(BytesMut::new()),
            reserved: 0,
            sealed: false,
        }
    }

    /// Artifact ID this writer will seal into
    pub fn id(&self) -> ArtifactId {
        self.id
    }

    /// Owning job
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.reserved
    }

    /// Append a chunk, failing with `Exhausted` if it would exceed capacity
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        if chunk.is_empty() {
            return Ok(());
        }

        let len = chunk.len() as u64;
        self.store.reserve(len)?;
        self.reserved += len;

        match &mut self.sink {
            Sink::File { file: Some(file), .. } => file.write_all(chunk).await?,
            Sink::File { file: None, .. } => {
                return Err(StorageError::Io(std::io::Error::other("writer already closed")));
            }
            Sink::Memory(buf) => buf.extend_from_slice(chunk),
        }
        Ok(())
    }

    /// Seal into an immutable artifact whose filename derives from `title`
    pub(super) async fn seal(mut self, title: &str) -> Result<Artifact, StorageError> {
        let filename = format!(
            "{}.{}",
            crate::utils::sanitize_filename(title),
            self.kind.container().extension()
        );

        let handle = match &mut self.sink {
            Sink::File { file, path } => {
                if let Some(mut f) = file.take() {
                    f.flush().await?;
                    f.sync_all().await?;
                }
                let sealed_path = self.store.sealed_path(self.id, self.kind);
                tokio::fs::rename(&*path, &sealed_path).await?;
                *path = sealed_path.clone();
                ArtifactHandle::File(sealed_path)
            }
            Sink::Memory(buf) => ArtifactHandle::Memory(Bytes::from(std::mem::take(buf))),
        };

        let artifact = Artifact {
            id: self.id,
            job_id: self.job_id,
            filename,
            kind: self.kind,
            size_bytes: self.reserved,
            created_at: chrono::Utc::now(),
            handle,
        };

        self.sealed = true;
        self.store.register(artifact.clone());

        tracing::debug!(
            artifact_id = %artifact.id,
            job_id = %artifact.job_id,
            size_bytes = artifact.size_bytes,
            filename = %artifact.filename,
            "Artifact sealed"
        );
        Ok(artifact)
    }
}

impl Drop for ArtifactWriter {
    fn drop(&mut self) {
        if self.sealed {
            return;
        }

        if let Sink::File { file, path } = &mut self.sink {
            drop(file.take());
            self.store.remove_file_quietly(path.to_path_buf());
        }
        self.store.discard(self.reserved);

        tracing::debug!(
            artifact_id = %self.id,
            job_id = %self.job_id,
            bytes = self.reserved,
            "Unsealed artifact discarded"
        );
    }
}

impl std::fmt::Debug for ArtifactWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactWriter")
            .field("id", &self.id)
            .field("job_id", &self.job_id)
            .field("kind", &self.kind)
            .field("bytes_written", &self.reserved)
            .finish()
    }
}
