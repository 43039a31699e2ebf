//! Streaming reader over a sealed artifact.

use super::{Artifact, ArtifactHandle, ArtifactStore};
use crate::error::StorageError;
use crate::types::ArtifactId;
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::io::ReaderStream;

/// Read chunk size for file-backed artifacts
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Keeps an artifact's backing storage alive while a reader exists
pub(super) struct ReadLease {
    store: ArtifactStore,
    id: ArtifactId,
}

impl ReadLease {
    pub(super) fn new(store: ArtifactStore, id: ArtifactId) -> Self {
        Self { store, id }
    }
}

impl Drop for ReadLease {
    fn drop(&mut self) {
        self.store.end_read(self.id);
    }
}

/// Byte stream over a sealed artifact
///
/// While any reader is alive, releasing the artifact only marks it; the
/// backing storage is removed when the last reader is dropped.
pub struct ArtifactReader {
    artifact: Artifact,
    stream: BoxStream<'static, std::io::Result<Bytes>>,
    _lease: ReadLease,
}

impl ArtifactReader {
    pub(super) async fn open(artifact: Artifact, lease: ReadLease) -> Result<Self, StorageError> {
        // On error the lease drops here and the reader count is restored
        let stream = match &artifact.handle {
            ArtifactHandle::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                ReaderStream::with_capacity(file, READ_CHUNK_SIZE).boxed()
            }
            ArtifactHandle::Memory(bytes) => {
                let bytes = bytes.clone();
                if bytes.is_empty() {
                    stream::empty().boxed()
                } else {
                    stream::once(async move { Ok(bytes) }).boxed()
                }
            }
        };

        Ok(Self {
            artifact,
            stream,
            _lease: lease,
        })
    }

    /// The artifact being read
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }
}

impl Stream for ArtifactReader {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for ArtifactReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactReader")
            .field("artifact", &self.artifact.id)
            .finish()
    }
}
