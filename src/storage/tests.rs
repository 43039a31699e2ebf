use super::*;
use crate::config::{StorageBackend, StorageConfig};
use crate::types::{JobId, MediaKind};
use futures::StreamExt;
use std::time::Duration;
use tempfile::TempDir;

fn disk_config(dir: &TempDir, capacity_bytes: u64) -> StorageConfig {
    StorageConfig {
        backend: StorageBackend::Disk,
        artifact_dir: dir.path().to_path_buf(),
        capacity_bytes,
        ..StorageConfig::default()
    }
}

fn memory_config(capacity_bytes: u64) -> StorageConfig {
    StorageConfig {
        backend: StorageBackend::Memory,
        capacity_bytes,
        ..StorageConfig::default()
    }
}

async fn read_all(reader: ArtifactReader) -> Vec<u8> {
    let chunks: Vec<_> = reader.collect().await;
    chunks
        .into_iter()
        .flat_map(|c| c.unwrap().to_vec())
        .collect()
}

async fn sealed(store: &ArtifactStore, job: u64, body: &[u8], title: &str) -> Artifact {
    let mut writer = store.create(JobId(job), MediaKind::Video).await.unwrap();
    writer.write(body).await.unwrap();
    store.seal(writer, title).await.unwrap()
}

#[tokio::test]
async fn test_disk_write_seal_read() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(disk_config(&dir, 1024)).await.unwrap();

    let mut writer = store.create(JobId(1), MediaKind::Video).await.unwrap();
    writer.write(b"hello ").await.unwrap();
    writer.write(b"world").await.unwrap();
    assert_eq!(store.stats().in_flight, 1);

    let artifact = store.seal(writer, "My Clip").await.unwrap();
    assert_eq!(artifact.filename, "My Clip.mp4");
    assert_eq!(artifact.size_bytes, 11);
    assert_eq!(artifact.media_type(), "video/mp4");

    let ArtifactHandle::File(path) = artifact.handle() else {
        panic!("disk backend should produce a file handle");
    };
    assert!(path.exists());
    assert_eq!(path.extension().unwrap(), "mp4");

    let reader = store.open(&artifact).await.unwrap();
    assert_eq!(read_all(reader).await, b"hello world");

    let stats = store.stats();
    assert_eq!(stats.used_bytes, 11);
    assert_eq!(stats.artifacts, 1);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.active_readers, 0);
}

#[tokio::test]
async fn test_memory_write_seal_read() {
    let store = ArtifactStore::new(memory_config(1024)).await.unwrap();

    let mut writer = store.create(JobId(3), MediaKind::Audio).await.unwrap();
    writer.write(b"ID3").await.unwrap();
    let artifact = store.seal(writer, "song").await.unwrap();

    assert_eq!(artifact.filename, "song.mp3");
    assert_eq!(artifact.media_type(), "audio/mpeg");
    assert!(matches!(artifact.handle(), ArtifactHandle::Memory(_)));

    let reader = store.open(&artifact).await.unwrap();
    assert_eq!(read_all(reader).await, b"ID3");
}

#[tokio::test]
async fn test_dropped_writer_is_discarded_once() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(disk_config(&dir, 1024)).await.unwrap();

    let mut writer = store.create(JobId(1), MediaKind::Video).await.unwrap();
    writer.write(&[0u8; 100]).await.unwrap();
    assert_eq!(store.stats().used_bytes, 100);

    let staging = dir.path().join(format!("{}.part", writer.id()));
    assert!(staging.exists());

    drop(writer);

    let stats = store.stats();
    assert_eq!(stats.used_bytes, 0);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.artifacts, 0);
    store.flush_removals().await;
    assert!(!staging.exists());
}

#[tokio::test]
async fn test_sealed_writer_is_not_discarded() {
    let store = ArtifactStore::new(memory_config(1024)).await.unwrap();
    let _artifact = sealed(&store, 1, b"abc", "x").await;
    assert_eq!(store.stats().discarded, 0);
}

#[tokio::test]
async fn test_write_beyond_capacity_fails() {
    let store = ArtifactStore::new(memory_config(10)).await.unwrap();

    let mut writer = store.create(JobId(1), MediaKind::Video).await.unwrap();
    writer.write(&[1u8; 8]).await.unwrap();

    let err = writer.write(&[1u8; 8]).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Exhausted {
            requested: 8,
            used: 8,
            capacity: 10
        }
    ));

    drop(writer);
    assert_eq!(store.stats().used_bytes, 0);
}

#[tokio::test]
async fn test_create_fails_when_full() {
    let store = ArtifactStore::new(memory_config(4)).await.unwrap();
    let _artifact = sealed(&store, 1, b"full", "a").await;

    assert!(matches!(
        store.check_capacity(),
        Err(StorageError::Exhausted { .. })
    ));
    assert!(matches!(
        store.create(JobId(2), MediaKind::Video).await,
        Err(StorageError::Exhausted { .. })
    ));
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(disk_config(&dir, 1024)).await.unwrap();
    let artifact = sealed(&store, 1, b"payload", "clip").await;
    let ArtifactHandle::File(path) = artifact.handle().clone() else {
        panic!("expected a file");
    };

    assert!(store.release(artifact.id));
    assert_eq!(store.stats().used_bytes, 0);
    store.flush_removals().await;
    assert!(!path.exists());
    assert!(!store.contains(artifact.id));

    assert!(!store.release(artifact.id));
    assert!(!store.release(crate::types::ArtifactId(9999)));
    assert_eq!(store.stats().used_bytes, 0);
}

#[tokio::test]
async fn test_open_after_release_is_not_found() {
    let store = ArtifactStore::new(memory_config(1024)).await.unwrap();
    let artifact = sealed(&store, 1, b"abc", "x").await;
    store.release(artifact.id);

    assert!(matches!(
        store.open(&artifact).await,
        Err(StorageError::NotFound(id)) if id == artifact.id
    ));
}

#[tokio::test]
async fn test_release_deferred_while_reading() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(disk_config(&dir, 1024)).await.unwrap();
    let artifact = sealed(&store, 1, b"streaming body", "clip").await;
    let ArtifactHandle::File(path) = artifact.handle().clone() else {
        panic!("expected a file");
    };

    let reader = store.open(&artifact).await.unwrap();
    assert_eq!(store.stats().active_readers, 1);

    assert!(store.release(artifact.id));
    // Still readable: the reader holds a lease
    assert!(path.exists());
    assert!(store.contains(artifact.id));
    assert_eq!(store.stats().used_bytes, 14);

    // A new open is refused once released
    assert!(store.open(&artifact).await.is_err());

    assert_eq!(read_all(reader).await, b"streaming body");

    store.flush_removals().await;
    assert!(!path.exists());
    assert!(!store.contains(artifact.id));
    assert_eq!(store.stats().used_bytes, 0);
}

#[tokio::test]
async fn test_reap_expired_respects_retention() {
    let config = StorageConfig {
        retention: Duration::from_secs(60),
        ..memory_config(1024)
    };
    let store = ArtifactStore::new(config).await.unwrap();
    let artifact = sealed(&store, 1, b"abc", "x").await;

    let now = artifact.created_at;
    assert!(store.reap_expired(now).is_empty());
    assert!(
        store
            .reap_expired(now + chrono::Duration::seconds(59))
            .is_empty()
    );

    let reaped = store.reap_expired(now + chrono::Duration::seconds(60));
    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].job_id, JobId(1));
    assert_eq!(store.stats().artifacts, 0);

    // Already reclaimed
    assert!(
        store
            .reap_expired(now + chrono::Duration::seconds(120))
            .is_empty()
    );
}

#[tokio::test]
async fn test_release_all() {
    let store = ArtifactStore::new(memory_config(1024)).await.unwrap();
    sealed(&store, 1, b"a", "a").await;
    sealed(&store, 2, b"b", "b").await;

    assert_eq!(store.release_all().await, 2);
    assert_eq!(store.stats().artifacts, 0);
    assert_eq!(store.stats().used_bytes, 0);
}

#[tokio::test]
async fn test_release_all_waits_for_disk_removal() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(disk_config(&dir, 1024)).await.unwrap();
    sealed(&store, 1, b"a", "a").await;
    sealed(&store, 2, b"b", "b").await;

    assert_eq!(store.release_all().await, 2);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

// The test body runs on a current-thread runtime, so a spawned removal cannot
// start until the test yields.
#[tokio::test]
async fn test_release_does_not_unlink_on_caller() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(disk_config(&dir, 1024)).await.unwrap();
    let artifact = sealed(&store, 1, b"payload", "clip").await;
    let ArtifactHandle::File(path) = artifact.handle().clone() else {
        panic!("expected a file");
    };

    assert!(store.release(artifact.id));
    assert!(path.exists());
    assert!(!store.contains(artifact.id));

    store.flush_removals().await;
    assert!(!path.exists());
}

#[test]
fn test_release_without_runtime_removes_inline() {
    let dir = TempDir::new().unwrap();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (store, artifact) = runtime.block_on(async {
        let store = ArtifactStore::new(disk_config(&dir, 1024)).await.unwrap();
        let artifact = sealed(&store, 1, b"payload", "clip").await;
        (store, artifact)
    });
    drop(runtime);

    let ArtifactHandle::File(path) = artifact.handle().clone() else {
        panic!("expected a file");
    };
    assert!(store.release(artifact.id));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_stale_files_purged_on_startup() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("17.part"), b"partial").unwrap();
    std::fs::write(dir.path().join("18.mp4"), b"old").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

    let _store = ArtifactStore::new(disk_config(&dir, 1024)).await.unwrap();

    assert!(!dir.path().join("17.part").exists());
    assert!(!dir.path().join("18.mp4").exists());
    assert!(dir.path().join("notes.txt").exists());
}

#[tokio::test]
async fn test_empty_title_falls_back() {
    let store = ArtifactStore::new(memory_config(1024)).await.unwrap();
    let artifact = sealed(&store, 1, b"x", "  ").await;
    assert_eq!(artifact.filename, "download.mp4");
}

#[tokio::test]
async fn test_disk_space_reserve_enforced() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig {
        min_free_disk_bytes: u64::MAX,
        ..disk_config(&dir, 1024)
    };
    let store = ArtifactStore::new(config).await.unwrap();

    assert!(matches!(
        store.create(JobId(1), MediaKind::Video).await,
        Err(StorageError::DiskSpaceLow { .. })
    ));
    assert_eq!(store.stats().in_flight, 0);
}
