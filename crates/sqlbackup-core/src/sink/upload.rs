//! Streaming upload sink
//!
//! The serializer writes into one end of an in-memory duplex conduit while a
//! spawned task copies the other end into a multipart upload. Memory use is
//! bounded by the conduit capacity plus the upload part size, whatever the
//! artifact size.
//!
//! The upload only completes after `finish` commits it. If the sink is
//! aborted or dropped first, the task aborts the multipart upload. If
//! completing the upload outlives the upload timeout, the task is cancelled
//! and an object that still landed is deleted, so a failed run leaves no
//! artifact behind.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::path::Path;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::BackupSink;
use crate::config::ObjectStoreConfig;
use crate::error::{BackupError, BackupResult};

/// Bytes buffered between producer and uploader before writes wait
const CONDUIT_CAPACITY: usize = 64 * 1024;

/// Upload part size; S3 rejects parts under 5 MiB except the last one
const DEFAULT_PART_SIZE: usize = 10 * 1024 * 1024;

/// Build an S3-compatible store from configuration
pub fn s3_store(config: &ObjectStoreConfig) -> BackupResult<Arc<dyn ObjectStore>> {
    config.validate()?;

    let mut builder = AmazonS3Builder::new()
        .with_region(&config.region)
        .with_bucket_name(&config.bucket)
        .with_access_key_id(&config.access_key_id)
        .with_secret_access_key(&config.secret_access_key)
        .with_virtual_hosted_style_request(!config.force_path_style)
        .with_allow_http(config.allow_http);
    if !config.endpoint.is_empty() {
        builder = builder.with_endpoint(&config.endpoint);
    }

    let store = builder
        .build()
        .map_err(|e| BackupError::Config(format!("Invalid object store settings: {e}")))?;
    Ok(Arc::new(store))
}

/// What the upload task does once the conduit is drained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Pending,
    Commit,
    Cancel,
}

/// Sink that streams the artifact into an object store
pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
    location: Path,
    writer: Option<DuplexStream>,
    decision: watch::Sender<Decision>,
    upload: Option<JoinHandle<BackupResult<u64>>>,
    upload_timeout: Duration,
    bytes: u64,
}

impl ObjectStoreSink {
    /// Start the upload task for `key`. Must be called inside a Tokio runtime.
    pub fn new(store: Arc<dyn ObjectStore>, key: &str, upload_timeout: Duration) -> Self {
        Self::with_part_size(store, key, upload_timeout, DEFAULT_PART_SIZE)
    }

    /// Like [`ObjectStoreSink::new`], switching to a multipart upload once
    /// `part_size` bytes are buffered
    pub fn with_part_size(
        store: Arc<dyn ObjectStore>,
        key: &str,
        upload_timeout: Duration,
        part_size: usize,
    ) -> Self {
        let location = Path::from(key);
        let (writer, reader) = tokio::io::duplex(CONDUIT_CAPACITY);
        let (decision, decision_rx) = watch::channel(Decision::Pending);
        let upload = BufWriter::with_capacity(Arc::clone(&store), location.clone(), part_size);

        let task_location = location.clone();
        let handle = tokio::spawn(async move {
            let result = upload_task(reader, upload, decision_rx).await;
            match &result {
                Ok(bytes) => tracing::debug!(key = %task_location, bytes, "Upload task finished"),
                Err(e) => tracing::warn!(key = %task_location, error = %e, "Upload task failed"),
            }
            result
        });

        Self {
            store,
            location,
            writer: Some(writer),
            decision,
            upload: Some(handle),
            upload_timeout,
            bytes: 0,
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Wait for the upload task and return its outcome
    async fn join_upload(&mut self) -> BackupResult<u64> {
        let handle = self
            .upload
            .take()
            .ok_or_else(|| BackupError::Upload("upload task already joined".to_string()))?;
        handle
            .await
            .map_err(|e| BackupError::Upload(format!("upload task failed to run: {e}")))?
    }

    /// The conduit broke: the uploader stopped reading. Report its error.
    async fn broken_conduit(&mut self, io_error: std::io::Error) -> BackupError {
        self.writer = None;
        self.decision.send_replace(Decision::Cancel);
        match self.join_upload().await {
            Err(upload_error) => upload_error,
            Ok(_) => BackupError::Upload(format!("conduit closed early: {io_error}")),
        }
    }

    /// Completing the upload took too long: cancel it and make sure no
    /// object is left behind if it landed anyway.
    async fn cancel_late_upload(&mut self) {
        self.decision.send_replace(Decision::Cancel);
        if let Ok(bytes) = self.join_upload().await {
            tracing::warn!(key = %self.location, bytes, "Upload completed after timeout, deleting");
            if let Err(e) = self.store.delete(&self.location).await {
                tracing::error!(key = %self.location, error = %e, "Failed to delete late upload");
            }
        }
    }
}

async fn upload_task(
    mut reader: DuplexStream,
    mut upload: BufWriter,
    mut decision: watch::Receiver<Decision>,
) -> BackupResult<u64> {
    let copied = tokio::io::copy(&mut reader, &mut upload).await;
    drop(reader);

    let bytes = match copied {
        Ok(bytes) => bytes,
        Err(e) => {
            abort_upload(&mut upload).await;
            return Err(BackupError::Upload(e.to_string()));
        }
    };

    // a dropped sink counts as a cancel
    let decided = decision
        .wait_for(|d| *d != Decision::Pending)
        .await
        .map(|d| *d)
        .unwrap_or(Decision::Cancel);
    if decided != Decision::Commit {
        abort_upload(&mut upload).await;
        return Err(BackupError::Upload(
            "upload cancelled before completion".to_string(),
        ));
    }

    // Once shutdown has started the writer can no longer be aborted; a
    // cancel drops the in-flight completion instead.
    let completed = tokio::select! {
        result = upload.shutdown() => Some(result),
        _ = cancelled(&mut decision) => None,
    };
    match completed {
        Some(Ok(())) => Ok(bytes),
        Some(Err(e)) => Err(BackupError::Upload(e.to_string())),
        None => Err(BackupError::Upload(
            "upload cancelled while completing".to_string(),
        )),
    }
}

async fn cancelled(decision: &mut watch::Receiver<Decision>) {
    let _ = decision.wait_for(|d| *d == Decision::Cancel).await;
}

async fn abort_upload(upload: &mut BufWriter) {
    if let Err(e) = upload.abort().await {
        tracing::warn!(error = %e, "Failed to abort multipart upload");
    }
}

#[async_trait]
impl BackupSink for ObjectStoreSink {
    async fn write_chunk(&mut self, chunk: &str) -> BackupResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| BackupError::Sink("upload sink is closed".to_string()))?;
        if let Err(e) = writer.write_all(chunk.as_bytes()).await {
            return Err(self.broken_conduit(e).await);
        }
        self.bytes += chunk.len() as u64;
        Ok(())
    }

    async fn finish(&mut self) -> BackupResult<u64> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| BackupError::Sink("upload sink is closed".to_string()))?;
        if let Err(e) = writer.shutdown().await {
            return Err(self.broken_conduit(e).await);
        }
        drop(writer);

        // a task that already failed ignores this; joining reports why
        self.decision.send_replace(Decision::Commit);

        let timeout = self.upload_timeout;
        let joined = match self.upload.as_mut() {
            Some(handle) => tokio::time::timeout(timeout, handle).await,
            None => return Err(BackupError::Upload("upload task already joined".to_string())),
        };
        let uploaded = match joined {
            Ok(result) => {
                self.upload = None;
                result.map_err(|e| {
                    BackupError::Upload(format!("upload task failed to run: {e}"))
                })??
            }
            Err(_) => {
                tracing::error!(
                    key = %self.location,
                    timeout_secs = timeout.as_secs_f64(),
                    "Upload timed out"
                );
                self.cancel_late_upload().await;
                return Err(BackupError::timeout("upload", timeout));
            }
        };

        if uploaded != self.bytes {
            return Err(BackupError::Upload(format!(
                "uploaded {uploaded} bytes but {} were written",
                self.bytes
            )));
        }

        tracing::info!(key = %self.location, bytes = uploaded, "Backup uploaded");
        Ok(uploaded)
    }

    async fn abort(&mut self) {
        self.writer = None;
        self.decision.send_replace(Decision::Cancel);
        if self.upload.is_some() {
            let _ = self.join_upload().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::local::LocalFileSystem;
    use object_store::memory::InMemory;
    use object_store::throttle::{ThrottleConfig, ThrottledStore};
    use tempfile::TempDir;

    /// A store rooted at a regular file: every upload fails
    fn broken_store(dir: &TempDir) -> Arc<LocalFileSystem> {
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        Arc::new(LocalFileSystem::new_with_prefix(&blocker).unwrap())
    }

    #[tokio::test]
    async fn uploads_streamed_chunks() {
        let store = Arc::new(InMemory::new());
        let mut sink = ObjectStoreSink::new(store.clone(), "backup-a.sql", Duration::from_secs(5));

        sink.write_chunk("CREATE TABLE t ();\n\n").await.unwrap();
        sink.write_chunk("-- end\n").await.unwrap();
        let bytes = sink.finish().await.unwrap();

        let stored = store
            .get(&Path::from("backup-a.sql"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(bytes, stored.len() as u64);
        assert_eq!(&stored[..], b"CREATE TABLE t ();\n\n-- end\n");
    }

    #[tokio::test]
    async fn payload_larger_than_conduit_is_uploaded_whole() {
        let store = Arc::new(InMemory::new());
        let mut sink = ObjectStoreSink::new(store.clone(), "big.sql", Duration::from_secs(5));

        let line = "INSERT INTO \"t\" (\"v\") VALUES ('xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx');\n";
        let mut expected = String::new();
        for _ in 0..(CONDUIT_CAPACITY / line.len() * 4) {
            sink.write_chunk(line).await.unwrap();
            expected.push_str(line);
        }
        sink.finish().await.unwrap();

        let stored = store
            .get(&Path::from("big.sql"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(stored.len(), expected.len());
        assert_eq!(&stored[..], expected.as_bytes());
    }

    #[tokio::test]
    async fn abort_leaves_no_object() {
        let store = Arc::new(InMemory::new());
        let mut sink = ObjectStoreSink::new(store.clone(), "aborted.sql", Duration::from_secs(5));
        sink.write_chunk("half a backup").await.unwrap();

        sink.abort().await;

        assert!(store.get(&Path::from("aborted.sql")).await.is_err());
        assert!(sink.write_chunk("more").await.is_err());
    }

    #[tokio::test]
    async fn dropped_sink_does_not_commit() {
        let store = Arc::new(InMemory::new());
        let mut sink = ObjectStoreSink::new(store.clone(), "dropped.sql", Duration::from_secs(5));
        sink.write_chunk("half a backup").await.unwrap();
        let handle = sink.upload.take().unwrap();

        drop(sink);

        assert!(handle.await.unwrap().is_err());
        assert!(store.get(&Path::from("dropped.sql")).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_upload_leaves_no_object() {
        let slow = ThrottleConfig {
            wait_put_per_call: Duration::from_millis(500),
            ..ThrottleConfig::default()
        };
        let store = Arc::new(ThrottledStore::new(InMemory::new(), slow));
        let mut sink = ObjectStoreSink::new(store.clone(), "late.sql", Duration::from_millis(50));
        sink.write_chunk("CREATE TABLE t ();\n\n").await.unwrap();

        match sink.finish().await {
            Err(BackupError::Timeout { operation, timeout }) => {
                assert_eq!(operation, "upload");
                assert_eq!(timeout, Duration::from_millis(50));
            }
            other => panic!("expected upload timeout, got {other:?}"),
        }
        sink.abort().await;

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(store.get(&Path::from("late.sql")).await.is_err());
    }

    #[tokio::test]
    async fn failed_completion_reports_store_error() {
        let dir = TempDir::new().unwrap();
        let store = broken_store(&dir);
        let mut sink = ObjectStoreSink::new(store, "failing.sql", Duration::from_secs(5));

        sink.write_chunk("CREATE TABLE t ();\n\n").await.unwrap();

        match sink.finish().await {
            Err(BackupError::Upload(message)) => assert!(message.contains("failing.sql")),
            other => panic!("expected upload error, got {other:?}"),
        }
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn failed_part_upload_breaks_later_writes() {
        let dir = TempDir::new().unwrap();
        let store = broken_store(&dir);
        let mut sink =
            ObjectStoreSink::with_part_size(store, "stream.sql", Duration::from_secs(5), 1024);

        let chunk = "x".repeat(1024);
        let mut failure = None;
        for _ in 0..10_000 {
            if let Err(e) = sink.write_chunk(&chunk).await {
                failure = Some(e);
                break;
            }
        }

        match failure {
            Some(BackupError::Upload(message)) => assert!(message.contains("stream.sql")),
            other => panic!("expected upload error from a write, got {other:?}"),
        }
        assert!(matches!(
            sink.write_chunk("more").await,
            Err(BackupError::Sink(_))
        ));
        sink.abort().await;
    }

    #[test]
    fn builds_path_style_s3_store() {
        let config = ObjectStoreConfig {
            endpoint: "http://localhost:9000".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: "minio".to_string(),
            secret_access_key: "minio123".to_string(),
            bucket: "backups".to_string(),
            force_path_style: true,
            allow_http: true,
        };
        assert!(s3_store(&config).is_ok());

        let missing_bucket = ObjectStoreConfig {
            bucket: String::new(),
            ..config
        };
        assert!(matches!(
            s3_store(&missing_bucket),
            Err(BackupError::Config(_))
        ));
    }
}
