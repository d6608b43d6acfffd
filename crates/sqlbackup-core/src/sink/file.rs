use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};

use super::BackupSink;
use crate::error::{BackupError, BackupResult};

/// Local file sink.
///
/// Writes go to `<artifact>.partial` in the target directory; `finish`
/// flushes, syncs and renames it to `<artifact>`. A run that dies midway
/// leaves only the `.partial` file, never a truncated artifact under the
/// final name.
pub struct FileSink {
    final_path: PathBuf,
    partial_path: PathBuf,
    writer: Option<BufWriter<File>>,
    bytes: u64,
}

impl FileSink {
    pub async fn create(dir: impl AsRef<Path>, artifact: &str) -> BackupResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await.map_err(|e| {
            BackupError::Sink(format!("cannot create {}: {e}", dir.display()))
        })?;

        let final_path = dir.join(artifact);
        let partial_path = dir.join(format!("{artifact}.partial"));
        let file = File::create(&partial_path).await.map_err(|e| {
            BackupError::Sink(format!("cannot create {}: {e}", partial_path.display()))
        })?;

        tracing::debug!(path = ?partial_path, "Opened backup file");
        Ok(Self {
            final_path,
            partial_path,
            writer: Some(BufWriter::new(file)),
            bytes: 0,
        })
    }

    /// Path the artifact has once `finish` succeeds
    pub fn path(&self) -> &Path {
        &self.final_path
    }
}

#[async_trait]
impl BackupSink for FileSink {
    async fn write_chunk(&mut self, chunk: &str) -> BackupResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| BackupError::Sink("file sink is closed".to_string()))?;
        writer.write_all(chunk.as_bytes()).await?;
        self.bytes += chunk.len() as u64;
        Ok(())
    }

    async fn finish(&mut self) -> BackupResult<u64> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| BackupError::Sink("file sink is closed".to_string()))?;
        writer.flush().await?;
        writer.get_mut().sync_all().await?;
        drop(writer);

        fs::rename(&self.partial_path, &self.final_path).await?;
        tracing::info!(path = ?self.final_path, bytes = self.bytes, "Backup file written");
        Ok(self.bytes)
    }

    async fn abort(&mut self) {
        if self.writer.take().is_some() {
            if let Err(e) = fs::remove_file(&self.partial_path).await {
                tracing::warn!(
                    path = ?self.partial_path,
                    error = %e,
                    "Failed to remove partial backup file"
                );
            }
        }
    }
}
