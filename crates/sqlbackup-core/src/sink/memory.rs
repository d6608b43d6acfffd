use async_trait::async_trait;

use super::BackupSink;
use crate::error::{BackupError, BackupResult};

/// Sink that keeps the artifact in a `String`
#[derive(Debug, Default)]
pub struct MemorySink {
    contents: String,
    finished: bool,
    aborted: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

#[async_trait]
impl BackupSink for MemorySink {
    async fn write_chunk(&mut self, chunk: &str) -> BackupResult<()> {
        if self.finished || self.aborted {
            return Err(BackupError::Sink("sink is closed".to_string()));
        }
        self.contents.push_str(chunk);
        Ok(())
    }

    async fn finish(&mut self) -> BackupResult<u64> {
        if self.finished || self.aborted {
            return Err(BackupError::Sink("sink is closed".to_string()));
        }
        self.finished = true;
        Ok(self.contents.len() as u64)
    }

    async fn abort(&mut self) {
        self.aborted = true;
        self.contents.clear();
    }
}
