//! Output sinks for the serialized backup
//!
//! A sink receives the artifact as an ordered sequence of text chunks and
//! persists it. `finish` makes the artifact durable; `abort` discards it.
//!
//! - **[FileSink]**: local file, renamed into place on `finish`
//! - **[ObjectStoreSink]**: streamed multipart upload (requires `s3` feature)
//! - **[MemorySink]**: collects text in memory, for tests

use async_trait::async_trait;

use crate::error::BackupResult;

mod file;
mod memory;
pub use file::FileSink;
pub use memory::MemorySink;

#[cfg(feature = "s3")]
mod upload;
#[cfg(feature = "s3")]
pub use upload::{ObjectStoreSink, s3_store};

/// Destination of the serialized artifact
#[async_trait]
pub trait BackupSink: Send {
    /// Append one chunk. Fails once the sink is finished or aborted.
    async fn write_chunk(&mut self, chunk: &str) -> BackupResult<()>;

    /// Flush everything and make the artifact durable. Returns bytes persisted.
    async fn finish(&mut self) -> BackupResult<u64>;

    /// Discard whatever was written so far. Never fails.
    async fn abort(&mut self);
}
