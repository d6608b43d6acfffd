//! # sqlbackup core
//!
//! Logical backups of a PostgreSQL schema as plain SQL: one
//! `CREATE TABLE IF NOT EXISTS` statement per base table followed by one
//! `INSERT` per row, written to a local file or streamed to an object store.
//!
//! ## Pipeline
//!
//! 1. A [`Catalog`] lists base tables and their columns in ordinal order.
//! 2. [`run_backup`] renders each table's schema statement and pulls rows in
//!    batches, rendering each value through [`SqlValue`].
//! 3. A [`BackupSink`] persists the text: [`FileSink`] or, with the `s3`
//!    feature, [`ObjectStoreSink`].
//!
//! ## Feature Flags
//!
//! - `postgres`: [`PgCatalog`] over `tokio-postgres` (default)
//! - `s3`: [`ObjectStoreSink`] and [`s3_store`] over `object_store` (default)
//!
//! ## Example
//!
//! ```rust
//! use sqlbackup_core::{ColumnSpec, MemoryCatalog, MemorySink, Row, SqlValue, run_backup};
//!
//! # tokio_test::block_on(async {
//! let mut catalog = MemoryCatalog::new().with_table(
//!     "users",
//!     vec![
//!         ColumnSpec::new("id", "int").not_null(),
//!         ColumnSpec::new("name", "varchar").with_max_length(20),
//!     ],
//!     vec![Row::new(vec![SqlValue::from_i64(1), SqlValue::text("O'Brien")])],
//! );
//! let mut sink = MemorySink::new();
//!
//! run_backup(&mut catalog, &mut sink, "backup.sql").await.unwrap();
//! assert!(sink.contents().contains("VALUES (1, 'O''Brien');"));
//! # });
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod naming;
pub mod runner;
pub mod schema;
pub mod sink;
pub mod timeout;
pub mod value;

pub use catalog::{Catalog, MemoryCatalog};
pub use config::{ObjectStoreConfig, PostgresConfig, SinkTarget};
pub use error::{BackupError, BackupFailure, BackupPhase, BackupResult};
pub use naming::artifact_name;
pub use runner::{BackupSummary, run_backup};
pub use schema::{ColumnKind, ColumnSpec, Row, TableDescriptor};
pub use sink::{BackupSink, FileSink, MemorySink};
pub use timeout::TimeoutConfig;
pub use value::SqlValue;

#[cfg(feature = "postgres")]
pub use catalog::PgCatalog;
#[cfg(feature = "s3")]
pub use sink::{ObjectStoreSink, s3_store};
