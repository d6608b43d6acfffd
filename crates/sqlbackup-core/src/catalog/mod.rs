//! Catalog reading and row fetching
//!
//! [`Catalog`] is the seam between the backup runner and a database. Rows are
//! pulled in batches through a cursor so a large table never has to fit in
//! memory at once.
//!
//! - **[MemoryCatalog]**: in-memory tables, for tests and dry runs
//! - **[PgCatalog]**: PostgreSQL via `tokio-postgres` (requires `postgres` feature)

use async_trait::async_trait;

use crate::error::BackupResult;
use crate::schema::{ColumnSpec, Row, TableDescriptor};

mod memory;
pub use memory::MemoryCatalog;

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "postgres")]
pub use postgres::PgCatalog;

/// Read-only view of a database's tables, columns and rows
#[async_trait]
pub trait Catalog: Send {
    /// Base tables of the backed-up schema
    async fn list_tables(&mut self) -> BackupResult<Vec<TableDescriptor>>;

    /// Columns of `table` in ordinal order
    async fn columns(&mut self, table: &TableDescriptor) -> BackupResult<Vec<ColumnSpec>>;

    /// Start reading all rows of `table`. Only one row cursor is open at a time.
    async fn open_rows(
        &mut self,
        table: &TableDescriptor,
        columns: &[ColumnSpec],
    ) -> BackupResult<()>;

    /// Next batch of rows from the open cursor; empty once exhausted
    async fn next_rows(&mut self) -> BackupResult<Vec<Row>>;

    /// Release the open cursor
    async fn close_rows(&mut self) -> BackupResult<()>;
}
