use async_trait::async_trait;

use super::Catalog;
use crate::error::{BackupError, BackupResult};
use crate::schema::{ColumnSpec, Row, TableDescriptor};

struct MemoryTable {
    descriptor: TableDescriptor,
    columns: Vec<ColumnSpec>,
    rows: Vec<Row>,
    fail_reads: bool,
}

/// In-memory catalog. Tables are listed in insertion order.
pub struct MemoryCatalog {
    tables: Vec<MemoryTable>,
    batch_size: usize,
    cursor: Option<(usize, usize)>,
    fail_close: bool,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self {
            tables: Vec::new(),
            batch_size: 1000,
            cursor: None,
            fail_close: false,
        }
    }

    /// Rows returned per `next_rows` call
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_table(mut self, name: &str, columns: Vec<ColumnSpec>, rows: Vec<Row>) -> Self {
        self.tables.push(MemoryTable {
            descriptor: TableDescriptor::new(name),
            columns,
            rows,
            fail_reads: false,
        });
        self
    }

    /// A table whose row reads fail, to exercise error paths
    pub fn with_unreadable_table(mut self, name: &str, columns: Vec<ColumnSpec>) -> Self {
        self.tables.push(MemoryTable {
            descriptor: TableDescriptor::new(name),
            columns,
            rows: Vec::new(),
            fail_reads: true,
        });
        self
    }

    /// Make `close_rows` fail after releasing the cursor
    pub fn with_failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    fn position(&self, table: &TableDescriptor) -> BackupResult<usize> {
        self.tables
            .iter()
            .position(|t| t.descriptor == *table)
            .ok_or_else(|| {
                BackupError::Catalog(format!("relation \"{}\" does not exist", table.name))
            })
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn list_tables(&mut self) -> BackupResult<Vec<TableDescriptor>> {
        Ok(self.tables.iter().map(|t| t.descriptor.clone()).collect())
    }

    async fn columns(&mut self, table: &TableDescriptor) -> BackupResult<Vec<ColumnSpec>> {
        let idx = self.position(table)?;
        Ok(self.tables[idx].columns.clone())
    }

    async fn open_rows(
        &mut self,
        table: &TableDescriptor,
        _columns: &[ColumnSpec],
    ) -> BackupResult<()> {
        if self.cursor.is_some() {
            return Err(BackupError::Catalog("a row cursor is already open".to_string()));
        }
        let idx = self.position(table)?;
        if self.tables[idx].fail_reads {
            return Err(BackupError::Catalog(format!(
                "permission denied for table {}",
                table.name
            )));
        }
        self.cursor = Some((idx, 0));
        Ok(())
    }

    async fn next_rows(&mut self) -> BackupResult<Vec<Row>> {
        let (idx, offset) = self
            .cursor
            .ok_or_else(|| BackupError::Catalog("no row cursor is open".to_string()))?;
        let rows = &self.tables[idx].rows;
        let end = (offset + self.batch_size).min(rows.len());
        let batch = rows[offset..end].to_vec();
        self.cursor = Some((idx, end));
        Ok(batch)
    }

    async fn close_rows(&mut self) -> BackupResult<()> {
        self.cursor = None;
        if self.fail_close {
            return Err(BackupError::Catalog(
                "connection lost while closing cursor".to_string(),
            ));
        }
        Ok(())
    }
}
