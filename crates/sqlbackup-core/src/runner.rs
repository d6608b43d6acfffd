//! Backup pipeline
//!
//! `ListingTables -> (ProcessingTable)* -> Finalizing -> Done`, with `Failed`
//! reachable from every step. There are no retries: the first error aborts
//! the sink and is returned with the progress made so far.

use crate::catalog::Catalog;
use crate::error::{BackupError, BackupFailure, BackupPhase, BackupResult};
use crate::schema::{TableDescriptor, create_table_statement, insert_statement};
use crate::sink::BackupSink;

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSummary {
    pub artifact: String,
    /// Tables written, skipped ones excluded
    pub tables: usize,
    pub rows: u64,
    pub bytes: u64,
    /// Tables with no columns; nothing is emitted for them
    pub skipped_tables: Vec<String>,
}

/// Serialize every table from `catalog` into `sink`.
///
/// On failure the sink is aborted before returning.
pub async fn run_backup<C, S>(
    catalog: &mut C,
    sink: &mut S,
    artifact: &str,
) -> Result<BackupSummary, BackupFailure>
where
    C: Catalog + ?Sized,
    S: BackupSink + ?Sized,
{
    let mut summary = BackupSummary {
        artifact: artifact.to_string(),
        tables: 0,
        rows: 0,
        bytes: 0,
        skipped_tables: Vec::new(),
    };

    tracing::info!(phase = %BackupPhase::ListingTables, "Starting database backup");
    let tables = match catalog.list_tables().await {
        Ok(tables) => tables,
        Err(e) => {
            sink.abort().await;
            return Err(BackupFailure::at(BackupPhase::ListingTables, e));
        }
    };
    let total = tables.len();
    tracing::info!(tables = total, "Found tables");

    for (completed, table) in tables.iter().enumerate() {
        tracing::info!(
            phase = %BackupPhase::ProcessingTable,
            table = %table.name,
            "Processing table"
        );
        match backup_table(catalog, sink, table).await {
            Ok(Some(rows)) => {
                summary.tables += 1;
                summary.rows += rows;
                tracing::debug!(table = %table.name, rows, "Table done");
            }
            Ok(None) => {
                tracing::warn!(table = %table.name, "Table has no columns, skipping");
                summary.skipped_tables.push(table.name.clone());
            }
            Err(e) => {
                // leave the database connection reusable for the caller's cleanup
                if let Err(close_error) = catalog.close_rows().await {
                    tracing::debug!(
                        table = %table.name,
                        error = %close_error,
                        "Failed to close row cursor after error"
                    );
                }
                sink.abort().await;
                return Err(BackupFailure {
                    phase: BackupPhase::ProcessingTable,
                    tables_completed: completed,
                    tables_total: total,
                    source: e,
                });
            }
        }
    }

    tracing::info!(phase = %BackupPhase::Finalizing, "Finalizing backup");
    summary.bytes = match sink.finish().await {
        Ok(bytes) => bytes,
        Err(e) => {
            sink.abort().await;
            return Err(BackupFailure {
                phase: BackupPhase::Finalizing,
                tables_completed: total,
                tables_total: total,
                source: e,
            });
        }
    };

    tracing::info!(
        phase = %BackupPhase::Done,
        artifact = %summary.artifact,
        tables = summary.tables,
        rows = summary.rows,
        bytes = summary.bytes,
        "Backup completed successfully"
    );
    Ok(summary)
}

/// Emit one table's schema statement followed by its inserts.
/// Returns `None` for a table without columns.
async fn backup_table<C, S>(
    catalog: &mut C,
    sink: &mut S,
    table: &TableDescriptor,
) -> BackupResult<Option<u64>>
where
    C: Catalog + ?Sized,
    S: BackupSink + ?Sized,
{
    let columns = catalog.columns(table).await?;
    if columns.is_empty() {
        return Ok(None);
    }

    let mut create = create_table_statement(table, &columns);
    create.push_str("\n\n");
    sink.write_chunk(&create).await?;

    catalog.open_rows(table, &columns).await?;
    let mut rows = 0u64;
    loop {
        let batch = catalog.next_rows().await?;
        if batch.is_empty() {
            break;
        }

        let mut chunk = String::new();
        for row in &batch {
            if row.values.len() != columns.len() {
                return Err(BackupError::Decode {
                    table: table.name.clone(),
                    column: String::new(),
                    reason: format!(
                        "row has {} values for {} columns",
                        row.values.len(),
                        columns.len()
                    ),
                });
            }
            chunk.push_str(&insert_statement(table, &columns, row));
            chunk.push('\n');
        }
        sink.write_chunk(&chunk).await?;
        rows += batch.len() as u64;
    }
    catalog.close_rows().await?;

    if rows > 0 {
        sink.write_chunk("\n").await?;
    }
    Ok(Some(rows))
}
