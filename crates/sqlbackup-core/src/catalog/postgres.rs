//! PostgreSQL catalog reader
//!
//! The whole run happens inside one `REPEATABLE READ READ ONLY` transaction,
//! so every table is read from the same snapshot. Rows are streamed through a
//! server-side cursor, `batch_size` rows per round trip.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tokio::task::JoinHandle;
use tokio_postgres::types::{Date, Timestamp};
use tokio_postgres::{Client, Error as PgError, NoTls};

use super::Catalog;
use crate::config::PostgresConfig;
use crate::error::{BackupError, BackupResult};
use crate::schema::{ColumnKind, ColumnSpec, Row, TableDescriptor, select_statement};
use crate::timeout::{TimeoutConfig, with_timeout};
use crate::value::{SqlValue, quote_ident};

const CURSOR_NAME: &str = "sqlbackup_rows";

const LIST_TABLES: &str = r#"
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = $1::text
      AND table_type = 'BASE TABLE'
    ORDER BY table_name
"#;

const LIST_COLUMNS: &str = r#"
    SELECT column_name::text,
           data_type::text,
           udt_name::text,
           character_maximum_length::int4,
           is_nullable::text
    FROM information_schema.columns
    WHERE table_schema = $1::text
      AND table_name = $2::text
    ORDER BY ordinal_position
"#;

struct OpenCursor {
    table: String,
    columns: Vec<ColumnSpec>,
}

/// Catalog backed by a single PostgreSQL connection
pub struct PgCatalog {
    client: Client,
    driver: JoinHandle<()>,
    schema: String,
    batch_size: u32,
    timeouts: TimeoutConfig,
    cursor: Option<OpenCursor>,
}

impl PgCatalog {
    /// Connect and open the snapshot transaction
    pub async fn connect(config: &PostgresConfig, timeouts: TimeoutConfig) -> BackupResult<Self> {
        config.validate()?;

        let pg_config = config.build_pg_config(timeouts.connect_timeout);
        let (client, connection) = with_timeout(timeouts.connect_timeout, "connect", async {
            pg_config
                .connect(NoTls)
                .await
                .map_err(|e| BackupError::Connection(sanitize_error(&e)))
        })
        .await?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "PostgreSQL connection error");
            }
        });

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Connected to PostgreSQL"
        );

        let catalog = Self {
            client,
            driver,
            schema: config.schema.clone(),
            batch_size: config.batch_size,
            timeouts,
            cursor: None,
        };
        catalog
            .execute(
                "begin_snapshot",
                "BEGIN ISOLATION LEVEL REPEATABLE READ READ ONLY",
            )
            .await?;
        Ok(catalog)
    }

    /// End the snapshot transaction and close the connection.
    ///
    /// Never fails: cleanup problems are logged, not returned.
    pub async fn close(self) {
        if let Err(e) = self.execute("end_snapshot", "ROLLBACK").await {
            tracing::warn!(error = %e, "Failed to end snapshot transaction");
        }
        drop(self.client);
        if let Err(e) = self.driver.await {
            tracing::warn!(error = %e, "PostgreSQL connection task did not shut down cleanly");
        }
        tracing::debug!("PostgreSQL connection closed");
    }

    async fn execute(&self, operation: &str, sql: &str) -> BackupResult<()> {
        with_timeout(self.timeouts.statement_timeout, operation, async {
            self.client.batch_execute(sql).await.map_err(BackupError::from)
        })
        .await
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn list_tables(&mut self) -> BackupResult<Vec<TableDescriptor>> {
        let rows = with_timeout(self.timeouts.statement_timeout, "list_tables", async {
            self.client
                .query(LIST_TABLES, &[&self.schema])
                .await
                .map_err(BackupError::from)
        })
        .await?;

        rows.iter()
            .map(|row| {
                row.try_get::<_, String>(0)
                    .map(TableDescriptor::new)
                    .map_err(BackupError::from)
            })
            .collect()
    }

    async fn columns(&mut self, table: &TableDescriptor) -> BackupResult<Vec<ColumnSpec>> {
        let rows = with_timeout(self.timeouts.statement_timeout, "list_columns", async {
            self.client
                .query(LIST_COLUMNS, &[&self.schema, &table.name])
                .await
                .map_err(BackupError::from)
        })
        .await?;

        rows.iter()
            .map(|row| -> BackupResult<ColumnSpec> {
                let is_nullable: String = row.try_get(4)?;
                Ok(ColumnSpec {
                    name: row.try_get(0)?,
                    data_type: row.try_get(1)?,
                    udt_name: row.try_get(2)?,
                    max_length: row.try_get(3)?,
                    nullable: is_nullable != "NO",
                })
            })
            .collect()
    }

    async fn open_rows(
        &mut self,
        table: &TableDescriptor,
        columns: &[ColumnSpec],
    ) -> BackupResult<()> {
        if self.cursor.is_some() {
            return Err(BackupError::Catalog("a row cursor is already open".to_string()));
        }

        let select = select_statement(&self.schema, table, columns);
        let declare = format!(
            "DECLARE {} NO SCROLL CURSOR FOR {select}",
            quote_ident(CURSOR_NAME)
        );
        tracing::debug!(table = %table.name, query = %select, "Opening row cursor");
        self.execute("declare_cursor", &declare).await?;

        self.cursor = Some(OpenCursor {
            table: table.name.clone(),
            columns: columns.to_vec(),
        });
        Ok(())
    }

    async fn next_rows(&mut self) -> BackupResult<Vec<Row>> {
        let cursor = self
            .cursor
            .as_ref()
            .ok_or_else(|| BackupError::Catalog("no row cursor is open".to_string()))?;

        let fetch = format!(
            "FETCH FORWARD {} FROM {}",
            self.batch_size,
            quote_ident(CURSOR_NAME)
        );
        let rows = with_timeout(self.timeouts.statement_timeout, "fetch_rows", async {
            self.client.query(&fetch, &[]).await.map_err(BackupError::from)
        })
        .await?;

        rows.iter()
            .map(|row| decode_row(&cursor.table, &cursor.columns, row))
            .collect()
    }

    async fn close_rows(&mut self) -> BackupResult<()> {
        if self.cursor.take().is_some() {
            let close = format!("CLOSE {}", quote_ident(CURSOR_NAME));
            self.execute("close_cursor", &close).await?;
        }
        Ok(())
    }
}

fn decode_row(
    table: &str,
    columns: &[ColumnSpec],
    row: &tokio_postgres::Row,
) -> BackupResult<Row> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            decode_value(row, idx, column.kind()).map_err(|e| BackupError::Decode {
                table: table.to_string(),
                column: column.name.clone(),
                reason: e.to_string(),
            })
        })
        .collect::<BackupResult<Vec<_>>>()
        .map(Row::new)
}

fn decode_value(
    row: &tokio_postgres::Row,
    idx: usize,
    kind: ColumnKind,
) -> Result<SqlValue, PgError> {
    let value = match kind {
        ColumnKind::Boolean => row.try_get::<_, Option<bool>>(idx)?.into(),
        ColumnKind::Integer => row.try_get::<_, Option<i64>>(idx)?.into(),
        ColumnKind::Float => row.try_get::<_, Option<f64>>(idx)?.into(),
        ColumnKind::Numeric => row
            .try_get::<_, Option<String>>(idx)?
            .map_or(SqlValue::Null, SqlValue::from_numeric_text),
        ColumnKind::TimestampTz => timestamp_value(
            row.try_get::<_, Option<Timestamp<DateTime<Utc>>>>(idx)?,
            SqlValue::from_timestamptz,
        ),
        ColumnKind::Timestamp => timestamp_value(
            row.try_get::<_, Option<Timestamp<NaiveDateTime>>>(idx)?,
            SqlValue::from_timestamp,
        ),
        ColumnKind::Date => match row.try_get::<_, Option<Date<NaiveDate>>>(idx)? {
            None => SqlValue::Null,
            Some(Date::PosInfinity) => SqlValue::infinity(),
            Some(Date::NegInfinity) => SqlValue::neg_infinity(),
            Some(Date::Value(date)) => SqlValue::from_date(date),
        },
        ColumnKind::Time => row
            .try_get::<_, Option<NaiveTime>>(idx)?
            .map_or(SqlValue::Null, SqlValue::from_time),
        ColumnKind::Text => row.try_get::<_, Option<String>>(idx)?.into(),
    };
    Ok(value)
}

fn timestamp_value<T>(
    value: Option<Timestamp<T>>,
    finite: impl FnOnce(T) -> SqlValue,
) -> SqlValue {
    match value {
        None => SqlValue::Null,
        Some(Timestamp::PosInfinity) => SqlValue::infinity(),
        Some(Timestamp::NegInfinity) => SqlValue::neg_infinity(),
        Some(Timestamp::Value(value)) => finite(value),
    }
}

/// Connection errors without server-side detail that could leak credentials
fn sanitize_error(error: &PgError) -> String {
    if let Some(db) = error.as_db_error() {
        format!("{} ({})", db.message(), db.code().code())
    } else if error.to_string().contains("timeout") {
        "Connection timed out".to_string()
    } else if error.to_string().contains("authentication") {
        "Authentication failed".to_string()
    } else {
        format!("Could not reach server: {error}")
    }
}
