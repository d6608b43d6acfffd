//! Table and column descriptors and statement rendering
//!
//! Columns are always carried in ordinal order. The same ordered slice feeds
//! both the `CREATE TABLE` column list and every `INSERT` value list, so
//! schema and data stay aligned.

use crate::value::{SqlValue, quote_ident};

/// One base table in the backed-up schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Catalog metadata for one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    /// `information_schema.columns.data_type`
    pub data_type: String,
    /// Underlying type name, used to resolve `ARRAY` and `USER-DEFINED`
    pub udt_name: String,
    /// Declared character length, if any
    pub max_length: Option<i32>,
    pub nullable: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            udt_name: data_type.clone(),
            data_type,
            max_length: None,
            nullable: true,
        }
    }

    pub fn with_udt_name(mut self, udt_name: impl Into<String>) -> Self {
        self.udt_name = udt_name.into();
        self
    }

    pub fn with_max_length(mut self, max_length: i32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Declared type as it appears in the `CREATE TABLE` statement
    pub fn type_sql(&self) -> String {
        let base = match self.data_type.as_str() {
            "ARRAY" => format!("{}[]", self.udt_name.trim_start_matches('_')),
            "USER-DEFINED" => quote_ident(&self.udt_name),
            other => other.to_string(),
        };
        match self.max_length {
            Some(len) => format!("{base}({len})"),
            None => base,
        }
    }

    /// Column definition fragment: `"name" type[(len)][ NOT NULL]`
    pub fn definition(&self) -> String {
        let mut def = format!("{} {}", quote_ident(&self.name), self.type_sql());
        if !self.nullable {
            def.push_str(" NOT NULL");
        }
        def
    }

    pub fn kind(&self) -> ColumnKind {
        ColumnKind::classify(&self.data_type)
    }
}

/// How a column's values are fetched and which literal form they take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Boolean,
    Integer,
    Float,
    Numeric,
    TimestampTz,
    Timestamp,
    Date,
    Time,
    /// Anything else: fetched as its text form and quoted
    Text,
}

impl ColumnKind {
    pub fn classify(data_type: &str) -> Self {
        match data_type {
            "boolean" => ColumnKind::Boolean,
            "smallint" | "integer" | "bigint" => ColumnKind::Integer,
            "real" | "double precision" => ColumnKind::Float,
            "numeric" => ColumnKind::Numeric,
            "timestamp with time zone" => ColumnKind::TimestampTz,
            "timestamp without time zone" => ColumnKind::Timestamp,
            "date" => ColumnKind::Date,
            "time without time zone" => ColumnKind::Time,
            _ => ColumnKind::Text,
        }
    }

    /// Select-list expression that yields a value this kind can decode
    pub fn projection(self, column: &str) -> String {
        let ident = quote_ident(column);
        match self {
            ColumnKind::Integer => format!("{ident}::int8"),
            ColumnKind::Float => format!("{ident}::float8"),
            ColumnKind::Numeric | ColumnKind::Text => format!("{ident}::text"),
            ColumnKind::Boolean
            | ColumnKind::TimestampTz
            | ColumnKind::Timestamp
            | ColumnKind::Date
            | ColumnKind::Time => ident,
        }
    }
}

/// One fetched row, values aligned with the table's ordered columns
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    pub values: Vec<SqlValue>,
}

impl Row {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }
}

impl<V: Into<SqlValue>> FromIterator<V> for Row {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

pub fn create_table_statement(table: &TableDescriptor, columns: &[ColumnSpec]) -> String {
    let defs: Vec<String> = columns.iter().map(ColumnSpec::definition).collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        quote_ident(&table.name),
        defs.join(", ")
    )
}

pub fn insert_statement(table: &TableDescriptor, columns: &[ColumnSpec], row: &Row) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
    let values: Vec<String> = row.values.iter().map(SqlValue::render).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote_ident(&table.name),
        names.join(", "),
        values.join(", ")
    )
}

/// Row fetch query: every column, projected per [`ColumnKind`]
pub fn select_statement(schema: &str, table: &TableDescriptor, columns: &[ColumnSpec]) -> String {
    let projection: Vec<String> = columns
        .iter()
        .map(|c| c.kind().projection(&c.name))
        .collect();
    format!(
        "SELECT {} FROM {}.{}",
        projection.join(", "),
        quote_ident(schema),
        quote_ident(&table.name)
    )
}
