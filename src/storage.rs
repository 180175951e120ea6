//! Storage collaborator seams.
//!
//! The pipeline reads the target schema through [`SchemaIntrospector`] and
//! hands validated records to a [`BulkLoader`]. Neither trait knows about SQL
//! dialects; [`crate::sqlite::SqliteStore`] is the bundled implementation.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::{
    schema::{ColumnSchema, is_system_column},
    validate::ValidatedRecord,
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Table '{0}' not found or has no columns")]
    TableNotFound(String),
    #[error("'{0}' is not a valid table or column name")]
    InvalidIdentifier(String),
    #[error("Column '{column}' declares an unsupported type: {message}")]
    Declaration { column: String, message: String },
    #[error("Record {record} holds an invalid value for column '{column}'")]
    InvalidRecord { record: usize, column: String },
    #[error("Record {record} (sheet row {row}) could not be inserted: {source}")]
    RowFailed {
        record: usize,
        row: usize,
        #[source]
        source: rusqlite::Error,
    },
}

pub type Result<T> = std::result::Result<T, StorageError>;

pub trait SchemaIntrospector {
    /// Columns in declaration order. Fails with [`StorageError::TableNotFound`]
    /// when the table has no columns.
    fn columns(&self, table: &str, exclude_system: bool) -> Result<Vec<ColumnSchema>>;

    /// Row counts for the most recent `limit` periods, newest first.
    fn period_counts(&self, table: &str, limit: usize) -> Result<Vec<PeriodCount>>;
}

pub trait BulkLoader {
    /// Loads every record or none of them. With `replace_existing`, rows
    /// already tagged with `period` are removed in the same unit of work.
    fn load(
        &self,
        records: &[ValidatedRecord],
        table: &str,
        period: NaiveDate,
        replace_existing: bool,
    ) -> Result<LoadSummary>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSummary {
    pub inserted_count: usize,
    /// Rows the loader chose not to write. Always zero for all-or-nothing
    /// loaders such as the SQLite store.
    pub skipped_count: usize,
    /// Rows removed for the period before inserting.
    pub replaced_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodCount {
    pub period: NaiveDate,
    pub rows: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnPreview {
    #[serde(flatten)]
    pub column: ColumnSchema,
    /// Filled in by the loader rather than the spreadsheet.
    pub is_automatic: bool,
    pub required_in_excel: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePreview {
    pub table: String,
    pub columns: Vec<ColumnPreview>,
    pub total_columns: usize,
    pub excel_required_columns: usize,
    pub recent_periods: Vec<PeriodCount>,
}

/// Every column of `table` flagged by where its value comes from, plus recent period counts.
pub fn preview_columns(
    introspector: &dyn SchemaIntrospector,
    table: &str,
    period_limit: usize,
) -> Result<TablePreview> {
    let columns = introspector
        .columns(table, false)?
        .into_iter()
        .map(|column| {
            let is_automatic = is_system_column(&column.name);
            ColumnPreview {
                column,
                is_automatic,
                required_in_excel: !is_automatic,
            }
        })
        .collect::<Vec<_>>();
    let excel_required_columns = columns.iter().filter(|c| c.required_in_excel).count();

    Ok(TablePreview {
        table: table.to_string(),
        total_columns: columns.len(),
        excel_required_columns,
        columns,
        recent_periods: introspector.period_counts(table, period_limit)?,
    })
}
