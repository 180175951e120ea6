use std::path::PathBuf;

use thiserror::Error;

use crate::storage::StorageError;

/// Conditions that abort an ingest before any row is loaded.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Sheet '{0}' was not found in the workbook")]
    SheetNotFound(String),
    #[error("Sheet '{0}' is empty or has no data")]
    EmptySheet(String),
    #[error("Failed to read {path:?}: {message}")]
    Read { path: PathBuf, message: String },
    #[error(
        "Could not locate a header row. Make sure the sheet has a clear header row within the first {scanned} rows"
    )]
    NoHeaderRow { scanned: usize },
    #[error(
        "Spreadsheet headers do not match the table columns. Unmatched table columns: {}. Spreadsheet headers: [{}]. Spaces are converted to underscores automatically and matching is case-insensitive.",
        .unmatched.join(", "),
        .excel_headers.join(", ")
    )]
    UnreconciledColumns {
        unmatched: Vec<String>,
        excel_headers: Vec<String>,
    },
    #[error("Header row {0} has no usable column to locate data rows")]
    NoPrimaryColumn(usize),
    #[error("No data found below the header in column '{primary}'")]
    NoDataRows { primary: String },
    #[error("No valid rows found to load")]
    NoValidRows,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl IngestError {
    /// Structural failures describe the shape of the sheet, not the storage engine.
    pub fn is_structural(&self) -> bool {
        !matches!(self, IngestError::Storage(_) | IngestError::Read { .. })
    }
}
