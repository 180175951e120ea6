//! Row validation and the batch error-rate gate.

use std::fmt;

use log::{info, warn};
use serde::Serialize;

use crate::{
    coerce::coerce,
    data::{CellValue, FieldValue},
    schema::ColumnSchema,
};

static MISSING_CELL: CellValue = CellValue::Empty;

/// One cell that failed coercion. `row` is the 1-based sheet row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellError {
    pub row: usize,
    pub column: String,
    pub message: String,
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row {}, Column '{}': {}", self.row, self.column, self.message)
    }
}

/// A coerced data row. Failed cells hold [`FieldValue::Invalid`] so columns stay aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    /// 1-based sheet row the record was read from.
    pub source_row: usize,
    pub values: Vec<(String, FieldValue)>,
}

impl ValidatedRecord {
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn has_errors(&self) -> bool {
        self.values.iter().any(|(_, value)| value.is_invalid())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub records: Vec<ValidatedRecord>,
    pub errors: Vec<CellError>,
    /// Rows times mapped columns.
    pub cell_count: usize,
}

impl ValidationReport {
    pub fn error_rate(&self) -> f64 {
        error_rate(self.errors.len(), self.cell_count)
    }

    pub fn gate(&self, max_error_rate: f64) -> GateDecision {
        gate(self.errors.len(), self.cell_count, max_error_rate)
    }

    /// Records without any failed cell.
    pub fn clean_records(&self) -> Vec<ValidatedRecord> {
        self.records
            .iter()
            .filter(|record| !record.has_errors())
            .cloned()
            .collect()
    }

    pub fn rejected_rows(&self) -> usize {
        self.records.iter().filter(|record| record.has_errors()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    Clean,
    /// Some cells failed but the batch may load; the errors are reported as warnings.
    Accepted { error_rate: f64 },
    Rejected { error_rate: f64 },
}

impl GateDecision {
    pub fn allows_load(&self) -> bool {
        !matches!(self, GateDecision::Rejected { .. })
    }

    pub fn error_rate(&self) -> f64 {
        match self {
            GateDecision::Clean => 0.0,
            GateDecision::Accepted { error_rate } | GateDecision::Rejected { error_rate } => {
                *error_rate
            }
        }
    }
}

pub fn error_rate(errors: usize, cells: usize) -> f64 {
    if cells == 0 {
        0.0
    } else {
        errors as f64 / cells as f64
    }
}

/// A rate exactly at `max_error_rate` still loads.
pub fn gate(errors: usize, cells: usize, max_error_rate: f64) -> GateDecision {
    if errors == 0 {
        return GateDecision::Clean;
    }
    let error_rate = error_rate(errors, cells);
    if error_rate > max_error_rate {
        warn!(
            "Error rate {:.2}% exceeds {:.2}%; rejecting batch",
            error_rate * 100.0,
            max_error_rate * 100.0
        );
        GateDecision::Rejected { error_rate }
    } else {
        info!(
            "Error rate {:.2}% within {:.2}%; loading with warnings",
            error_rate * 100.0,
            max_error_rate * 100.0
        );
        GateDecision::Accepted { error_rate }
    }
}

/// Coerces every cell of every row. `rows` carry their 0-based sheet index and
/// one cell per entry of `columns`, in the same order.
pub fn validate_rows(rows: &[(usize, Vec<CellValue>)], columns: &[&ColumnSchema]) -> ValidationReport {
    let mut report = ValidationReport {
        records: Vec::with_capacity(rows.len()),
        errors: Vec::new(),
        cell_count: rows.len() * columns.len(),
    };

    for (row_idx, cells) in rows {
        let source_row = row_idx + 1;
        let values = columns
            .iter()
            .enumerate()
            .map(|(col_idx, column)| {
                let raw = cells.get(col_idx).unwrap_or(&MISSING_CELL);
                let value = coerce(raw, column).unwrap_or_else(|message| {
                    report.errors.push(CellError {
                        row: source_row,
                        column: column.name.clone(),
                        message,
                    });
                    FieldValue::Invalid
                });
                (column.name.clone(), value)
            })
            .collect();
        report.records.push(ValidatedRecord { source_row, values });
    }

    info!(
        "Validated {} row(s) x {} column(s): {} cell error(s)",
        rows.len(),
        columns.len(),
        report.errors.len()
    );
    report
}
