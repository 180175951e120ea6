//! Finding the first genuine data row below the header.

use log::{debug, info, warn};

use crate::{
    data::{CellValue, normalize_text},
    error::IngestError,
    grid::{RawGrid, non_blank_count},
};

/// Primary-column values that mean "nothing here" even though the cell is not empty.
const PLACEHOLDER_TOKENS: &[&str] = &["nan", "none", "null"];

/// Index of the header-row column that holds the primary header.
///
/// Tries an exact normalized match, then containment in either direction, then
/// the first non-blank header cell.
pub fn primary_column(grid: &RawGrid, header_row: usize, primary: &str) -> Option<usize> {
    let needle = normalize_text(primary);
    let header = grid.row(header_row);
    let normalized = header.iter().map(CellValue::normalized).collect::<Vec<_>>();

    if !needle.is_empty() {
        if let Some(idx) = normalized.iter().position(|text| *text == needle) {
            return Some(idx);
        }
        if let Some(idx) = normalized
            .iter()
            .position(|text| !text.is_empty() && (text.contains(&needle) || needle.contains(text.as_str())))
        {
            return Some(idx);
        }
    }

    let fallback = normalized.iter().position(|text| !text.is_empty());
    if let Some(idx) = fallback {
        warn!(
            "Primary header '{}' not found in row {}; using column '{}' instead",
            primary,
            header_row + 1,
            header[idx].text().trim()
        );
    }
    fallback
}

fn holds_data(cell: &CellValue) -> bool {
    if cell.is_blank() {
        return false;
    }
    !PLACEHOLDER_TOKENS.contains(&cell.normalized().as_str())
}

/// Returns the 0-based row where data begins.
pub fn locate_data_start(
    grid: &RawGrid,
    header_row: usize,
    primary: &str,
) -> Result<usize, IngestError> {
    let column = primary_column(grid, header_row, primary)
        .ok_or(IngestError::NoPrimaryColumn(header_row + 1))?;
    debug!("Primary column index {column} for header '{primary}'");

    let start = (header_row + 1..grid.len())
        .find(|&idx| holds_data(grid.cell(idx, column)) && non_blank_count(grid.row(idx)) >= 2)
        .ok_or_else(|| IngestError::NoDataRows {
            primary: primary.to_string(),
        })?;
    info!("Data starts at row {}", start + 1);
    Ok(start)
}
