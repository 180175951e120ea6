//! The worksheet as rows of raw cells.
//!
//! A [`RawGrid`] is never mutated once read; the pipeline only looks rows up
//! by index, measures them, and copies selected columns out of them.

use crate::data::CellValue;

static EMPTY_CELL: CellValue = CellValue::Empty;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGrid {
    rows: Vec<Vec<CellValue>>,
}

impl RawGrid {
    pub fn new(rows: Vec<Vec<CellValue>>) -> Self {
        Self { rows }
    }

    /// Builds a grid from text rows; empty strings become blank cells.
    pub fn from_text_rows<R, S>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| CellValue::from(cell.as_ref()))
                    .collect()
            })
            .collect();
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row_is_blank(row))
    }

    /// Width of the widest row.
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn row(&self, index: usize) -> &[CellValue] {
        self.rows.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[CellValue]> {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn cell(&self, row: usize, column: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .unwrap_or(&EMPTY_CELL)
    }

    /// Trimmed header texts for `row`, with trailing blank cells removed.
    pub fn header_texts(&self, row: usize) -> Vec<String> {
        let mut headers = self
            .row(row)
            .iter()
            .map(|cell| cell.text().trim().to_string())
            .collect::<Vec<_>>();
        while headers.last().is_some_and(|header| header.is_empty()) {
            headers.pop();
        }
        headers
    }

    /// Copies `columns` out of every row from `start` to the end of the sheet.
    ///
    /// Each returned entry carries the 0-based sheet row it came from. Rows in
    /// which every selected cell is blank are dropped.
    pub fn select_columns(&self, start: usize, columns: &[usize]) -> Vec<(usize, Vec<CellValue>)> {
        (start..self.rows.len())
            .filter_map(|row_idx| {
                let cells = columns
                    .iter()
                    .map(|&col| self.cell(row_idx, col).clone())
                    .collect::<Vec<_>>();
                if cells.iter().all(CellValue::is_blank) {
                    None
                } else {
                    Some((row_idx, cells))
                }
            })
            .collect()
    }
}

pub fn non_blank_count(row: &[CellValue]) -> usize {
    row.iter().filter(|cell| !cell.is_blank()).count()
}

pub fn row_is_blank(row: &[CellValue]) -> bool {
    row.iter().all(CellValue::is_blank)
}
