//! Header row detection.
//!
//! Exports from upstream systems put their header anywhere in the first few
//! rows, often below a title block or a blank spacer row. [`locate`] finds it
//! in three passes:
//!
//! 1. **Hint** – when the caller names the primary header, the first row in the
//!    scan window with a cell containing (or contained by) that text wins,
//!    provided the row itself looks like a header.
//! 2. **Scoring** – otherwise every row in the window is scored on keyword
//!    hits, synthetic `column_<n>` names, column count and position; the
//!    highest score wins, even a score of zero, and the earliest row wins
//!    ties.
//! 3. **Fallback** – reached only when no row in the scoring window looks
//!    like a header: the first row in the fallback window with two or more
//!    non-blank cells that are not all numeric.

use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    config::{HeaderScoring, IngestConfig},
    data::{CellValue, normalize_text},
    error::IngestError,
    grid::{RawGrid, non_blank_count},
};

/// Generated header names such as `column_3`.
fn is_synthetic_header(normalized: &str) -> bool {
    normalized
        .strip_prefix("column_")
        .is_some_and(|suffix| !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Hint,
    Scored { score: u32 },
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderLocation {
    /// 0-based sheet row.
    pub row: usize,
    pub primary_header: String,
    pub method: DetectionMethod,
}

/// A row can only be a header if it has at least two labels and is not pure numbers.
pub fn looks_like_header(row: &[CellValue]) -> bool {
    let non_blank = row.iter().filter(|cell| !cell.is_blank()).collect::<Vec<_>>();
    if non_blank.len() < 2 {
        return false;
    }
    !non_blank.iter().all(|cell| cell.is_numeric())
}

pub fn locate(
    grid: &RawGrid,
    hint: Option<&str>,
    config: &IngestConfig,
) -> Result<HeaderLocation, IngestError> {
    let hint = hint.map(str::trim).filter(|hint| !hint.is_empty());
    if let Some(hint) = hint {
        if let Some(location) = locate_by_hint(grid, hint, config.header_scan_rows) {
            info!(
                "Header row found at row {} using primary header '{}'",
                location.row + 1,
                hint
            );
            return Ok(location);
        }
        debug!("Primary header hint '{hint}' not found; scoring rows instead");
    }

    if let Some(location) = locate_by_score(grid, config.header_scan_rows, &config.scoring) {
        info!(
            "Header row auto-detected at row {}, primary header '{}' ({:?})",
            location.row + 1,
            location.primary_header,
            location.method
        );
        return Ok(location);
    }

    warn!("No header candidate in the scan window; falling back to the first plausible row");
    if let Some(location) = locate_fallback(grid, config.fallback_scan_rows) {
        info!(
            "Header row fallback at row {}, primary header '{}'",
            location.row + 1,
            location.primary_header
        );
        return Ok(location);
    }

    Err(IngestError::NoHeaderRow {
        scanned: config.header_scan_rows,
    })
}

fn locate_by_hint(grid: &RawGrid, hint: &str, window: usize) -> Option<HeaderLocation> {
    let needle = normalize_text(hint);
    grid.rows()
        .take(window)
        .position(|row| {
            let mentions_hint = row.iter().any(|cell| {
                let text = cell.normalized();
                !text.is_empty() && (text.contains(&needle) || needle.contains(&text))
            });
            mentions_hint && looks_like_header(row)
        })
        .map(|row| HeaderLocation {
            row,
            primary_header: hint.to_string(),
            method: DetectionMethod::Hint,
        })
}

/// Scores one row; `None` when the row cannot be a header at all.
pub fn score_row(
    row: &[CellValue],
    row_index: usize,
    scoring: &HeaderScoring,
) -> Option<(u32, Option<String>)> {
    if !looks_like_header(row) {
        return None;
    }

    let mut score = 0u32;
    let mut primary_candidate = None;
    let mut synthetic_hits = 0usize;

    for cell in row.iter().filter(|cell| !cell.is_blank()) {
        let normalized = cell.normalized();
        let keyword_hit = scoring
            .keywords
            .iter()
            .any(|keyword| normalized.contains(keyword.as_str()));
        if keyword_hit {
            score += scoring.keyword;
            if primary_candidate.is_none()
                && scoring
                    .primary_keywords
                    .iter()
                    .any(|keyword| normalized.contains(keyword.as_str()))
            {
                primary_candidate = Some(cell.text().trim().to_string());
            }
        }
        if is_synthetic_header(&normalized) {
            synthetic_hits += 1;
        }
    }

    if synthetic_hits >= 2 {
        score += scoring.synthetic_pattern;
    }
    if row_index == 0 {
        score += scoring.first_row;
    }
    if non_blank_count(row) >= scoring.column_count_threshold {
        score += scoring.column_count;
    }
    Some((score, primary_candidate))
}

fn locate_by_score(grid: &RawGrid, window: usize, scoring: &HeaderScoring) -> Option<HeaderLocation> {
    let mut best: Option<(usize, u32, String)> = None;

    for (idx, row) in grid.rows().enumerate().take(window) {
        let Some((score, candidate)) = score_row(row, idx, scoring) else {
            continue;
        };
        debug!("Row {} header score {}", idx + 1, score);
        if best.as_ref().is_none_or(|(_, best_score, _)| score > *best_score) {
            let primary = candidate.unwrap_or_else(|| first_non_blank_text(row));
            best = Some((idx, score, primary));
        }
    }

    best.map(|(row, score, primary_header)| HeaderLocation {
        row,
        primary_header,
        method: DetectionMethod::Scored { score },
    })
}

fn locate_fallback(grid: &RawGrid, window: usize) -> Option<HeaderLocation> {
    grid.rows()
        .take(window)
        .position(looks_like_header)
        .map(|row| HeaderLocation {
            row,
            primary_header: first_non_blank_text(grid.row(row)),
            method: DetectionMethod::Fallback,
        })
}

fn first_non_blank_text(row: &[CellValue]) -> String {
    row.iter()
        .find(|cell| !cell.is_blank())
        .map(|cell| cell.text().trim().to_string())
        .unwrap_or_default()
}
