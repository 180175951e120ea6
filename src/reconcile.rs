//! Mapping spreadsheet headers onto table columns.
//!
//! Matching runs strategy by strategy, most precise first. A pass only
//! considers table columns and spreadsheet headers that earlier passes left
//! unclaimed, so a precise match is never displaced by a looser one and no
//! spreadsheet column is mapped twice.

use std::{fmt, sync::LazyLock};

use log::{debug, info};
use regex::Regex;
use serde::Serialize;

use crate::error::IngestError;

static SEPARATOR_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_\-]+").expect("separator pattern compiles"));

/// Separator-stripped headers shorter than this never match.
const STRIPPED_MIN_LEN: usize = 3;
/// Both sides of a substring match must be at least this long.
const SUBSTRING_MIN_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    SeparatorNormalized,
    SeparatorStripped,
    Substring,
}

impl MatchStrategy {
    pub const ORDERED: [MatchStrategy; 4] = [
        MatchStrategy::Exact,
        MatchStrategy::SeparatorNormalized,
        MatchStrategy::SeparatorStripped,
        MatchStrategy::Substring,
    ];

    fn matches(&self, excel: &str, column: &str) -> bool {
        match self {
            MatchStrategy::Exact => excel.trim().to_lowercase() == column.trim().to_lowercase(),
            MatchStrategy::SeparatorNormalized => underscored(excel) == underscored(column),
            MatchStrategy::SeparatorStripped => {
                let excel = stripped(excel);
                excel.chars().count() >= STRIPPED_MIN_LEN && excel == stripped(column)
            }
            MatchStrategy::Substring => {
                let excel = underscored(excel);
                let column = underscored(column);
                excel.chars().count() >= SUBSTRING_MIN_LEN
                    && column.chars().count() >= SUBSTRING_MIN_LEN
                    && (excel.contains(&column) || column.contains(&excel))
            }
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MatchStrategy::Exact => "exact",
            MatchStrategy::SeparatorNormalized => "separator-normalized",
            MatchStrategy::SeparatorStripped => "separator-stripped",
            MatchStrategy::Substring => "substring",
        };
        f.write_str(label)
    }
}

fn underscored(value: &str) -> String {
    value.trim().replace(' ', "_").to_lowercase()
}

fn stripped(value: &str) -> String {
    SEPARATOR_RUNS.replace_all(value.trim(), "").to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMapping {
    pub excel_header: String,
    /// Position of the spreadsheet column in the header row.
    pub excel_index: usize,
    pub column: String,
    pub strategy: MatchStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    /// One entry per required column, in required-column order.
    pub mappings: Vec<HeaderMapping>,
    /// Spreadsheet headers no column claimed.
    pub unused_headers: Vec<String>,
}

impl Reconciliation {
    pub fn matched_count(&self) -> usize {
        self.mappings.len()
    }

    pub fn mapping_for(&self, column: &str) -> Option<&HeaderMapping> {
        self.mappings.iter().find(|mapping| mapping.column == column)
    }
}

/// Matches every required column to a spreadsheet header or fails listing what is missing.
pub fn reconcile<S>(excel_headers: &[String], required: &[S]) -> Result<Reconciliation, IngestError>
where
    S: AsRef<str>,
{
    let mut available = excel_headers
        .iter()
        .enumerate()
        .filter(|(_, header)| !header.trim().is_empty())
        .map(|(idx, header)| (idx, header.trim().to_string()))
        .collect::<Vec<_>>();
    let mut claimed: Vec<Option<HeaderMapping>> = vec![None; required.len()];

    for strategy in MatchStrategy::ORDERED {
        for (slot, column) in claimed.iter_mut().zip(required) {
            if slot.is_some() {
                continue;
            }
            let column = column.as_ref();
            let Some(pos) = available
                .iter()
                .position(|(_, header)| strategy.matches(header, column))
            else {
                continue;
            };
            let (excel_index, excel_header) = available.remove(pos);
            debug!("Column '{column}' matched header '{excel_header}' ({strategy})");
            *slot = Some(HeaderMapping {
                excel_header,
                excel_index,
                column: column.to_string(),
                strategy,
            });
        }
    }

    let unmatched = claimed
        .iter()
        .zip(required)
        .filter(|(slot, _)| slot.is_none())
        .map(|(_, column)| column.as_ref().to_string())
        .collect::<Vec<_>>();
    if !unmatched.is_empty() {
        return Err(IngestError::UnreconciledColumns {
            unmatched,
            excel_headers: excel_headers
                .iter()
                .map(|header| header.trim().to_lowercase())
                .filter(|header| !header.is_empty())
                .collect(),
        });
    }

    let mappings = claimed.into_iter().flatten().collect::<Vec<_>>();
    info!("Matched {} column(s) to spreadsheet headers", mappings.len());
    Ok(Reconciliation {
        mappings,
        unused_headers: available.into_iter().map(|(_, header)| header).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn exact_matches_ignore_case() {
        let result = reconcile(&headers(&["FACILITY_NO", "amount"]), &["Facility_No", "Amount"]).unwrap();
        assert!(result.mappings.iter().all(|m| m.strategy == MatchStrategy::Exact));
        assert_eq!(result.mapping_for("Amount").unwrap().excel_index, 1);
    }

    #[test]
    fn separator_stripped_requires_three_characters() {
        let result = reconcile(&headers(&["Cust-Name"]), &["cust_name"]).unwrap();
        assert_eq!(result.mappings[0].strategy, MatchStrategy::SeparatorStripped);

        assert!(reconcile(&headers(&["i-d"]), &["i_d"]).is_err());
        assert!(reconcile(&headers(&["a-b"]), &["ab"]).is_err());
    }

    #[test]
    fn substring_requires_four_characters_each_side() {
        let result = reconcile(&headers(&["Outstanding Balance IDR"]), &["Outstanding_Balance"]).unwrap();
        assert_eq!(result.mappings[0].strategy, MatchStrategy::Substring);
        assert!(reconcile(&headers(&["Customer ID"]), &["id"]).is_err());
    }

    #[test]
    fn precise_matches_are_not_stolen_by_looser_ones() {
        // "Amount Due" would substring-match "Amount", but "Amount" exists exactly.
        let result = reconcile(
            &headers(&["Amount Due", "Amount"]),
            &["Amount_Due_Total", "Amount"],
        )
        .unwrap();
        assert_eq!(result.mapping_for("Amount").unwrap().excel_index, 1);
        assert_eq!(result.mapping_for("Amount_Due_Total").unwrap().excel_index, 0);
    }

    #[test]
    fn unused_headers_are_reported() {
        let result = reconcile(&headers(&["Code", "", "Notes"]), &["code"]).unwrap();
        assert_eq!(result.unused_headers, vec!["Notes".to_string()]);
        assert_eq!(result.matched_count(), 1);
    }

    #[test]
    fn missing_columns_fail_with_normalized_headers() {
        let err = reconcile(&headers(&["Facility No", " Customer Name "]), &["Facility_No", "Amount"])
            .unwrap_err();
        match err {
            IngestError::UnreconciledColumns {
                unmatched,
                excel_headers,
            } => {
                assert_eq!(unmatched, vec!["Amount".to_string()]);
                assert_eq!(excel_headers, vec!["facility no", "customer name"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
