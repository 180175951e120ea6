//! Tunable pipeline settings.
//!
//! Every value has a default matching the behaviour users already rely on, so
//! a YAML config file only needs the keys it overrides:
//!
//! ```yaml
//! max_error_rate: 0.05
//! scoring:
//!   first_row: 3
//!   keywords: [number, name, id, account]
//! ```

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

const DEFAULT_HEADER_KEYWORDS: &[&str] = &[
    "number",
    "name",
    "id",
    "code",
    "facility",
    "location",
    "type",
    "date",
    "status",
    "description",
    "value",
    "amount",
    "quantity",
    "column",
    "field",
    "data",
    "info",
];

const DEFAULT_PRIMARY_KEYWORDS: &[&str] = &["number", "id", "column"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Rows inspected when scoring header candidates.
    pub header_scan_rows: usize,
    /// Rows inspected by the last-resort "first plausible row" fallback.
    pub fallback_scan_rows: usize,
    /// A batch whose cell error rate exceeds this fraction is rejected.
    pub max_error_rate: f64,
    /// Cap on cell errors echoed back in a result; the total is always reported.
    pub max_reported_errors: usize,
    /// Data rows included in a sheet analysis preview.
    pub sample_rows: usize,
    pub scoring: HeaderScoring,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            header_scan_rows: 20,
            fallback_scan_rows: 10,
            max_error_rate: 0.10,
            max_reported_errors: 20,
            sample_rows: 3,
            scoring: HeaderScoring::default(),
        }
    }
}

impl IngestConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let config: IngestConfig =
            serde_yaml::from_reader(reader).context("Parsing config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.header_scan_rows > 0, "header_scan_rows must be positive");
        ensure!(
            self.fallback_scan_rows > 0,
            "fallback_scan_rows must be positive"
        );
        ensure!(
            (0.0..=1.0).contains(&self.max_error_rate),
            "max_error_rate must be between 0.0 and 1.0 (got {})",
            self.max_error_rate
        );
        ensure!(
            !self.scoring.keywords.is_empty(),
            "scoring.keywords cannot be empty"
        );
        Ok(())
    }
}

/// Weights for the header-row scorer. The synthetic `column_<n>` bonus is the
/// strongest signal; keyword hits, column count and first-row position add on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeaderScoring {
    pub keyword: u32,
    pub synthetic_pattern: u32,
    pub first_row: u32,
    pub column_count: u32,
    pub column_count_threshold: usize,
    pub keywords: Vec<String>,
    pub primary_keywords: Vec<String>,
}

impl Default for HeaderScoring {
    fn default() -> Self {
        Self {
            keyword: 1,
            synthetic_pattern: 10,
            first_row: 5,
            column_count: 2,
            column_count_threshold: 3,
            keywords: DEFAULT_HEADER_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            primary_keywords: DEFAULT_PRIMARY_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}
