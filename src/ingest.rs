//! The ingest pipeline.
//!
//! [`Ingestor::ingest`] runs one worksheet through header location, column
//! reconciliation, data-start location, cell coercion and the error-rate gate,
//! then hands the surviving records to the bulk loader. Every outcome,
//! including structural failures, is reported as an [`IngestResult`] carrying
//! whatever header details were established before the pipeline stopped.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;

use crate::{
    config::IngestConfig,
    data_start::locate_data_start,
    error::IngestError,
    grid::row_is_blank,
    header::{self, DetectionMethod},
    reconcile::{HeaderMapping, reconcile},
    schema::ColumnSchema,
    storage::{BulkLoader, SchemaIntrospector},
    validate::{CellError, GateDecision, validate_rows},
    workbook::WorksheetReader,
};

#[derive(Debug, Clone, PartialEq)]
pub struct IngestRequest {
    pub path: PathBuf,
    pub table: String,
    pub sheet: Option<String>,
    pub primary_header: Option<String>,
    /// First day of the reporting month.
    pub period: NaiveDate,
    pub replace_existing: bool,
}

impl IngestRequest {
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>, period: NaiveDate) -> Self {
        Self {
            path: path.into(),
            table: table.into(),
            sheet: None,
            primary_header: None,
            period,
            replace_existing: true,
        }
    }

    pub fn with_sheet(mut self, sheet: Option<String>) -> Self {
        self.sheet = sheet;
        self
    }

    pub fn with_primary_header(mut self, primary_header: Option<String>) -> Self {
        self.primary_header = primary_header;
        self
    }

    pub fn replace_existing(mut self, replace: bool) -> Self {
        self.replace_existing = replace;
        self
    }
}

/// Where the pipeline found things. Row numbers are 1-based.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderInfo {
    pub header_row: Option<usize>,
    pub data_start_row: Option<usize>,
    pub detected_primary: Option<String>,
    pub matched_columns: usize,
    pub missing_columns: Vec<String>,
    pub sheet_used: Option<String>,
    pub excel_headers: Vec<String>,
    pub required_columns: Vec<String>,
    pub mappings: Vec<HeaderMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted_rows: Option<usize>,
    /// Rows withheld from the load because at least one of their cells failed,
    /// plus any the loader itself skipped.
    pub skipped_rows: usize,
    pub replaced_rows: usize,
    /// The first errors only; see `total_errors`.
    pub validation_errors: Vec<CellError>,
    pub total_errors: usize,
    pub error_rate: f64,
    pub header_info: HeaderInfo,
}

impl IngestResult {
    fn failure(message: impl Into<String>, header_info: HeaderInfo) -> Self {
        Self {
            success: false,
            message: message.into(),
            inserted_rows: None,
            skipped_rows: 0,
            replaced_rows: 0,
            validation_errors: Vec::new(),
            total_errors: 0,
            error_rate: 0.0,
            header_info,
        }
    }
}

/// A dry run over one sheet: what would be read, without touching storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetAnalysis {
    pub header_row: usize,
    pub data_start_row: usize,
    pub detected_primary_header: String,
    pub detection: DetectionMethod,
    pub headers: Vec<String>,
    pub total_columns: usize,
    pub data_rows_available: usize,
    pub sample_data: Vec<Vec<String>>,
    pub available_sheets: Vec<String>,
    pub sheet_used: String,
}

pub struct Ingestor<'a> {
    reader: &'a dyn WorksheetReader,
    introspector: &'a dyn SchemaIntrospector,
    loader: &'a dyn BulkLoader,
    config: &'a IngestConfig,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        reader: &'a dyn WorksheetReader,
        introspector: &'a dyn SchemaIntrospector,
        loader: &'a dyn BulkLoader,
        config: &'a IngestConfig,
    ) -> Self {
        Self {
            reader,
            introspector,
            loader,
            config,
        }
    }

    /// Never fails outright; problems come back as an unsuccessful result.
    pub fn ingest(&self, request: &IngestRequest) -> IngestResult {
        let mut info = HeaderInfo::default();
        match self.run(request, &mut info) {
            Ok(result) => result,
            Err(err) => {
                warn!("Ingest of {:?} into '{}' failed: {}", request.path, request.table, err);
                IngestResult::failure(err.to_string(), info)
            }
        }
    }

    fn run(&self, request: &IngestRequest, info: &mut HeaderInfo) -> Result<IngestResult, IngestError> {
        let columns = self.introspector.columns(&request.table, true)?;
        info.required_columns = columns.iter().map(|c| c.name.clone()).collect();

        let sheet = self.reader.read_sheet(&request.path, request.sheet.as_deref())?;
        info.sheet_used = Some(sheet.name.clone());
        let grid = &sheet.grid;
        if grid.is_empty() {
            return Err(IngestError::EmptySheet(sheet.name));
        }

        let location = header::locate(grid, request.primary_header.as_deref(), self.config)?;
        info.header_row = Some(location.row + 1);
        info.detected_primary = Some(location.primary_header.clone());

        let headers = grid.header_texts(location.row);
        info.excel_headers = headers.clone();

        let reconciliation = reconcile(&headers, &info.required_columns).inspect_err(|err| {
            if let IngestError::UnreconciledColumns { unmatched, .. } = err {
                info.matched_columns = info.required_columns.len() - unmatched.len();
                info.missing_columns = unmatched.clone();
            }
        })?;
        info.matched_columns = reconciliation.matched_count();
        info.mappings = reconciliation.mappings.clone();

        let data_start = locate_data_start(grid, location.row, &location.primary_header)?;
        info.data_start_row = Some(data_start + 1);

        let mapped = reconciliation
            .mappings
            .iter()
            .filter_map(|mapping| {
                columns
                    .iter()
                    .find(|column| column.name == mapping.column)
                    .map(|column| (mapping.excel_index, column))
            })
            .collect::<Vec<(usize, &ColumnSchema)>>();
        let indices = mapped.iter().map(|(idx, _)| *idx).collect::<Vec<_>>();
        let schema = mapped.iter().map(|(_, column)| *column).collect::<Vec<_>>();

        let rows = grid.select_columns(data_start, &indices);
        if rows.is_empty() {
            return Err(IngestError::NoValidRows);
        }
        let report = validate_rows(&rows, &schema);
        let decision = report.gate(self.config.max_error_rate);
        let total_errors = report.errors.len();
        let reported = report
            .errors
            .iter()
            .take(self.config.max_reported_errors)
            .cloned()
            .collect::<Vec<_>>();

        if let GateDecision::Rejected { error_rate } = decision {
            let mut result = IngestResult::failure(
                format!(
                    "Validation failed: {} cell error(s) across {} row(s) ({:.2}% of cells, limit {:.2}%). Nothing was loaded.",
                    total_errors,
                    rows.len(),
                    error_rate * 100.0,
                    self.config.max_error_rate * 100.0
                ),
                info.clone(),
            );
            result.validation_errors = reported;
            result.total_errors = total_errors;
            result.error_rate = error_rate;
            return Ok(result);
        }

        let records = report.clean_records();
        let skipped_rows = report.rejected_rows();
        if records.is_empty() {
            return Err(IngestError::NoValidRows);
        }

        let summary = self.loader.load(
            &records,
            &request.table,
            request.period,
            request.replace_existing,
        )?;
        let period = request.period.format("%Y-%m");
        let mut message = format!(
            "Inserted {} row(s) into '{}' for period {}",
            summary.inserted_count, request.table, period
        );
        if total_errors > 0 {
            message.push_str(&format!(
                "; {} row(s) skipped with {} cell error(s)",
                skipped_rows, total_errors
            ));
        }
        info!("{message}");

        Ok(IngestResult {
            success: true,
            message,
            inserted_rows: Some(summary.inserted_count),
            skipped_rows: skipped_rows + summary.skipped_count,
            replaced_rows: summary.replaced_count,
            validation_errors: reported,
            total_errors,
            error_rate: decision.error_rate(),
            header_info: info.clone(),
        })
    }

    /// Locates the header and data rows of a sheet and samples its data.
    pub fn analyze(
        &self,
        path: &Path,
        sheet: Option<&str>,
        primary_header: Option<&str>,
    ) -> Result<SheetAnalysis, IngestError> {
        let available_sheets = self.reader.sheet_names(path)?;
        let loaded = self.reader.read_sheet(path, sheet)?;
        let grid = &loaded.grid;
        if grid.is_empty() {
            return Err(IngestError::EmptySheet(loaded.name));
        }

        let location = header::locate(grid, primary_header, self.config)?;
        let data_start = locate_data_start(grid, location.row, &location.primary_header)?;
        let headers = grid.header_texts(location.row);

        let sample_data = grid
            .rows()
            .skip(data_start)
            .filter(|row| !row_is_blank(row))
            .take(self.config.sample_rows)
            .map(|row| {
                (0..headers.len())
                    .map(|idx| {
                        row.get(idx)
                            .map(|cell| cell.text().trim().to_string())
                            .unwrap_or_default()
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        Ok(SheetAnalysis {
            header_row: location.row + 1,
            data_start_row: data_start + 1,
            detected_primary_header: location.primary_header,
            detection: location.method,
            total_columns: headers.len(),
            headers,
            data_rows_available: grid.len().saturating_sub(data_start),
            sample_data,
            available_sheets,
            sheet_used: loaded.name,
        })
    }
}
