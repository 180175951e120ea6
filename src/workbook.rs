//! Worksheet reading.
//!
//! Workbooks (`.xlsx`, `.xlsm`, `.xlsb`, `.xls`, `.ods`) are read with
//! `calamine`; delimited text (`.csv`, `.tsv`, `.txt`) is read as a single
//! sheet named after the file stem. Either way the result is a [`RawGrid`]
//! whose row and column indices match the sheet's own, so row numbers in
//! messages line up with what the user sees.

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Result as AnyResult, anyhow};
use calamine::{Data, Reader, open_workbook_auto};
use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::{
    coerce::parse_temporal,
    data::{CellValue, excel_serial_to_datetime},
    error::IngestError,
    grid::RawGrid,
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

const DELIMITED_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSheet {
    pub name: String,
    pub grid: RawGrid,
}

pub trait WorksheetReader {
    fn sheet_names(&self, path: &Path) -> Result<Vec<String>, IngestError>;

    /// Reads `sheet`, or the first sheet when `None`.
    fn read_sheet(&self, path: &Path, sheet: Option<&str>) -> Result<LoadedSheet, IngestError>;
}

/// Reads workbooks with calamine and delimited text with the csv crate.
#[derive(Debug, Clone)]
pub struct WorkbookReader {
    encoding: &'static Encoding,
    delimiter: Option<u8>,
}

impl Default for WorkbookReader {
    fn default() -> Self {
        Self {
            encoding: UTF_8,
            delimiter: None,
        }
    }
}

impl WorkbookReader {
    pub fn new(encoding: &'static Encoding, delimiter: Option<u8>) -> Self {
        Self {
            encoding,
            delimiter,
        }
    }

    fn delimiter_for(&self, path: &Path) -> u8 {
        self.delimiter
            .unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
                Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
                _ => DEFAULT_CSV_DELIMITER,
            })
    }

    fn read_delimited(&self, path: &Path) -> Result<RawGrid, IngestError> {
        let file = File::open(path).map_err(|err| read_error(path, err))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter_for(path))
            .double_quote(true)
            .from_reader(BufReader::new(file));

        let mut rows = Vec::new();
        for record in reader.byte_records() {
            let record = record.map_err(|err| read_error(path, err))?;
            let cells = record
                .iter()
                .map(|field| decode_bytes(field, self.encoding).map(|text| CellValue::from(text.as_str())))
                .collect::<AnyResult<Vec<_>>>()
                .map_err(|err| read_error(path, err))?;
            rows.push(cells);
        }
        Ok(RawGrid::new(rows))
    }
}

pub fn resolve_encoding(label: Option<&str>) -> AnyResult<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'")),
        None => Ok(UTF_8),
    }
}

fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> AnyResult<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

fn read_error(path: &Path, err: impl std::fmt::Display) -> IngestError {
    IngestError::Read {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn is_delimited(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            DELIMITED_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn stem_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Sheet1".to_string())
}

/// Converts one calamine cell. Date cells become timestamps; everything else keeps its kind.
pub fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(text) => CellValue::from(text.as_str()),
        Data::Int(value) => CellValue::Int(*value),
        Data::Float(value) => CellValue::Float(*value),
        Data::Bool(value) => CellValue::Bool(*value),
        Data::DateTime(value) if value.is_datetime() => excel_serial_to_datetime(value.as_f64())
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Float(value.as_f64())),
        Data::DateTime(value) => CellValue::Float(value.as_f64()),
        Data::DateTimeIso(text) => parse_temporal(text)
            .or_else(|| {
                chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").ok()
            })
            .map(CellValue::DateTime)
            .unwrap_or_else(|| CellValue::Text(text.clone())),
        Data::DurationIso(text) => CellValue::Text(text.clone()),
        Data::Error(err) => CellValue::Text(err.to_string()),
    }
}

impl WorksheetReader for WorkbookReader {
    fn sheet_names(&self, path: &Path) -> Result<Vec<String>, IngestError> {
        if is_delimited(path) {
            return Ok(vec![stem_name(path)]);
        }
        let workbook = open_workbook_auto(path).map_err(|err| read_error(path, err))?;
        Ok(workbook.sheet_names())
    }

    fn read_sheet(&self, path: &Path, sheet: Option<&str>) -> Result<LoadedSheet, IngestError> {
        if is_delimited(path) {
            let name = stem_name(path);
            if let Some(requested) = sheet
                && requested != name
            {
                return Err(IngestError::SheetNotFound(requested.to_string()));
            }
            let grid = self.read_delimited(path)?;
            debug!("Read {} row(s) from {:?}", grid.len(), path);
            return Ok(LoadedSheet { name, grid });
        }

        let mut workbook = open_workbook_auto(path).map_err(|err| read_error(path, err))?;
        let names = workbook.sheet_names();
        let name = match sheet {
            Some(requested) => names
                .iter()
                .find(|name| name.as_str() == requested)
                .cloned()
                .ok_or_else(|| IngestError::SheetNotFound(requested.to_string()))?,
            None => names
                .first()
                .cloned()
                .ok_or_else(|| IngestError::EmptySheet(stem_name(path)))?,
        };

        let range = workbook
            .worksheet_range(&name)
            .map_err(|err| read_error(path, err))?;

        // Ranges start at the first used cell; pad so indices match the sheet.
        let (row_offset, col_offset) = range.start().unwrap_or((0, 0));
        let mut rows = vec![Vec::new(); row_offset as usize];
        rows.extend(range.rows().map(|row| {
            std::iter::repeat_n(CellValue::Empty, col_offset as usize)
                .chain(row.iter().map(cell_from_data))
                .collect::<Vec<_>>()
        }));
        debug!("Read {} row(s) from sheet '{}' of {:?}", rows.len(), name, path);

        Ok(LoadedSheet {
            name,
            grid: RawGrid::new(rows),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn delimited_files_read_as_a_single_sheet() {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Monthly report,,").unwrap();
        writeln!(file, "Code,Name,Amount").unwrap();
        writeln!(file, "A1,Alpha,\"1,200\"").unwrap();

        let reader = WorkbookReader::default();
        let sheet = reader.read_sheet(file.path(), None).unwrap();
        assert_eq!(reader.sheet_names(file.path()).unwrap(), vec![sheet.name.clone()]);
        assert_eq!(sheet.grid.len(), 3);
        assert!(sheet.grid.cell(0, 1).is_blank());
        assert_eq!(sheet.grid.cell(2, 2).text(), "1,200");
    }

    #[test]
    fn delimited_files_honour_encoding_and_tabs() {
        let mut file = Builder::new().suffix(".tsv").tempfile().unwrap();
        let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode("Código\tNombre\nÑ1\tJosé\n");
        file.write_all(&bytes).unwrap();

        let reader = WorkbookReader::new(resolve_encoding(Some("windows-1252")).unwrap(), None);
        let sheet = reader.read_sheet(file.path(), None).unwrap();
        assert_eq!(sheet.grid.cell(0, 0).text(), "Código");
        assert_eq!(sheet.grid.cell(1, 1).text(), "José");
    }

    #[test]
    fn unknown_sheet_is_distinct_from_read_errors() {
        let file = Builder::new().suffix(".csv").tempfile().unwrap();
        let err = WorkbookReader::default()
            .read_sheet(file.path(), Some("Data"))
            .unwrap_err();
        assert!(matches!(err, IngestError::SheetNotFound(name) if name == "Data"));

        let err = WorkbookReader::default()
            .read_sheet(Path::new("/no/such/book.xlsx"), None)
            .unwrap_err();
        assert!(matches!(err, IngestError::Read { .. }));
    }

    #[test]
    fn calamine_cells_map_to_cell_values() {
        assert_eq!(cell_from_data(&Data::String(String::new())), CellValue::Empty);
        assert_eq!(cell_from_data(&Data::Int(4)), CellValue::Int(4));
        assert_eq!(
            cell_from_data(&Data::DateTimeIso("2024-02-03T04:05:06".into())),
            CellValue::DateTime(
                chrono::NaiveDate::from_ymd_opt(2024, 2, 3)
                    .unwrap()
                    .and_hms_opt(4, 5, 6)
                    .unwrap()
            )
        );
    }

    #[test]
    fn unknown_encoding_label_is_rejected() {
        assert!(resolve_encoding(Some("klingon")).is_err());
        assert_eq!(resolve_encoding(None).unwrap(), UTF_8);
    }
}
