use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DATABASE_ENV: &str = "SHEET_INGEST_DATABASE";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Load loosely structured spreadsheets into typed tables",
    long_about = None
)]
pub struct Cli {
    /// YAML file overriding header detection and validation settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the sheets of a workbook
    Sheets(SheetsArgs),
    /// Locate the header and data rows of a sheet without loading anything
    Analyze(AnalyzeArgs),
    /// Validate a sheet against a table and load it for a reporting period
    Ingest(IngestArgs),
    /// Show a table's columns and its most recent periods
    Columns(ColumnsArgs),
}

/// How to read the input file.
#[derive(Debug, Args)]
pub struct InputArgs {
    /// Workbook (.xlsx, .xls, .xlsb, .ods) or delimited text (.csv, .tsv)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Delimiter for text input (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of text input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct SheetsArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Sheet to read (defaults to the first sheet)
    #[arg(long)]
    pub sheet: Option<String>,
    /// Text of the primary header cell, used to find the header row
    #[arg(long = "primary-header")]
    pub primary_header: Option<String>,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Target table
    #[arg(short = 't', long)]
    pub table: String,
    /// Reporting period as YYYY-MM
    #[arg(long)]
    pub period: String,
    /// Sheet to read (defaults to the first sheet)
    #[arg(long)]
    pub sheet: Option<String>,
    /// Text of the primary header cell, used to find the header row
    #[arg(long = "primary-header")]
    pub primary_header: Option<String>,
    /// SQLite database holding the target table
    #[arg(long, env = DATABASE_ENV)]
    pub database: PathBuf,
    /// Keep rows already loaded for the period instead of replacing them
    #[arg(long = "no-replace")]
    pub no_replace: bool,
}

#[derive(Debug, Args)]
pub struct ColumnsArgs {
    /// Table to describe
    #[arg(short = 't', long)]
    pub table: String,
    /// SQLite database holding the table
    #[arg(long, env = DATABASE_ENV)]
    pub database: PathBuf,
    /// Number of recent periods to count
    #[arg(long, default_value_t = 5)]
    pub periods: usize,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
