pub mod cli;
pub mod coerce;
pub mod config;
pub mod data;
pub mod data_start;
pub mod defaults;
pub mod error;
pub mod grid;
pub mod header;
pub mod ingest;
pub mod reconcile;
pub mod schema;
pub mod sqlite;
pub mod storage;
pub mod validate;
pub mod workbook;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};
use serde::Serialize;

use crate::{
    cli::{Cli, Commands},
    config::IngestConfig,
    data::parse_period_key,
    ingest::{IngestRequest, Ingestor},
    sqlite::SqliteStore,
    workbook::{WorkbookReader, WorksheetReader, resolve_encoding},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_ingest", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => IngestConfig::load(path)
            .with_context(|| format!("Loading configuration from {path:?}"))?,
        None => IngestConfig::default(),
    };
    debug!("Effective configuration: {config:?}");

    match cli.command {
        Commands::Sheets(args) => handle_sheets(&args),
        Commands::Analyze(args) => handle_analyze(&args, &config),
        Commands::Ingest(args) => handle_ingest(&args, &config),
        Commands::Columns(args) => handle_columns(&args),
    }
}

fn reader_for(args: &cli::InputArgs) -> Result<WorkbookReader> {
    let encoding = resolve_encoding(args.input_encoding.as_deref())?;
    Ok(WorkbookReader::new(encoding, args.delimiter))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Serializing output")?;
    println!("{rendered}");
    Ok(())
}

fn handle_sheets(args: &cli::SheetsArgs) -> Result<()> {
    let reader = reader_for(&args.input)?;
    let names = reader
        .sheet_names(&args.input.input)
        .with_context(|| format!("Listing sheets of {:?}", args.input.input))?;
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn handle_analyze(args: &cli::AnalyzeArgs, config: &IngestConfig) -> Result<()> {
    info!("Analyzing '{}'", args.input.input.display());
    let reader = reader_for(&args.input)?;
    // Analysis never touches storage; an in-memory store satisfies the seams.
    let store = SqliteStore::open_in_memory().context("Opening scratch store")?;
    let analysis = Ingestor::new(&reader, &store, &store, config)
        .analyze(
            &args.input.input,
            args.sheet.as_deref(),
            args.primary_header.as_deref(),
        )
        .with_context(|| format!("Analyzing {:?}", args.input.input))?;
    print_json(&analysis)
}

fn handle_ingest(args: &cli::IngestArgs, config: &IngestConfig) -> Result<()> {
    let period = parse_period_key(&args.period)?;
    let reader = reader_for(&args.input)?;
    let store = SqliteStore::open(&args.database)
        .with_context(|| format!("Opening database {:?}", args.database))?;
    info!(
        "Ingesting '{}' into '{}' for period {}",
        args.input.input.display(),
        args.table,
        period.format("%Y-%m")
    );

    let request = IngestRequest::new(&args.input.input, &args.table, period)
        .with_sheet(args.sheet.clone())
        .with_primary_header(args.primary_header.clone())
        .replace_existing(!args.no_replace);
    let result = Ingestor::new(&reader, &store, &store, config).ingest(&request);
    print_json(&result)?;
    if !result.success {
        bail!("{}", result.message);
    }
    Ok(())
}

fn handle_columns(args: &cli::ColumnsArgs) -> Result<()> {
    let store = SqliteStore::open(&args.database)
        .with_context(|| format!("Opening database {:?}", args.database))?;
    let preview = storage::preview_columns(&store, &args.table, args.periods)
        .with_context(|| format!("Describing table '{}'", args.table))?;
    print_json(&preview)
}
