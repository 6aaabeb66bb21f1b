//! Command-line front-end for report ingestion

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;

use report_ingest::config::IngestConfig;
use report_ingest::ingest::{
    IngestOutcome, IngestionEngine, ReportSchema, SchemaRegistry, UploadPayload, UploadRouter,
};
use report_ingest::source::json::{JsonSource, read_json};
use report_ingest::source::{RowLayout, read_rows};
use report_ingest::store::SqliteStore;

#[derive(Parser)]
#[command(name = "report-ingest")]
#[command(version, about = "Ingest tabular business reports into SQLite", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.config/report-ingest/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a CSV, XLSX or JSON report file
    Ingest {
        /// Report type tag (e.g. labor, horizon, employee_weekly)
        #[arg(long = "type")]
        report_type: Option<String>,
        #[arg(long)]
        file: PathBuf,
        /// Report date (YYYY-MM-DD) for daily reports
        #[arg(long)]
        report_date: Option<String>,
        /// Period start (YYYY-MM-DD) for weekly reports
        #[arg(long)]
        start_date: Option<String>,
        /// Period end (YYYY-MM-DD) for weekly reports
        #[arg(long)]
        end_date: Option<String>,
        #[arg(long, default_value = "cli")]
        uploaded_by: String,
        /// Deliver the file in chunks of this many rows
        #[arg(long)]
        chunk_rows: Option<usize>,
    },
    /// List registered report schemas
    Schemas {
        /// Print full descriptors as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Create tables for every registered schema
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The logger must exist before config loading logs; without RUST_LOG the
    // configured level is applied once the config is known.
    let from_env = std::env::var_os("RUST_LOG").is_some();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).init();
    if !from_env {
        log::set_max_level(LevelFilter::Info);
    }

    let config = IngestConfig::load(cli.config.as_deref())?;
    if !from_env {
        log::set_max_level(config.level_filter()?);
    }

    match cli.command {
        Command::Ingest {
            report_type,
            file,
            report_date,
            start_date,
            end_date,
            uploaded_by,
            chunk_rows,
        } => {
            let request = IngestRequest {
                report_type,
                file,
                report_date,
                start_date,
                end_date,
                uploaded_by,
                chunk_rows,
            };
            run_ingest(&config, request).await
        }
        Command::Schemas { json } => {
            let registry = load_registry(&config)?;
            print_schemas(&registry, json)
        }
        Command::InitDb => {
            let engine = build_engine(&config).await?;
            engine.prepare().await?;
            println!("Tables ready for {} report types", engine.registry().len());
            Ok(())
        }
    }
}

struct IngestRequest {
    report_type: Option<String>,
    file: PathBuf,
    report_date: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    uploaded_by: String,
    chunk_rows: Option<usize>,
}

/// Built-in schemas plus the configured schema files
fn load_registry(config: &IngestConfig) -> Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::builtin()?;
    for path in &config.schema_files {
        registry.load_toml(path)?;
    }
    Ok(registry)
}

async fn build_engine(config: &IngestConfig) -> Result<IngestionEngine> {
    let registry = Arc::new(load_registry(config)?);
    let store = SqliteStore::connect(&config.database_url, config.max_connections).await?;

    let engine = IngestionEngine::new(registry, Arc::new(store))
        .with_batch_size(config.batch_size)
        .with_idle_timeout(config.session_idle_timeout());
    Ok(engine)
}

fn print_schemas(registry: &SchemaRegistry, json: bool) -> Result<()> {
    let schemas = registry.latest();
    if json {
        let descriptors: Vec<&ReportSchema> = schemas.iter().map(|s| &**s).collect();
        let out = serde_json::to_string_pretty(&descriptors).context("Failed to serialize schemas")?;
        println!("{}", out);
        return Ok(());
    }

    for schema in &schemas {
        println!(
            "{:<26} v{:<3} {:<28} period: {:<24} key: {}",
            schema.report_type,
            schema.version,
            schema.table,
            schema.period.names().join(", "),
            schema.identifying.join(", ")
        );
    }
    Ok(())
}

/// Read the file into an upload payload; CLI flags win over payload fields
fn build_payload(request: &IngestRequest, registry: &SchemaRegistry) -> Result<UploadPayload> {
    let is_json = request
        .file
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let mut payload = if is_json {
        match read_json(&request.file)? {
            JsonSource::Payload(payload) => *payload,
            JsonSource::Rows(data) => UploadPayload {
                data,
                ..Default::default()
            },
        }
    } else {
        let report_type = request
            .report_type
            .as_deref()
            .context("--type is required for CSV and XLSX files")?;
        let layout = RowLayout::for_header_source(registry.get(report_type)?.header_source);
        UploadPayload {
            data: read_rows(&request.file, layout)?,
            ..Default::default()
        }
    };

    if let Some(report_type) = &request.report_type {
        payload.file_type = report_type.clone();
    }
    if payload.file_name.is_empty() {
        payload.file_name = file_name_of(&request.file);
    }
    for (slot, flag) in [
        (&mut payload.report_date, &request.report_date),
        (&mut payload.start_date, &request.start_date),
        (&mut payload.end_date, &request.end_date),
    ] {
        if flag.is_some() {
            *slot = flag.clone();
        }
    }
    payload.chunk_index = None;
    payload.total_chunks = None;
    payload.is_last_chunk = None;
    Ok(payload)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn run_ingest(config: &IngestConfig, request: IngestRequest) -> Result<()> {
    let engine = Arc::new(build_engine(config).await?);
    if config.create_tables {
        engine.prepare().await?;
    }
    let payload = build_payload(&request, engine.registry())?;
    let router = UploadRouter::new(engine.clone());

    let outcome = match request.chunk_rows.filter(|n| *n > 0) {
        None => router.handle(&payload, &request.uploaded_by).await?,
        Some(chunk_rows) => {
            let reaper = engine.assembler().spawn_reaper(config.reaper_interval());
            let result = send_chunks(&router, &payload, &request.uploaded_by, chunk_rows).await;
            reaper.abort();
            result?
        }
    };

    match outcome {
        IngestOutcome::Committed(summary) => {
            println!(
                "{} v{}: {} records written from '{}'",
                summary.report_type, summary.schema_version, summary.records, summary.file_name
            );
            println!(
                "  rows received: {}, dropped: {}, after footer: {}, duplicates: {}",
                summary.rows_received, summary.rows_dropped, summary.rows_ignored, summary.duplicates
            );
            println!(
                "  chunks: {}, batches: {}, rows affected: {}, deleted: {}",
                summary.chunks, summary.batches, summary.rows_affected, summary.deleted
            );
        }
        IngestOutcome::Buffered { chunk_index, total_chunks, .. } => {
            anyhow::bail!(
                "Upload stopped after chunk {} of {}",
                chunk_index + 1,
                total_chunks
            );
        }
    }
    Ok(())
}

async fn send_chunks(
    router: &UploadRouter,
    payload: &UploadPayload,
    uploaded_by: &str,
    chunk_rows: usize,
) -> Result<IngestOutcome> {
    let chunks: Vec<_> = payload.data.chunks(chunk_rows).collect();
    let total = chunks.len();
    let template = UploadPayload {
        data: Vec::new(),
        ..payload.clone()
    };
    let mut outcome = None;

    for (index, rows) in chunks.into_iter().enumerate() {
        let chunk = UploadPayload {
            data: rows.to_vec(),
            chunk_index: Some(index),
            total_chunks: Some(total),
            is_last_chunk: Some(index + 1 == total),
            ..template.clone()
        };
        let step = router
            .handle(&chunk, uploaded_by)
            .await
            .with_context(|| format!("Chunk {}/{} rejected", index + 1, total))?;
        if let IngestOutcome::Buffered { buffered, .. } = &step {
            log::info!("Chunk {}/{} buffered ({} records so far)", index + 1, total, buffered);
        }
        outcome = Some(step);
    }

    outcome.context("File contains no rows")
}
