// ============================================================
// COMMAND LINE
// ============================================================

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use crate::application::IngestPipeline;
use crate::application::use_cases::ingest_pipeline::log_summary;
use crate::domain::error::{AppError, Result};
use crate::domain::ingest_config::{DuplicatePolicy, IngestConfig};
use crate::domain::records::TABLE_COLUMNS;
use crate::domain::summary::{RunSummary, TableStats};
use crate::infrastructure::config::{load_config, resolve_database_url};
use crate::infrastructure::db::{connect_sink, FarmerSink};
use crate::infrastructure::export::export_csv;
use crate::infrastructure::source::open_source;

#[derive(Parser, Debug)]
#[command(name = "farmer-ingest")]
#[command(about = "Reconcile, clean and load multi-sheet farmer/plot spreadsheets")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: config/ingest.toml if present)
    #[arg(long, short = 'c', global = true, env = "FARMER_INGEST_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the target table and indexes, then show its layout and counts
    Setup,

    /// Ingest a workbook or CSV file
    Load(LoadArgs),

    /// Record counts: total, by source sheet, by status
    Stats,

    /// Print one stored farmer as JSON
    Show {
        farmer_code: String,
    },
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Workbook (xlsx, xls, ods) or CSV file
    #[arg(long, short = 'i')]
    pub input: PathBuf,

    /// Create the table and indexes before loading
    #[arg(long)]
    pub create_table: bool,

    /// Records per transaction (overrides the config file)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// drop-new or keep-last (overrides the config file)
    #[arg(long)]
    pub duplicate_policy: Option<DuplicatePolicy>,

    /// Reconcile, clean and validate without touching the database
    #[arg(long)]
    pub dry_run: bool,

    /// Write the merged records to this CSV file
    #[arg(long, value_name = "PATH")]
    pub export_csv: Option<PathBuf>,

    /// Write the run summary to this JSON file
    #[arg(long, value_name = "PATH")]
    pub summary_json: Option<PathBuf>,
}

impl LoadArgs {
    fn apply_overrides(&self, config: &mut IngestConfig) {
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(policy) = self.duplicate_policy {
            config.duplicate_policy = policy;
        }
    }
}

pub async fn execute(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Setup => setup(&config).await,
        Command::Load(args) => load(config, &args).await,
        Command::Stats => stats(&config).await,
        Command::Show { farmer_code } => show(&config, &farmer_code).await,
    }
}

async fn connect(config: &IngestConfig) -> Result<Box<dyn FarmerSink>> {
    let url = resolve_database_url(&config.database)?;
    connect_sink(&url, &config.database).await
}

async fn setup(config: &IngestConfig) -> Result<ExitCode> {
    let sink = connect(config).await?;
    sink.ensure_schema().await?;

    println!("Table {} is ready with columns:", sink.table_name());
    for column in TABLE_COLUMNS {
        println!("  {}", column);
    }
    print_stats(&sink.table_stats().await?);
    Ok(ExitCode::SUCCESS)
}

async fn load(mut config: IngestConfig, args: &LoadArgs) -> Result<ExitCode> {
    args.apply_overrides(&mut config);
    let pipeline = IngestPipeline::new(config)?;

    let mut source = open_source(&args.input)?;
    info!(input = %args.input.display(), "Reading input");
    let mut prepared = pipeline.prepare(source.as_mut())?;

    if let Some(path) = &args.export_csv {
        export_csv(path, &prepared.records)?;
        info!(path = %path.display(), records = prepared.records.len(), "Canonical CSV written");
    }

    let mut loaded = Ok(());
    if prepared.summary.is_total_failure() {
        error!("No sheet could be processed; nothing loaded");
    } else if args.dry_run {
        info!(records = prepared.records.len(), "Dry run; database not touched");
    } else {
        loaded = match connect(pipeline.config()).await {
            Ok(sink) => pipeline.load(&mut prepared, sink.as_ref(), args.create_table).await,
            Err(e) => Err(e),
        };
    }

    // The summary is reported even when the load failed
    log_summary(&prepared.summary);
    if let Some(path) = &args.summary_json {
        write_summary(path, &prepared.summary)?;
    }
    loaded?;

    Ok(if prepared.summary.is_total_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn stats(config: &IngestConfig) -> Result<ExitCode> {
    let sink = connect(config).await?;
    print_stats(&sink.table_stats().await?);
    Ok(ExitCode::SUCCESS)
}

async fn show(config: &IngestConfig, farmer_code: &str) -> Result<ExitCode> {
    let sink = connect(config).await?;
    match sink.fetch_farmer(farmer_code).await? {
        Some(row) => {
            let json = serde_json::to_string_pretty(&row)
                .map_err(|e| AppError::Internal(format!("Failed to serialize farmer: {}", e)))?;
            println!("{}", json);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            warn!(farmer_code = %farmer_code, "Farmer not found");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_stats(stats: &TableStats) {
    println!("Total records: {}", stats.total_records);
    println!("By source sheet:");
    for (sheet, count) in &stats.records_by_sheet {
        println!("  {:<24} {}", sheet, count);
    }
    println!("By status:");
    for (status, count) in &stats.records_by_status {
        println!("  {:<24} {}", status.as_deref().unwrap_or("(none)"), count);
    }
}

fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| AppError::Internal(format!("Failed to serialize run summary: {}", e)))?;
    fs::write(path, json)
        .map_err(|e| AppError::IoError(format!("Failed to write {}: {}", path.display(), e)))?;
    info!(path = %path.display(), "Run summary written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_load_flags_parse() {
        let cli = Cli::parse_from([
            "farmer-ingest",
            "load",
            "--input",
            "farmers.xlsx",
            "--batch-size",
            "100",
            "--duplicate-policy",
            "keep-last",
            "--dry-run",
        ]);

        match cli.command {
            Command::Load(args) => {
                assert_eq!(args.input, PathBuf::from("farmers.xlsx"));
                assert!(args.dry_run);
                assert!(!args.create_table);

                let mut config = IngestConfig::default();
                args.apply_overrides(&mut config);
                assert_eq!(config.batch_size, 100);
                assert_eq!(config.duplicate_policy, DuplicatePolicy::KeepLast);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let parsed = Cli::try_parse_from([
            "farmer-ingest",
            "load",
            "--input",
            "farmers.xlsx",
            "--duplicate-policy",
            "newest",
        ]);
        assert!(parsed.is_err());
    }
}
