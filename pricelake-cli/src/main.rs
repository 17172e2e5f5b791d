//! pricelake CLI: daily ingestion, partition listing, and Postgres commands.
//!
//! Commands:
//! - `ingest`: run the daily workflow: fetch every ticker, write raw partitions
//! - `partitions`: list partitions already written for a source
//! - `db query`: run a read statement and print the result
//! - `db exec`: run a write/DDL statement and print the affected row count
//! - `db load`: replace a table with the contents of a Parquet file
//! - `db drop`: drop a table if it exists
//!
//! A `.env` file in the working directory is loaded before anything else,
//! so `POSTGRES_*` settings can live there.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use polars::prelude::DataFrame;
use pricelake_core::config::PipelineConfig;
use pricelake_core::data::partition::read_parquet;
use pricelake_core::data::{PartitionWriter, YahooProvider};
use pricelake_core::db::{DbConfig, Gateway, SqlParam};
use pricelake_core::pipeline::{run_ingest, LogProgress, RunReport, TaskOutcome};
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pricelake",
    about = "pricelake: daily market-price ingestion into a raw Parquet lake"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every configured ticker and write today's raw partitions.
    Ingest {
        /// Path to a TOML workflow config. Built-in defaults when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Tickers to ingest, overriding the config (e.g., VOO VT).
        tickers: Vec<String>,

        /// Start date (YYYY-MM-DD), overriding the config.
        #[arg(long)]
        start: Option<String>,

        /// Base directory of the lake, overriding the config.
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Keep unadjusted OHLC and add an `adj_close` column.
        #[arg(long, default_value_t = false)]
        no_adjust: bool,

        /// Run ticker tasks in parallel.
        #[arg(long, default_value_t = false)]
        parallel: bool,

        /// Also write the run report JSON to this file.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// List partitions written for a source.
    Partitions {
        /// Source name, e.g. yfinance.
        #[arg(long, default_value = YahooProvider::NAME)]
        source: String,

        /// Base directory of the lake.
        #[arg(long, default_value = pricelake_core::data::DEFAULT_BASE_DIR)]
        base_dir: PathBuf,
    },
    /// Postgres gateway commands (connection from POSTGRES_* variables).
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

#[derive(Subcommand)]
enum DbAction {
    /// Run a read statement and print the result table.
    Query {
        sql: String,

        /// Positional parameter for $1, $2, ... (`int:5`, `date:2025-10-01`, `null`, or text).
        #[arg(long = "param", short = 'p')]
        params: Vec<String>,

        /// Print rows as JSON lines instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run a write or DDL statement in a transaction.
    Exec {
        sql: String,

        /// Positional parameter for $1, $2, ...
        #[arg(long = "param", short = 'p')]
        params: Vec<String>,
    },
    /// Replace a table with the contents of a Parquet file.
    Load {
        /// Parquet file to load, e.g. a raw partition.
        path: PathBuf,

        /// Target table: `schema.table` or `table` (default schema).
        #[arg(long)]
        table: String,
    },
    /// Drop a table if it exists (cascades to dependents).
    Drop {
        /// `schema.table` or `table`.
        table: String,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            config,
            tickers,
            start,
            base_dir,
            no_adjust,
            parallel,
            report,
        } => run_ingest_cmd(config, tickers, start, base_dir, no_adjust, parallel, report),
        Commands::Partitions { source, base_dir } => run_partitions(&source, &base_dir),
        Commands::Db { action } => block_on(run_db(action)),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[allow(clippy::too_many_arguments)]
fn run_ingest_cmd(
    config_path: Option<PathBuf>,
    tickers: Vec<String>,
    start: Option<String>,
    base_dir: Option<PathBuf>,
    no_adjust: bool,
    parallel: bool,
    report_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };

    // Command-line overrides
    if !tickers.is_empty() {
        config.workflow.tickers = tickers;
    }
    if let Some(s) = start.as_deref() {
        config.fetch.start_date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --start {s:?}"))?;
    }
    if let Some(dir) = base_dir {
        config.storage.base_dir = dir;
    }
    if no_adjust {
        config.fetch.auto_adjust = false;
    }
    config.validate()?;

    if config.workflow.source != YahooProvider::NAME {
        bail!(
            "unsupported source '{}'. Valid: {}",
            config.workflow.source,
            YahooProvider::NAME
        );
    }

    let provider = YahooProvider::new()?.with_auto_adjust(config.fetch.auto_adjust);
    let writer = PartitionWriter::new(&config.storage.base_dir);

    info!(
        workflow = %config.workflow.id,
        tickers = config.workflow.tickers.len(),
        base_dir = %config.storage.base_dir.display(),
        "starting run"
    );
    let report = run_ingest(&provider, &writer, &config, parallel, &LogProgress);

    let json = serde_json::to_string_pretty(&report)?;
    println!("{json}");
    if let Some(path) = report_path {
        std::fs::write(&path, &json)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }

    print_failures(&report);
    if !report.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_failures(report: &RunReport) {
    for task in &report.tasks {
        if let TaskOutcome::Failed { error } = &task.outcome {
            eprintln!("Error for {}: {error}", task.ticker);
        }
    }
}

fn run_partitions(source: &str, base_dir: &Path) -> Result<()> {
    let writer = PartitionWriter::new(base_dir);
    let keys = writer.list_partitions(source)?;

    if keys.is_empty() {
        println!("No partitions for source '{source}' under {}", base_dir.display());
        return Ok(());
    }

    println!("Lake: {}", base_dir.display());
    println!("{:<12} {:<10} {:<12} {}", "Source", "Asset", "Date", "Path");
    println!("{}", "-".repeat(72));
    for key in &keys {
        println!(
            "{:<12} {:<10} {:<12} {}",
            key.source,
            key.asset,
            key.dt.to_string(),
            writer.path_for(key).display()
        );
    }
    Ok(())
}

/// Run an async command on a fresh multi-threaded runtime.
fn block_on<F: Future<Output = Result<()>>>(fut: F) -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?
        .block_on(fut)
}

async fn run_db(action: DbAction) -> Result<()> {
    let config = DbConfig::from_env()?;
    let gateway = Gateway::connect(&config).await?;
    let result = run_db_action(&gateway, action).await;
    gateway.close().await;
    result
}

async fn run_db_action(gateway: &Gateway, action: DbAction) -> Result<()> {
    match action {
        DbAction::Query { sql, params, json } => {
            let params = parse_params(&params)?;
            let df = gateway.read(&sql, &params).await?;
            if json {
                print_json_rows(&df)?;
            } else {
                println!("{df}");
            }
        }
        DbAction::Exec { sql, params } => {
            let params = parse_params(&params)?;
            let affected = gateway.execute(&sql, &params).await?;
            println!("{affected} row(s) affected");
        }
        DbAction::Load { path, table } => {
            let df = read_parquet(&path)?;
            let rows = gateway.bulk_replace(Some(&df), &table).await?;
            println!("Loaded {rows} row(s) into {}", gateway.qualify(&table)?);
        }
        DbAction::Drop { table } => {
            gateway.delete_table(&table).await?;
            println!("Dropped {}", gateway.qualify(&table)?);
        }
    }
    Ok(())
}

fn parse_params(raw: &[String]) -> Result<Vec<SqlParam>> {
    raw.iter()
        .map(|p| {
            p.parse::<SqlParam>()
                .with_context(|| format!("invalid --param {p:?}"))
        })
        .collect()
}

/// One JSON object per row, keyed by column name.
fn print_json_rows(df: &DataFrame) -> Result<()> {
    let columns = df.get_columns();
    for row in 0..df.height() {
        let mut obj = serde_json::Map::with_capacity(columns.len());
        for column in columns {
            let value = column.get(row)?;
            let json = match value {
                polars::prelude::AnyValue::Null => serde_json::Value::Null,
                polars::prelude::AnyValue::Boolean(b) => serde_json::Value::Bool(b),
                polars::prelude::AnyValue::Int32(v) => v.into(),
                polars::prelude::AnyValue::Int64(v) => v.into(),
                polars::prelude::AnyValue::Float32(v) => serde_json::json!(v),
                polars::prelude::AnyValue::Float64(v) => serde_json::json!(v),
                polars::prelude::AnyValue::String(s) => s.into(),
                other => other.to_string().into(),
            };
            obj.insert(column.name().to_string(), json);
        }
        println!("{}", serde_json::Value::Object(obj));
    }
    Ok(())
}
