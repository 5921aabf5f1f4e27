//! PDF table-extraction HTTP service.
//!
//! Maps CLI flags and environment variables to `TableServiceConfig` and
//! serves the router.

use anyhow::{Context, Result};
use clap::Parser;
use docintel::pipeline::upload::ensure_temp_dir;
use docintel::server::tables::{self, TableService};
use docintel::server::serve;
use docintel::{TableServiceConfig, TableStrategy};
use std::io;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "table-service",
    version,
    about = "Extract tables from PDFs into XLSX workbooks"
)]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind.
    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// Upload ceiling in megabytes.
    #[arg(long, env = "TABLES_MAX_UPLOAD_MB", default_value_t = 25)]
    max_upload_mb: u64,

    /// Deadline for one document, in seconds.
    #[arg(long, env = "TABLES_TIMEOUT_SECS", default_value_t = 600)]
    timeout_secs: u64,

    /// Directory for per-request temp files.
    #[arg(long, env = "TABLES_TEMP_DIR", default_value = "temp_table_files")]
    temp_dir: PathBuf,

    /// Extraction jobs in flight at once.
    #[arg(long, env = "TABLES_MAX_CONCURRENT_JOBS", default_value_t = 4)]
    max_concurrent_jobs: usize,

    /// How tables are found: lines, text or auto.
    #[arg(long, env = "TABLES_STRATEGY", default_value = "auto")]
    table_strategy: TableStrategy,

    /// Fewest rows, header included, that count as a table.
    #[arg(long, env = "TABLES_MIN_ROWS", default_value_t = 2)]
    min_table_rows: usize,

    /// Fewest columns that count as a table.
    #[arg(long, env = "TABLES_MIN_COLUMNS", default_value_t = 2)]
    min_table_columns: usize,

    /// Log level when RUST_LOG is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let result = runtime.block_on(run(cli));
    // A timed-out extraction may still hold a blocking thread.
    runtime.shutdown_background();
    result
}

async fn run(cli: Cli) -> Result<()> {
    let temp_dir = ensure_temp_dir(&cli.temp_dir)
        .with_context(|| format!("Failed to create temp dir {}", cli.temp_dir.display()))?;

    let config = TableServiceConfig::builder()
        .max_upload_mb(cli.max_upload_mb)
        .temp_dir(temp_dir)
        .timeout_secs(cli.timeout_secs)
        .max_concurrent_jobs(cli.max_concurrent_jobs)
        .table_strategy(cli.table_strategy)
        .min_table_rows(cli.min_table_rows)
        .min_table_columns(cli.min_table_columns)
        .build()
        .context("Invalid configuration")?;
    info!(?config, "starting table service");

    let service = TableService::from_config(config);
    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    serve(listener, tables::router(service))
        .await
        .context("Server error")?;
    info!("table service stopped");
    Ok(())
}
