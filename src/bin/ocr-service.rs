//! OCR + chat HTTP service.
//!
//! A thin shim over the library crate: maps CLI flags and environment
//! variables to `OcrServiceConfig` and serves the router.

use anyhow::{Context, Result};
use clap::Parser;
use docintel::pipeline::upload::ensure_temp_dir;
use docintel::server::{ocr, serve};
use docintel::{OcrPipeline, OcrServiceConfig};
use std::io;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "ocr-service",
    version,
    about = "OCR documents through the hosted Mistral API and chat about them"
)]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind.
    #[arg(long, env = "PORT", default_value_t = 8001)]
    port: u16,

    /// API key. Without it the service starts degraded.
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Chat model.
    #[arg(long, env = "MISTRAL_MODEL", default_value = docintel::config::DEFAULT_CHAT_MODEL)]
    model: String,

    /// Agent to route OCR chat through instead of the chat model.
    #[arg(long, env = "MISTRAL_AGENT_ID")]
    agent_id: Option<String>,

    /// OCR model.
    #[arg(long, env = "MISTRAL_OCR_MODEL", default_value = docintel::config::DEFAULT_OCR_MODEL)]
    ocr_model: String,

    /// Base URL of the hosted API.
    #[arg(long, env = "MISTRAL_BASE_URL", default_value = docintel::config::DEFAULT_BASE_URL)]
    base_url: String,

    /// Upload ceiling in megabytes.
    #[arg(long, env = "OCR_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: u64,

    /// Deadline for upload, signed URL and OCR, in seconds.
    #[arg(long, env = "OCR_TIMEOUT_SECS", default_value_t = 600)]
    ocr_timeout_secs: u64,

    /// Deadline for one chat completion, in seconds.
    #[arg(long, env = "CHAT_TIMEOUT_SECS", default_value_t = 600)]
    chat_timeout_secs: u64,

    /// Directory for per-request temp files.
    #[arg(long, env = "OCR_TEMP_DIR", default_value = "temp_ocr_files")]
    temp_dir: PathBuf,

    /// Hosted-API jobs in flight at once.
    #[arg(long, env = "OCR_MAX_CONCURRENT_JOBS", default_value_t = 8)]
    max_concurrent_jobs: usize,

    /// Lifetime of signed URLs, in hours.
    #[arg(long, env = "OCR_SIGNED_URL_EXPIRY_HOURS", default_value_t = 24)]
    signed_url_expiry_hours: u32,

    /// Delete uploaded files from the provider after OCR.
    #[arg(long, env = "OCR_DELETE_REMOTE_FILES")]
    delete_remote_files: bool,

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
    // Abandoned OCR jobs are not waited for.
    runtime.shutdown_background();
    result
}

async fn run(cli: Cli) -> Result<()> {
    let temp_dir = ensure_temp_dir(&cli.temp_dir)
        .with_context(|| format!("Failed to create temp dir {}", cli.temp_dir.display()))?;

    let config = OcrServiceConfig::builder()
        .api_key(cli.api_key)
        .base_url(cli.base_url)
        .chat_model(cli.model)
        .ocr_model(cli.ocr_model)
        .agent_id(cli.agent_id)
        .max_upload_mb(cli.max_upload_mb)
        .temp_dir(temp_dir)
        .ocr_timeout_secs(cli.ocr_timeout_secs)
        .chat_timeout_secs(cli.chat_timeout_secs)
        .max_concurrent_jobs(cli.max_concurrent_jobs)
        .signed_url_expiry_hours(cli.signed_url_expiry_hours)
        .delete_remote_files(cli.delete_remote_files)
        .build()
        .context("Invalid configuration")?;
    info!(?config, "starting OCR service");

    let pipeline = OcrPipeline::from_config(config).context("Failed to build OCR pipeline")?;
    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    serve(listener, ocr::router(pipeline))
        .await
        .context("Server error")?;
    info!("OCR service stopped");
    Ok(())
}
