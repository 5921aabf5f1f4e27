//! Configuration types for the OCR/chat and table-extraction services.
//!
//! Each service is controlled by one struct ([`OcrServiceConfig`],
//! [`TableServiceConfig`]) built via its builder. The binaries fill the
//! builders from CLI flags and environment variables; tests fill them
//! directly. Everything a handler needs at request time hangs off the
//! config, so nothing is read from the environment after startup.

use crate::error::ServiceError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

const MIB: u64 = 1024 * 1024;

/// Default chat model when `MISTRAL_MODEL` is not set.
pub const DEFAULT_CHAT_MODEL: &str = "mistral-small-2501";

/// Default OCR model.
pub const DEFAULT_OCR_MODEL: &str = "mistral-ocr-latest";

/// Default hosted API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai";

// ── Upload limits ─────────────────────────────────────────────────────────

/// Limits applied by the bounded upload receiver.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    /// Hard ceiling on cumulative upload bytes. The upload is aborted the
    /// moment this is exceeded.
    pub max_bytes: u64,

    /// Size of the write buffer between the request body and the temp file.
    /// Default: 1 MiB.
    pub chunk_size: usize,

    /// Directory holding per-request temp files. Created at startup.
    pub temp_dir: PathBuf,
}

impl UploadLimits {
    /// The ceiling as shown in error messages: whole megabytes when it is a
    /// multiple of 1 MiB, bytes otherwise.
    pub fn describe_limit(&self) -> String {
        if self.max_bytes >= MIB && self.max_bytes % MIB == 0 {
            format!("{}MB", self.max_bytes / MIB)
        } else {
            format!("{} bytes", self.max_bytes)
        }
    }
}

// ── OCR / chat service ────────────────────────────────────────────────────

/// Configuration for the OCR + chat service.
#[derive(Clone)]
pub struct OcrServiceConfig {
    /// API key for the hosted OCR/LLM API. `None` puts the service in
    /// degraded mode: `/health` says so and processing routes answer 503.
    pub api_key: Option<String>,

    /// Base URL of the hosted API. Default: `https://api.mistral.ai`.
    pub base_url: String,

    /// Chat completion model. Default: `mistral-small-2501`.
    pub chat_model: String,

    /// OCR model. Default: `mistral-ocr-latest`.
    pub ocr_model: String,

    /// Agent identifier. When set, chat requests go to the agent endpoint
    /// with a user turn only; otherwise to the chat endpoint with a system
    /// turn and a user turn.
    pub agent_id: Option<String>,

    /// Upload ceiling (default 50 MiB), buffer size, temp directory.
    pub upload: UploadLimits,

    /// Wall-clock deadline for upload → signed URL → OCR. Default: 600.
    pub ocr_timeout_secs: u64,

    /// Wall-clock deadline for one chat completion. Default: 600.
    pub chat_timeout_secs: u64,

    /// Maximum number of hosted-API jobs in flight at once. Default: 8.
    pub max_concurrent_jobs: usize,

    /// Lifetime of the signed URL handed to the OCR endpoint. Default: 24.
    pub signed_url_expiry_hours: u32,

    /// Delete the uploaded file from the provider after OCR. Default: false.
    pub delete_remote_files: bool,
}

impl Default for OcrServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            ocr_model: DEFAULT_OCR_MODEL.to_string(),
            agent_id: None,
            upload: UploadLimits {
                max_bytes: 50 * MIB,
                chunk_size: MIB as usize,
                temp_dir: PathBuf::from("temp_ocr_files"),
            },
            ocr_timeout_secs: 600,
            chat_timeout_secs: 600,
            max_concurrent_jobs: 8,
            signed_url_expiry_hours: 24,
            delete_remote_files: false,
        }
    }
}

impl fmt::Debug for OcrServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrServiceConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("ocr_model", &self.ocr_model)
            .field("agent_id", &self.agent_id)
            .field("upload", &self.upload)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("chat_timeout_secs", &self.chat_timeout_secs)
            .field("max_concurrent_jobs", &self.max_concurrent_jobs)
            .field("delete_remote_files", &self.delete_remote_files)
            .finish()
    }
}

impl OcrServiceConfig {
    /// Create a new builder for `OcrServiceConfig`.
    pub fn builder() -> OcrServiceConfigBuilder {
        OcrServiceConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`OcrServiceConfig`].
#[derive(Debug)]
pub struct OcrServiceConfigBuilder {
    config: OcrServiceConfig,
}

impl OcrServiceConfigBuilder {
    pub fn api_key(mut self, key: Option<String>) -> Self {
        // An empty key is as good as none.
        self.config.api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.config.chat_model = model.into();
        self
    }

    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = model.into();
        self
    }

    pub fn agent_id(mut self, id: Option<String>) -> Self {
        self.config.agent_id = id.filter(|a| !a.trim().is_empty());
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.upload.max_bytes = bytes;
        self
    }

    pub fn max_upload_mb(self, mb: u64) -> Self {
        self.max_upload_bytes(mb * MIB)
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.upload.chunk_size = n.max(1);
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload.temp_dir = dir.into();
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn chat_timeout_secs(mut self, secs: u64) -> Self {
        self.config.chat_timeout_secs = secs;
        self
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.config.max_concurrent_jobs = n;
        self
    }

    pub fn signed_url_expiry_hours(mut self, hours: u32) -> Self {
        self.config.signed_url_expiry_hours = hours.max(1);
        self
    }

    pub fn delete_remote_files(mut self, v: bool) -> Self {
        self.config.delete_remote_files = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrServiceConfig, ServiceError> {
        let c = &self.config;
        validate_upload(&c.upload)?;
        if c.ocr_timeout_secs == 0 || c.chat_timeout_secs == 0 {
            return Err(ServiceError::InvalidConfig(
                "timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.max_concurrent_jobs == 0 {
            return Err(ServiceError::InvalidConfig(
                "max_concurrent_jobs must be ≥ 1".into(),
            ));
        }
        if !c.base_url.starts_with("http://") && !c.base_url.starts_with("https://") {
            return Err(ServiceError::InvalidConfig(format!(
                "base_url must be an HTTP(S) URL, got '{}'",
                c.base_url
            )));
        }
        Ok(self.config)
    }
}

// ── Table-extraction service ──────────────────────────────────────────────

/// How tables are located on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableStrategy {
    /// Ruling lines and cell borders only.
    Lines,
    /// Text alignment only, for borderless tables.
    Text,
    /// Ruling lines first; text alignment on pages where they find nothing.
    #[default]
    Auto,
}

impl FromStr for TableStrategy {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lines" | "lattice" => Ok(Self::Lines),
            "text" | "stream" => Ok(Self::Text),
            "auto" => Ok(Self::Auto),
            other => Err(ServiceError::InvalidConfig(format!(
                "unknown table strategy '{other}' (expected lines, text or auto)"
            ))),
        }
    }
}

/// Table detection settings.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Default: [`TableStrategy::Auto`].
    pub strategy: TableStrategy,

    /// Fewest rows, header included, for a detected table to be kept.
    /// Default: 2.
    pub min_rows: usize,

    /// Fewest columns for a detected table to be kept. Default: 2.
    pub min_columns: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            strategy: TableStrategy::default(),
            min_rows: 2,
            min_columns: 2,
        }
    }
}

/// Configuration for the table-extraction service.
#[derive(Debug, Clone)]
pub struct TableServiceConfig {
    /// Upload ceiling (default 25 MiB), buffer size, temp directory.
    pub upload: UploadLimits,

    /// Wall-clock deadline for one document's extraction. Default: 600.
    pub timeout_secs: u64,

    /// Maximum number of extraction jobs in flight at once. Default: 4.
    pub max_concurrent_jobs: usize,

    /// Detector and formatter tuning.
    pub detector: DetectorConfig,

    /// Narrowest column width written to a worksheet. Default: 8.43.
    pub min_column_width: f64,

    /// Widest column width written to a worksheet. Default: 70.
    pub max_column_width: f64,
}

impl Default for TableServiceConfig {
    fn default() -> Self {
        Self {
            upload: UploadLimits {
                max_bytes: 25 * MIB,
                chunk_size: MIB as usize,
                temp_dir: PathBuf::from("temp_table_files"),
            },
            timeout_secs: 600,
            max_concurrent_jobs: 4,
            detector: DetectorConfig::default(),
            min_column_width: 8.43,
            max_column_width: 70.0,
        }
    }
}

impl TableServiceConfig {
    /// Create a new builder for `TableServiceConfig`.
    pub fn builder() -> TableServiceConfigBuilder {
        TableServiceConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`TableServiceConfig`].
#[derive(Debug)]
pub struct TableServiceConfigBuilder {
    config: TableServiceConfig,
}

impl TableServiceConfigBuilder {
    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.upload.max_bytes = bytes;
        self
    }

    pub fn max_upload_mb(self, mb: u64) -> Self {
        self.max_upload_bytes(mb * MIB)
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.upload.chunk_size = n.max(1);
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload.temp_dir = dir.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.config.max_concurrent_jobs = n;
        self
    }

    pub fn min_table_rows(mut self, n: usize) -> Self {
        self.config.detector.min_rows = n.max(1);
        self
    }

    pub fn min_table_columns(mut self, n: usize) -> Self {
        self.config.detector.min_columns = n.max(1);
        self
    }

    pub fn table_strategy(mut self, strategy: TableStrategy) -> Self {
        self.config.detector.strategy = strategy;
        self
    }

    pub fn column_width_bounds(mut self, min: f64, max: f64) -> Self {
        self.config.min_column_width = min;
        self.config.max_column_width = max;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TableServiceConfig, ServiceError> {
        let c = &self.config;
        validate_upload(&c.upload)?;
        if c.timeout_secs == 0 {
            return Err(ServiceError::InvalidConfig(
                "timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_concurrent_jobs == 0 {
            return Err(ServiceError::InvalidConfig(
                "max_concurrent_jobs must be ≥ 1".into(),
            ));
        }
        if !(c.min_column_width > 0.0 && c.min_column_width <= c.max_column_width) {
            return Err(ServiceError::InvalidConfig(format!(
                "column width bounds must satisfy 0 < min ≤ max, got {}..{}",
                c.min_column_width, c.max_column_width
            )));
        }
        Ok(self.config)
    }
}

fn validate_upload(upload: &UploadLimits) -> Result<(), ServiceError> {
    if upload.max_bytes == 0 {
        return Err(ServiceError::InvalidConfig(
            "upload ceiling must be ≥ 1 byte".into(),
        ));
    }
    Ok(())
}
