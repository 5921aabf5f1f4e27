//! Error types for the docintel services.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ServiceError`]: **Fatal** for one request: the upload was rejected,
//!   the hosted API failed, or the deadline elapsed. Every variant maps to
//!   exactly one HTTP status and is returned to the caller verbatim.
//!
//! * [`TableError`]: **Non-fatal**: a single page or detected table could
//!   not be turned into a table. The extraction pipeline logs it and moves on
//!   so one bad table never costs the caller the whole workbook.
//!
//! Remote-API failures keep the name of the underlying error kind
//! ([`crate::mistral::MistralError::kind`]) so the 500 detail string is
//! useful for diagnostics without inventing structured error codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// All fatal errors a request handler can return.
#[derive(Debug, Error)]
pub enum ServiceError {
    // ── Validation ────────────────────────────────────────────────────────
    /// The multipart body had no `file` part, or the part had no filename.
    #[error("Invalid input: No file provided.")]
    MissingFile,

    /// A required form or JSON field was absent or empty.
    #[error("Missing {field} in request")]
    MissingField { field: &'static str },

    /// The body could not be parsed (bad multipart framing, bad JSON).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The table service only accepts PDFs.
    #[error("File must be a PDF")]
    NotAPdf,

    /// The declared content type is not on the allow-list.
    #[error("Unsupported file type: {content_type}. Allowed types: {allowed}")]
    UnsupportedMediaType { content_type: String, allowed: String },

    /// Cumulative upload size crossed the configured ceiling.
    #[error("File too large: Exceeds limit of {limit}")]
    PayloadTooLarge { limit: String },

    // ── Upstream ──────────────────────────────────────────────────────────
    /// The hosted API client was never configured (no API key).
    #[error("Mistral client not initialized. Check API key.")]
    UpstreamUnavailable,

    /// The hosted API returned an error or an unusable response.
    #[error("{stage} failed: ({kind}) {message}")]
    Upstream {
        stage: &'static str,
        kind: String,
        message: String,
    },

    // ── Scheduling ────────────────────────────────────────────────────────
    /// The worker did not finish before its deadline. The worker itself is
    /// abandoned, not cancelled.
    #[error("{operation} timed out after {secs} seconds.")]
    Timeout { operation: &'static str, secs: u64 },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (I/O on the temp dir, panicked worker, ...).
    #[error("An unexpected server error occurred: {0}")]
    Internal(String),

    /// Configuration rejected by a builder.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ServiceError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::MissingFile
            | ServiceError::MissingField { .. }
            | ServiceError::InvalidRequest(_)
            | ServiceError::NotAPdf => StatusCode::BAD_REQUEST,
            ServiceError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ServiceError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Upstream { .. }
            | ServiceError::Internal(_)
            | ServiceError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wrap a hosted-API failure, keeping its kind name for the detail string.
    pub fn upstream(stage: &'static str, err: &crate::mistral::MistralError) -> Self {
        ServiceError::Upstream {
            stage,
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        ServiceError::Internal(e.to_string())
    }
}

/// JSON body carried by every error response.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// A non-fatal error for a single page or detected table.
///
/// Logged by the extraction pipeline; never propagated to the caller.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum TableError {
    /// The page could not be parsed.
    #[error("Page {page}: could not be read: {detail}")]
    PageFailed { page: usize, detail: String },

    /// The detector failed on a page.
    #[error("Page {page}: table detection failed: {detail}")]
    DetectionFailed { page: usize, detail: String },

    /// A detected table could not be structured or written.
    #[error("Page {page}, table {table}: formatting failed: {detail}")]
    FormattingFailed {
        page: usize,
        table: usize,
        detail: String,
    },
}
