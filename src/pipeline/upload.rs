//! Bounded upload receiver: stream one multipart file to a temp file.
//!
//! ## Why a temp file?
//!
//! Both downstream consumers want a path: the hosted OCR upload reads the
//! file back, and the PDF parser opens documents by path. Streaming to disk keeps a 50 MB upload from sitting in
//! memory while we wait on a remote API.
//!
//! ## Lifetime
//!
//! [`UploadedDocument`] owns its temp file. It is deleted exactly once:
//! immediately when the ceiling is crossed mid-stream, otherwise when the
//! document is dropped at the end of the request (success, validation
//! failure, processing failure or timeout alike). Deletion failures are
//! logged and never reach the caller.

use crate::config::UploadLimits;
use crate::error::ServiceError;
use futures::{Stream, StreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{error, info, warn};

/// Media types the services know how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Pdf,
    Jpeg,
    Png,
}

impl MediaKind {
    /// Canonical MIME type.
    pub fn mime(&self) -> &'static str {
        match self {
            MediaKind::Pdf => "application/pdf",
            MediaKind::Jpeg => "image/jpeg",
            MediaKind::Png => "image/png",
        }
    }

    /// Parse a MIME type, ignoring parameters and case.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match normalise_mime(mime).as_str() {
            "application/pdf" => Some(MediaKind::Pdf),
            "image/jpeg" | "image/jpg" => Some(MediaKind::Jpeg),
            "image/png" => Some(MediaKind::Png),
            _ => None,
        }
    }

    /// Guess from the filename extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".pdf") {
            Some(MediaKind::Pdf)
        } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
            Some(MediaKind::Jpeg)
        } else if lower.ends_with(".png") {
            Some(MediaKind::Png)
        } else {
            None
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, MediaKind::Jpeg | MediaKind::Png)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// Everything the OCR service accepts.
pub const OCR_ALLOWED: &[MediaKind] = &[MediaKind::Pdf, MediaKind::Jpeg, MediaKind::Png];

const OCTET_STREAM: &str = "application/octet-stream";

fn normalise_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Work out the effective content type of an upload.
///
/// The declared type wins unless it is the generic octet-stream (or absent).
/// In that case the filename extension or the client's `X-File-Type` hint
/// decides, checked in the order PDF, JPEG, PNG. Otherwise the declared type
/// is returned unchanged for the caller to reject.
pub fn resolve_content_type(declared: Option<&str>, file_name: &str, hint: Option<&str>) -> String {
    let declared = declared
        .map(normalise_mime)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| OCTET_STREAM.to_string());
    if declared != OCTET_STREAM {
        return declared;
    }

    let by_name = MediaKind::from_file_name(file_name);
    let by_hint = hint.and_then(MediaKind::from_mime);
    for kind in [MediaKind::Pdf, MediaKind::Jpeg, MediaKind::Png] {
        if by_name == Some(kind) || by_hint == Some(kind) {
            info!(
                file_name,
                resolved = kind.mime(),
                "treating octet-stream upload by extension/type hint"
            );
            return kind.mime().to_string();
        }
    }
    declared
}

/// Check an effective content type against an allow-list.
pub fn check_allowed(content_type: &str, allowed: &[MediaKind]) -> Result<MediaKind, ServiceError> {
    match MediaKind::from_mime(content_type) {
        Some(kind) if allowed.contains(&kind) => Ok(kind),
        _ => Err(ServiceError::UnsupportedMediaType {
            content_type: content_type.to_string(),
            allowed: allowed
                .iter()
                .map(|k| k.mime())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Accept a PDF named `*.pdf` or typed as a PDF; either is enough.
pub fn check_pdf(content_type: &str, file_name: &str) -> Result<MediaKind, ServiceError> {
    if MediaKind::from_mime(content_type) == Some(MediaKind::Pdf)
        || MediaKind::from_file_name(file_name) == Some(MediaKind::Pdf)
    {
        Ok(MediaKind::Pdf)
    } else {
        Err(ServiceError::NotAPdf)
    }
}

/// A file received over HTTP and persisted to a per-request temp file.
#[derive(Debug)]
pub struct UploadedDocument {
    file_name: String,
    media: MediaKind,
    size: u64,
    path: Option<TempPath>,
}

impl UploadedDocument {
    /// Original client-side filename.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn media(&self) -> MediaKind {
        self.media
    }

    /// Bytes written.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Location of the temp file. Valid until the document is dropped.
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Delete the temp file now.
    pub fn cleanup(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        let Some(temp) = self.path.take() else {
            return;
        };
        let shown = temp.to_path_buf();
        match temp.close() {
            Ok(()) => info!(path = %shown.display(), "temporary file removed"),
            Err(e) => error!(
                path = %shown.display(),
                error = %e,
                "CRITICAL: failed to remove temporary file"
            ),
        }
    }
}

impl Drop for UploadedDocument {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Keep the tail of a client filename safe to embed in a temp file name.
fn sanitise_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let tail: Vec<char> = cleaned.chars().collect();
    let start = tail.len().saturating_sub(64);
    tail[start..].iter().collect()
}

/// Create the temp directory if needed. Called once at startup.
pub fn ensure_temp_dir(dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    info!(dir = %dir.display(), "temporary directory ready");
    Ok(dir.to_path_buf())
}

/// Stream an upload body into a fresh temp file, enforcing the ceiling.
///
/// `chunks` is any byte-chunk stream (an axum multipart field in the
/// services). The moment the cumulative size exceeds `limits.max_bytes` the
/// partial file is deleted and [`ServiceError::PayloadTooLarge`] returned.
pub async fn receive<S, B, E>(
    chunks: S,
    file_name: &str,
    media: MediaKind,
    limits: &UploadLimits,
) -> Result<UploadedDocument, ServiceError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let named = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&format!("_{}", sanitise_file_name(file_name)))
        .tempfile_in(&limits.temp_dir)?;
    let (file, temp_path) = named.into_parts();
    info!(
        file_name,
        path = %temp_path.display(),
        "receiving upload"
    );

    let mut doc = UploadedDocument {
        file_name: file_name.to_string(),
        media,
        size: 0,
        path: Some(temp_path),
    };

    let mut writer = BufWriter::with_capacity(limits.chunk_size, tokio::fs::File::from_std(file));
    let mut chunks = std::pin::pin!(chunks);

    while let Some(chunk) = chunks.next().await {
        let chunk =
            chunk.map_err(|e| ServiceError::InvalidRequest(format!("upload interrupted: {e}")))?;
        let bytes = chunk.as_ref();
        doc.size += bytes.len() as u64;

        if doc.size > limits.max_bytes {
            warn!(
                file_name,
                limit = %limits.describe_limit(),
                "upload rejected: size exceeds limit"
            );
            drop(writer);
            doc.cleanup();
            return Err(ServiceError::PayloadTooLarge {
                limit: limits.describe_limit(),
            });
        }
        writer.write_all(bytes).await?;
    }
    writer.flush().await?;

    info!(
        file_name,
        size_mb = %format!("{:.2}", doc.size as f64 / (1024.0 * 1024.0)),
        "finished writing upload"
    );
    Ok(doc)
}
