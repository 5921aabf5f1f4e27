//! HTTP surface of both services.
//!
//! Each service is an axum [`Router`] over its own application-scoped state.
//! Handlers stay thin: read the multipart form, hand the upload to the
//! pipeline, map the outcome. Upload routes disable axum's default body
//! limit; the byte ceiling is enforced while streaming instead.

pub mod ocr;
pub mod tables;

use crate::config::UploadLimits;
use crate::error::ServiceError;
use crate::pipeline::upload::{receive, resolve_content_type, MediaKind, UploadedDocument};
use axum::extract::Multipart;
use axum::Router;
use serde::Serialize;
use std::collections::HashMap;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Multipart field carrying the document.
pub const FILE_FIELD: &str = "file";

/// Per-part header a client may set to hint the media type of a generic
/// octet-stream upload.
pub const FILE_TYPE_HEADER: &str = "x-file-type";

/// `{"status": ...}`
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: String,
}

/// `{"message": ...}`
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub message: &'static str,
}

/// The document plus every text field of a multipart form.
#[derive(Debug)]
pub struct UploadForm {
    pub document: UploadedDocument,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    /// A non-empty text field.
    pub fn field(&self, name: &'static str) -> Result<&str, ServiceError> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ServiceError::MissingField { field: name })
    }
}

/// Read a multipart form, streaming the `file` part to a temp file.
///
/// `accept` sees the effective content type and the filename of the file
/// part and decides whether it is acceptable; it runs before a single byte
/// hits the disk.
pub async fn read_upload_form<A>(
    mut multipart: Multipart,
    limits: &UploadLimits,
    accept: A,
) -> Result<UploadForm, ServiceError>
where
    A: Fn(&str, &str) -> Result<MediaKind, ServiceError>,
{
    let mut document = None;
    let mut fields = HashMap::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        if name != FILE_FIELD {
            let value = field.text().await.map_err(bad_multipart)?;
            debug!(field = %name, "form field received");
            fields.insert(name, value);
            continue;
        }
        if document.is_some() {
            continue;
        }

        let file_name = match field.file_name() {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => return Err(ServiceError::MissingFile),
        };
        let hint = field
            .headers()
            .get(FILE_TYPE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_type = resolve_content_type(field.content_type(), &file_name, hint.as_deref());
        let media = accept(&content_type, &file_name)?;
        info!(file_name = %file_name, content_type = %content_type, "upload accepted");

        document = Some(receive(field, &file_name, media, limits).await?);
    }

    let document = document.ok_or(ServiceError::MissingFile)?;
    Ok(UploadForm { document, fields })
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> ServiceError {
    ServiceError::InvalidRequest(e.body_text())
}

/// Serve `app` until Ctrl-C or SIGTERM.
///
/// In-flight requests are drained; abandoned workers are not waited for.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
