//! Routes of the table-extraction service.
//!
//! `POST /extract-tables` takes a multipart PDF and answers with an XLSX
//! attachment named `extracted_<stem>.xlsx`.

use super::{read_upload_form, HealthReport, ServiceInfo};
use crate::config::TableServiceConfig;
use crate::error::ServiceError;
use crate::pipeline::extract::TableExtractor;
use crate::pipeline::upload::check_pdf;
use crate::pipeline::workbook::XLSX_MEDIA_TYPE;
use crate::worker::WorkerPool;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const EXTRACTION: &str = "Table extraction";

/// Shared state of the table service.
#[derive(Clone)]
pub struct TableService {
    config: Arc<TableServiceConfig>,
    extractor: TableExtractor,
    pool: WorkerPool,
}

impl TableService {
    pub fn new(config: TableServiceConfig, extractor: TableExtractor) -> Self {
        let pool = WorkerPool::new(config.max_concurrent_jobs);
        Self {
            config: Arc::new(config),
            extractor,
            pool,
        }
    }

    /// Service backed by pdfplumber and the default detector.
    pub fn from_config(config: TableServiceConfig) -> Self {
        let extractor = TableExtractor::from_config(&config);
        Self::new(config, extractor)
    }
}

pub fn router(service: TableService) -> Router {
    Router::new()
        .route("/extract-tables", post(extract_tables))
        .route("/health", get(health))
        .route("/", get(root))
        .layer(DefaultBodyLimit::disable())
        .with_state(service)
}

/// `report.pdf` → `extracted_report.xlsx`
pub fn output_file_name(upload_name: &str) -> String {
    let stem = Path::new(upload_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("tables");
    let safe: String = stem
        .chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect();
    format!("extracted_{safe}.xlsx")
}

async fn extract_tables(
    State(service): State<TableService>,
    multipart: Multipart,
) -> Result<Response, ServiceError> {
    let form = read_upload_form(multipart, &service.config.upload, check_pdf).await?;
    let doc = form.document;
    info!(file_name = doc.file_name(), bytes = doc.size(), "extracting tables");

    let extractor = service.extractor.clone();
    let path = doc.path().to_path_buf();
    let out = service
        .pool
        .run_blocking(
            EXTRACTION,
            Duration::from_secs(service.config.timeout_secs),
            move || extractor.extract(&path),
        )
        .await?;

    let disposition = format!("attachment; filename=\"{}\"", output_file_name(doc.file_name()));
    Ok((
        [
            (header::CONTENT_TYPE, XLSX_MEDIA_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        out.bytes,
    )
        .into_response())
}

async fn health() -> Json<HealthReport> {
    Json(HealthReport {
        status: "healthy".to_string(),
    })
}

async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "Table Extraction Service. POST PDF to /extract-tables endpoint",
    })
}
