//! Routes of the OCR + chat service.
//!
//! | Route | Method | Reply |
//! |-------|--------|-------|
//! | `/ocr/process` | POST multipart `file` | markdown, `text/plain` |
//! | `/ocr/chat` | POST multipart `file` + `message` | [`ChatReply`] |
//! | `/chat/with-document` | POST JSON [`DocumentChatRequest`] | [`ChatReply`] |
//! | `/health` | GET | [`HealthReport`] |
//! | `/` | GET | [`ServiceInfo`] |

use super::{read_upload_form, HealthReport, ServiceInfo};
use crate::error::ServiceError;
use crate::pipeline::ocr::{ChatReply, OcrPipeline};
use crate::pipeline::upload::{check_allowed, OCR_ALLOWED};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

/// Body of `/chat/with-document`. Missing keys read as empty and are
/// rejected by the handler.
#[derive(Debug, Default, Deserialize)]
pub struct DocumentChatRequest {
    #[serde(default)]
    pub document_text: String,
    #[serde(default)]
    pub user_message: String,
}

pub fn router(pipeline: OcrPipeline) -> Router {
    Router::new()
        .route("/ocr/process", post(process_document))
        .route("/ocr/chat", post(chat_with_upload))
        .route("/chat/with-document", post(chat_with_document))
        .route("/health", get(health))
        .route("/", get(root))
        .layer(DefaultBodyLimit::disable())
        .with_state(pipeline)
}

async fn process_document(
    State(pipeline): State<OcrPipeline>,
    multipart: Multipart,
) -> Result<String, ServiceError> {
    if !pipeline.is_ready() {
        return Err(ServiceError::UpstreamUnavailable);
    }
    let form = read_upload_form(multipart, &pipeline.config().upload, |ct, _| {
        check_allowed(ct, OCR_ALLOWED)
    })
    .await?;
    info!(
        file_name = form.document.file_name(),
        bytes = form.document.size(),
        "processing document"
    );
    pipeline.extract_text(&form.document).await
}

async fn chat_with_upload(
    State(pipeline): State<OcrPipeline>,
    multipart: Multipart,
) -> Result<Json<ChatReply>, ServiceError> {
    if !pipeline.is_ready() {
        return Err(ServiceError::UpstreamUnavailable);
    }
    let form = read_upload_form(multipart, &pipeline.config().upload, |ct, _| {
        check_allowed(ct, OCR_ALLOWED)
    })
    .await?;
    let message = form.field("message")?;
    let reply = pipeline.chat_about_upload(&form.document, message).await?;
    Ok(Json(reply))
}

async fn chat_with_document(
    State(pipeline): State<OcrPipeline>,
    body: Result<Json<DocumentChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ServiceError> {
    let Json(req) = body.map_err(|e| ServiceError::InvalidRequest(e.body_text()))?;
    let reply = pipeline
        .chat_about_text(&req.document_text, &req.user_message)
        .await?;
    Ok(Json(reply))
}

async fn health(State(pipeline): State<OcrPipeline>) -> Json<HealthReport> {
    let status = if pipeline.is_ready() {
        "healthy"
    } else {
        "degraded: Mistral API client not initialized"
    };
    Json(HealthReport {
        status: status.to_string(),
    })
}

async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "Mistral OCR Microservice. POST document to /ocr/process",
    })
}
