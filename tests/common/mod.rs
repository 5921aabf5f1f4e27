//! Shared fixtures for the integration tests: an in-process `DocumentAi`,
//! a fake hosted API over HTTP, and helpers to serve routers locally.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::{Multipart, Path as UrlPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use docintel::mistral::{ChatMessage, DocumentAi, MistralError, RemoteFile};
use docintel::pipeline::upload::MediaKind;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const API_KEY: &str = "test-key";

// ── Serving ──────────────────────────────────────────────────────────────────

/// Route service logs to the test harness; `RUST_LOG=debug` for detail.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn(app: Router) -> String {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Number of entries in `dir`.
pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// Poll until `dir` is empty; cleanup runs as the handler unwinds, which
/// can land just after the response is flushed.
pub async fn assert_dir_empties(dir: &Path) {
    for _ in 0..50 {
        if entries(dir) == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} still has {} entries", dir.display(), entries(dir));
}

pub fn file_part(bytes: &[u8], name: &str, mime: &str) -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(bytes.to_vec())
        .file_name(name.to_string())
        .mime_str(mime)
        .unwrap()
}

// ── In-process fake ──────────────────────────────────────────────────────────

/// Scriptable `DocumentAi` that records what it was asked.
#[derive(Default)]
pub struct FakeAi {
    pub markdown: String,
    pub answer: String,
    pub ocr_delay: Option<Duration>,
    pub fail_ocr: bool,
    pub calls: Mutex<Vec<String>>,
    pub media: Mutex<Vec<MediaKind>>,
    pub messages: Mutex<Vec<ChatMessage>>,
}

impl FakeAi {
    pub fn new(markdown: &str, answer: &str) -> Self {
        Self {
            markdown: markdown.to_string(),
            answer: answer.to_string(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl DocumentAi for FakeAi {
    async fn upload_file(&self, path: &Path, file_name: &str) -> Result<RemoteFile, MistralError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| MistralError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.record(&format!("upload:{file_name}:{}", bytes.len()));
        Ok(RemoteFile {
            id: "file-1".into(),
            filename: Some(file_name.into()),
            bytes: Some(bytes.len() as u64),
        })
    }

    async fn signed_url(&self, file_id: &str) -> Result<String, MistralError> {
        self.record(&format!("signed_url:{file_id}"));
        Ok(format!("https://signed.example/{file_id}"))
    }

    async fn ocr(&self, url: &str, media: MediaKind) -> Result<String, MistralError> {
        self.record(&format!("ocr:{url}"));
        self.media.lock().unwrap().push(media);
        if let Some(delay) = self.ocr_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_ocr {
            return Err(MistralError::Status {
                endpoint: "ocr".into(),
                status: 401,
                body: "Unauthorized".into(),
            });
        }
        Ok(self.markdown.clone())
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), MistralError> {
        self.record(&format!("delete:{file_id}"));
        Ok(())
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, MistralError> {
        self.record("chat");
        self.messages.lock().unwrap().extend_from_slice(messages);
        Ok(self.answer.clone())
    }

    async fn agent_chat(
        &self,
        agent_id: &str,
        messages: &[ChatMessage],
    ) -> Result<String, MistralError> {
        self.record(&format!("agent:{agent_id}"));
        self.messages.lock().unwrap().extend_from_slice(messages);
        Ok(self.answer.clone())
    }
}

// ── Fake hosted API over HTTP ────────────────────────────────────────────────

/// Every request the fake API saw, as `{"route": ..., "body": ...}`.
#[derive(Clone, Default)]
pub struct ApiLog(pub Arc<Mutex<Vec<Value>>>);

impl ApiLog {
    fn push(&self, route: &str, body: Value) {
        self.0.lock().unwrap().push(json!({ "route": route, "body": body }));
    }

    pub fn routes(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .map(|v| v["route"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn body(&self, route: &str) -> Option<Value> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .find(|v| v["route"] == route)
            .map(|v| v["body"].clone())
    }
}

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn authorise(headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    let expected = format!("Bearer {API_KEY}");
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(v) if v == expected => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Unauthorized" })),
        )),
    }
}

async fn api_upload(State(log): State<ApiLog>, headers: HeaderMap, mut form: Multipart) -> ApiResult {
    authorise(&headers)?;
    let mut purpose = String::new();
    let mut file_name = String::new();
    let mut size = 0usize;
    while let Some(field) = form.next_field().await.unwrap() {
        match field.name() {
            Some("purpose") => purpose = field.text().await.unwrap(),
            Some("file") => {
                file_name = field.file_name().unwrap_or_default().to_string();
                size = field.bytes().await.unwrap().len();
            }
            _ => {}
        }
    }
    log.push(
        "upload",
        json!({ "purpose": purpose, "filename": file_name, "bytes": size }),
    );
    Ok(Json(json!({
        "id": "file-abc",
        "object": "file",
        "bytes": size,
        "filename": file_name,
        "purpose": purpose,
    })))
}

async fn api_signed_url(
    State(log): State<ApiLog>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
    Query(q): Query<HashMap<String, String>>,
) -> ApiResult {
    authorise(&headers)?;
    log.push("signed_url", json!({ "id": id, "expiry": q.get("expiry") }));
    Ok(Json(json!({ "url": format!("https://signed.example/{id}") })))
}

async fn api_ocr(State(log): State<ApiLog>, headers: HeaderMap, Json(body): Json<Value>) -> ApiResult {
    authorise(&headers)?;
    log.push("ocr", body);
    Ok(Json(json!({
        "model": "mistral-ocr-latest",
        "pages": [
            { "index": 1, "markdown": "| Name | Age |\n|---|---|\n| Ann | 31 |\n" },
            { "index": 0, "markdown": "# Report" },
        ],
    })))
}

async fn api_chat(State(log): State<ApiLog>, headers: HeaderMap, Json(body): Json<Value>) -> ApiResult {
    authorise(&headers)?;
    log.push("chat", body);
    Ok(Json(json!({
        "id": "cmpl-1",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": "chat answer" } }],
    })))
}

async fn api_agent(State(log): State<ApiLog>, headers: HeaderMap, Json(body): Json<Value>) -> ApiResult {
    authorise(&headers)?;
    log.push("agent", body);
    Ok(Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": [
            { "type": "text", "text": "agent " },
            { "type": "text", "text": "answer" },
        ] } }],
    })))
}

async fn api_delete(State(log): State<ApiLog>, headers: HeaderMap, UrlPath(id): UrlPath<String>) -> ApiResult {
    authorise(&headers)?;
    log.push("delete", json!({ "id": id }));
    Ok(Json(json!({ "id": id, "deleted": true })))
}

/// Start the fake hosted API; returns its base URL and request log.
pub async fn spawn_fake_api() -> (String, ApiLog) {
    let log = ApiLog::default();
    let app = Router::new()
        .route("/v1/files", post(api_upload))
        .route("/v1/files/:id/url", get(api_signed_url))
        .route("/v1/files/:id", delete(api_delete))
        .route("/v1/ocr", post(api_ocr))
        .route("/v1/chat/completions", post(api_chat))
        .route("/v1/agents/completions", post(api_agent))
        .with_state(log.clone());
    (spawn(app).await, log)
}
