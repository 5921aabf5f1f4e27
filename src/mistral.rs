//! HTTP client for the hosted OCR / LLM API.
//!
//! The services only ever talk to the provider through the [`DocumentAi`]
//! trait: upload a file, mint a signed URL, run OCR on that URL, and ask a
//! chat model or an agent a question. [`MistralClient`] is the production
//! implementation over `reqwest`; tests substitute their own.
//!
//! ## Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | upload    | `POST /v1/files` (multipart: `purpose=ocr`, `file`) |
//! | signed URL| `GET /v1/files/{id}/url?expiry=<hours>` |
//! | OCR       | `POST /v1/ocr` (`document_url` or `image_url`) |
//! | delete    | `DELETE /v1/files/{id}` |
//! | chat      | `POST /v1/chat/completions` |
//! | agent     | `POST /v1/agents/completions` |
//!
//! No retries: every failure surfaces once as a [`MistralError`].

use crate::pipeline::upload::MediaKind;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Longest slice of an error body kept in [`MistralError::Status`].
const MAX_ERROR_BODY: usize = 500;

/// Failures talking to the hosted API.
#[derive(Debug, Error)]
pub enum MistralError {
    /// Connection, TLS, or timeout failure before a response arrived.
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx response (including 401/403 for a bad key).
    #[error("HTTP {status} from {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// 2xx response whose body did not match the expected shape.
    #[error("could not decode response from {endpoint}: {detail}")]
    Decode { endpoint: String, detail: String },

    /// The local file to upload could not be read.
    #[error("could not read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A well-formed response with nothing in it.
    #[error("{endpoint} returned no content")]
    EmptyResponse { endpoint: String },
}

impl MistralError {
    /// Short type name embedded in 500 details.
    pub fn kind(&self) -> &'static str {
        match self {
            MistralError::Transport { .. } => "Transport",
            MistralError::Status { .. } => "Status",
            MistralError::Decode { .. } => "Decode",
            MistralError::Io { .. } => "Io",
            MistralError::EmptyResponse { .. } => "EmptyResponse",
        }
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

/// Chat roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// File record returned by the upload endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub bytes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SignedUrl {
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OcrDocument {
    DocumentUrl { document_url: String },
    ImageUrl { image_url: String },
}

#[derive(Debug, Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: OcrDocument,
    include_image_base64: bool,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    pages: Vec<OcrPage>,
}

#[derive(Debug, Deserialize)]
struct OcrPage {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    markdown: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Serialize)]
struct AgentRequest<'a> {
    agent_id: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: serde_json::Value,
}

// ── Trait ────────────────────────────────────────────────────────────────

/// The operations the services need from the hosted API.
#[async_trait]
pub trait DocumentAi: Send + Sync {
    /// Upload a local file for OCR.
    async fn upload_file(&self, path: &Path, file_name: &str) -> Result<RemoteFile, MistralError>;

    /// Mint a time-limited URL for an uploaded file.
    async fn signed_url(&self, file_id: &str) -> Result<String, MistralError>;

    /// Run OCR on a signed URL and return the extracted markdown.
    async fn ocr(&self, url: &str, media: MediaKind) -> Result<String, MistralError>;

    /// Delete an uploaded file.
    async fn delete_file(&self, file_id: &str) -> Result<(), MistralError>;

    /// Plain chat completion; returns the assistant's text.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, MistralError>;

    /// Agent completion; returns the assistant's text.
    async fn agent_chat(
        &self,
        agent_id: &str,
        messages: &[ChatMessage],
    ) -> Result<String, MistralError>;
}

// ── Client ───────────────────────────────────────────────────────────────

/// `reqwest`-backed [`DocumentAi`] for the Mistral API.
#[derive(Clone)]
pub struct MistralClient {
    http: Client,
    api_key: String,
    base_url: String,
    ocr_model: String,
    chat_model: String,
    signed_url_expiry_hours: u32,
}

impl fmt::Debug for MistralClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MistralClient")
            .field("base_url", &self.base_url)
            .field("ocr_model", &self.ocr_model)
            .field("chat_model", &self.chat_model)
            .finish()
    }
}

impl MistralClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        ocr_model: impl Into<String>,
        chat_model: impl Into<String>,
        signed_url_expiry_hours: u32,
    ) -> Result<Self, MistralError> {
        let http = Client::builder()
            .user_agent(concat!("docintel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| MistralError::Transport {
                endpoint: "client".into(),
                source,
            })?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ocr_model: ocr_model.into(),
            chat_model: chat_model.into(),
            signed_url_expiry_hours,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, endpoint: &str, req: RequestBuilder) -> Result<reqwest::Response, MistralError> {
        let resp = req
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|source| MistralError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MistralError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }
        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        req: RequestBuilder,
    ) -> Result<T, MistralError> {
        let resp = self.send(endpoint, req).await?;
        let bytes = resp.bytes().await.map_err(|source| MistralError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| MistralError::Decode {
            endpoint: endpoint.to_string(),
            detail: e.to_string(),
        })
    }

    async fn complete(
        &self,
        endpoint: &str,
        req: RequestBuilder,
    ) -> Result<String, MistralError> {
        let resp: ChatResponse = self.send_json(endpoint, req).await?;
        resp.choices
            .into_iter()
            .next()
            .and_then(|c| message_text(&c.message.content))
            .ok_or_else(|| MistralError::EmptyResponse {
                endpoint: endpoint.to_string(),
            })
    }
}

#[async_trait]
impl DocumentAi for MistralClient {
    async fn upload_file(&self, path: &Path, file_name: &str) -> Result<RemoteFile, MistralError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| MistralError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(file_name, bytes = bytes.len(), "uploading to files API");

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new()
            .text("purpose", "ocr")
            .part("file", part);

        self.send_json("files", self.http.post(self.url("/v1/files")).multipart(form))
            .await
    }

    async fn signed_url(&self, file_id: &str) -> Result<String, MistralError> {
        let req = self
            .http
            .get(self.url(&format!("/v1/files/{file_id}/url")))
            .query(&[("expiry", self.signed_url_expiry_hours)]);
        let signed: SignedUrl = self.send_json("files/url", req).await?;
        Ok(signed.url)
    }

    async fn ocr(&self, url: &str, media: MediaKind) -> Result<String, MistralError> {
        let document = if media.is_image() {
            OcrDocument::ImageUrl {
                image_url: url.to_string(),
            }
        } else {
            OcrDocument::DocumentUrl {
                document_url: url.to_string(),
            }
        };
        let body = OcrRequest {
            model: &self.ocr_model,
            document,
            include_image_base64: false,
        };
        let resp: OcrResponse = self
            .send_json("ocr", self.http.post(self.url("/v1/ocr")).json(&body))
            .await?;
        if resp.pages.is_empty() {
            return Err(MistralError::EmptyResponse {
                endpoint: "ocr".into(),
            });
        }
        Ok(join_pages(resp.pages))
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), MistralError> {
        self.send(
            "files/delete",
            self.http.delete(self.url(&format!("/v1/files/{file_id}"))),
        )
        .await?;
        Ok(())
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, MistralError> {
        let body = ChatRequest {
            model: &self.chat_model,
            messages,
        };
        self.complete(
            "chat/completions",
            self.http.post(self.url("/v1/chat/completions")).json(&body),
        )
        .await
    }

    async fn agent_chat(
        &self,
        agent_id: &str,
        messages: &[ChatMessage],
    ) -> Result<String, MistralError> {
        let body = AgentRequest { agent_id, messages };
        self.complete(
            "agents/completions",
            self.http.post(self.url("/v1/agents/completions")).json(&body),
        )
        .await
    }
}

/// Page markdown in page order, separated by a blank line.
fn join_pages(mut pages: Vec<OcrPage>) -> String {
    pages.sort_by_key(|p| p.index);
    pages
        .into_iter()
        .map(|p| p.markdown)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Assistant content is either a string or a list of typed chunks.
fn message_text(content: &serde_json::Value) -> Option<String> {
    match content {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(chunks) => {
            let text: String = chunks
                .iter()
                .filter_map(|c| c.get("text").and_then(|t| t.as_str()))
                .collect();
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        }
        _ => None,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\u{2026}", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ocr_document_serialises_tagged() {
        let doc = OcrDocument::DocumentUrl {
            document_url: "https://x/y".into(),
        };
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({"type": "document_url", "document_url": "https://x/y"})
        );
        let img = OcrDocument::ImageUrl {
            image_url: "https://x/z".into(),
        };
        assert_eq!(serde_json::to_value(&img).unwrap()["type"], "image_url");
    }

    #[test]
    fn chat_message_roles_are_lowercase() {
        let v = serde_json::to_value(ChatMessage::system("s")).unwrap();
        assert_eq!(v, json!({"role": "system", "content": "s"}));
    }

    #[test]
    fn pages_join_in_index_order() {
        let pages = vec![
            OcrPage {
                index: 1,
                markdown: "second".into(),
            },
            OcrPage {
                index: 0,
                markdown: "first".into(),
            },
        ];
        assert_eq!(join_pages(pages), "first\n\nsecond");
    }

    #[test]
    fn message_text_accepts_string_and_chunks() {
        assert_eq!(message_text(&json!("hi")).as_deref(), Some("hi"));
        assert_eq!(
            message_text(&json!([{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]))
                .as_deref(),
            Some("ab")
        );
        assert_eq!(message_text(&json!(null)), None);
        assert_eq!(message_text(&json!([])), None);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        let t = truncate("ääää", 3);
        assert_eq!(t, "ä\u{2026}");
    }

    #[test]
    fn error_kinds() {
        let e = MistralError::Status {
            endpoint: "ocr".into(),
            status: 401,
            body: "Unauthorized".into(),
        };
        assert_eq!(e.kind(), "Status");
        assert_eq!(e.to_string(), "HTTP 401 from ocr: Unauthorized");
        assert_eq!(
            MistralError::EmptyResponse {
                endpoint: "chat".into()
            }
            .kind(),
            "EmptyResponse"
        );
    }
}
