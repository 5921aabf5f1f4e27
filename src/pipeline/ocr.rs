//! OCR and document chat orchestration.
//!
//! [`OcrPipeline`] is the application-scoped handle the OCR service shares
//! across requests: the optional hosted-API client, the worker pool, and the
//! config. It is built once at startup and cloned into every handler.
//!
//! ```text
//! /ocr/process        upload ─▶ signed URL ─▶ OCR ─▶ markdown
//! /ocr/chat           ...same... ─▶ splice tables ─▶ prompt ─▶ chat/agent
//! /chat/with-document caller text ─▶ prompt ─▶ chat
//! ```
//!
//! Every remote job runs on the [`WorkerPool`] under a deadline. A job that
//! outlives its deadline becomes an orphan; the request answers 504.

use crate::config::OcrServiceConfig;
use crate::error::ServiceError;
use crate::mistral::{ChatMessage, DocumentAi, MistralClient};
use crate::pipeline::markdown_tables::{find_first_table, splice_tables, ExtractedTable};
use crate::pipeline::upload::{MediaKind, UploadedDocument};
use crate::prompts::{document_prompt, DOCUMENT_CHAT_SYSTEM_PROMPT, OCR_CHAT_SYSTEM_PROMPT};
use crate::worker::WorkerPool;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const OCR_STAGE: &str = "OCR processing";
const CHAT_STAGE: &str = "Chat processing";

/// JSON reply of the chat routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    /// The model's answer, verbatim.
    pub response: String,

    /// First pipe table in the answer, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<ExtractedTable>,

    /// Tables spliced out of the OCR text, in document order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_tables: Option<Vec<ExtractedTable>>,
}

impl ChatReply {
    fn from_answer(response: String, ocr_tables: Vec<ExtractedTable>) -> Self {
        let table = find_first_table(&response);
        Self {
            response,
            table,
            ocr_tables: (!ocr_tables.is_empty()).then_some(ocr_tables),
        }
    }
}

/// Shared state of the OCR service.
#[derive(Clone)]
pub struct OcrPipeline {
    config: Arc<OcrServiceConfig>,
    client: Option<Arc<dyn DocumentAi>>,
    pool: WorkerPool,
}

impl OcrPipeline {
    /// Build the pipeline with the production client, or none when no API
    /// key is configured.
    pub fn from_config(config: OcrServiceConfig) -> Result<Self, ServiceError> {
        let client: Option<Arc<dyn DocumentAi>> = match &config.api_key {
            Some(key) => {
                let client = MistralClient::new(
                    key.clone(),
                    config.base_url.clone(),
                    config.ocr_model.clone(),
                    config.chat_model.clone(),
                    config.signed_url_expiry_hours,
                )
                .map_err(|e| ServiceError::InvalidConfig(e.to_string()))?;
                info!(base_url = %config.base_url, "hosted API client initialised");
                Some(Arc::new(client))
            }
            None => {
                warn!("no API key configured; OCR and chat routes will answer 503");
                None
            }
        };
        Ok(Self::new(config, client))
    }

    /// Build the pipeline around an explicit client.
    pub fn new(config: OcrServiceConfig, client: Option<Arc<dyn DocumentAi>>) -> Self {
        let pool = WorkerPool::new(config.max_concurrent_jobs);
        Self {
            config: Arc::new(config),
            client,
            pool,
        }
    }

    pub fn config(&self) -> &OcrServiceConfig {
        &self.config
    }

    /// `true` when a hosted-API client is configured.
    pub fn is_ready(&self) -> bool {
        self.client.is_some()
    }

    fn client(&self) -> Result<Arc<dyn DocumentAi>, ServiceError> {
        self.client.clone().ok_or(ServiceError::UpstreamUnavailable)
    }

    /// OCR an uploaded document and return its markdown.
    pub async fn extract_text(&self, doc: &UploadedDocument) -> Result<String, ServiceError> {
        let client = self.client()?;
        let job = ocr_job(
            client,
            doc.path().to_path_buf(),
            doc.file_name().to_string(),
            doc.media(),
            self.config.delete_remote_files,
        );
        let text = self
            .pool
            .run(
                OCR_STAGE,
                Duration::from_secs(self.config.ocr_timeout_secs),
                job,
            )
            .await?;
        info!(
            file_name = doc.file_name(),
            chars = text.len(),
            "OCR finished"
        );
        Ok(text)
    }

    /// OCR an upload, cut its tables out, and ask a question about it.
    pub async fn chat_about_upload(
        &self,
        doc: &UploadedDocument,
        question: &str,
    ) -> Result<ChatReply, ServiceError> {
        let client = self.client()?;
        let text = self.extract_text(doc).await?;

        let spliced = splice_tables(&text);
        info!(
            file_name = doc.file_name(),
            tables = spliced.tables.len(),
            "spliced OCR tables"
        );
        let prompt = document_prompt(&spliced.text, question, &spliced.tables);
        let answer = self
            .ask(client, self.config.agent_id.clone(), OCR_CHAT_SYSTEM_PROMPT, prompt)
            .await?;
        Ok(ChatReply::from_answer(answer, spliced.tables))
    }

    /// Ask a question about caller-supplied text. Always uses plain chat.
    pub async fn chat_about_text(
        &self,
        document_text: &str,
        question: &str,
    ) -> Result<ChatReply, ServiceError> {
        if document_text.is_empty() {
            return Err(ServiceError::MissingField {
                field: "document_text",
            });
        }
        if question.is_empty() {
            return Err(ServiceError::MissingField {
                field: "user_message",
            });
        }
        let client = self.client()?;
        let prompt = document_prompt(document_text, question, &[]);
        let answer = self
            .ask(client, None, DOCUMENT_CHAT_SYSTEM_PROMPT, prompt)
            .await?;
        Ok(ChatReply::from_answer(answer, Vec::new()))
    }

    async fn ask(
        &self,
        client: Arc<dyn DocumentAi>,
        agent_id: Option<String>,
        system_prompt: &'static str,
        prompt: String,
    ) -> Result<String, ServiceError> {
        let job = async move {
            let result = match agent_id {
                Some(agent) => {
                    client
                        .agent_chat(&agent, &[ChatMessage::user(prompt)])
                        .await
                }
                None => {
                    client
                        .chat(&[
                            ChatMessage::system(system_prompt),
                            ChatMessage::user(prompt),
                        ])
                        .await
                }
            };
            result.map_err(|e| {
                error!(error = %e, kind = e.kind(), "chat completion failed");
                ServiceError::upstream(CHAT_STAGE, &e)
            })
        };
        self.pool
            .run(
                CHAT_STAGE,
                Duration::from_secs(self.config.chat_timeout_secs),
                job,
            )
            .await
    }
}

/// Upload, sign, OCR, and optionally delete the remote copy.
async fn ocr_job(
    client: Arc<dyn DocumentAi>,
    path: PathBuf,
    file_name: String,
    media: MediaKind,
    delete_remote: bool,
) -> Result<String, ServiceError> {
    let fail = |e: crate::mistral::MistralError| {
        error!(file_name = %file_name, error = %e, kind = e.kind(), "OCR failed");
        ServiceError::upstream(OCR_STAGE, &e)
    };

    let remote = client.upload_file(&path, &file_name).await.map_err(fail)?;
    info!(file_name = %file_name, file_id = %remote.id, "uploaded to hosted API");

    let result = match client.signed_url(&remote.id).await {
        Ok(url) => client.ocr(&url, media).await,
        Err(e) => Err(e),
    };

    if delete_remote {
        if let Err(e) = client.delete_file(&remote.id).await {
            warn!(file_id = %remote.id, error = %e, "failed to delete remote file");
        }
    }

    result.map_err(fail)
}
