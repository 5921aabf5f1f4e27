//! # docintel
//!
//! Two document-intelligence HTTP services in one crate:
//!
//! * **OCR + chat**: upload a PDF or image, have it OCR'd by the hosted
//!   Mistral API, and optionally ask a chat model (or an agent) about it.
//! * **Table extraction**: upload a PDF, get back an XLSX workbook with one
//!   worksheet per table found.
//!
//! ## Pipeline Overview
//!
//! ```text
//! OCR service                          Table service
//!
//! multipart upload                     multipart upload
//!  │                                    │
//!  ├─ 1. Upload   stream to temp file   ├─ 1. Upload   stream to temp file
//!  ├─ 2. OCR      files → URL → OCR     ├─ 2. Layout   pdfplumber pages
//!  ├─ 3. Splice   tables → [TABLE_n]    ├─ 3. Detect   table finder
//!  ├─ 4. Chat     chat or agent         ├─ 4. Format   columns + rows
//!  └─ 5. Reply    text / JSON           └─ 5. Write    normalise → XLSX
//! ```
//!
//! Remote calls and PDF work run on a bounded [`worker::WorkerPool`] under a
//! deadline; a job that overruns is abandoned and the request answers 504.
//! Temp files are deleted on every exit path.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docintel::{server, OcrPipeline, OcrServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OcrServiceConfig::builder()
//!         .api_key(std::env::var("MISTRAL_API_KEY").ok())
//!         .build()?;
//!     let app = server::ocr::router(OcrPipeline::from_config(config)?);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8001").await?;
//!     server::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-service` and `table-service` binaries (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod mistral;
pub mod pipeline;
pub mod prompts;
pub mod server;
pub mod worker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DetectorConfig, OcrServiceConfig, TableServiceConfig, TableStrategy, UploadLimits};
pub use error::{ServiceError, TableError};
pub use mistral::{DocumentAi, MistralClient, MistralError};
pub use pipeline::extract::{ExtractedWorkbook, PageSource, TableExtractor};
pub use pipeline::markdown_tables::{find_first_table, splice_tables, ExtractedTable};
pub use pipeline::normalize::TabularStructure;
pub use pipeline::ocr::{ChatReply, OcrPipeline};
pub use server::tables::TableService;
pub use worker::WorkerPool;
