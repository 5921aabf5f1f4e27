//! Pipeline stages of both services.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! OCR:    upload ──▶ ocr ──▶ markdown_tables ──▶ (chat)
//! Tables: upload ──▶ layout ──▶ detect ──▶ extract ──▶ normalize ──▶ workbook
//! ```
//!
//! 1. [`upload`]: stream a multipart file to a temp file under a byte
//!    ceiling; resolve its media type
//! 2. [`ocr`]: hosted OCR and chat, run on the worker pool
//! 3. [`markdown_tables`]: parse pipe tables, splice them out of OCR text
//! 4. [`layout`]: parse pages with pdfplumber (blocking)
//! 5. [`detect`]: find tables on a page and structure them into rows
//! 6. [`extract`]: drive detection over all pages, skipping failures
//! 7. [`normalize`]: header reconstruction, cell cleanup, column widths
//! 8. [`workbook`]: sheet naming and XLSX serialisation

pub mod detect;
pub mod extract;
pub mod layout;
pub mod markdown_tables;
pub mod normalize;
pub mod ocr;
pub mod upload;
pub mod workbook;
