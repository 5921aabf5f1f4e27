//! PDF pages read with pdfplumber.
//!
//! Table finding needs both the characters and the painted ruling lines of a
//! page. pdfplumber parses both in pure Rust, so no native library has to be
//! installed next to the service.
//!
//! Everything here is blocking and runs inside the worker pool's
//! `spawn_blocking` job. [`Pdf::open_path`] reads the file into memory and
//! releases the handle before returning, so the upload's temp file can be
//! removed as soon as the job ends, whatever happened on the way.

use crate::error::{ServiceError, TableError};
use pdfplumber::{Page, Pdf};
use std::path::Path;
use tracing::{debug, info};

/// Parse the document at `pdf_path`.
pub fn open_document(pdf_path: &Path) -> Result<Pdf, ServiceError> {
    let pdf = Pdf::open_path(pdf_path, None)
        .map_err(|e| ServiceError::Internal(format!("could not open PDF: {e}")))?;
    info!(pages = pdf.page_count(), "PDF opened for table extraction");
    Ok(pdf)
}

/// Hand every page of `pdf` to `visit`, in order.
///
/// A page that cannot be parsed arrives as a [`TableError`] so the visitor
/// can log it and carry on with the next one.
pub fn visit_pages(pdf: &Pdf, visit: &mut dyn FnMut(Result<Page, TableError>)) {
    for (idx, page) in pdf.pages().into_iter().enumerate() {
        let page = page.map_err(|e| TableError::PageFailed {
            page: idx + 1,
            detail: e.to_string(),
        });
        if let Ok(p) = &page {
            debug!(page = display_number(p), chars = p.chars().len(), "page parsed");
        }
        visit(page);
    }
}

/// 1-based page number, as used in sheet titles and logs.
pub fn display_number(page: &Page) -> usize {
    page.page_number() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers_are_one_based() {
        assert_eq!(display_number(&Page::new(0, 612.0, 792.0, vec![])), 1);
        assert_eq!(display_number(&Page::new(4, 612.0, 792.0, vec![])), 5);
    }

    #[test]
    fn garbage_is_not_a_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"%PDF-1.7 fake").unwrap();
        let err = open_document(&path).err().expect("expected an error");
        assert!(matches!(err, ServiceError::Internal(ref m) if m.starts_with("could not open PDF")));
    }

    #[test]
    fn missing_file_is_not_a_document() {
        assert!(open_document(Path::new("/nonexistent/report.pdf")).is_err());
    }
}
