//! PDF → tables → XLSX, as one blocking job.
//!
//! ```text
//! PageSource ──▶ per page: TableDetector ──▶ per table: TableFormatter
//!                                                   │
//!                              TableWorkbook ◀──────┘ (normalise + write)
//! ```
//!
//! Failures below the document level are [`TableError`]s: logged, skipped,
//! never fatal. A page without tables, a table the formatter declines, and
//! an empty grid are skipped silently. Only failing to open the document or
//! to serialise the workbook fails the request.

use crate::config::TableServiceConfig;
use crate::error::{ServiceError, TableError};
use crate::pipeline::detect::{CellFormatter, FinderDetector, TableDetector, TableFormatter};
use crate::pipeline::layout::{display_number, open_document, visit_pages};
use crate::pipeline::normalize::{TabularStructure, WidthBounds};
use crate::pipeline::workbook::TableWorkbook;
use pdfplumber::Page;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Reads the pages of a PDF and hands them to a visitor, in order.
///
/// The document must be closed before `read_pages` returns, whatever happened.
pub trait PageSource: Send + Sync {
    fn read_pages(
        &self,
        pdf_path: &Path,
        visit: &mut dyn FnMut(Result<Page, TableError>),
    ) -> Result<(), ServiceError>;
}

/// [`PageSource`] backed by pdfplumber.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfPages;

impl PageSource for PdfPages {
    fn read_pages(
        &self,
        pdf_path: &Path,
        visit: &mut dyn FnMut(Result<Page, TableError>),
    ) -> Result<(), ServiceError> {
        let pdf = open_document(pdf_path)?;
        visit_pages(&pdf, visit);
        drop(pdf);
        info!("PDF document closed");
        Ok(())
    }
}

/// One structured table and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct PageTable {
    /// 1-based page number.
    pub page: usize,
    /// 1-based table index on the page.
    pub index: usize,
    pub table: TabularStructure,
}

/// Serialised workbook plus what went into it.
#[derive(Debug, Clone)]
pub struct ExtractedWorkbook {
    pub bytes: Vec<u8>,
    pub sheet_names: Vec<String>,
    /// Tables structured before normalisation.
    pub tables_found: usize,
}

/// Run detector and formatter over one page, skipping what fails.
pub fn tables_on_page(
    page: &Page,
    detector: &dyn TableDetector,
    formatter: &dyn TableFormatter,
) -> Vec<PageTable> {
    let number = display_number(page);
    let tables = match detector.detect(page) {
        Ok(tables) => tables,
        Err(e) => {
            warn!(page = number, error = %e, "skipping page");
            return Vec::new();
        }
    };
    if tables.is_empty() {
        return Vec::new();
    }
    info!(page = number, tables = tables.len(), "tables detected");

    let mut found = Vec::new();
    for (i, table) in tables.iter().enumerate() {
        let index = i + 1;
        match formatter.format(page, table) {
            Ok(Some(table)) if !table.is_empty() => found.push(PageTable {
                page: number,
                index,
                table,
            }),
            Ok(_) => info!(page = number, table = index, "empty table skipped"),
            Err(e) => warn!(page = number, table = index, error = %e, "skipping table"),
        }
    }
    found
}

/// [`tables_on_page`] over a sequence of pages; unreadable pages are logged
/// and skipped.
pub fn collect_tables<I>(
    pages: I,
    detector: &dyn TableDetector,
    formatter: &dyn TableFormatter,
) -> Vec<PageTable>
where
    I: IntoIterator<Item = Result<Page, TableError>>,
{
    let mut found = Vec::new();
    for page in pages {
        match page {
            Ok(page) => found.extend(tables_on_page(&page, detector, formatter)),
            Err(e) => warn!(error = %e, "skipping page"),
        }
    }
    found
}

/// Write collected tables to a workbook and serialise it.
pub fn build_workbook(tables: Vec<PageTable>, bounds: WidthBounds) -> Result<ExtractedWorkbook, ServiceError> {
    let tables_found = tables.len();
    let mut workbook = TableWorkbook::new(bounds);
    for PageTable { page, index, table } in tables {
        if let Err(e) = workbook.add_table(page, index, table) {
            let err = TableError::FormattingFailed {
                page,
                table: index,
                detail: e.to_string(),
            };
            warn!(error = %err, "skipping table");
        }
    }
    let (bytes, sheet_names) = workbook
        .finish()
        .map_err(|e| ServiceError::Internal(format!("could not write workbook: {e}")))?;
    Ok(ExtractedWorkbook {
        bytes,
        sheet_names,
        tables_found,
    })
}

/// The complete extraction job with its collaborators.
#[derive(Clone)]
pub struct TableExtractor {
    pages: Arc<dyn PageSource>,
    detector: Arc<dyn TableDetector>,
    formatter: Arc<dyn TableFormatter>,
    bounds: WidthBounds,
}

impl TableExtractor {
    /// pdfplumber pages with the table finder and cell formatter.
    pub fn from_config(config: &TableServiceConfig) -> Self {
        Self::new(
            Arc::new(PdfPages),
            Arc::new(FinderDetector::new(config.detector.clone())),
            Arc::new(CellFormatter),
            WidthBounds {
                min: config.min_column_width,
                max: config.max_column_width,
            },
        )
    }

    pub fn new(
        pages: Arc<dyn PageSource>,
        detector: Arc<dyn TableDetector>,
        formatter: Arc<dyn TableFormatter>,
        bounds: WidthBounds,
    ) -> Self {
        Self {
            pages,
            detector,
            formatter,
            bounds,
        }
    }

    /// Blocking: read, detect, format, and write `pdf_path`.
    pub fn extract(&self, pdf_path: &Path) -> Result<ExtractedWorkbook, ServiceError> {
        let mut tables = Vec::new();
        self.pages.read_pages(pdf_path, &mut |page| match page {
            Ok(page) => tables.extend(tables_on_page(
                &page,
                self.detector.as_ref(),
                self.formatter.as_ref(),
            )),
            Err(e) => warn!(error = %e, "skipping page"),
        })?;
        let out = build_workbook(tables, self.bounds)?;
        info!(
            tables = out.tables_found,
            sheets = out.sheet_names.len(),
            bytes = out.bytes.len(),
            "workbook ready"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::workbook::NO_TABLES_SHEET;
    use pdfplumber::{BBox, Table};

    fn page(number: usize) -> Page {
        Page::new(number - 1, 612.0, 792.0, vec![])
    }

    fn empty_table() -> Table {
        Table {
            bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
            cells: vec![],
            rows: vec![],
            columns: vec![],
        }
    }

    /// Two tables per page; pages listed in `fail_on` fail detection.
    struct TwoTables {
        fail_on: Vec<usize>,
    }

    impl TableDetector for TwoTables {
        fn detect(&self, page: &Page) -> Result<Vec<Table>, TableError> {
            let number = display_number(page);
            if self.fail_on.contains(&number) {
                return Err(TableError::DetectionFailed {
                    page: number,
                    detail: "bad page".into(),
                });
            }
            let mut second = empty_table();
            second.bbox = BBox::new(0.0, 500.0, 1.0, 501.0);
            Ok(vec![empty_table(), second])
        }
    }

    /// First table (top of page): structured; the other: declined.
    struct FirstOnly;

    impl TableFormatter for FirstOnly {
        fn format(&self, page: &Page, table: &Table) -> Result<Option<TabularStructure>, TableError> {
            if table.bbox.top > 0.0 {
                return Ok(None);
            }
            Ok(Some(TabularStructure::new(
                vec!["Page".into()],
                vec![vec![display_number(page).to_string()]],
            )))
        }
    }

    struct Failing;

    impl TableFormatter for Failing {
        fn format(&self, page: &Page, _table: &Table) -> Result<Option<TabularStructure>, TableError> {
            Err(TableError::FormattingFailed {
                page: display_number(page),
                table: 1,
                detail: "boom".into(),
            })
        }
    }

    #[test]
    fn page_and_table_failures_are_skipped() {
        let pages = vec![
            Ok(page(1)),
            Err(TableError::PageFailed {
                page: 2,
                detail: "unreadable".into(),
            }),
            Ok(page(3)),
            Ok(page(4)),
        ];
        let tables = collect_tables(pages, &TwoTables { fail_on: vec![3] }, &FirstOnly);
        let pages: Vec<usize> = tables.iter().map(|t| t.page).collect();
        assert_eq!(pages, [1, 4]);
        assert!(tables.iter().all(|t| t.index == 1));
    }

    #[test]
    fn formatter_errors_never_abort() {
        let tables = collect_tables(
            vec![Ok(page(1)), Ok(page(2))],
            &TwoTables { fail_on: vec![] },
            &Failing,
        );
        assert!(tables.is_empty());
        let out = build_workbook(tables, WidthBounds::default()).unwrap();
        assert_eq!(out.sheet_names, [NO_TABLES_SHEET]);
        assert_eq!(out.tables_found, 0);
    }

    #[test]
    fn builds_sheets_in_page_order() {
        let tables = collect_tables(
            vec![Ok(page(1)), Ok(page(2))],
            &TwoTables { fail_on: vec![] },
            &FirstOnly,
        );
        let out = build_workbook(tables, WidthBounds::default()).unwrap();
        assert_eq!(out.sheet_names, ["Page_1-Table_1", "Page_2-Table_1"]);
    }

    /// Pages rebuilt on every read; the second one is unreadable.
    struct TwoPages;

    impl PageSource for TwoPages {
        fn read_pages(
            &self,
            _: &Path,
            visit: &mut dyn FnMut(Result<Page, TableError>),
        ) -> Result<(), ServiceError> {
            visit(Ok(page(1)));
            visit(Err(TableError::PageFailed {
                page: 2,
                detail: "unreadable".into(),
            }));
            visit(Ok(page(3)));
            Ok(())
        }
    }

    #[test]
    fn extractor_visits_every_page() {
        let extractor = TableExtractor::new(
            Arc::new(TwoPages),
            Arc::new(TwoTables { fail_on: vec![] }),
            Arc::new(FirstOnly),
            WidthBounds::default(),
        );
        let out = extractor.extract(Path::new("unused.pdf")).unwrap();
        assert_eq!(out.tables_found, 2);
        assert_eq!(out.sheet_names, ["Page_1-Table_1", "Page_3-Table_1"]);
    }

    #[test]
    fn unreadable_document_fails_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"%PDF-1.7 fake").unwrap();
        let err = TableExtractor::from_config(&TableServiceConfig::default())
            .extract(&path)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Internal(_)));
    }
}
