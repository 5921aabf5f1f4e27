//! Table detection and structuring on parsed pages.
//!
//! Two seams, both synchronous (they run inside the blocking extraction job):
//!
//! * [`TableDetector`] finds the [`Table`]s on a page.
//! * [`TableFormatter`] turns one table into a [`TabularStructure`]: column
//!   labels plus rows of cell strings.
//!
//! The defaults hand the geometry to pdfplumber's table finder.
//! [`FinderDetector`] picks the finder strategy from [`TableStrategy`] and
//! drops tables smaller than the configured minimum. [`CellFormatter`] reads
//! the cell texts and decides the header:
//!
//! * a first row of text only becomes the column labels; a label spanning
//!   several lines keeps its `\n`s (a multi-line header),
//! * a first row carrying numbers, or blank, leaves the table with
//!   positional labels `"0".."n-1"`.

use crate::config::{DetectorConfig, TableStrategy};
use crate::error::TableError;
use crate::pipeline::layout::display_number;
use crate::pipeline::normalize::{positional_labels, TabularStructure};
use once_cell::sync::Lazy;
use pdfplumber::{Cell, Page, Strategy, Table, TableSettings};
use regex::Regex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::debug;

static RE_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+(]?[$€£]?\d[\d,]*(\.\d+)?%?\)?$").unwrap());

fn is_numeric(text: &str) -> bool {
    RE_NUMERIC.is_match(&text.replace(' ', ""))
}

/// Text of a cell; spanned grid positions read as blank.
fn cell_text(cell: &Cell) -> String {
    cell.text.as_deref().unwrap_or("").trim().to_string()
}

/// Finds the tables on a page.
pub trait TableDetector: Send + Sync {
    fn detect(&self, page: &Page) -> Result<Vec<Table>, TableError>;
}

/// Structures one detected table. `Ok(None)` means it is not a table after
/// all and is skipped silently.
pub trait TableFormatter: Send + Sync {
    fn format(&self, page: &Page, table: &Table) -> Result<Option<TabularStructure>, TableError>;
}

// ── Detector ──────────────────────────────────────────────────────────────

/// pdfplumber's table finder with a size filter.
#[derive(Debug, Clone, Default)]
pub struct FinderDetector {
    config: DetectorConfig,
}

impl FinderDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    fn find(&self, page: &Page, strategy: Strategy) -> Result<Vec<Table>, TableError> {
        let settings = TableSettings {
            strategy,
            ..TableSettings::default()
        };
        // A finder panic costs only this page.
        let tables = catch_unwind(AssertUnwindSafe(|| page.find_tables(&settings))).map_err(|_| {
            TableError::DetectionFailed {
                page: display_number(page),
                detail: format!("table finder panicked ({strategy:?})"),
            }
        })?;
        Ok(tables.into_iter().filter(|t| self.large_enough(t)).collect())
    }

    fn large_enough(&self, table: &Table) -> bool {
        let columns = table.rows.iter().map(Vec::len).max().unwrap_or(0);
        table.rows.len() >= self.config.min_rows && columns >= self.config.min_columns
    }
}

impl TableDetector for FinderDetector {
    fn detect(&self, page: &Page) -> Result<Vec<Table>, TableError> {
        let tables = match self.config.strategy {
            TableStrategy::Lines => self.find(page, Strategy::Lattice)?,
            TableStrategy::Text => self.find(page, Strategy::Stream)?,
            TableStrategy::Auto => {
                let ruled = self.find(page, Strategy::Lattice)?;
                if ruled.is_empty() {
                    self.find(page, Strategy::Stream)?
                } else {
                    ruled
                }
            }
        };
        debug!(page = display_number(page), tables = tables.len(), "tables found");
        Ok(tables)
    }
}

// ── Formatter ─────────────────────────────────────────────────────────────

/// Reads cell text row by row and picks the header.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellFormatter;

impl TableFormatter for CellFormatter {
    fn format(&self, _page: &Page, table: &Table) -> Result<Option<TabularStructure>, TableError> {
        let mut rows: Vec<Vec<String>> = table
            .rows
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if width == 0 {
            return Ok(None);
        }
        for row in &mut rows {
            row.resize(width, String::new());
        }

        let header_is_text = rows.len() > 1 && {
            let first = &rows[0];
            first.iter().any(|c| !c.is_empty()) && !first.iter().any(|c| is_numeric(c))
        };
        if header_is_text {
            let body = rows.split_off(1);
            let columns = rows.remove(0);
            Ok(Some(TabularStructure::new(columns, body)))
        } else {
            Ok(Some(TabularStructure::new(positional_labels(width), rows)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfplumber::{BBox, Char, Color, Line, LineOrientation, TextDirection};

    /// One 5pt-wide character per letter of `text`, on a 10pt line.
    fn word(text: &str, x: f64, top: f64) -> Vec<Char> {
        text.chars()
            .enumerate()
            .map(|(i, ch)| {
                let x0 = x + 5.0 * i as f64;
                Char {
                    text: ch.to_string(),
                    bbox: BBox::new(x0, top, x0 + 5.0, top + 10.0),
                    fontname: "TestFont".into(),
                    size: 10.0,
                    advance: 5.0,
                    doctop: top,
                    upright: true,
                    direction: TextDirection::Ltr,
                    stroking_color: None,
                    non_stroking_color: None,
                    ctm: [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
                    char_code: 0,
                    mcid: None,
                    tag: None,
                }
            })
            .collect()
    }

    fn rule(x0: f64, top: f64, x1: f64, bottom: f64, orientation: LineOrientation) -> Line {
        Line {
            x0,
            top,
            x1,
            bottom,
            line_width: 1.0,
            stroke_color: Color::black(),
            orientation,
        }
    }

    /// Ruled grid with column edges at `xs` and row edges at `ys`, each
    /// cell's text placed 4pt in from its top-left corner.
    fn ruled_page(xs: &[f64], ys: &[f64], cells: &[&[&str]]) -> Page {
        let (left, right) = (xs[0], xs[xs.len() - 1]);
        let (top, bottom) = (ys[0], ys[ys.len() - 1]);
        let mut lines: Vec<Line> = ys
            .iter()
            .map(|&y| rule(left, y, right, y, LineOrientation::Horizontal))
            .collect();
        lines.extend(xs.iter().map(|&x| rule(x, top, x, bottom, LineOrientation::Vertical)));

        let mut chars = word("Quarterly report", left, top - 40.0);
        for (r, row) in cells.iter().enumerate() {
            for (c, text) in row.iter().enumerate() {
                chars.extend(word(text, xs[c] + 4.0, ys[r] + 4.0));
            }
        }
        Page::with_geometry(0, 612.0, 792.0, chars, lines, vec![], vec![])
    }

    fn sample_page() -> Page {
        ruled_page(
            &[50.0, 150.0, 250.0],
            &[100.0, 120.0, 140.0, 160.0],
            &[&["Region", "Sales"], &["North", "1,200"], &["South", "950"]],
        )
    }

    fn structure(page: &Page) -> TabularStructure {
        let tables = FinderDetector::default().detect(page).unwrap();
        assert_eq!(tables.len(), 1);
        CellFormatter.format(page, &tables[0]).unwrap().unwrap()
    }

    #[test]
    fn finds_ruled_table_and_reads_header() {
        let t = structure(&sample_page());
        assert_eq!(t.columns, ["Region", "Sales"]);
        assert_eq!(t.rows, [["North", "1,200"], ["South", "950"]]);
    }

    #[test]
    fn tight_columns_stay_separate() {
        // Neighbouring cell texts end up 6pt apart.
        let page = ruled_page(
            &[50.0, 76.0, 102.0],
            &[100.0, 120.0, 140.0],
            &[&["Item", "Unit"], &["Pens", "Box"]],
        );
        let t = structure(&page);
        assert_eq!(t.columns, ["Item", "Unit"]);
        assert_eq!(t.rows, [["Pens", "Box"]]);
    }

    #[test]
    fn numeric_first_row_gets_positional_labels() {
        let page = ruled_page(
            &[50.0, 150.0, 250.0],
            &[100.0, 120.0, 140.0],
            &[&["1", "2"], &["3", "4"]],
        );
        let t = structure(&page);
        assert_eq!(t.columns, ["0", "1"]);
        assert_eq!(t.rows, [["1", "2"], ["3", "4"]]);
    }

    #[test]
    fn small_tables_are_dropped() {
        let detector = FinderDetector::new(DetectorConfig {
            min_rows: 4,
            ..DetectorConfig::default()
        });
        assert!(detector.detect(&sample_page()).unwrap().is_empty());

        let detector = FinderDetector::new(DetectorConfig {
            min_columns: 3,
            ..DetectorConfig::default()
        });
        assert!(detector.detect(&sample_page()).unwrap().is_empty());
    }

    #[test]
    fn prose_has_no_tables() {
        let page = Page::new(0, 612.0, 792.0, word("Notes", 50.0, 100.0));
        for strategy in [TableStrategy::Lines, TableStrategy::Text, TableStrategy::Auto] {
            let detector = FinderDetector::new(DetectorConfig {
                strategy,
                ..DetectorConfig::default()
            });
            assert!(detector.detect(&page).unwrap().is_empty(), "{strategy:?}");
        }
    }

    #[test]
    fn empty_table_is_declined() {
        let table = Table {
            bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
            cells: vec![],
            rows: vec![],
            columns: vec![],
        };
        let page = Page::new(0, 612.0, 792.0, vec![]);
        assert!(CellFormatter.format(&page, &table).unwrap().is_none());
    }

    #[test]
    fn spanned_cells_read_blank_and_short_rows_are_padded() {
        let cell = |text: Option<&str>| Cell {
            bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
            text: text.map(str::to_string),
        };
        let table = Table {
            bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
            cells: vec![],
            rows: vec![
                vec![cell(Some("Name")), cell(Some(" Total "))],
                vec![cell(Some("a")), cell(None)],
                vec![cell(Some("b"))],
            ],
            columns: vec![],
        };
        let page = Page::new(0, 612.0, 792.0, vec![]);
        let t = CellFormatter.format(&page, &table).unwrap().unwrap();
        assert_eq!(t.columns, ["Name", "Total"]);
        assert_eq!(t.rows, [["a", ""], ["b", ""]]);
    }

    #[test]
    fn numeric_cells() {
        for t in ["42", "1,200.50", "-3", "(17)", "$5", "12%", "1 000"] {
            assert!(is_numeric(t), "{t}");
        }
        for t in ["North", "Q1", "", "-"] {
            assert!(!is_numeric(t), "{t}");
        }
    }
}
