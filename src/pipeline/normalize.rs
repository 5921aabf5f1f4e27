//! Turn a raw [`TabularStructure`] into a worksheet plan.
//!
//! Steps, in order:
//!
//! 1. A multi-line header (any label with more than one line once literal
//!    `\n` escapes are decoded) becomes synthetic data rows, one per line,
//!    and the labels become positional indices.
//! 2. With positional labels, a first row that reads `"0","1",...` is an
//!    artifact and is dropped.
//! 3. Nothing left: no worksheet.
//! 4. Cells are cleaned: `None` and `nan` become empty, `\n` escapes are
//!    decoded.
//! 5. Positional labels are not written; any other labels form row one.
//! 6. A blank first data row is dropped.
//! 7. Column widths follow the longest line in each column, clamped.

use serde::{Deserialize, Serialize};

/// Column labels and rows of cell text as produced by a formatter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TabularStructure {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TabularStructure {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Positional labels sized to the widest row.
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        Self {
            columns: positional_labels(width),
            rows,
        }
    }

    /// No columns or no rows.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.rows.is_empty()
    }
}

/// `"0", "1", ... "n-1"`.
pub fn positional_labels(n: usize) -> Vec<String> {
    (0..n).map(|i| i.to_string()).collect()
}

/// True when `labels` are exactly the positional indices.
pub fn has_positional_labels(labels: &[String]) -> bool {
    labels.iter().enumerate().all(|(i, l)| *l == i.to_string())
}

/// Lower and upper bound for a column width, in character units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidthBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for WidthBounds {
    fn default() -> Self {
        Self {
            min: 8.43,
            max: 70.0,
        }
    }
}

/// Everything needed to write one worksheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetPlan {
    /// Labels written as row one, when the labels are real.
    pub header: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
    pub column_widths: Vec<f64>,
}

impl SheetPlan {
    pub fn column_count(&self) -> usize {
        self.column_widths.len()
    }
}

/// Plan a worksheet for `table`, or `None` if it has no rows left.
pub fn plan_sheet(table: TabularStructure, bounds: WidthBounds) -> Option<SheetPlan> {
    let table = drop_stray_index_row(expand_multiline_header(square_up(table)));
    if table.rows.is_empty() {
        return None;
    }

    let header = if has_positional_labels(&table.columns) {
        None
    } else {
        Some(table.columns)
    };

    let mut rows: Vec<Vec<String>> = table
        .rows
        .into_iter()
        .map(|row| row.iter().map(|c| clean_cell(c)).collect())
        .collect();
    if rows
        .first()
        .is_some_and(|r| r.iter().all(|c| c.trim().is_empty()))
    {
        rows.remove(0);
    }

    let column_widths = column_widths(header.as_deref(), &rows, bounds);
    Some(SheetPlan {
        header,
        rows,
        column_widths,
    })
}

/// Pad or cut every row to the label count.
fn square_up(mut table: TabularStructure) -> TabularStructure {
    let width = table.columns.len();
    for row in &mut table.rows {
        row.resize(width, String::new());
    }
    table
}

/// Step 1: move a multi-line header into the data.
pub fn expand_multiline_header(table: TabularStructure) -> TabularStructure {
    let label_lines: Vec<Vec<String>> = table
        .columns
        .iter()
        .map(|label| {
            let decoded = decode_newlines(label);
            let lines: Vec<String> = decoded.lines().map(str::to_string).collect();
            if lines.is_empty() {
                vec![String::new()]
            } else {
                lines
            }
        })
        .collect();

    let depth = label_lines.iter().map(Vec::len).max().unwrap_or(1);
    if depth <= 1 {
        return table;
    }

    let mut rows: Vec<Vec<String>> = (0..depth)
        .map(|line| {
            label_lines
                .iter()
                .map(|lines| lines.get(line).cloned().unwrap_or_default())
                .collect()
        })
        .collect();
    rows.extend(table.rows);

    TabularStructure {
        columns: positional_labels(table.columns.len()),
        rows,
    }
}

/// Step 2: drop a leading `"0","1",...` row under positional labels.
pub fn drop_stray_index_row(mut table: TabularStructure) -> TabularStructure {
    if !has_positional_labels(&table.columns) {
        return table;
    }
    let is_index_row = table.rows.first().is_some_and(|row| {
        row.len() == table.columns.len()
            && row
                .iter()
                .enumerate()
                .all(|(i, cell)| cell.trim() == i.to_string())
    });
    if is_index_row {
        table.rows.remove(0);
    }
    table
}

/// Step 4 for one cell.
pub fn clean_cell(value: &str) -> String {
    match value {
        "None" | "nan" => String::new(),
        other => decode_newlines(other),
    }
}

fn decode_newlines(s: &str) -> String {
    s.replace("\\n", "\n")
}

fn column_widths(header: Option<&[String]>, rows: &[Vec<String>], bounds: WidthBounds) -> Vec<f64> {
    let count = header
        .map(<[String]>::len)
        .into_iter()
        .chain(rows.iter().map(Vec::len))
        .max()
        .unwrap_or(0);

    (0..count)
        .map(|col| {
            let longest = header
                .into_iter()
                .chain(rows.iter().map(Vec::as_slice))
                .filter_map(|row| row.get(col))
                .flat_map(|cell| cell.lines())
                .map(|line| line.chars().count())
                .max()
                .unwrap_or(0);
            column_width(longest, bounds)
        })
        .collect()
}

/// `min(max((longest + 2) * 1.15, min), max)`
pub fn column_width(longest_line: usize, bounds: WidthBounds) -> f64 {
    ((longest_line as f64 + 2.0) * 1.15)
        .max(bounds.min)
        .min(bounds.max)
}
