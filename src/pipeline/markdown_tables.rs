//! Markdown pipe-table parsing and splicing.
//!
//! OCR output and chat replies both carry GFM pipe tables. Two operations
//! are needed:
//!
//! 1. **Splice** ([`splice_tables`]): cut every table out of an OCR document,
//!    leaving a `[TABLE_<n>]` token in its place, so the chat prompt is not
//!    bloated by raw table markup while the structured rows travel alongside.
//! 2. **Find first** ([`find_first_table`]): pull the first table out of a
//!    model reply for structured display by the client.
//!
//! A table is exactly: a pipe-delimited header line, a separator line made of
//! dashes, pipes and whitespace only, then zero or more pipe-delimited lines.
//! Column counts are not checked across rows.
//!
//! ## Cells
//!
//! The outer border pipes of a line are stripped and the remainder split on
//! `|`. Interior empty cells are kept as `""` so `| a | | c |` has three
//! cells. A row whose cells are all empty is dropped.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::ops::Range;

static RE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\|([^\n]+)\|\n\|([-|\s]+)\|\n((?:\|[^\n]+\|\n?)*)").unwrap()
});

/// Header labels and rows of one recognised table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Marker left where a table's text span used to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePlaceholder {
    /// 0-based order of discovery.
    pub index: usize,
    /// Byte span of the table in the *original* text.
    pub span: Range<usize>,
    /// `[TABLE_<index>]`
    pub token: String,
}

/// Result of cutting the tables out of a document.
#[derive(Debug, Clone, Default)]
pub struct SplicedDocument {
    /// Original text with every table replaced by its token.
    pub text: String,
    /// Tables in order of appearance; `tables[i]` belongs to `placeholders[i]`.
    pub tables: Vec<ExtractedTable>,
    pub placeholders: Vec<TablePlaceholder>,
}

/// Token substituted for the `index`-th table.
pub fn placeholder_token(index: usize) -> String {
    format!("[TABLE_{index}]")
}

/// Parse the first table found in `content`, if any.
pub fn find_first_table(content: &str) -> Option<ExtractedTable> {
    RE_TABLE.captures(content).map(|caps| parse_captures(&caps))
}

/// Count the tables in `content`.
pub fn count_tables(content: &str) -> usize {
    RE_TABLE.find_iter(content).count()
}

/// Replace every table in `content` with a positional token.
///
/// Spans are collected in one scan and replaced back to front, so earlier
/// byte offsets stay valid while later spans change length.
pub fn splice_tables(content: &str) -> SplicedDocument {
    let mut tables = Vec::new();
    let mut placeholders = Vec::new();

    for (index, caps) in RE_TABLE.captures_iter(content).enumerate() {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        tables.push(parse_captures(&caps));
        placeholders.push(TablePlaceholder {
            index,
            span: whole,
            token: placeholder_token(index),
        });
    }

    let mut text = content.to_string();
    for placeholder in placeholders.iter().rev() {
        text.replace_range(placeholder.span.clone(), &placeholder.token);
    }

    SplicedDocument {
        text,
        tables,
        placeholders,
    }
}

fn parse_captures(caps: &Captures<'_>) -> ExtractedTable {
    let headers = split_cells(caps.get(1).map_or("", |m| m.as_str()));
    let headers = if headers.iter().all(String::is_empty) {
        Vec::new()
    } else {
        headers
    };

    let rows = caps
        .get(3)
        .map_or("", |m| m.as_str())
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(split_cells)
        .filter(|cells| cells.iter().any(|c| !c.is_empty()))
        .collect();

    ExtractedTable { headers, rows }
}

fn split_cells(line: &str) -> Vec<String> {
    let inner = line.trim();
    let inner = inner.strip_prefix('|').unwrap_or(inner);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(|c| c.trim().to_string()).collect()
}
