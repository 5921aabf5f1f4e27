//! XLSX output: one worksheet per planned table.
//!
//! Worksheet names are `Page_<p>-Table_<t>`, unique (case-insensitively, as
//! Excel compares them) and at most 31 characters. A workbook that would
//! otherwise have no worksheet gets a single `No Tables Found` sheet, since
//! an XLSX file needs at least one.

use crate::pipeline::normalize::{plan_sheet, SheetPlan, TabularStructure, WidthBounds};
use rust_xlsxwriter::{Format, FormatAlign, Workbook, Worksheet, XlsxError};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Name of the placeholder sheet.
pub const NO_TABLES_SHEET: &str = "No Tables Found";

/// Media type of the serialised workbook.
pub const XLSX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const MAX_SHEET_NAME: usize = 31;

/// Hands out unique worksheet names.
#[derive(Debug, Default)]
pub struct SheetTitles {
    taken: HashSet<String>,
    added: usize,
}

impl SheetTitles {
    /// Name for table `table` of page `page` (both 1-based). A repeated
    /// name gets `_<n>` appended, where `n` starts at the number of sheets
    /// added so far plus one.
    pub fn allocate(&mut self, page: usize, table: usize) -> String {
        let title = self.candidate(page, table);
        self.claim(&title);
        title
    }

    /// The name [`allocate`](Self::allocate) would hand out, without taking it.
    pub fn candidate(&self, page: usize, table: usize) -> String {
        let base = clip(&format!("Page_{page}-Table_{table}"), MAX_SHEET_NAME);
        let mut title = base.clone();
        let mut counter = self.added + 1;
        while self.taken.contains(&title.to_lowercase()) {
            let suffix = format!("_{counter}");
            title = format!(
                "{}{suffix}",
                clip(&base, MAX_SHEET_NAME.saturating_sub(suffix.len()))
            );
            counter += 1;
        }
        title
    }

    /// Mark `title` as used.
    pub fn claim(&mut self, title: &str) {
        self.taken.insert(title.to_lowercase());
        self.added += 1;
    }
}

fn clip(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Workbook under construction.
pub struct TableWorkbook {
    workbook: Workbook,
    titles: SheetTitles,
    sheet_names: Vec<String>,
    bounds: WidthBounds,
    cell_format: Format,
}

impl TableWorkbook {
    pub fn new(bounds: WidthBounds) -> Self {
        Self {
            workbook: Workbook::new(),
            titles: SheetTitles::default(),
            sheet_names: Vec::new(),
            bounds,
            cell_format: Format::new()
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_text_wrap(),
        }
    }

    /// Normalise `table` and write it to a new worksheet.
    ///
    /// Returns the sheet name, or `None` when the table had no rows and no
    /// sheet was created. The sheet joins the workbook only once every cell
    /// is written; on error the workbook and the name counter are unchanged.
    pub fn add_table(
        &mut self,
        page: usize,
        index: usize,
        table: TabularStructure,
    ) -> Result<Option<String>, XlsxError> {
        let Some(plan) = plan_sheet(table, self.bounds) else {
            info!(page, table = index, "table empty after normalisation, no sheet");
            return Ok(None);
        };

        let title = self.titles.candidate(page, index);
        let mut sheet = Worksheet::new();
        sheet.set_name(&title)?;
        write_plan(&mut sheet, &plan, &self.cell_format)?;
        self.workbook.push_worksheet(sheet);
        self.titles.claim(&title);
        debug!(
            sheet = %title,
            rows = plan.rows.len(),
            header = plan.header.is_some(),
            "worksheet written"
        );
        self.sheet_names.push(title.clone());
        Ok(Some(title))
    }

    /// Names of the sheets written so far.
    pub fn sheet_names(&self) -> &[String] {
        &self.sheet_names
    }

    /// Serialise, adding the placeholder sheet if nothing was written.
    pub fn finish(mut self) -> Result<(Vec<u8>, Vec<String>), XlsxError> {
        if self.sheet_names.is_empty() {
            warn!("no tables extracted; writing placeholder sheet");
            self.workbook.add_worksheet().set_name(NO_TABLES_SHEET)?;
            self.sheet_names.push(NO_TABLES_SHEET.to_string());
        }
        let bytes = self.workbook.save_to_buffer()?;
        Ok((bytes, self.sheet_names))
    }
}

fn write_plan(sheet: &mut Worksheet, plan: &SheetPlan, format: &Format) -> Result<(), XlsxError> {
    let lines = plan.header.iter().chain(plan.rows.iter());
    for (r, cells) in lines.enumerate() {
        let row = u32::try_from(r).map_err(|_| XlsxError::RowColumnLimitError)?;
        for (c, value) in cells.iter().enumerate() {
            let col = u16::try_from(c).map_err(|_| XlsxError::RowColumnLimitError)?;
            if value.is_empty() {
                sheet.write_blank(row, col, format)?;
            } else {
                sheet.write_string_with_format(row, col, value, format)?;
            }
        }
    }
    for (c, width) in plan.column_widths.iter().enumerate() {
        let col = u16::try_from(c).map_err(|_| XlsxError::RowColumnLimitError)?;
        sheet.set_column_width(col, *width)?;
    }
    Ok(())
}
