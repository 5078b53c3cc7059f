use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use chrono::NaiveTime;
use derive_setters::Setters;
use serde_json::Value;
use tracing::trace;

use crate::filter::{Rows, parse_day};
use crate::record::{Record, value_as_bool, value_as_f64, value_to_string};

pub const DEFAULT_PLACEHOLDER: &str = "N/A";
pub const DATE_FORMAT: &str = "%d/%m/%Y";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Render-ready content of one table cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(String),
    /// An image the user can open in the zoom popup.
    Image { url: String },
    /// A button that navigates to `target` (usually a record id).
    Link { target: String, label: String },
}

impl Cell {
    pub fn display(&self) -> String {
        match self {
            Cell::Text(text) => text.clone(),
            Cell::Image { .. } => "[ver imagen]".to_string(),
            Cell::Link { label, .. } => label.clone(),
        }
    }

    /// The raw text worth copying to the clipboard.
    pub fn payload(&self) -> String {
        match self {
            Cell::Text(text) => text.clone(),
            Cell::Image { url } => url.clone(),
            Cell::Link { target, .. } => target.clone(),
        }
    }
}

pub type CellRenderer = Arc<dyn Fn(Option<&Value>, &Record) -> Option<Cell> + Send + Sync>;

#[derive(Clone)]
pub enum CellKind {
    Text,
    Date { format: String },
    Time,
    Boolean,
    Number { suffix: String },
    Image,
    Link { label: String },
    /// Escape hatch; returning `None` falls back to the column placeholder.
    Custom(CellRenderer),
}

impl CellKind {
    pub fn date() -> Self {
        CellKind::Date {
            format: DATE_FORMAT.to_string(),
        }
    }

    pub fn number(suffix: &str) -> Self {
        CellKind::Number {
            suffix: suffix.to_string(),
        }
    }

    pub fn link(label: &str) -> Self {
        CellKind::Link {
            label: label.to_string(),
        }
    }

    pub fn custom<F>(render: F) -> Self
    where
        F: Fn(Option<&Value>, &Record) -> Option<Cell> + Send + Sync + 'static,
    {
        CellKind::Custom(Arc::new(render))
    }
}

impl fmt::Debug for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellKind::Text => write!(f, "Text"),
            CellKind::Date { format } => write!(f, "Date({format})"),
            CellKind::Time => write!(f, "Time"),
            CellKind::Boolean => write!(f, "Boolean"),
            CellKind::Number { suffix } => write!(f, "Number({suffix})"),
            CellKind::Image => write!(f, "Image"),
            CellKind::Link { label } => write!(f, "Link({label})"),
            CellKind::Custom(_) => write!(f, "Custom"),
        }
    }
}

#[derive(Clone, Debug, Setters)]
#[setters(into)]
pub struct ColumnDef {
    #[setters(skip)]
    pub accessor: String,
    #[setters(skip)]
    pub header: String,
    pub kind: CellKind,
    pub placeholder: String,
}

impl ColumnDef {
    pub fn new(accessor: &str, header: &str) -> Self {
        ColumnDef {
            accessor: accessor.to_string(),
            header: header.to_string(),
            kind: CellKind::Text,
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
        }
    }
}

/// Formats a number with `,` thousands separators and at most two decimals.
pub fn format_thousands(value: f64) -> String {
    let negative = value < 0.0;
    let rounded = (value.abs() * 100.0).round() / 100.0;
    let integer = rounded.trunc() as u64;
    let fraction = ((rounded - rounded.trunc()) * 100.0).round() as u64;

    let digits = integer.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if fraction > 0 {
        let decimals = format!("{fraction:02}");
        grouped.push('.');
        grouped.push_str(decimals.trim_end_matches('0'));
    }
    if negative && (integer > 0 || fraction > 0) {
        grouped.insert(0, '-');
    }
    grouped
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    // "08:30:00", "08:30:00.25" or "08:30:00+00" from a timetz column
    let s = raw.trim().trim_end_matches('Z');
    let s = s.split(['+', '-']).next().unwrap_or(s);
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn render_value(value: Option<&Value>, record: &Record, kind: &CellKind) -> Option<Cell> {
    if let CellKind::Custom(render) = kind {
        return render(value, record);
    }
    let value = value?;
    match kind {
        CellKind::Text => value_to_string(value).map(Cell::Text),
        CellKind::Date { format } => value_to_string(value)
            .and_then(|raw| parse_day(&raw))
            .map(|day| Cell::Text(day.format(format).to_string())),
        CellKind::Time => value_to_string(value)
            .and_then(|raw| parse_time(&raw))
            .map(|time| Cell::Text(time.format(TIME_FORMAT).to_string())),
        CellKind::Boolean => value_as_bool(value).map(|b| Cell::Text(if b { "Sí" } else { "No" }.to_string())),
        CellKind::Number { suffix } => value_as_f64(value).map(|n| {
            let text = format_thousands(n);
            Cell::Text(if suffix.is_empty() { text } else { format!("{text} {suffix}") })
        }),
        CellKind::Image => value_to_string(value)
            .filter(|url| !url.is_empty())
            .map(|url| Cell::Image { url }),
        CellKind::Link { label } => value_to_string(value).map(|target| Cell::Link {
            target,
            label: label.clone(),
        }),
        CellKind::Custom(_) => None,
    }
}

/// Resolves `column.accessor` in `record` and renders it.
///
/// Absent values, `null` embedded relations and values the column kind
/// cannot parse all render as the column placeholder.
pub fn resolve_cell(record: &Record, column: &ColumnDef) -> Cell {
    render_value(record.resolve(&column.accessor), record, &column.kind)
        .unwrap_or_else(|| Cell::Text(column.placeholder.clone()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page_index: usize,
    page_size: usize,
}

impl Pagination {
    pub fn new(page_size: usize) -> Self {
        Pagination {
            page_index: 0,
            page_size: page_size.max(1),
        }
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_count(&self, total_rows: usize) -> usize {
        total_rows.div_ceil(self.page_size)
    }

    pub fn max_page_index(&self, total_rows: usize) -> usize {
        self.page_count(total_rows).saturating_sub(1)
    }

    pub fn clamp(&mut self, total_rows: usize) {
        let max = self.max_page_index(total_rows);
        if self.page_index > max {
            trace!("Clamping page index {} -> {max}", self.page_index);
            self.page_index = max;
        }
    }

    pub fn can_next(&self, total_rows: usize) -> bool {
        (self.page_index + 1) * self.page_size < total_rows
    }

    pub fn can_previous(&self) -> bool {
        self.page_index > 0
    }

    pub fn next(&mut self, total_rows: usize) -> bool {
        if self.can_next(total_rows) {
            self.page_index += 1;
            true
        } else {
            false
        }
    }

    pub fn previous(&mut self) -> bool {
        if self.can_previous() {
            self.page_index -= 1;
            true
        } else {
            false
        }
    }

    pub fn first(&mut self) {
        self.page_index = 0;
    }

    pub fn last(&mut self, total_rows: usize) {
        self.page_index = self.max_page_index(total_rows);
    }

    /// Positions of the current page inside the filtered row set.
    pub fn range(&self, total_rows: usize) -> Range<usize> {
        let begin = std::cmp::min(self.page_index * self.page_size, total_rows);
        let end = std::cmp::min(begin + self.page_size, total_rows);
        begin..end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRow {
    /// Stable identity: the record id, or its base position when it has none.
    pub key: String,
    pub base_index: usize,
    pub cells: Vec<Cell>,
}

/// Paginates a filtered row set and renders it through column definitions.
pub struct TableEngine {
    columns: Vec<ColumnDef>,
    rows: Rows,
    pagination: Pagination,
    cursor_row: usize,
    cursor_column: usize,
}

impl TableEngine {
    pub fn new(columns: Vec<ColumnDef>, page_size: usize) -> Self {
        TableEngine {
            columns,
            rows: Arc::new(Vec::new()),
            pagination: Pagination::new(page_size),
            cursor_row: 0,
            cursor_column: 0,
        }
    }

    /// Swaps in a new filter result, pulling the page index and row cursor
    /// back inside the new bounds.
    pub fn set_rows(&mut self, rows: Rows) {
        self.rows = rows;
        self.pagination.clamp(self.rows.len());
        self.clamp_cursor();
    }

    pub fn rows(&self) -> &Rows {
        &self.rows
    }

    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn set_columns(&mut self, columns: Vec<ColumnDef>) {
        self.columns = columns;
        self.clamp_cursor();
    }

    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.header.as_str()).collect()
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    /// Page count for the pager line; an empty table still shows one page.
    pub fn page_count_display(&self) -> usize {
        self.pagination.page_count(self.rows.len()).max(1)
    }

    pub fn can_next_page(&self) -> bool {
        self.pagination.can_next(self.rows.len())
    }

    pub fn can_previous_page(&self) -> bool {
        self.pagination.can_previous()
    }

    pub fn next_page(&mut self) {
        if self.pagination.next(self.rows.len()) {
            self.cursor_row = 0;
        }
    }

    pub fn previous_page(&mut self) {
        if self.pagination.previous() {
            self.cursor_row = 0;
        }
    }

    pub fn first_page(&mut self) {
        self.pagination.first();
        self.cursor_row = 0;
    }

    pub fn last_page(&mut self) {
        self.pagination.last(self.rows.len());
        self.cursor_row = 0;
    }

    /// Base indices of the rows on the current page.
    pub fn page_rows(&self) -> &[usize] {
        &self.rows[self.pagination.range(self.rows.len())]
    }

    pub fn get_page(&self, records: &[Record]) -> Vec<RenderedRow> {
        self.page_rows()
            .iter()
            .filter_map(|&idx| records.get(idx).map(|record| (idx, record)))
            .map(|(idx, record)| RenderedRow {
                key: record.id().unwrap_or_else(|| idx.to_string()),
                base_index: idx,
                cells: self.columns.iter().map(|c| resolve_cell(record, c)).collect(),
            })
            .collect()
    }

    fn clamp_cursor(&mut self) {
        let len = self.page_rows().len();
        self.cursor_row = std::cmp::min(self.cursor_row, len.saturating_sub(1));
        self.cursor_column = std::cmp::min(self.cursor_column, self.columns.len().saturating_sub(1));
    }

    pub fn cursor(&self) -> (usize, usize) {
        (self.cursor_row, self.cursor_column)
    }

    pub fn select_next_row(&mut self) {
        if self.cursor_row + 1 < self.page_rows().len() {
            self.cursor_row += 1;
        } else if self.can_next_page() {
            self.next_page();
        }
    }

    pub fn select_previous_row(&mut self) {
        if self.cursor_row > 0 {
            self.cursor_row -= 1;
        } else if self.can_previous_page() {
            self.previous_page();
            self.cursor_row = self.page_rows().len().saturating_sub(1);
        }
    }

    pub fn select_next_column(&mut self) {
        if self.cursor_column + 1 < self.columns.len() {
            self.cursor_column += 1;
        }
    }

    pub fn select_previous_column(&mut self) {
        self.cursor_column = self.cursor_column.saturating_sub(1);
    }

    /// Base index of the row under the cursor.
    pub fn selected_index(&self) -> Option<usize> {
        self.page_rows().get(self.cursor_row).copied()
    }

    pub fn selected_record<'a>(&self, records: &'a [Record]) -> Option<&'a Record> {
        self.selected_index().and_then(|idx| records.get(idx))
    }

    pub fn selected_cell(&self, records: &[Record]) -> Option<Cell> {
        let record = self.selected_record(records)?;
        let column = self.columns.get(self.cursor_column)?;
        Some(resolve_cell(record, column))
    }

    /// Display width per column for the current page, capped at `max_width`.
    pub fn column_widths(&self, page: &[RenderedRow], max_width: usize) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(cidx, column)| {
                let widest = page
                    .iter()
                    .filter_map(|row| row.cells.get(cidx))
                    .map(|cell| cell.display().chars().count())
                    .max()
                    .unwrap_or(0);
                std::cmp::min(std::cmp::max(widest, column.header.chars().count()) + 1, max_width)
            })
            .collect()
    }
}

/// Shortens `name` to `width` characters, marking the cut with `...`.
pub fn visible_name(name: &str, width: usize) -> String {
    if width < 3 {
        return String::new();
    }
    if name.chars().count() > width {
        let mut reduced: String = name.chars().take(width - 3).collect();
        reduced.push_str("...");
        reduced
    } else {
        name.to_string()
    }
}
