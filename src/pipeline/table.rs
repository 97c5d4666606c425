//! HTML table → GitHub-flavoured Markdown table.
//!
//! Two reconstructors share one rendering contract (padding, escaping,
//! divider after the first row, one blank line around the table):
//!
//! * the **structured** one splits `<thead>` rows from the rest and unwraps
//!   `<tbody>`/`<tfoot>`;
//! * the **simple** one treats every `<tr>` the same. It runs when the
//!   fragment is too irregular for the structured split (unbalanced section
//!   tags, nested tables).

use crate::pipeline::markdown;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RE_NESTED_TABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<table\b").unwrap());
static RE_THEAD_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<thead\b[^>]*>").unwrap());
static RE_THEAD_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</thead\s*>").unwrap());
static RE_TBODY_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<tbody\b[^>]*>").unwrap());
static RE_TBODY_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</tbody\s*>").unwrap());
static RE_THEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<thead\b[^>]*>(.*?)</thead\s*>").unwrap());
static RE_SECTION_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?(?:tbody|tfoot)\b[^>]*>").unwrap());
static RE_ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr\s*>").unwrap());
static RE_TH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<th\b[^>]*>(.*?)</th\s*>").unwrap());
static RE_TD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td\s*>").unwrap());
static RE_BR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\b[^>]*>").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Which reconstructor produced a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLayout {
    Structured,
    Simple,
}

/// How cell text is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellText {
    /// Entities decoded: final Markdown text.
    Decoded,
    /// `&`, `<`, `>` re-escaped, for output that still goes through tag
    /// stripping and entity decoding.
    Escaped,
}

/// Convert the inside of a `<table>` element to a Markdown table.
///
/// Returns `""` when the fragment has no row with at least one cell.
pub fn reconstruct_table(fragment: &str) -> String {
    reconstruct(fragment, CellText::Decoded).0
}

/// Like [`reconstruct_table`], also reporting which reconstructor ran.
pub fn reconstruct_table_with_layout(fragment: &str) -> (String, TableLayout) {
    reconstruct(fragment, CellText::Decoded)
}

pub(crate) fn reconstruct(fragment: &str, text: CellText) -> (String, TableLayout) {
    match structured_rows(fragment, text) {
        Some(rows) => (render(&rows), TableLayout::Structured),
        None => {
            debug!("Irregular table structure, using simple reconstruction");
            (render(&simple_rows(fragment, text)), TableLayout::Simple)
        }
    }
}

// ── Row extraction ───────────────────────────────────────────────────────

/// Header rows first, then the rest. `None` on irregular structure.
fn structured_rows(fragment: &str, text: CellText) -> Option<Vec<Vec<String>>> {
    if RE_NESTED_TABLE.is_match(fragment) {
        return None;
    }
    let thead_open = RE_THEAD_OPEN.find_iter(fragment).count();
    let thead_close = RE_THEAD_CLOSE.find_iter(fragment).count();
    if thead_open != thead_close || thead_open > 1 {
        return None;
    }
    if RE_TBODY_OPEN.find_iter(fragment).count() != RE_TBODY_CLOSE.find_iter(fragment).count() {
        return None;
    }

    let (head, rest) = match RE_THEAD.captures(fragment) {
        Some(caps) => {
            let whole = caps.get(0)?;
            let head = caps.get(1).map_or("", |m| m.as_str());
            let rest = format!("{}{}", &fragment[..whole.start()], &fragment[whole.end()..]);
            (head, rest)
        }
        None => ("", fragment.to_string()),
    };
    let rest = RE_SECTION_TAG.replace_all(&rest, "");

    let mut rows = extract_rows(head, text);
    rows.extend(extract_rows(&rest, text));
    Some(rows)
}

/// Every `<tr>` in document order.
fn simple_rows(fragment: &str, text: CellText) -> Vec<Vec<String>> {
    extract_rows(fragment, text)
}

/// Rows of cleaned cells. A row uses its `<th>` cells if it has any,
/// otherwise its `<td>` cells; rows with neither are skipped.
fn extract_rows(section: &str, text: CellText) -> Vec<Vec<String>> {
    RE_ROW
        .captures_iter(section)
        .filter_map(|row| {
            let inner = row.get(1).map_or("", |m| m.as_str());
            let headers = cells(&RE_TH, inner, text);
            let cells = if headers.is_empty() {
                cells(&RE_TD, inner, text)
            } else {
                headers
            };
            (!cells.is_empty()).then_some(cells)
        })
        .collect()
}

fn cells(re: &Regex, row: &str, text: CellText) -> Vec<String> {
    re.captures_iter(row)
        .map(|c| clean_cell(c.get(1).map_or("", |m| m.as_str()), text))
        .collect()
}

/// Inline formatting, tag stripping, entity decoding, whitespace collapse,
/// and `|` escaping for one cell.
fn clean_cell(raw: &str, text: CellText) -> String {
    let s = RE_BR.replace_all(raw, " ");
    let s = markdown::convert_inline(&s);
    let s = markdown::strip_tags(&s);
    let s = html_escape::decode_html_entities(&s).replace('\u{a0}', " ");
    let s = RE_WHITESPACE.replace_all(&s, " ");
    let s = s.trim().replace('|', "\\|");
    match text {
        CellText::Decoded => s,
        CellText::Escaped => html_escape::encode_text(&s).into_owned(),
    }
}

// ── Rendering ────────────────────────────────────────────────────────────

fn render(rows: &[Vec<String>]) -> String {
    let Some(columns) = rows.iter().map(Vec::len).max() else {
        return String::new();
    };

    let mut out = String::from("\n");
    for (i, row) in rows.iter().enumerate() {
        out.push_str("| ");
        let padded = row
            .iter()
            .map(String::as_str)
            .chain(std::iter::repeat("").take(columns - row.len()));
        out.push_str(&padded.collect::<Vec<_>>().join(" | "));
        out.push_str(" |\n");

        if i == 0 {
            out.push('|');
            for _ in 0..columns {
                out.push_str(" --- |");
            }
            out.push('\n');
        }
    }
    out.push('\n');
    out
}
