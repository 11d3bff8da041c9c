use std::sync::LazyLock;

use crate::types::{Grade, TermSnapshot};

use scraper::{ElementRef, Html, Selector};

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Term '{0}' not found in any table")]
    TermNotFound(String),
}

static TABLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("invalid selector: table"));
static ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("invalid selector: tr"));
static CELL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td, th").expect("invalid selector: td, th"));

const TERM_HEADER_CLASS: &str = "HeaderDetail";
const COURSE_DETAIL_CLASS: &str = "g_normalDetail";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    TermHeader,
    CourseDetail,
    Other,
}

impl RowKind {
    pub fn classify(class: &str) -> Self {
        if class.contains(TERM_HEADER_CLASS) {
            RowKind::TermHeader
        } else if class.contains(COURSE_DETAIL_CLASS) {
            RowKind::CourseDetail
        } else {
            RowKind::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub class: String,
    pub text: String,
}

impl TableRow {
    pub fn new(class: impl Into<String>, text: &str) -> Self {
        Self {
            class: class.into(),
            text: normalize_row_text(text),
        }
    }

    pub fn kind(&self) -> RowKind {
        RowKind::classify(&self.class)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageTable {
    pub rows: Vec<TableRow>,
}

fn normalize_row_text(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of a row as a browser renders it: inline markup inside a cell does
/// not split words, only cell boundaries do.
fn row_text(row: ElementRef) -> String {
    let cells: Vec<String> = row
        .select(&CELL_SELECTOR)
        .map(|cell| cell.text().collect::<String>())
        .collect();

    if cells.is_empty() {
        row.text().collect()
    } else {
        cells.join(" ")
    }
}

/// Reads every table of a rendered page, rows included in document order.
pub fn parse_page_tables(html: &str) -> Vec<PageTable> {
    let document = Html::parse_document(html);

    document
        .select(&TABLE_SELECTOR)
        .map(|table| PageTable {
            rows: table
                .select(&ROW_SELECTOR)
                .map(|row| {
                    TableRow::new(row.value().attr("class").unwrap_or(""), &row_text(row))
                })
                .collect(),
        })
        .collect()
}

pub fn is_course_code(token: &str) -> bool {
    token.chars().any(char::is_alphabetic) && token.chars().any(char::is_numeric)
}

pub fn parse_grade_from_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Option<Grade> {
    tokens.into_iter().find_map(|t| t.parse::<Grade>().ok())
}

/// Collects the course rows that follow the header matching `term`.
///
/// Tables are scanned in order and the first one yielding at least one
/// course wins. Within a table, collection stops at the next term header.
/// `term` is whitespace-normalized the same way row text is.
pub fn extract_term_grades(
    tables: &[PageTable],
    term: &str,
) -> Result<TermSnapshot, ExtractError> {
    let term = normalize_row_text(term);
    let term = term.as_str();

    for (index, table) in tables.iter().enumerate() {
        let mut collecting = false;
        let mut snapshot = TermSnapshot::new(term);

        for row in &table.rows {
            match row.kind() {
                RowKind::TermHeader => {
                    if row.text.contains(term) {
                        collecting = true;
                        continue;
                    }
                    if collecting {
                        log::debug!("Term '{}' ended at header '{}'", term, row.text);
                        break;
                    }
                }
                RowKind::CourseDetail if collecting => {
                    let tokens: Vec<&str> = row.text.split_whitespace().collect();
                    let Some(first) = tokens.first() else {
                        continue;
                    };

                    let course_code = first.to_uppercase();
                    if !is_course_code(&course_code) {
                        log::trace!("Skipping summary row '{}'", row.text);
                        continue;
                    }

                    let grade = parse_grade_from_tokens(tokens.iter().copied());
                    snapshot.insert(course_code, grade);
                }
                _ => {}
            }
        }

        if !snapshot.is_empty() {
            log::debug!(
                "Found {} course(s) for '{}' in table {}",
                snapshot.len(),
                term,
                index
            );
            return Ok(snapshot);
        }
    }

    Err(ExtractError::TermNotFound(term.to_string()))
}
