//! The query engine: declarative filter predicates, pagination and
//! aggregate summaries over in-memory row collections.
//!
//! Every dataset view goes through the same contract: filter the full row
//! collection with a conjunction of predicates (original order preserved),
//! slice out the requested 1-based page, and project the slice into
//! field-keyed records. Aggregates sum designated numeric columns, with
//! non-numeric cells contributing zero.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::cmp::Ordering;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::header::project_row;
use crate::schema::ResolvedSchema;
use crate::sheet::{CellValue, Sheet};

/// Strip diacritics: NFD decomposition with combining marks removed, so
/// "Hương" and "Huong" compare equal.
pub fn fold_accents(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Case- and accent-insensitive form used by the substring predicates.
pub fn search_normalize(text: &str) -> String {
    fold_accents(&text.to_lowercase())
}

/// Date formats accepted for user-entered range bounds.
const BOUND_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

/// Parse a user-entered date bound. Empty or unparsable input yields None,
/// which deactivates that side of the range.
pub fn parse_date_input(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    BOUND_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// One declarative filter condition over a logical field. Predicates are
/// combined conjunctively; an inactive predicate (empty input, incomplete
/// token) filters nothing.
#[derive(Clone, Debug)]
pub enum Predicate {
    /// Case- and accent-insensitive substring match against any of the
    /// listed fields (the free-text search box matches IMEI or model).
    Contains {
        fields: Vec<&'static str>,
        needle: String,
    },
    /// String equality after coercing the cell to a string, so a numeric
    /// capacity cell still matches its categorical filter value.
    Exact {
        field: &'static str,
        value: String,
    },
    /// Inclusive date range; an empty bound string deactivates that side.
    /// Rows whose date cell is missing or unparsable pass both bounds.
    DateRange {
        field: &'static str,
        from: String,
        to: String,
    },
    /// Partial-serial filter: active only once the token reaches the
    /// required length (the IMEI V5 box filters on exactly five digits).
    FixedToken {
        field: &'static str,
        token: String,
        length: usize,
    },
}

impl Predicate {
    pub fn is_active(&self) -> bool {
        match self {
            Predicate::Contains { needle, .. } => !needle.trim().is_empty(),
            Predicate::Exact { value, .. } => !value.is_empty(),
            Predicate::DateRange { from, to, .. } => {
                parse_date_input(from).is_some() || parse_date_input(to).is_some()
            }
            Predicate::FixedToken { token, length, .. } => token.trim().len() == *length,
        }
    }

    pub fn matches(&self, row: &[CellValue], schema: &ResolvedSchema) -> bool {
        match self {
            Predicate::Contains { fields, needle } => {
                let needle = search_normalize(needle.trim());
                fields.iter().any(|f| {
                    search_normalize(&schema.field(row, f).to_display()).contains(&needle)
                })
            }
            Predicate::Exact { field, value } => {
                schema.field(row, field).to_display() == *value
            }
            Predicate::DateRange { field, from, to } => {
                let Some(date) = schema.field(row, field).as_datetime() else {
                    // Unparsable dates are never excluded by a range bound.
                    return true;
                };
                if let Some(lower) = parse_date_input(from) {
                    if date < lower.and_hms_opt(0, 0, 0).unwrap() {
                        return false;
                    }
                }
                if let Some(upper) = parse_date_input(to) {
                    // Inclusive of the whole upper day.
                    if date > upper.and_hms_opt(23, 59, 59).unwrap() {
                        return false;
                    }
                }
                true
            }
            Predicate::FixedToken { field, token, .. } => {
                let token = token.trim().to_uppercase();
                schema
                    .field(row, field)
                    .to_display()
                    .to_uppercase()
                    .contains(&token)
            }
        }
    }
}

/// One page of a filtered dataset view.
#[derive(Clone, Debug)]
pub struct QueryPage {
    pub items: Vec<Value>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Slice bounds of a 1-based page: `start = (page-1)*page_size`,
/// `end = min(start+page_size, total)`. A page past the end yields an
/// empty slice, never an error.
pub fn page_bounds(total: usize, page: usize, page_size: usize) -> (usize, usize) {
    let page = page.max(1);
    let start = (page - 1).saturating_mul(page_size).min(total);
    let end = start.saturating_add(page_size).min(total);
    (start, end)
}

/// Filter the row collection with the active predicates (conjunctive,
/// order-preserving), paginate, and project the page into field-keyed
/// records.
pub fn run_query(
    rows: &[Vec<CellValue>],
    schema: &ResolvedSchema,
    predicates: &[Predicate],
    page: usize,
    page_size: usize,
) -> QueryPage {
    let active: Vec<&Predicate> = predicates.iter().filter(|p| p.is_active()).collect();

    let filtered: Vec<&Vec<CellValue>> = rows
        .iter()
        .filter(|row| active.iter().all(|p| p.matches(row, schema)))
        .collect();

    let total = filtered.len();
    let (start, end) = page_bounds(total, page, page_size);

    let items = filtered[start..end]
        .iter()
        .map(|row| Value::Object(project_row(schema.headers(), row)))
        .collect();

    QueryPage {
        items,
        total,
        page: page.max(1),
        page_size,
    }
}

/// Paginate rows that were already merged/prefixed, projecting with an
/// explicit header list (used by the multi-period merge views).
pub fn paginate_rows(
    rows: &[Vec<CellValue>],
    headers: &[String],
    page: usize,
    page_size: usize,
) -> QueryPage {
    let total = rows.len();
    let (start, end) = page_bounds(total, page, page_size);
    let items = rows[start..end]
        .iter()
        .map(|row| Value::Object(project_row(headers, row)))
        .collect();
    QueryPage {
        items,
        total,
        page: page.max(1),
        page_size,
    }
}

/// Sum a numeric field across rows; non-numeric and missing cells
/// contribute zero.
pub fn sum_field(rows: &[Vec<CellValue>], schema: &ResolvedSchema, field: &str) -> f64 {
    rows.iter()
        .map(|row| schema.field(row, field).as_number().unwrap_or(0.0))
        .sum()
}

/// Two-tier profit total for a monthly sales sheet.
///
/// Sheets conventionally carry a pre-aggregated total in the cell directly
/// above the header row, in the profit column. When that cell is numeric
/// it wins; otherwise (absent, text, or the header sits in row 1) the
/// per-row sum is used. The fallback chain is preserved as-is from the
/// upstream workbook convention.
pub fn profit_total(sheet: &Sheet, schema: &ResolvedSchema, field: &str) -> f64 {
    let Some(col) = schema.column(field) else {
        return 0.0;
    };

    if schema.header_row() >= 2 {
        if let Some(total) = sheet.cell(schema.header_row() - 1, col + 1).as_number() {
            return total;
        }
    }

    sum_field(&schema.data_rows(sheet), schema, field)
}

/// Prefix every row of a period's collection with the period identifier,
/// producing the merged multi-month layout (period in column 1).
pub fn prefix_period(period: &str, rows: Vec<Vec<CellValue>>) -> Vec<Vec<CellValue>> {
    rows.into_iter()
        .map(|mut row| {
            row.insert(0, CellValue::Text(period.to_string()));
            row
        })
        .collect()
}

/// Ordering for date-sorted history merges: ascending, with records that
/// have no parseable date sorting first (stable).
pub fn cmp_optional_dates(a: &Option<NaiveDateTime>, b: &Option<NaiveDateTime>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(y),
    }
}
