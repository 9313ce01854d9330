use serde_json::{Map, Value};

use crate::sheet::{CellValue, Sheet};

/// Keywords that identify a header row. A sheet's header is not always row
/// 1 - some tabs carry a title or a pre-aggregated total row above it.
pub const HEADER_KEYWORDS: [&str; 3] = ["STT", "IMEI", "DÒNG MÁY"];

/// Locate the header row of a sheet: the first of the top five rows where
/// any cell's trimmed upper-cased text contains one of the known header
/// keywords. Falls back to row 1 when nothing matches or the sheet is
/// empty, so callers always get a usable index.
pub fn find_header_row(sheet: &Sheet) -> usize {
    let last_row = sheet.last_row();
    if last_row < 1 {
        return 1;
    }

    let last_col = sheet.last_column();
    for r in 1..=last_row.min(5) {
        for c in 1..=last_col {
            let text = matching_key(&sheet.cell(r, c).to_display());
            if HEADER_KEYWORDS.iter().any(|kw| text.contains(kw)) {
                return r;
            }
        }
    }

    1
}

/// Normalization used when comparing header texts against candidate names:
/// trim and upper-case, so `"Dòng Máy"` and `"DÒNG MÁY"` collapse.
pub fn matching_key(text: &str) -> String {
    text.trim().to_uppercase()
}

/// Normalization used for projected record keys: trim, lower-case, strip
/// all whitespace. `"DUNG LƯỢNG"` becomes `"dunglượng"`.
pub fn record_key(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Raw texts of a sheet's header row.
pub fn header_texts(sheet: &Sheet, header_row: usize) -> Vec<String> {
    let ncols = sheet.last_column();
    (1..=ncols)
        .map(|c| sheet.cell(header_row, c).to_display())
        .collect()
}

/// Project an array-typed data row into a field-keyed record using the
/// header texts. Value types are preserved (numbers stay numbers, dates
/// become ISO-8601 strings); positions past the end of a short row project
/// as the empty string.
pub fn project_row(headers: &[String], row: &[CellValue]) -> Map<String, Value> {
    let mut record = Map::new();
    for (i, header) in headers.iter().enumerate() {
        let value = row
            .get(i)
            .map(CellValue::to_json)
            .unwrap_or_else(|| Value::String(String::new()));
        record.insert(record_key(header), value);
    }
    record
}
