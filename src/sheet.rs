use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single cell of a sheet.
///
/// Sheets mix types freely: the IMEI column holds text in one workbook
/// revision and numbers in another, price columns are numeric, date columns
/// are real date cells or `dd/mm/yyyy` text. The query engine only ever
/// looks at cells through the coercions below, never at the variant itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

/// Text date formats accepted when a date column was typed by hand.
const TEXT_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];
const TEXT_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Numeric view of the cell. Text that merely looks like a number does
    /// not count; aggregates treat anything non-numeric as zero.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Date view of the cell: a real date cell, or text in one of the
    /// accepted formats. Numbers are never interpreted as dates.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::DateTime(dt) => Some(*dt),
            CellValue::Text(s) => {
                let s = s.trim();
                for fmt in TEXT_DATETIME_FORMATS {
                    if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                        return Some(dt);
                    }
                }
                for fmt in TEXT_DATE_FORMATS {
                    if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
                        return d.and_hms_opt(0, 0, 0);
                    }
                }
                None
            }
            _ => None,
        }
    }

    /// String coercion used by the exact-match and substring predicates.
    /// Whole numbers render without a fractional part so that a numeric
    /// capacity cell `64` equals the categorical filter value `"64"`.
    pub fn to_display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            CellValue::Text(s) => s.clone(),
            CellValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// JSON view used by the row projector. Empty cells project as `""`,
    /// matching what a spreadsheet range read returns for blank cells.
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Empty => Value::String(String::new()),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Value::from(*n as i64)
                } else {
                    Value::from(*n)
                }
            }
            CellValue::Text(s) => Value::String(s.clone()),
            CellValue::DateTime(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
        }
    }
}

static EMPTY_CELL: CellValue = CellValue::Empty;

/// One named tab of the workbook: a growable 2-D grid of cells.
///
/// All coordinates are 1-based, mirroring the spreadsheet backend this
/// model stands in for. Reads outside the grid yield `Empty`, never an
/// error.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Sheet {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Sheet {
            name: name.into(),
            rows,
        }
    }

    /// Index of the last row holding data (equals the row count).
    pub fn last_row(&self) -> usize {
        self.rows.len()
    }

    /// Width of the widest row.
    pub fn last_column(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Cell at 1-based (row, col); `Empty` outside the grid.
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        if row == 0 || col == 0 {
            return &EMPTY_CELL;
        }
        self.rows
            .get(row - 1)
            .and_then(|r| r.get(col - 1))
            .unwrap_or(&EMPTY_CELL)
    }

    /// Rectangular read starting at 1-based (row, col). The result always
    /// has `nrows` x `ncols` cells; positions outside the grid read Empty.
    pub fn read_range(
        &self,
        row: usize,
        col: usize,
        nrows: usize,
        ncols: usize,
    ) -> Vec<Vec<CellValue>> {
        let mut out = Vec::with_capacity(nrows);
        for r in row..row + nrows {
            let mut line = Vec::with_capacity(ncols);
            for c in col..col + ncols {
                line.push(self.cell(r, c).clone());
            }
            out.push(line);
        }
        out
    }

    pub fn push_row(&mut self, row: Vec<CellValue>) {
        self.rows.push(row);
    }

    /// Write a cell at 1-based (row, col), growing the grid as needed.
    pub fn set_cell(&mut self, row: usize, col: usize, value: CellValue) {
        if row == 0 || col == 0 {
            return;
        }
        while self.rows.len() < row {
            self.rows.push(Vec::new());
        }
        let line = &mut self.rows[row - 1];
        while line.len() < col {
            line.push(CellValue::Empty);
        }
        line[col - 1] = value;
    }
}

/// The workbook: the row source the whole application queries.
///
/// Owned by the server state behind a lock; the query layer only ever
/// borrows sheets read-only, the record-mutation actions take `&mut`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Workbook::default()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    /// Insert a sheet, replacing any existing sheet with the same name.
    pub fn add_sheet(&mut self, sheet: Sheet) {
        if let Some(existing) = self.sheets.iter_mut().find(|s| s.name == sheet.name) {
            *existing = sheet;
        } else {
            self.sheets.push(sheet);
        }
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}
