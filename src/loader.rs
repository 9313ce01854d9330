#![cfg(not(tarpaulin_include))]

use calamine::{Data, DataType, Reader, Xlsx, open_workbook};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};
use crate::saving;
use crate::sheet::{CellValue, Sheet, Workbook};

/// Load a workbook from an Excel file
///
/// Every worksheet of the file becomes one named sheet of the workbook.
/// Cell coordinates are preserved: a used range that starts below row 1
/// (e.g. a sheet whose first rows are blank) is padded so that the header
/// locator sees the same row numbers the spreadsheet does.
///
/// # Arguments
/// * `filepath` - Path to the XLSX file to load
///
/// # Returns
/// * `Result<Workbook>` - The loaded workbook or an error
pub fn from_xlsx(filepath: impl AsRef<Path>) -> Result<Workbook> {
    let mut excel: Xlsx<_> =
        open_workbook(filepath).map_err(|e: calamine::XlsxError| Error::Workbook(e.to_string()))?;

    let names = excel.sheet_names().to_owned();
    if names.is_empty() {
        return Err(Error::Workbook("No sheets found in Excel file".into()));
    }

    let mut workbook = Workbook::new();
    for name in names {
        let range = excel
            .worksheet_range(&name)
            .map_err(|e| Error::Workbook(e.to_string()))?;

        let (start_row, start_col) = range.start().unwrap_or((0, 0));

        let mut rows: Vec<Vec<CellValue>> = Vec::new();
        // Blank leading rows so sheet coordinates match the file.
        for _ in 0..start_row {
            rows.push(Vec::new());
        }
        for row in range.rows() {
            let mut line = vec![CellValue::Empty; start_col as usize];
            line.extend(row.iter().map(data_to_cell));
            rows.push(line);
        }

        log::debug!("loaded sheet {} ({} rows)", name, rows.len());
        workbook.add_sheet(Sheet::from_rows(name, rows));
    }

    Ok(workbook)
}

fn data_to_cell(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => {
            if s.is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(s.clone())
            }
        }
        Data::Bool(b) => CellValue::Text(if *b { "TRUE".into() } else { "FALSE".into() }),
        Data::DateTime(_) | Data::DateTimeIso(_) => match data.as_datetime() {
            Some(dt) => CellValue::DateTime(dt),
            None => CellValue::Empty,
        },
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) => CellValue::Empty,
    }
}

/// Load a single-sheet workbook from a CSV file
///
/// The file becomes one sheet named after the file stem. Quoted fields and
/// embedded quotes are handled; numeric-looking fields become numbers,
/// everything else stays text.
///
/// # Arguments
/// * `filepath` - Path to the CSV file to load
///
/// # Returns
/// * `Result<Workbook>` - The loaded workbook or an error
pub fn from_csv(filepath: impl AsRef<Path>) -> Result<Workbook> {
    let path = filepath.as_ref();
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Sheet1")
        .to_string();

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let lines: Vec<String> = reader
        .lines()
        .collect::<std::result::Result<_, _>>()
        .map_err(Error::Io)?;

    if lines.is_empty() {
        return Err(Error::Workbook("CSV file is empty".into()));
    }

    let mut rows = Vec::with_capacity(lines.len());
    for line in &lines {
        let fields = parse_csv_row(line);
        rows.push(fields.into_iter().map(csv_field_to_cell).collect());
    }

    let mut workbook = Workbook::new();
    workbook.add_sheet(Sheet::from_rows(name, rows));
    Ok(workbook)
}

fn csv_field_to_cell(field: String) -> CellValue {
    if field.is_empty() {
        return CellValue::Empty;
    }
    match field.trim().parse::<f64>() {
        Ok(n) => CellValue::Number(n),
        Err(_) => CellValue::Text(field),
    }
}

// Parse a CSV row into a vector of strings
fn parse_csv_row(line: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if let Some(&next) = chars.peek() {
                    if next == '"' && in_quotes {
                        // Double quote inside quoted field - add a single quote
                        current_field.push('"');
                        chars.next();
                    } else {
                        // Toggle quote state
                        in_quotes = !in_quotes;
                    }
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                // End of field
                result.push(current_field);
                current_field = String::new();
            }
            _ => {
                current_field.push(c);
            }
        }
    }

    // Add the last field
    result.push(current_field);

    result
}

/// Detect file type and load appropriate format
///
/// This function examines the file extension and calls the appropriate
/// loader: CSV, Excel, or a compressed workbook snapshot.
///
/// # Arguments
/// * `filepath` - Path to the file to load
///
/// # Returns
/// * `Result<Workbook>` - The loaded workbook or an error
pub fn load_workbook(filepath: impl AsRef<Path>) -> Result<Workbook> {
    let path = filepath.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("csv") => from_csv(path),
        Some("xlsx") | Some("xls") => from_xlsx(path),
        Some("gz") | Some("bin") => Ok(saving::load_snapshot(path)?),
        Some(ext) => Err(Error::Workbook(format!(
            "Unsupported file extension: {}",
            ext
        ))),
        None => Err(Error::Workbook("File has no extension".into())),
    }
}
