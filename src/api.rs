//! Query actions over the workbook.
//!
//! One function per dispatched `action`, mirroring the endpoint contract:
//! every function returns the full success payload as JSON, or an
//! [`Error`](crate::error::Error) that the dispatch boundary converts into
//! the uniform `{"success": false, "error": "..."}` shape. The functions
//! are pure over the workbook (plus an injected "today" where a date
//! window is involved), which keeps them testable without the server.

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::header::record_key;
use crate::query::{
    Predicate, QueryPage, cmp_optional_dates, paginate_rows, prefix_period, profit_total,
    run_query, search_normalize, sum_field,
};
use crate::saving;
use crate::schema::{DatasetSchema, IMPORTS, INVENTORY, REPORTS, ResolvedSchema, SALES, WRITEOFFS};
use crate::sheet::{CellValue, Sheet, Workbook};

pub const SHEET_TONKHO: &str = "TonKho";
pub const SHEET_NHAPHANG: &str = "NhapHang";
pub const SHEET_XUATHUY: &str = "XuatHuy";
pub const SHEET_BAOCAO: &str = "BaoCao";

/// Monthly sales sheets are named `BanHangT01` .. `BanHangT12`.
pub const SALES_PREFIX: &str = "BanHangT";

lazy_static! {
    static ref SALES_SHEET_REGEX: Regex = Regex::new(r"^BanHangT(\d{2})$").unwrap();
}

/// Request parameters of every action, all optional. Absent or malformed
/// values are silently defaulted when read (a malformed `page` means page
/// 1, a malformed date bound deactivates that side of the range) - the
/// endpoint never rejects a request over its parameters.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ActionParams {
    pub action: String,
    pub page: String,
    #[serde(rename = "pageSize")]
    pub page_size: String,
    pub search: String,
    #[serde(rename = "dongMay")]
    pub dong_may: String,
    #[serde(rename = "dungLuong")]
    pub dung_luong: String,
    #[serde(rename = "imeiV5")]
    pub imei_v5: String,
    #[serde(rename = "dateFrom")]
    pub date_from: String,
    #[serde(rename = "dateTo")]
    pub date_to: String,
    #[serde(rename = "nhaCungCap")]
    pub nha_cung_cap: String,
    pub month: String,
    pub months: String,
    pub days: String,
    pub imei: String,
    #[serde(rename = "imeiList")]
    pub imei_list: String,
    pub refresh: String,
}

fn positive_or(text: &str, default: usize) -> usize {
    text.trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

impl ActionParams {
    pub fn page(&self) -> usize {
        positive_or(&self.page, 1)
    }

    pub fn page_size(&self) -> usize {
        positive_or(&self.page_size, 20)
    }

    pub fn days(&self) -> i64 {
        positive_or(&self.days, 120) as i64
    }

    pub fn refresh(&self) -> bool {
        matches!(self.refresh.trim(), "1" | "true")
    }
}

fn current_month(today: NaiveDate) -> String {
    format!("{:02}", today.month())
}

fn pad_month(month: &str) -> String {
    let m = month.trim();
    if m.len() == 1 {
        format!("0{m}")
    } else {
        m.to_string()
    }
}

/// Name of the sales sheet for a two-digit month id.
pub fn month_sheet_name(month: &str) -> String {
    format!("{SALES_PREFIX}{month}")
}

/// Month id requested by the caller (zero-padded), defaulting to the
/// current month.
pub fn requested_month(params: &ActionParams, today: NaiveDate) -> String {
    if params.month.trim().is_empty() {
        current_month(today)
    } else {
        pad_month(&params.month)
    }
}

/// All monthly sales sheets, with their two-digit month id.
fn sales_sheets(wb: &Workbook) -> Vec<(String, &Sheet)> {
    wb.sheets()
        .iter()
        .filter_map(|s| {
            SALES_SHEET_REGEX
                .captures(&s.name)
                .map(|c| (c[1].to_string(), s))
        })
        .collect()
}

fn open<'a>(
    wb: &'a Workbook,
    name: &str,
    schema: &DatasetSchema,
    label: &str,
) -> Result<(&'a Sheet, ResolvedSchema)> {
    let sheet = wb.sheet(name).ok_or_else(|| Error::sheet(label))?;
    let resolved = ResolvedSchema::resolve(sheet, schema);
    Ok((sheet, resolved))
}

fn page_envelope(page: QueryPage) -> Value {
    json!({
        "success": true,
        "items": page.items,
        "total": page.total,
        "page": page.page,
        "pageSize": page.page_size,
    })
}

/// Inventory view: free-text search over IMEI and model, categorical
/// model/capacity filters, and the five-digit partial-IMEI filter.
pub fn get_ton_kho(wb: &Workbook, params: &ActionParams) -> Result<Value> {
    let (sheet, schema) = open(wb, SHEET_TONKHO, &INVENTORY, "TonKho sheet")?;
    let rows = schema.data_rows(sheet);

    let predicates = [
        Predicate::Contains {
            fields: vec!["imei", "dongmay"],
            needle: params.search.clone(),
        },
        Predicate::Exact {
            field: "dongmay",
            value: params.dong_may.clone(),
        },
        Predicate::Exact {
            field: "dungluong",
            value: params.dung_luong.clone(),
        },
        Predicate::FixedToken {
            field: "imeiv5",
            token: params.imei_v5.clone(),
            length: 5,
        },
    ];

    let page = run_query(&rows, &schema, &predicates, params.page(), params.page_size());
    Ok(page_envelope(page))
}

/// Imports view: free-text search over IMEI and supplier, an inclusive
/// import-date range, a categorical supplier filter and the partial-IMEI
/// filter.
pub fn get_nhap_hang(wb: &Workbook, params: &ActionParams) -> Result<Value> {
    let (sheet, schema) = open(wb, SHEET_NHAPHANG, &IMPORTS, "NhapHang sheet")?;
    let rows = schema.data_rows(sheet);

    let predicates = [
        Predicate::Contains {
            fields: vec!["imei", "nhacungcap"],
            needle: params.search.clone(),
        },
        Predicate::DateRange {
            field: "ngaynhap",
            from: params.date_from.clone(),
            to: params.date_to.clone(),
        },
        Predicate::Exact {
            field: "nhacungcap",
            value: params.nha_cung_cap.clone(),
        },
        Predicate::FixedToken {
            field: "imeiv5",
            token: params.imei_v5.clone(),
            length: 5,
        },
    ];

    let page = run_query(&rows, &schema, &predicates, params.page(), params.page_size());
    Ok(page_envelope(page))
}

/// Monthly sales view with its summary block. The summary always covers
/// the full sheet, not the page: total count, revenue sum, and a plain
/// per-row profit sum (the dashboard is what uses the pre-aggregated
/// total cell).
pub fn get_ban_hang(wb: &Workbook, params: &ActionParams, today: NaiveDate) -> Result<Value> {
    let month = requested_month(params, today);

    let label = format!("BanHang sheet for month {month}");
    let (sheet, schema) = open(wb, &month_sheet_name(&month), &SALES, &label)?;
    let rows = schema.data_rows(sheet);

    let page = run_query(&rows, &schema, &[], params.page(), params.page_size());

    let summary = json!({
        "totalSales": rows.len(),
        "totalRevenue": sum_field(&rows, &schema, "giaban"),
        "totalProfit": sum_field(&rows, &schema, "loinhuan"),
    });

    let mut envelope = page_envelope(page);
    envelope["summary"] = summary;
    envelope["month"] = Value::String(month);
    Ok(envelope)
}

/// Write-off view: plain pagination.
pub fn get_xuat_huy(wb: &Workbook, params: &ActionParams) -> Result<Value> {
    let (sheet, schema) = open(wb, SHEET_XUATHUY, &WRITEOFFS, "XuatHuy sheet")?;
    let rows = schema.data_rows(sheet);
    let page = run_query(&rows, &schema, &[], params.page(), params.page_size());
    Ok(page_envelope(page))
}

/// Report rollup: every row plus quantity/value totals over the full
/// (unfiltered) sheet.
pub fn get_bao_cao(wb: &Workbook) -> Result<Value> {
    let (sheet, schema) = open(wb, SHEET_BAOCAO, &REPORTS, "BaoCao sheet")?;
    let rows = schema.data_rows(sheet);

    let items: Vec<Value> = rows
        .iter()
        .map(|row| Value::Object(crate::header::project_row(schema.headers(), row)))
        .collect();

    Ok(json!({
        "success": true,
        "items": items,
        "summary": {
            "totalQuantity": sum_field(&rows, &schema, "soluong"),
            "totalValue": sum_field(&rows, &schema, "giatri"),
        },
    }))
}

struct HistoryRecord {
    date: Option<NaiveDateTime>,
    json: Value,
}

fn history_record(
    kind: &str,
    imei: &str,
    schema: &ResolvedSchema,
    row: &[CellValue],
    date_field: &str,
    is_sale: bool,
) -> HistoryRecord {
    let date_cell = schema.field(row, date_field);
    let sale_or_empty = |field: &str| {
        if is_sale {
            schema.field(row, field).to_json()
        } else {
            Value::String(String::new())
        }
    };

    HistoryRecord {
        date: date_cell.as_datetime(),
        json: json!({
            "type": kind,
            "imei": imei,
            "date": date_cell.to_json(),
            "dongMay": schema.field(row, "dongmay").to_json(),
            "dungLuong": schema.field(row, "dungluong").to_json(),
            "mauSac": schema.field(row, "mausac").to_json(),
            "supplier": schema.field(row, "nhacungcap").to_json(),
            "customer": sale_or_empty("khachhang"),
            "txIn": schema.field(row, "tx_nhap").to_json(),
            "txOut": sale_or_empty("tx_xuat"),
            "priceIn": schema.field(row, "gianhap").to_json(),
            "priceOut": sale_or_empty("giaban"),
            "profit": sale_or_empty("loinhuan"),
            "description": schema.field(row, "motanhap").to_json(),
        }),
    }
}

/// Full life history of one or more IMEIs: their import record plus every
/// sale across all monthly sheets, merged and sorted ascending by date.
/// Records without a parseable date sort first.
pub fn search_imei(wb: &Workbook, params: &ActionParams) -> Result<Value> {
    let imeis: HashSet<String> = params
        .imei_list
        .split(',')
        .chain(std::iter::once(params.imei.as_str()))
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

    let mut history: Vec<HistoryRecord> = Vec::new();

    if let Some(sheet) = wb.sheet(SHEET_NHAPHANG) {
        let schema = ResolvedSchema::resolve(sheet, &IMPORTS);
        for row in schema.data_rows(sheet) {
            let imei = schema.field(&row, "imei").to_display().trim().to_uppercase();
            if imeis.contains(&imei) {
                history.push(history_record("Nhập", &imei, &schema, &row, "ngaynhap", false));
            }
        }
    }

    for (_, sheet) in sales_sheets(wb) {
        let schema = ResolvedSchema::resolve(sheet, &SALES);
        for row in schema.data_rows(sheet) {
            let imei = schema.field(&row, "imei").to_display().trim().to_uppercase();
            if imeis.contains(&imei) {
                history.push(history_record("Bán", &imei, &schema, &row, "ngayban", true));
            }
        }
    }

    history.sort_by(|a, b| cmp_optional_dates(&a.date, &b.date));
    let records: Vec<Value> = history.into_iter().map(|r| r.json).collect();

    Ok(json!({ "success": true, "history": records }))
}

/// Customer search across months: each requested month's sales rows are
/// filtered accent-insensitively on the customer name, prefixed with the
/// month id, merged and paginated as one collection.
pub fn search_customer(wb: &Workbook, params: &ActionParams, today: NaiveDate) -> Result<Value> {
    let months: Vec<String> = if params.months.trim().is_empty() {
        vec![current_month(today)]
    } else {
        params
            .months
            .split(',')
            .map(pad_month)
            .filter(|m| !m.is_empty())
            .collect()
    };

    let needle = search_normalize(params.search.trim());

    let mut merged: Vec<Vec<CellValue>> = Vec::new();
    let mut headers: Option<Vec<String>> = None;

    for month in &months {
        let Some(sheet) = wb.sheet(&month_sheet_name(month)) else {
            // Months without a sheet simply contribute nothing.
            continue;
        };
        let schema = ResolvedSchema::resolve(sheet, &SALES);

        let rows: Vec<Vec<CellValue>> = schema
            .data_rows(sheet)
            .into_iter()
            .filter(|row| {
                needle.is_empty()
                    || search_normalize(&schema.field(row, "khachhang").to_display())
                        .contains(&needle)
            })
            .collect();

        if headers.is_none() {
            let mut h = vec!["THÁNG".to_string()];
            h.extend(schema.headers().iter().cloned());
            headers = Some(h);
        }
        merged.extend(prefix_period(month, rows));
    }

    let headers = headers.unwrap_or_else(|| vec!["THÁNG".to_string()]);
    let page = paginate_rows(&merged, &headers, params.page(), params.page_size());

    let mut envelope = page_envelope(page);
    envelope["months"] = json!(months);
    Ok(envelope)
}

struct ProductStat {
    dong_may: String,
    units: usize,
    revenue: f64,
}

/// Units and revenue per model across all sales sheets within the last
/// `days` days. Rows need a parseable sale date inside the window, a
/// non-empty model and a non-empty, non-zero price cell to count.
fn product_stats(wb: &Workbook, days: i64, today: NaiveDate) -> (Vec<ProductStat>, usize) {
    let start = today - Duration::days(days);
    let mut stats: Vec<ProductStat> = Vec::new();
    let mut total_sales = 0usize;

    for (_, sheet) in sales_sheets(wb) {
        let schema = ResolvedSchema::resolve(sheet, &SALES);
        if schema.column("ngayban").is_none()
            || schema.column("dongmay").is_none()
            || schema.column("giaban").is_none()
        {
            continue;
        }

        for row in schema.data_rows(sheet) {
            let Some(date) = schema.field(&row, "ngayban").as_datetime() else {
                continue;
            };
            if date.date() < start || date.date() > today {
                continue;
            }

            let model = schema.field(&row, "dongmay").to_display().trim().to_string();
            if model.is_empty() {
                continue;
            }

            let price_cell = schema.field(&row, "giaban");
            let priced = match price_cell {
                CellValue::Number(n) => *n != 0.0,
                CellValue::Empty => false,
                _ => !price_cell.to_display().is_empty(),
            };
            if !priced {
                continue;
            }

            total_sales += 1;
            let revenue = price_cell.as_number().unwrap_or(0.0);
            match stats.iter_mut().find(|s| s.dong_may == model) {
                Some(s) => {
                    s.units += 1;
                    s.revenue += revenue;
                }
                None => stats.push(ProductStat {
                    dong_may: model,
                    units: 1,
                    revenue,
                }),
            }
        }
    }

    // Stable sort: models tied on units keep first-seen order.
    stats.sort_by(|a, b| b.units.cmp(&a.units));
    (stats, total_sales)
}

/// Best-selling models within the requested window (default 120 days),
/// capped at the top ten.
pub fn get_top_products(wb: &Workbook, params: &ActionParams, today: NaiveDate) -> Result<Value> {
    let days = params.days();
    let (stats, total_sales) = product_stats(wb, days, today);

    let top: Vec<Value> = stats
        .iter()
        .take(10)
        .map(|s| {
            json!({
                "dongMay": s.dong_may,
                "soLuongBan": s.units,
                "doanhThu": s.revenue,
            })
        })
        .collect();

    Ok(json!({
        "success": true,
        "topProducts": top,
        "totalDays": days,
        "totalSales": total_sales,
    }))
}

/// Dashboard aggregates: stock count, current-month sales/revenue/profit,
/// current-month import count, trailing-12-month revenue and profit
/// series, and the top-product split for the chart.
///
/// Missing sheets contribute zeros; this action never fails over absent
/// data.
pub fn get_dashboard(wb: &Workbook, today: NaiveDate) -> Result<Value> {
    let total_ton_kho = wb
        .sheet(SHEET_TONKHO)
        .map(|sheet| {
            let schema = ResolvedSchema::resolve(sheet, &INVENTORY);
            sheet.last_row().saturating_sub(schema.header_row())
        })
        .unwrap_or(0);

    let month = current_month(today);
    let mut total_ban = 0usize;
    let mut total_revenue = 0.0;
    let mut total_profit = 0.0;
    if let Some(sheet) = wb.sheet(&month_sheet_name(&month)) {
        let schema = ResolvedSchema::resolve(sheet, &SALES);
        let rows = schema.data_rows(sheet);
        total_ban = rows.len();
        total_revenue = sum_field(&rows, &schema, "giaban");
        // The dashboard profit honors the pre-aggregated total cell.
        total_profit = profit_total(sheet, &schema, "loinhuan");
    }

    let mut total_nhap = 0usize;
    if let Some(sheet) = wb.sheet(SHEET_NHAPHANG) {
        let schema = ResolvedSchema::resolve(sheet, &IMPORTS);
        total_nhap = schema
            .data_rows(sheet)
            .iter()
            .filter(|row| {
                schema
                    .field(row, "ngaynhap")
                    .as_datetime()
                    .map(|d| d.year() == today.year() && d.month() == today.month())
                    .unwrap_or(false)
            })
            .count();
    }

    let mut revenue_by_month = Vec::with_capacity(12);
    let mut profit_by_month = Vec::with_capacity(12);
    for i in (0..12u32).rev() {
        let m = today
            .checked_sub_months(Months::new(i))
            .unwrap_or(today);
        match wb.sheet(&month_sheet_name(&format!("{:02}", m.month()))) {
            Some(sheet) => {
                let schema = ResolvedSchema::resolve(sheet, &SALES);
                let rows = schema.data_rows(sheet);
                revenue_by_month.push(sum_field(&rows, &schema, "giaban"));
                profit_by_month.push(profit_total(sheet, &schema, "loinhuan"));
            }
            None => {
                revenue_by_month.push(0.0);
                profit_by_month.push(0.0);
            }
        }
    }

    // Chart split: top three models by units, everything else lumped.
    let (stats, _) = product_stats(wb, 120, today);
    let mut labels: Vec<String> = stats.iter().take(3).map(|s| s.dong_may.clone()).collect();
    let mut data: Vec<usize> = stats.iter().take(3).map(|s| s.units).collect();
    let rest: usize = stats.iter().skip(3).map(|s| s.units).sum();
    if rest > 0 {
        labels.push("Khác".to_string());
        data.push(rest);
    }

    Ok(json!({
        "success": true,
        "totalTonKho": total_ton_kho,
        "totalRevenue": total_revenue,
        "totalProfit": total_profit,
        "totalNhap": total_nhap,
        "totalBan": total_ban,
        "revenueByMonth": revenue_by_month,
        "profitByMonth": profit_by_month,
        "productsData": { "labels": labels, "data": data },
    }))
}

fn json_to_cell(value: &Value) -> CellValue {
    match value {
        Value::Null => CellValue::Empty,
        Value::Number(n) => CellValue::Number(n.as_f64().unwrap_or(0.0)),
        Value::Bool(b) => CellValue::Text(if *b { "TRUE".into() } else { "FALSE".into() }),
        Value::String(s) => {
            if s.is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(s.clone())
            }
        }
        other => CellValue::Text(other.to_string()),
    }
}

/// Append a record to a dataset's sheet. Field keys are matched against
/// the sheet's headers through the same key normalization the projector
/// uses, so `"dongMay"`, `"DÒNG MÁY"` and `"dòng máy"` all land in the
/// model column. A sequence column gets the next ordinal when the caller
/// does not provide one.
pub fn add_record(
    wb: &mut Workbook,
    schema: &DatasetSchema,
    sheet_name: &str,
    fields: &Map<String, Value>,
) -> Result<Value> {
    let label = format!("{sheet_name} sheet");
    let (sheet, resolved) = open(wb, sheet_name, schema, &label)?;
    let data_count = sheet.last_row().saturating_sub(resolved.header_row());
    let width = sheet.last_column().max(resolved.headers().len());

    let mut row = vec![CellValue::Empty; width];
    for (key, value) in fields {
        let wanted = record_key(key);
        if let Some(i) = resolved
            .headers()
            .iter()
            .position(|h| record_key(h) == wanted)
        {
            if i >= row.len() {
                row.resize(i + 1, CellValue::Empty);
            }
            row[i] = json_to_cell(value);
        }
    }

    if let Some(i) = resolved.column("stt") {
        if i < row.len() && row[i].is_empty() {
            row[i] = CellValue::Number((data_count + 1) as f64);
        }
    }

    let row_number = sheet.last_row() + 1;
    let sheet = wb.sheet_mut(sheet_name).ok_or_else(|| Error::sheet(label.clone()))?;
    sheet.push_row(row);

    Ok(json!({ "success": true, "row": row_number }))
}

/// Update the first record whose IMEI matches, writing only the provided
/// fields. Unknown field keys are ignored; a missing record is a named
/// error.
pub fn update_record(
    wb: &mut Workbook,
    schema: &DatasetSchema,
    sheet_name: &str,
    imei: &str,
    fields: &Map<String, Value>,
) -> Result<Value> {
    let label = format!("{sheet_name} sheet");
    let (sheet, resolved) = open(wb, sheet_name, schema, &label)?;

    let wanted_imei = imei.trim().to_uppercase();
    let row_index = resolved
        .data_rows(sheet)
        .iter()
        .position(|row| {
            resolved.field(row, "imei").to_display().trim().to_uppercase() == wanted_imei
        })
        .ok_or(Error::RecordNotFound)?;
    let row_number = resolved.header_row() + row_index + 1;

    let mut updates: Vec<(usize, CellValue)> = Vec::new();
    for (key, value) in fields {
        let wanted = record_key(key);
        if let Some(i) = resolved
            .headers()
            .iter()
            .position(|h| record_key(h) == wanted)
        {
            updates.push((i + 1, json_to_cell(value)));
        }
    }

    let sheet = wb.sheet_mut(sheet_name).ok_or_else(|| Error::sheet(label.clone()))?;
    for (col, value) in updates {
        sheet.set_cell(row_number, col, value);
    }

    Ok(json!({ "success": true, "row": row_number }))
}

/// Recompute the profit column of a monthly sales sheet (sale price minus
/// cost, rows with both numeric) and write the total into the
/// pre-aggregated cell above the header row, keeping the sheet convention
/// the dashboard's two-tier read relies on.
pub fn calculate_profit(wb: &mut Workbook, params: &ActionParams, today: NaiveDate) -> Result<Value> {
    let month = requested_month(params, today);
    let name = month_sheet_name(&month);
    let label = format!("BanHang sheet for month {month}");

    let (sheet, schema) = open(wb, &name, &SALES, &label)?;
    let profit_col = schema
        .column("loinhuan")
        .ok_or_else(|| Error::Workbook(format!("LỢI NHUẬN column not found in {name}")))?;

    let rows = schema.data_rows(sheet);
    let mut updates: Vec<(usize, f64)> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let sale = schema.field(row, "giaban").as_number();
        let cost = schema.field(row, "gianhap").as_number();
        if let (Some(sale), Some(cost)) = (sale, cost) {
            updates.push((schema.header_row() + i + 1, sale - cost));
        }
    }

    let updated = updates.len();
    let header_row = schema.header_row();

    let sheet = wb.sheet_mut(&name).ok_or_else(|| Error::sheet(label.clone()))?;
    for (row_number, profit) in &updates {
        sheet.set_cell(*row_number, profit_col + 1, CellValue::Number(*profit));
    }

    // Re-read the column so untouched rows keep contributing their value.
    let sheet = wb.sheet(&name).ok_or_else(|| Error::sheet(label.clone()))?;
    let schema = ResolvedSchema::resolve(sheet, &SALES);
    let total = sum_field(&schema.data_rows(sheet), &schema, "loinhuan");

    if header_row >= 2 {
        let sheet = wb.sheet_mut(&name).ok_or_else(|| Error::sheet(label.clone()))?;
        sheet.set_cell(header_row - 1, profit_col + 1, CellValue::Number(total));
    }

    Ok(json!({
        "success": true,
        "month": month,
        "totalProfit": total,
        "updated": updated,
    }))
}

/// Stock-vs-sales consistency check: IMEIs still present in the inventory
/// sheet that also appear in a monthly sales sheet (sold but never removed
/// from stock).
pub fn compare_ton_kho(wb: &Workbook) -> Result<Value> {
    let (sheet, schema) = open(wb, SHEET_TONKHO, &INVENTORY, "TonKho sheet")?;

    let stock: Vec<String> = schema
        .data_rows(sheet)
        .iter()
        .map(|row| schema.field(row, "imei").to_display().trim().to_uppercase())
        .filter(|imei| !imei.is_empty())
        .collect();

    let mut sold: HashSet<String> = HashSet::new();
    for (_, sales_sheet) in sales_sheets(wb) {
        let sales_schema = ResolvedSchema::resolve(sales_sheet, &SALES);
        for row in sales_schema.data_rows(sales_sheet) {
            let imei = sales_schema
                .field(&row, "imei")
                .to_display()
                .trim()
                .to_uppercase();
            if !imei.is_empty() {
                sold.insert(imei);
            }
        }
    }

    let discrepancies: Vec<&String> = stock.iter().filter(|imei| sold.contains(*imei)).collect();

    Ok(json!({
        "success": true,
        "totalTonKho": stock.len(),
        "totalSold": sold.len(),
        "totalDiscrepancies": discrepancies.len(),
        "discrepancies": discrepancies,
    }))
}

/// Rebuild the BaoCao rollup sheet from the monthly sales sheets: one row
/// per (month, model) with units sold and total value, replacing the
/// previous rollup.
pub fn generate_bao_cao(wb: &mut Workbook) -> Result<Value> {
    let mut groups: Vec<(String, String, usize, f64)> = Vec::new();

    for (month, sheet) in sales_sheets(wb) {
        let schema = ResolvedSchema::resolve(sheet, &SALES);
        for row in schema.data_rows(sheet) {
            let model = schema.field(&row, "dongmay").to_display().trim().to_string();
            if model.is_empty() {
                continue;
            }
            let value = schema.field(&row, "giaban").as_number().unwrap_or(0.0);
            match groups
                .iter_mut()
                .find(|(m, d, _, _)| *m == month && *d == model)
            {
                Some(group) => {
                    group.2 += 1;
                    group.3 += value;
                }
                None => groups.push((month.clone(), model, 1, value)),
            }
        }
    }

    groups.sort_by(|a, b| a.0.cmp(&b.0).then(b.2.cmp(&a.2)));

    let mut sheet = Sheet::new(SHEET_BAOCAO);
    sheet.push_row(
        ["STT", "THÁNG", "DÒNG MÁY", "SỐ LƯỢNG", "GIÁ TRỊ"]
            .iter()
            .map(|h| CellValue::Text((*h).to_string()))
            .collect(),
    );
    for (i, (month, model, units, value)) in groups.iter().enumerate() {
        sheet.push_row(vec![
            CellValue::Number((i + 1) as f64),
            CellValue::Text(month.clone()),
            CellValue::Text(model.clone()),
            CellValue::Number(*units as f64),
            CellValue::Number(*value),
        ]);
    }

    let rows = groups.len();
    wb.add_sheet(sheet);

    Ok(json!({ "success": true, "rows": rows }))
}

/// Write a compressed snapshot of the whole workbook next to the source
/// file.
pub fn backup_data(wb: &Workbook, source: &Path) -> Result<Value> {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("workbook");
    let backup = source.with_file_name(format!("{stem}_backup.bin.gz"));

    saving::save_snapshot(wb, &backup)?;

    Ok(json!({
        "success": true,
        "path": backup.display().to_string(),
    }))
}
