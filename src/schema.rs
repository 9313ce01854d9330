//! Per-dataset schema descriptors.
//!
//! The workbook's sheets use column position as an implicit schema, and the
//! conventions drift between sheets and between workbook revisions (the
//! supplier column moves, `IMEI V5` is sometimes `IMEI_V5`). Instead of
//! hard-coding indices, each dataset declares its fields as an ordered list
//! of candidate header names; the descriptor is resolved once per sheet
//! against the located header row, and everything downstream addresses
//! cells by logical field name.

use std::collections::HashMap;

use crate::header::{find_header_row, header_texts, matching_key};
use crate::sheet::{CellValue, Sheet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Date,
}

/// One logical field: the name queries use, the header texts that may
/// carry it, and the kind of value the column holds.
#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    pub field: &'static str,
    pub candidates: &'static [&'static str],
    pub kind: FieldKind,
}

/// Schema of one dataset (one kind of sheet).
#[derive(Clone, Copy, Debug)]
pub struct DatasetSchema {
    pub dataset: &'static str,
    pub fields: &'static [FieldSpec],
}

/// Inventory (TonKho): one row per device in stock, keyed by IMEI.
pub static INVENTORY: DatasetSchema = DatasetSchema {
    dataset: "tonkho",
    fields: &[
        FieldSpec { field: "stt", candidates: &["STT"], kind: FieldKind::Number },
        FieldSpec { field: "ngaynhap", candidates: &["NGÀY NHẬP", "NGAY NHAP"], kind: FieldKind::Date },
        FieldSpec { field: "dongmay", candidates: &["DÒNG MÁY", "DONG MAY"], kind: FieldKind::Text },
        FieldSpec { field: "dungluong", candidates: &["DUNG LƯỢNG", "DUNG LUONG"], kind: FieldKind::Text },
        FieldSpec { field: "mausac", candidates: &["MÀU SẮC", "MAU SAC"], kind: FieldKind::Text },
        FieldSpec { field: "imei", candidates: &["IMEI"], kind: FieldKind::Text },
        FieldSpec { field: "imeiv5", candidates: &["IMEI V5", "IMEI_V5", "IMEIV5"], kind: FieldKind::Text },
        FieldSpec { field: "gianhap", candidates: &["GIÁ NHẬP", "GIA NHAP"], kind: FieldKind::Number },
        FieldSpec { field: "nhacungcap", candidates: &["NHÀ CUNG CẤP", "NHA CUNG CAP"], kind: FieldKind::Text },
        FieldSpec { field: "tinhtrang", candidates: &["TÌNH TRẠNG", "TINH TRANG"], kind: FieldKind::Text },
    ],
};

/// Imports (NhapHang): one row per purchased device.
pub static IMPORTS: DatasetSchema = DatasetSchema {
    dataset: "nhaphang",
    fields: &[
        FieldSpec { field: "stt", candidates: &["STT"], kind: FieldKind::Number },
        FieldSpec { field: "ngaynhap", candidates: &["NGÀY NHẬP", "NGAY NHAP"], kind: FieldKind::Date },
        FieldSpec { field: "dongmay", candidates: &["DÒNG MÁY", "DONG MAY"], kind: FieldKind::Text },
        FieldSpec { field: "dungluong", candidates: &["DUNG LƯỢNG", "DUNG LUONG"], kind: FieldKind::Text },
        FieldSpec { field: "mausac", candidates: &["MÀU SẮC", "MAU SAC"], kind: FieldKind::Text },
        FieldSpec { field: "imei", candidates: &["IMEI"], kind: FieldKind::Text },
        FieldSpec { field: "imeiv5", candidates: &["IMEI V5", "IMEI_V5", "IMEIV5"], kind: FieldKind::Text },
        FieldSpec { field: "gianhap", candidates: &["GIÁ NHẬP", "GIA NHAP"], kind: FieldKind::Number },
        FieldSpec { field: "nhacungcap", candidates: &["NHÀ CUNG CẤP", "NHA CUNG CAP"], kind: FieldKind::Text },
        FieldSpec { field: "tx_nhap", candidates: &["TX_NHAP", "TX NHẬP"], kind: FieldKind::Text },
        FieldSpec { field: "motanhap", candidates: &["MÔ TẢ NHẬP", "MO TA NHAP"], kind: FieldKind::Text },
    ],
};

/// Sales (BanHangT<MM>, one sheet per month): one row per sold device.
pub static SALES: DatasetSchema = DatasetSchema {
    dataset: "banhang",
    fields: &[
        FieldSpec { field: "stt", candidates: &["STT"], kind: FieldKind::Number },
        FieldSpec { field: "ngayban", candidates: &["NGÀY BÁN", "NGAY BAN"], kind: FieldKind::Date },
        FieldSpec { field: "dongmay", candidates: &["DÒNG MÁY", "DONG MAY"], kind: FieldKind::Text },
        FieldSpec { field: "dungluong", candidates: &["DUNG LƯỢNG", "DUNG LUONG"], kind: FieldKind::Text },
        FieldSpec { field: "mausac", candidates: &["MÀU SẮC", "MAU SAC"], kind: FieldKind::Text },
        FieldSpec { field: "imei", candidates: &["IMEI"], kind: FieldKind::Text },
        FieldSpec { field: "imeiv5", candidates: &["IMEI V5", "IMEI_V5", "IMEIV5"], kind: FieldKind::Text },
        FieldSpec { field: "giaban", candidates: &["GIÁ BÁN", "GIA BAN"], kind: FieldKind::Number },
        FieldSpec { field: "khachhang", candidates: &["KHÁCH HÀNG", "KHACH HANG"], kind: FieldKind::Text },
        FieldSpec { field: "gianhap", candidates: &["GIÁ NHẬP", "GIA NHAP"], kind: FieldKind::Number },
        FieldSpec { field: "loinhuan", candidates: &["LỢI NHUẬN", "LOI NHUAN"], kind: FieldKind::Number },
        FieldSpec { field: "ngaynhap", candidates: &["NGÀY NHẬP", "NGAY NHAP"], kind: FieldKind::Date },
        FieldSpec { field: "nhacungcap", candidates: &["NHÀ CUNG CẤP", "NHA CUNG CAP"], kind: FieldKind::Text },
        FieldSpec { field: "motanhap", candidates: &["MÔ TẢ NHẬP", "MO TA NHAP"], kind: FieldKind::Text },
        FieldSpec { field: "tx_nhap", candidates: &["TX_NHAP", "TX NHẬP"], kind: FieldKind::Text },
        FieldSpec { field: "tx_xuat", candidates: &["TX_XUAT", "TX XUẤT"], kind: FieldKind::Text },
    ],
};

/// Write-offs (XuatHuy): devices removed from stock outside a sale.
pub static WRITEOFFS: DatasetSchema = DatasetSchema {
    dataset: "xuathuy",
    fields: &[
        FieldSpec { field: "stt", candidates: &["STT"], kind: FieldKind::Number },
        FieldSpec { field: "ngayxuat", candidates: &["NGÀY XUẤT", "NGÀY HỦY", "NGAY XUAT"], kind: FieldKind::Date },
        FieldSpec { field: "dongmay", candidates: &["DÒNG MÁY", "DONG MAY"], kind: FieldKind::Text },
        FieldSpec { field: "dungluong", candidates: &["DUNG LƯỢNG", "DUNG LUONG"], kind: FieldKind::Text },
        FieldSpec { field: "mausac", candidates: &["MÀU SẮC", "MAU SAC"], kind: FieldKind::Text },
        FieldSpec { field: "imei", candidates: &["IMEI"], kind: FieldKind::Text },
        FieldSpec { field: "imeiv5", candidates: &["IMEI V5", "IMEI_V5", "IMEIV5"], kind: FieldKind::Text },
        FieldSpec { field: "lydo", candidates: &["LÝ DO", "LY DO"], kind: FieldKind::Text },
    ],
};

/// Monthly report rollup (BaoCao).
pub static REPORTS: DatasetSchema = DatasetSchema {
    dataset: "baocao",
    fields: &[
        FieldSpec { field: "stt", candidates: &["STT"], kind: FieldKind::Number },
        FieldSpec { field: "thang", candidates: &["THÁNG", "THANG"], kind: FieldKind::Text },
        FieldSpec { field: "dongmay", candidates: &["DÒNG MÁY", "DONG MAY"], kind: FieldKind::Text },
        FieldSpec { field: "soluong", candidates: &["SỐ LƯỢNG", "SO LUONG"], kind: FieldKind::Number },
        FieldSpec { field: "giatri", candidates: &["GIÁ TRỊ", "GIA TRI"], kind: FieldKind::Number },
    ],
};

/// A dataset schema bound to a concrete sheet: the located header row, the
/// raw header texts, and the logical-field -> column mapping obtained by
/// walking each field's candidate chain.
#[derive(Clone, Debug)]
pub struct ResolvedSchema {
    header_row: usize,
    headers: Vec<String>,
    columns: HashMap<&'static str, usize>,
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl ResolvedSchema {
    pub fn resolve(sheet: &Sheet, schema: &DatasetSchema) -> Self {
        let header_row = find_header_row(sheet);
        let headers = header_texts(sheet, header_row);
        let keys: Vec<String> = headers.iter().map(|h| matching_key(h)).collect();

        let mut columns = HashMap::new();
        for spec in schema.fields {
            for candidate in spec.candidates {
                let wanted = matching_key(candidate);
                if let Some(i) = keys.iter().position(|k| *k == wanted) {
                    columns.insert(spec.field, i);
                    break;
                }
            }
        }

        ResolvedSchema {
            header_row,
            headers,
            columns,
        }
    }

    pub fn header_row(&self) -> usize {
        self.header_row
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// 0-based column index of a logical field, if any candidate matched.
    pub fn column(&self, field: &str) -> Option<usize> {
        self.columns.get(field).copied()
    }

    /// Cell of a logical field within an array-typed data row. Unmapped
    /// fields and short rows read Empty.
    pub fn field<'a>(&self, row: &'a [CellValue], field: &str) -> &'a CellValue {
        self.column(field)
            .and_then(|i| row.get(i))
            .unwrap_or(&EMPTY_CELL)
    }

    /// All data rows of the sheet: everything below the header row, padded
    /// to the sheet's full width.
    pub fn data_rows(&self, sheet: &Sheet) -> Vec<Vec<CellValue>> {
        let last_row = sheet.last_row();
        if last_row <= self.header_row {
            return Vec::new();
        }
        sheet.read_range(
            self.header_row + 1,
            1,
            last_row - self.header_row,
            sheet.last_column(),
        )
    }
}
