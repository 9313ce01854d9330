/*!
# QLBH Admin Backend

Inventory and sales management for a phone shop, backed by a spreadsheet
workbook acting as the database and exposed through a single HTTP endpoint
consumed by a browser dashboard.

## Overview

The workbook carries one sheet per dataset: `TonKho` (stock, one row per
device keyed by IMEI), `NhapHang` (imports), `BanHangT01`..`BanHangT12`
(sales, one sheet per month), `XuatHuy` (write-offs) and `BaoCao` (the
report rollup). Sheets are loose: the header row is not always row 1,
header texts drift between revisions, and columns mix numeric and text
cells freely. Everything above the raw grid deals with that.

## Architecture

Data flows through four layers:

- **Row source** (`sheet`, `loader`, `saving`): the in-memory `Workbook`
  of named `Sheet`s, loaded from `.xlsx`/`.csv` files or compressed
  snapshots, with 1-based clamped range reads.
- **Header locator & row projector** (`header`): finds the header row by
  keyword scan, normalizes header texts into record keys, projects
  array-typed rows into field-keyed records.
- **Schema & query engine** (`schema`, `query`): per-dataset field
  descriptors with candidate header names resolved once per sheet, and a
  single filter/paginate/aggregate engine shared by every dataset view -
  substring, exact, date-range and fixed-length-token predicates,
  conjunctive and order-preserving.
- **Actions & dispatch** (`api`, `app`, `cache`): one function per
  dispatched `action`, an axum router with `GET /api` / `POST /api`, and
  an explicitly invalidated snapshot cache for the whole-workbook scans.

## Response contract

Every action answers `{"success": true, ...}` or
`{"success": false, "error": "..."}`. Missing or malformed request
parameters are silently defaulted, never rejected.

## Modules

- **sheet**: cell values, sheets, the workbook
- **loader**: XLSX/CSV/snapshot ingest
- **saving**: compressed workbook snapshots
- **header**: header-row location and row projection
- **schema**: dataset schema descriptors and per-sheet resolution
- **query**: the filter/paginate/aggregate engine
- **cache**: dataset snapshot cache
- **error**: the error taxonomy behind the uniform failure response
- **api**: the dispatched actions
- **app**: router, dispatch and shared state (`web` feature)
*/

pub mod api;
pub mod cache;
pub mod error;
pub mod header;
pub mod loader;
pub mod query;
pub mod saving;
pub mod schema;
pub mod sheet;

#[cfg(feature = "web")]
pub mod app;

/// Re-export the types most callers touch.
pub use error::{Error, Result};
pub use sheet::{CellValue, Sheet, Workbook};
