#![cfg(not(tarpaulin_include))]

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    routing::get,
};
use chrono::Local;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::api::{self, ActionParams};
use crate::cache::SnapshotCache;
use crate::error::{Error, Result};
use crate::loader;
use crate::schema::{IMPORTS, INVENTORY, SALES, WRITEOFFS};
use crate::sheet::Workbook;

pub struct AppState {
    pub workbook: RwLock<Workbook>,
    pub cache: SnapshotCache,
    pub source: PathBuf,
}

pub async fn run(
    source: PathBuf,
    addr: String,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Load workbook
    let workbook = loader::load_workbook(&source)?;
    log::info!(
        "loaded {} with sheets {:?}",
        source.display(),
        workbook.sheet_names()
    );

    // Setup app state
    let app_state = Arc::new(AppState {
        workbook: RwLock::new(workbook),
        cache: SnapshotCache::new(),
        source,
    });

    // Build router: one endpoint, action dispatch, plus the dashboard files
    let app = Router::new()
        .route("/api", get(handle_get).post(handle_post))
        .nest_service("/static", ServeDir::new("static"))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = TcpListener::bind(addr.as_str()).await?;
    log::info!("Listening on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn handle_get(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ActionParams>,
) -> Json<Value> {
    Json(dispatch_get(&state, &params))
}

async fn handle_post(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ActionParams>,
    body: Bytes,
) -> Json<Value> {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    Json(dispatch_post(&state, &params, &body))
}

/// Convert an action result into the uniform response: the payload as-is
/// on success, `{"success": false, "error": ...}` otherwise. Nothing ever
/// propagates past this boundary.
fn envelope(action: &str, result: Result<Value>) -> Value {
    match result {
        Ok(value) => value,
        Err(e) => {
            log::warn!("action {action} failed: {e}");
            json!({ "success": false, "error": e.to_string() })
        }
    }
}

/// Serve a cached snapshot unless the caller asked for a refresh; on a
/// miss, compute, store and stamp the payload. Used for the actions that
/// scan every monthly sheet.
fn cached(
    state: &AppState,
    key: &str,
    refresh: bool,
    compute: impl FnOnce() -> Result<Value>,
) -> Result<Value> {
    if !refresh {
        if let Some(entry) = state.cache.get(key) {
            let mut value = entry.data;
            value["lastUpdate"] = json!(entry.last_update);
            value["cached"] = json!(true);
            return Ok(value);
        }
    }

    let mut value = compute()?;
    let stamp = state.cache.set(key, value.clone());
    value["lastUpdate"] = json!(stamp);
    Ok(value)
}

pub fn dispatch_get(state: &AppState, params: &ActionParams) -> Value {
    let today = Local::now().date_naive();
    log::info!("GET action={}", params.action);

    let wb = state.workbook.read().unwrap();
    let result = match params.action.as_str() {
        "getDashboard" => cached(state, "dashboard", params.refresh(), || {
            api::get_dashboard(&wb, today)
        }),
        "getTonKho" => api::get_ton_kho(&wb, params),
        "getNhapHang" => api::get_nhap_hang(&wb, params),
        "getBanHang" => api::get_ban_hang(&wb, params, today),
        "getXuatHuy" => api::get_xuat_huy(&wb, params),
        "getBaoCao" => api::get_bao_cao(&wb),
        "searchIMEI" => api::search_imei(&wb, params),
        "searchCustomer" => api::search_customer(&wb, params, today),
        "getTopProducts" => cached(
            state,
            &format!("topproducts:{}", params.days()),
            params.refresh(),
            || api::get_top_products(&wb, params, today),
        ),
        _ => Err(Error::UnknownAction),
    };

    envelope(&params.action, result)
}

pub fn dispatch_post(state: &AppState, params: &ActionParams, body: &Value) -> Value {
    let today = Local::now().date_naive();

    // Parameters may arrive in the query string or the JSON body; the
    // record payload is the body's `fields` object (or the body itself).
    let action = if params.action.is_empty() {
        body.get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    } else {
        params.action.clone()
    };
    let fields: Map<String, Value> = body
        .get("fields")
        .and_then(Value::as_object)
        .cloned()
        .or_else(|| body.as_object().cloned())
        .unwrap_or_default();
    let imei = if params.imei.is_empty() {
        body.get("imei")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    } else {
        params.imei.clone()
    };

    log::info!("POST action={action}");

    let mut mutated = false;
    let result = match action.as_str() {
        "addTonKho" => {
            mutated = true;
            let mut wb = state.workbook.write().unwrap();
            api::add_record(&mut wb, &INVENTORY, api::SHEET_TONKHO, &fields)
        }
        "updateTonKho" => {
            mutated = true;
            let mut wb = state.workbook.write().unwrap();
            api::update_record(&mut wb, &INVENTORY, api::SHEET_TONKHO, &imei, &fields)
        }
        "addNhapHang" => {
            mutated = true;
            let mut wb = state.workbook.write().unwrap();
            api::add_record(&mut wb, &IMPORTS, api::SHEET_NHAPHANG, &fields)
        }
        "updateNhapHang" => {
            mutated = true;
            let mut wb = state.workbook.write().unwrap();
            api::update_record(&mut wb, &IMPORTS, api::SHEET_NHAPHANG, &imei, &fields)
        }
        "addBanHang" => {
            mutated = true;
            let name = api::month_sheet_name(&api::requested_month(params, today));
            let mut wb = state.workbook.write().unwrap();
            api::add_record(&mut wb, &SALES, &name, &fields)
        }
        "updateBanHang" => {
            mutated = true;
            let name = api::month_sheet_name(&api::requested_month(params, today));
            let mut wb = state.workbook.write().unwrap();
            api::update_record(&mut wb, &SALES, &name, &imei, &fields)
        }
        "addXuatHuy" => {
            mutated = true;
            let mut wb = state.workbook.write().unwrap();
            api::add_record(&mut wb, &WRITEOFFS, api::SHEET_XUATHUY, &fields)
        }
        "updateXuatHuy" => {
            mutated = true;
            let mut wb = state.workbook.write().unwrap();
            api::update_record(&mut wb, &WRITEOFFS, api::SHEET_XUATHUY, &imei, &fields)
        }
        "generateBaoCao" => {
            mutated = true;
            let mut wb = state.workbook.write().unwrap();
            api::generate_bao_cao(&mut wb)
        }
        "calculateProfit" => {
            mutated = true;
            let mut wb = state.workbook.write().unwrap();
            api::calculate_profit(&mut wb, params, today)
        }
        "compareTonKho" => {
            let wb = state.workbook.read().unwrap();
            api::compare_ton_kho(&wb)
        }
        "syncData" => sync_data(state),
        "backupData" => {
            let wb = state.workbook.read().unwrap();
            api::backup_data(&wb, &state.source)
        }
        _ => Err(Error::UnknownAction),
    };

    if mutated && result.is_ok() {
        state.cache.clear_all();
    }

    envelope(&action, result)
}

/// Reload the workbook from its source file and drop every cached
/// snapshot.
fn sync_data(state: &AppState) -> Result<Value> {
    let workbook = loader::load_workbook(&state.source)?;
    let sheets = workbook.sheet_names().len();

    *state.workbook.write().unwrap() = workbook;
    state.cache.clear_all();

    Ok(json!({ "success": true, "sheets": sheets }))
}
