#![cfg(not(tarpaulin_include))]

use qlbh::app;
use std::env;
use std::path::PathBuf;

/// Main entry point for the admin web application
///
/// Loads the workbook given on the command line and serves the single
/// action-dispatch endpoint plus the static dashboard.
///
/// # Arguments
/// * First argument: path to the workbook (.xlsx, .csv or .bin.gz snapshot)
/// * Second argument: bind address (defaults to 127.0.0.1:3000)
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let source = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| "data/qlbh.xlsx".to_string());
    let addr = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| "127.0.0.1:3000".to_string());

    app::run(PathBuf::from(source), addr).await
}
