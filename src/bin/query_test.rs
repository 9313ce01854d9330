use chrono::NaiveDate;
use qlbh::query::{
    Predicate, cmp_optional_dates, fold_accents, page_bounds, paginate_rows, parse_date_input,
    prefix_period, profit_total, run_query, search_normalize, sum_field,
};
use qlbh::schema::{DatasetSchema, FieldKind, FieldSpec, INVENTORY, ResolvedSchema};
use qlbh::sheet::{CellValue, Sheet};

static TEST_SCHEMA: DatasetSchema = DatasetSchema {
    dataset: "test",
    fields: &[
        FieldSpec { field: "model", candidates: &["MODEL"], kind: FieldKind::Text },
        FieldSpec { field: "capacity", candidates: &["CAPACITY"], kind: FieldKind::Text },
        FieldSpec { field: "price", candidates: &["PRICE"], kind: FieldKind::Number },
        FieldSpec { field: "date", candidates: &["DATE"], kind: FieldKind::Date },
    ],
};

fn text(s: &str) -> CellValue {
    CellValue::Text(s.to_string())
}

fn num(n: f64) -> CellValue {
    CellValue::Number(n)
}

fn date(y: i32, m: u32, d: u32) -> CellValue {
    CellValue::DateTime(
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
    )
}

/// Sheet with MODEL/CAPACITY/PRICE/DATE columns and the given data rows.
fn test_sheet(rows: Vec<Vec<CellValue>>) -> Sheet {
    let mut all = vec![vec![
        text("MODEL"),
        text("CAPACITY"),
        text("PRICE"),
        text("DATE"),
    ]];
    all.extend(rows);
    Sheet::from_rows("Test", all)
}

fn spec_rows() -> Vec<Vec<CellValue>> {
    vec![
        vec![text("A"), text("64GB"), num(100.0)],
        vec![text("B"), text("64GB"), num(200.0)],
        vec![text("A"), text("128GB"), num(300.0)],
    ]
}

fn test_spec_scenario() {
    println!("\n====== Testing the reference scenario ======");

    let sheet = test_sheet(spec_rows());
    let schema = ResolvedSchema::resolve(&sheet, &TEST_SCHEMA);
    let rows = schema.data_rows(&sheet);

    let predicates = [Predicate::Contains {
        fields: vec!["model"],
        needle: "A".to_string(),
    }];
    let page = run_query(&rows, &schema, &predicates, 1, 1);

    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);
    let item = page.items[0].as_object().unwrap();
    assert_eq!(item.get("model"), Some(&serde_json::json!("A")));
    assert_eq!(item.get("capacity"), Some(&serde_json::json!("64GB")));
    assert_eq!(item.get("price"), Some(&serde_json::json!(100)));
    println!("✓ model-contains-A, page 1 of size 1 returns the first A row");
}

fn test_page_concatenation() {
    println!("\n====== Testing page concatenation ======");

    let sheet = test_sheet(
        (1..=7)
            .map(|i| vec![text(&format!("M{i}")), text("64GB"), num(i as f64)])
            .collect(),
    );
    let schema = ResolvedSchema::resolve(&sheet, &TEST_SCHEMA);
    let rows = schema.data_rows(&sheet);

    for page_size in [1usize, 2, 3, 7, 10] {
        let full = run_query(&rows, &schema, &[], 1, rows.len().max(1));
        let pages = full.total.div_ceil(page_size).max(1);

        let mut collected = Vec::new();
        for page in 1..=pages {
            collected.extend(run_query(&rows, &schema, &[], page, page_size).items);
        }
        assert_eq!(collected, full.items, "page size {page_size}");
    }
    println!("✓ pages 1..=ceil(total/p) reproduce the collection exactly once");

    // A page past the end is an empty slice, not an error
    let page = run_query(&rows, &schema, &[], 99, 3);
    assert_eq!(page.total, 7);
    assert!(page.items.is_empty());
    println!("✓ out-of-range page yields an empty slice");
}

fn test_filter_idempotent() {
    println!("\n====== Testing filter idempotence ======");

    let sheet = test_sheet(spec_rows());
    let schema = ResolvedSchema::resolve(&sheet, &TEST_SCHEMA);
    let rows = schema.data_rows(&sheet);

    let predicates = [Predicate::Contains {
        fields: vec!["model"],
        needle: "a".to_string(),
    }];

    let filtered: Vec<Vec<CellValue>> = rows
        .iter()
        .filter(|row| predicates.iter().all(|p| p.matches(row, &schema)))
        .cloned()
        .collect();

    let once = run_query(&rows, &schema, &predicates, 1, 100);
    let twice = run_query(&filtered, &schema, &predicates, 1, 100);

    assert_eq!(once.total, twice.total);
    assert_eq!(once.items, twice.items);
    println!("✓ re-filtering an already-filtered collection is a no-op");
}

fn test_inactive_predicates() {
    println!("\n====== Testing inactive predicates ======");

    let sheet = test_sheet(spec_rows());
    let schema = ResolvedSchema::resolve(&sheet, &TEST_SCHEMA);
    let rows = schema.data_rows(&sheet);

    let predicates = [
        Predicate::Contains { fields: vec!["model"], needle: "  ".to_string() },
        Predicate::Exact { field: "capacity", value: String::new() },
        Predicate::DateRange {
            field: "date",
            from: String::new(),
            to: String::new(),
        },
        Predicate::FixedToken { field: "model", token: "123".to_string(), length: 5 },
    ];
    for p in &predicates {
        assert!(!p.is_active());
    }

    let page = run_query(&rows, &schema, &predicates, 1, 100);
    assert_eq!(page.total, rows.len());
    println!("✓ empty search, empty filters and a short token filter nothing");
}

fn test_exact_numeric_coercion() {
    println!("\n====== Testing exact-match coercion ======");

    // One sheet stores the capacity as text, a revision stores it numeric
    let sheet = test_sheet(vec![
        vec![text("A"), text("64"), num(100.0)],
        vec![text("B"), num(64.0), num(200.0)],
        vec![text("C"), num(128.0), num(300.0)],
    ]);
    let schema = ResolvedSchema::resolve(&sheet, &TEST_SCHEMA);
    let rows = schema.data_rows(&sheet);

    let predicates = [Predicate::Exact {
        field: "capacity",
        value: "64".to_string(),
    }];
    let page = run_query(&rows, &schema, &predicates, 1, 100);
    assert_eq!(page.total, 2);
    println!("✓ a numeric cell equals its categorical string value");
}

fn test_date_range_policy() {
    println!("\n====== Testing date-range bounds ======");

    let sheet = test_sheet(vec![
        vec![text("early"), text(""), num(0.0), date(2024, 1, 10)],
        vec![text("late"), text(""), num(0.0), date(2024, 1, 20)],
        vec![text("bad"), text(""), num(0.0), text("n/a")],
        vec![text("none"), text(""), num(0.0), CellValue::Empty],
    ]);
    let schema = ResolvedSchema::resolve(&sheet, &TEST_SCHEMA);
    let rows = schema.data_rows(&sheet);

    // Lower bound only: strictly-earlier rows drop out; rows whose date
    // cannot be parsed pass the bound (the documented policy).
    let predicates = [Predicate::DateRange {
        field: "date",
        from: "2024-01-15".to_string(),
        to: String::new(),
    }];
    let page = run_query(&rows, &schema, &predicates, 1, 100);
    assert_eq!(page.total, 3);
    let models: Vec<&str> = page
        .items
        .iter()
        .map(|i| i["model"].as_str().unwrap())
        .collect();
    assert_eq!(models, vec!["late", "bad", "none"]);
    println!("✓ lower bound excludes earlier rows, unparsable dates pass");

    // Upper bound is inclusive of the whole day
    let predicates = [Predicate::DateRange {
        field: "date",
        from: String::new(),
        to: "2024-01-20".to_string(),
    }];
    let page = run_query(&rows, &schema, &predicates, 1, 100);
    assert_eq!(page.total, 4);
    println!("✓ upper bound includes the bound day itself");

    // Bounds accept the dd/mm/yyyy form too
    assert_eq!(
        parse_date_input("15/01/2024"),
        NaiveDate::from_ymd_opt(2024, 1, 15)
    );
    assert_eq!(parse_date_input("garbage"), None);
    println!("✓ bound parsing accepts both date forms, rejects garbage");
}

fn test_fixed_token() {
    println!("\n====== Testing fixed-length token filter ======");

    let sheet = test_sheet(vec![
        vec![text("356789012345671")],
        vec![text("358880011122233")],
    ]);
    let schema = ResolvedSchema::resolve(&sheet, &TEST_SCHEMA);
    let rows = schema.data_rows(&sheet);

    // Four characters: inactive, nothing filtered
    let predicates = [Predicate::FixedToken {
        field: "model",
        token: "4567".to_string(),
        length: 5,
    }];
    assert_eq!(run_query(&rows, &schema, &predicates, 1, 10).total, 2);

    // Five characters: active
    let predicates = [Predicate::FixedToken {
        field: "model",
        token: "45671".to_string(),
        length: 5,
    }];
    assert_eq!(run_query(&rows, &schema, &predicates, 1, 10).total, 1);
    println!("✓ the filter only engages at exactly the required length");
}

fn test_aggregates() {
    println!("\n====== Testing aggregates ======");

    let sheet = test_sheet(vec![
        vec![text("A"), text(""), num(100.0)],
        vec![text("B"), text(""), text("not a number")],
        vec![text("C"), text(""), CellValue::Empty],
        vec![text("D"), text(""), num(50.5)],
    ]);
    let schema = ResolvedSchema::resolve(&sheet, &TEST_SCHEMA);
    let rows = schema.data_rows(&sheet);

    assert_eq!(sum_field(&rows, &schema, "price"), 150.5);
    println!("✓ non-numeric cells contribute zero to sums");

    // All-absent column sums to zero
    let empty_sheet = test_sheet(vec![
        vec![text("A"), text(""), CellValue::Empty],
        vec![text("B"), text(""), text("-")],
    ]);
    let schema = ResolvedSchema::resolve(&empty_sheet, &TEST_SCHEMA);
    let rows = schema.data_rows(&empty_sheet);
    assert_eq!(sum_field(&rows, &schema, "price"), 0.0);
    assert_eq!(sum_field(&rows, &schema, "missing"), 0.0);
    println!("✓ an all-absent numeric column sums to 0");
}

fn test_profit_total_two_tier() {
    println!("\n====== Testing two-tier profit total ======");

    // Pre-aggregated cell above the header wins when numeric
    let sheet = Sheet::from_rows(
        "BanHangT01",
        vec![
            vec![CellValue::Empty, CellValue::Empty, num(9_999.0)],
            vec![text("MODEL"), text("CAPACITY"), text("PRICE")],
            vec![text("A"), text(""), num(100.0)],
            vec![text("B"), text(""), num(200.0)],
        ],
    );
    let schema = ResolvedSchema::resolve(&sheet, &TEST_SCHEMA);
    assert_eq!(schema.header_row(), 2);
    assert_eq!(profit_total(&sheet, &schema, "price"), 9_999.0);
    println!("✓ numeric pre-aggregated cell is preferred");

    // Non-numeric cell above the header falls back to the per-row sum
    let sheet = Sheet::from_rows(
        "BanHangT01",
        vec![
            vec![CellValue::Empty, CellValue::Empty, text("tổng")],
            vec![text("MODEL"), text("CAPACITY"), text("PRICE")],
            vec![text("A"), text(""), num(100.0)],
            vec![text("B"), text(""), num(200.0)],
        ],
    );
    let schema = ResolvedSchema::resolve(&sheet, &TEST_SCHEMA);
    assert_eq!(profit_total(&sheet, &schema, "price"), 300.0);
    println!("✓ non-numeric cell falls back to the computed sum");

    // Header in row 1: there is no cell above, sum directly
    let sheet = test_sheet(vec![vec![text("A"), text(""), num(42.0)]]);
    let schema = ResolvedSchema::resolve(&sheet, &TEST_SCHEMA);
    assert_eq!(profit_total(&sheet, &schema, "price"), 42.0);
    println!("✓ header at row 1 skips the cell probe entirely");
}

fn test_accent_folding() {
    println!("\n====== Testing accent folding ======");

    assert_eq!(fold_accents("Hương"), "Huong");
    assert_eq!(search_normalize("Nguyễn Văn An"), search_normalize("nguyen van an"));
    assert!(search_normalize("Nguyễn Văn An").contains("an"));
    assert!(search_normalize("Tran Thi Anh").contains("an"));
    println!("✓ accented and unaccented variants normalize alike");
}

fn test_period_merge() {
    println!("\n====== Testing period merge ======");

    let jan = vec![vec![text("A"), text("64GB"), num(100.0)]];
    let feb = vec![vec![text("B"), text("128GB"), num(200.0)]];

    let mut merged = prefix_period("01", jan);
    merged.extend(prefix_period("02", feb));

    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0][0], text("01"));
    assert_eq!(merged[1][0], text("02"));
    assert_eq!(merged[0][1], text("A"));
    println!("✓ rows gain their period id in column 1");

    let headers = vec![
        "THÁNG".to_string(),
        "MODEL".to_string(),
        "CAPACITY".to_string(),
        "PRICE".to_string(),
    ];
    let page = paginate_rows(&merged, &headers, 1, 1);
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0]["tháng"], serde_json::json!("01"));
    println!("✓ merged rows paginate and project with the period header");
}

fn test_candidate_fallback() {
    println!("\n====== Testing candidate header fallback ======");

    // Two workbook revisions spell the model column differently
    let upper = Sheet::from_rows(
        "TonKho",
        vec![
            vec![text("STT"), text("DÒNG MÁY"), text("IMEI")],
            vec![num(1.0), text("iPhone 15"), text("356")],
        ],
    );
    let lower = Sheet::from_rows(
        "TonKho",
        vec![
            vec![text("STT"), text("Dòng Máy"), text("IMEI")],
            vec![num(1.0), text("iPhone 15"), text("356")],
        ],
    );

    let a = ResolvedSchema::resolve(&upper, &INVENTORY);
    let b = ResolvedSchema::resolve(&lower, &INVENTORY);
    assert_eq!(a.column("dongmay"), Some(1));
    assert_eq!(b.column("dongmay"), Some(1));
    println!("✓ both header spellings resolve to the same logical field");

    // The ASCII fallback candidate also resolves
    let ascii = Sheet::from_rows(
        "TonKho",
        vec![vec![text("STT"), text("DONG MAY"), text("IMEI")]],
    );
    let c = ResolvedSchema::resolve(&ascii, &INVENTORY);
    assert_eq!(c.column("dongmay"), Some(1));
    println!("✓ the unaccented candidate spelling resolves too");
}

fn test_date_ordering() {
    println!("\n====== Testing history date ordering ======");

    let d1 = NaiveDate::from_ymd_opt(2024, 1, 10)
        .unwrap()
        .and_hms_opt(0, 0, 0);
    let d2 = NaiveDate::from_ymd_opt(2024, 2, 10)
        .unwrap()
        .and_hms_opt(0, 0, 0);

    let mut dates = vec![d2, None, d1];
    dates.sort_by(cmp_optional_dates);
    assert_eq!(dates, vec![None, d1, d2]);
    println!("✓ unparsable dates sort first, the rest ascend");
}

fn test_page_bounds_invariant() {
    println!("\n====== Testing page bounds ======");

    for total in 0..10usize {
        for page in 1..5usize {
            for page_size in 1..5usize {
                let (start, end) = page_bounds(total, page, page_size);
                assert!(start <= end && end <= total);
                assert!(end - start <= page_size);
            }
        }
    }
    println!("✓ 0 <= start <= end <= total holds for every combination");
}

pub fn run_tests() {
    println!("Starting query engine tests");
    test_spec_scenario();
    test_page_concatenation();
    test_filter_idempotent();
    test_inactive_predicates();
    test_exact_numeric_coercion();
    test_date_range_policy();
    test_fixed_token();
    test_aggregates();
    test_profit_total_two_tier();
    test_accent_folding();
    test_period_merge();
    test_candidate_fallback();
    test_date_ordering();
    test_page_bounds_invariant();
    println!("\nAll tests passed!");
}

fn main() {
    run_tests();
}
