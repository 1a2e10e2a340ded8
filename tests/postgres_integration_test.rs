// ABOUTME: Integration tests against a live PostgreSQL server
// ABOUTME: Run with TEST_POSTGRES_URL set and `cargo test -- --ignored`

use std::env;
use table_interchange::adapter::{connect, DatabaseAdapter};
use table_interchange::export::{ExportOptions, Exporter};
use table_interchange::formats::Format;
use table_interchange::import::{ConflictMode, ImportOptions, Importer};

/// Helper to get test PostgreSQL URL from environment
fn get_test_postgres_url() -> Option<String> {
    env::var("TEST_POSTGRES_URL").ok()
}

fn connect_or_skip() -> Option<Box<dyn DatabaseAdapter>> {
    let Some(url) = get_test_postgres_url() else {
        println!("Skipping: TEST_POSTGRES_URL not set");
        return None;
    };
    Some(connect(&url).expect("Failed to connect to PostgreSQL"))
}

fn create_test_tables(db: &mut dyn DatabaseAdapter) {
    for sql in [
        "DROP TABLE IF EXISTS interchange_items",
        "CREATE TABLE interchange_items (
            id INTEGER PRIMARY KEY,
            code TEXT,
            price NUMERIC(10,2),
            tags JSONB
        )",
    ] {
        db.execute(sql, &[]).expect("Failed to create test table");
    }
}

#[test]
#[ignore]
fn test_postgres_import_keeps_text_that_looks_numeric() {
    let Some(mut db) = connect_or_skip() else {
        return;
    };
    create_test_tables(db.as_mut());

    let doc = r#"{"data": {"interchange_items": [
        {"id": 1, "code": "00123", "price": "9.99", "tags": null},
        {"id": 2, "code": "NULL", "price": null, "tags": null},
        {"id": 3, "code": "", "price": "0", "tags": null}
    ]}}"#;
    let stats = Importer::new(db.as_mut(), ImportOptions::default())
        .unwrap()
        .import_str(doc, Format::Json)
        .unwrap();
    assert_eq!(stats.rows_imported, 3);

    let rows = db
        .fetch_all("SELECT code FROM interchange_items ORDER BY id", &[])
        .unwrap();
    assert_eq!(rows[0]["code"], "00123");
    assert_eq!(rows[1]["code"], "NULL");
    assert_eq!(rows[2]["code"], "");

    db.execute("DROP TABLE interchange_items", &[]).unwrap();
    db.disconnect().unwrap();
}

#[test]
#[ignore]
fn test_postgres_continue_on_error_keeps_transaction_usable() {
    let Some(mut db) = connect_or_skip() else {
        return;
    };
    create_test_tables(db.as_mut());
    db.execute("INSERT INTO interchange_items (id, code) VALUES (2, 'existing')", &[])
        .unwrap();

    let doc = r#"{"data": {"interchange_items": [
        {"id": 1, "code": "a"},
        {"id": 2, "code": "duplicate"},
        {"id": 3, "code": "c"}
    ]}}"#;
    let options = ImportOptions {
        stop_on_error: false,
        conflict_mode: ConflictMode::Append,
        ..Default::default()
    };
    let stats = Importer::new(db.as_mut(), options)
        .unwrap()
        .import_str(doc, Format::Json)
        .unwrap();

    assert_eq!(stats.rows_imported, 2);
    assert_eq!(stats.errors.len(), 1);

    let rows = db
        .fetch_all("SELECT id FROM interchange_items ORDER BY id", &[])
        .unwrap();
    assert_eq!(rows.len(), 3);

    db.execute("DROP TABLE interchange_items", &[]).unwrap();
    db.disconnect().unwrap();
}

#[test]
#[ignore]
fn test_postgres_export_binds_where_values() {
    let Some(mut db) = connect_or_skip() else {
        return;
    };
    create_test_tables(db.as_mut());
    db.execute(
        "INSERT INTO interchange_items (id, code, price) VALUES (1, 'a', 5), (2, 'b', 15), (3, 'c', 25)",
        &[],
    )
    .unwrap();

    let mut where_clauses = std::collections::BTreeMap::new();
    where_clauses.insert(
        "interchange_items".to_string(),
        "price BETWEEN 10 AND 30 AND code IN ('b', 'c')".to_string(),
    );
    let options = ExportOptions {
        format: Format::Yaml,
        tables: Some(vec!["interchange_items".to_string()]),
        where_clauses,
        ..Default::default()
    };
    let mut out = Vec::new();
    let summary = Exporter::new(db.as_mut(), options)
        .unwrap()
        .export_to_writer(&mut out)
        .unwrap();
    assert_eq!(summary.total_rows, 2);

    db.execute("DROP TABLE interchange_items", &[]).unwrap();
    db.disconnect().unwrap();
}

#[test]
#[ignore]
fn test_postgres_numeric_keeps_full_precision() {
    let Some(mut db) = connect_or_skip() else {
        return;
    };
    for sql in [
        "DROP TABLE IF EXISTS interchange_amounts",
        "CREATE TABLE interchange_amounts (id INTEGER PRIMARY KEY, amount NUMERIC(30,10))",
        "INSERT INTO interchange_amounts VALUES (1, 12345678901234567890.1234567890), (2, NULL)",
    ] {
        db.execute(sql, &[]).unwrap();
    }

    let options = ExportOptions {
        format: Format::Json,
        tables: Some(vec!["interchange_amounts".to_string()]),
        ..Default::default()
    };
    let mut out = Vec::new();
    Exporter::new(db.as_mut(), options)
        .unwrap()
        .export_to_writer(&mut out)
        .unwrap();

    let doc: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let rows = doc["data"]["interchange_amounts"]["rows"].as_array().unwrap();
    assert_eq!(rows[0]["id"], 1);
    assert_eq!(rows[0]["amount"], "12345678901234567890.1234567890");
    assert!(rows[1]["amount"].is_null());

    db.execute("TRUNCATE interchange_amounts", &[]).unwrap();
    let stats = Importer::new(db.as_mut(), ImportOptions::default())
        .unwrap()
        .import_str(std::str::from_utf8(&out).unwrap(), Format::Json)
        .unwrap();
    assert_eq!(stats.rows_imported, 2);

    let row = db
        .fetch_row(
            "SELECT amount FROM interchange_amounts WHERE id = ?",
            &[serde_json::json!(1)],
        )
        .unwrap()
        .unwrap();
    assert_eq!(row["amount"], "12345678901234567890.1234567890");

    db.execute("DROP TABLE interchange_amounts", &[]).unwrap();
    db.disconnect().unwrap();
}
