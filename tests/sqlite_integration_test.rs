// ABOUTME: Integration tests for export/import round trips through SQLite files
// ABOUTME: Checks every format keeps NULL, "NULL", empty strings and leading zeros distinct

mod common;

use common::typed_rows;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use table_interchange::adapter::{connect, DatabaseAdapter};
use table_interchange::export::{ExportOptions, Exporter};
use table_interchange::formats::Format;
use table_interchange::import::{ConflictMode, ImportOptions, Importer};

const SCHEMA: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        name TEXT,
        score REAL
    );
    CREATE TABLE empty_table (
        id INTEGER PRIMARY KEY,
        data TEXT
    );
";

/// Create a source database with the tricky values
fn create_source_db(dir: &Path) -> PathBuf {
    let path = dir.join("source.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn.execute_batch(
        "
        INSERT INTO users VALUES
            (1, 'NULL', 1.5),
            (2, NULL, NULL),
            (3, '', 0),
            (4, '00123', -2.25),
            (5, 'O''Brien', 3),
            (6, '\\N', 4),
            (7, 'multi
line, with \"quotes\"', 5),
            (8, 'Zoë 日本', 6);
    ",
    )
    .unwrap();
    path
}

/// Create an empty target database; `with_schema` pre-creates the tables
fn create_target_db(dir: &Path, name: &str, with_schema: bool) -> PathBuf {
    let path = dir.join(name);
    let conn = Connection::open(&path).unwrap();
    if with_schema {
        conn.execute_batch(SCHEMA).unwrap();
    }
    path
}

fn export(source: &Path, output: &Path, options: ExportOptions) -> PathBuf {
    let mut adapter = connect(source.to_str().unwrap()).unwrap();
    let summary = Exporter::new(adapter.as_mut(), options)
        .unwrap()
        .export_to(output)
        .unwrap();
    adapter.disconnect().unwrap();
    assert_eq!(summary.total_rows, 8, "all rows should be exported");
    summary.output.unwrap()
}

fn import(target: &Path, input: &Path, options: ImportOptions) -> u64 {
    let mut adapter = connect(&format!("sqlite://{}", target.display())).unwrap();
    let stats = Importer::new(adapter.as_mut(), options)
        .unwrap()
        .import_file(input)
        .unwrap();
    adapter.disconnect().unwrap();
    assert!(stats.errors.is_empty(), "unexpected errors: {:?}", stats.errors);
    stats.rows_imported
}

fn assert_same_users(source: &Path, target: &Path) {
    let source = Connection::open(source).unwrap();
    let target = Connection::open(target).unwrap();
    assert_eq!(
        typed_rows(&target, "users", "name"),
        typed_rows(&source, "users", "name"),
        "names differ after round trip"
    );

    let scores = |conn: &Connection| -> Vec<Option<f64>> {
        let mut stmt = conn.prepare("SELECT score FROM users ORDER BY id").unwrap();
        stmt.query_map([], |r| r.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
    };
    assert_eq!(scores(&target), scores(&source), "scores differ after round trip");
}

fn round_trip(format: Format, file_name: &str, target_has_schema: bool) {
    let dir = tempfile::tempdir().unwrap();
    let source = create_source_db(dir.path());
    let output = dir.path().join(file_name);

    let written = export(
        &source,
        &output,
        ExportOptions {
            format,
            ..Default::default()
        },
    );

    let target = create_target_db(dir.path(), "target.db", target_has_schema);
    let imported = import(&target, &written, ImportOptions::default());
    assert_eq!(imported, 8);

    assert_same_users(&source, &target);
}

#[test]
fn test_json_round_trip() {
    round_trip(Format::Json, "export.json", true);
}

#[test]
fn test_yaml_round_trip() {
    round_trip(Format::Yaml, "export.yaml", true);
}

#[test]
fn test_csv_round_trip() {
    round_trip(Format::Csv, "csv_export", true);
}

#[test]
fn test_sql_round_trip_creates_tables() {
    round_trip(Format::Sql, "export.sql", false);
}

#[test]
fn test_sql_round_trip_with_drop_tables_over_existing_data() {
    let dir = tempfile::tempdir().unwrap();
    let source = create_source_db(dir.path());
    let written = export(
        &source,
        &dir.path().join("export.sql"),
        ExportOptions {
            drop_tables: true,
            ..Default::default()
        },
    );

    // Target already has a conflicting row that the DROP removes
    let target = create_target_db(dir.path(), "target.db", true);
    Connection::open(&target)
        .unwrap()
        .execute("INSERT INTO users VALUES (1, 'stale', 0)", [])
        .unwrap();

    import(&target, &written, ImportOptions::default());
    assert_same_users(&source, &target);
}

#[test]
fn test_compressed_json_round_trip_detects_gzip() {
    let dir = tempfile::tempdir().unwrap();
    let source = create_source_db(dir.path());
    let written = export(
        &source,
        &dir.path().join("export.json"),
        ExportOptions {
            format: Format::Json,
            compress: true,
            ..Default::default()
        },
    );
    assert!(written.to_string_lossy().ends_with(".json.gz"));

    // Rename so the extension gives no hint; detection must sniff the content
    let disguised = dir.path().join("export.bin");
    std::fs::rename(&written, &disguised).unwrap();

    let target = create_target_db(dir.path(), "target.db", true);
    import(&target, &disguised, ImportOptions::default());
    assert_same_users(&source, &target);
}

#[test]
fn test_filtered_export_with_where_clause_and_limit() {
    let dir = tempfile::tempdir().unwrap();
    let source = create_source_db(dir.path());
    let mut adapter = connect(source.to_str().unwrap()).unwrap();

    let mut where_clauses = std::collections::BTreeMap::new();
    where_clauses.insert("users".to_string(), "score >= 3 AND name IS NOT NULL".to_string());
    let options = ExportOptions {
        format: Format::Json,
        tables: Some(vec!["users".to_string()]),
        where_clauses,
        limit: Some(2),
        ..Default::default()
    };

    let mut out = Vec::new();
    let summary = Exporter::new(adapter.as_mut(), options)
        .unwrap()
        .export_to_writer(&mut out)
        .unwrap();
    assert_eq!(summary.total_rows, 2);

    let doc: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let rows = doc["data"]["users"]["rows"].as_array().unwrap();
    assert!(rows.iter().all(|r| r["score"].as_f64().unwrap() >= 3.0));
    assert!(doc["data"].get("empty_table").is_none());
}

#[test]
fn test_replace_mode_reimport_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let source = create_source_db(dir.path());
    let written = export(
        &source,
        &dir.path().join("export.yaml"),
        ExportOptions {
            format: Format::Yaml,
            ..Default::default()
        },
    );

    let target = create_target_db(dir.path(), "target.db", true);
    let options = ImportOptions {
        conflict_mode: ConflictMode::Replace,
        ..Default::default()
    };
    import(&target, &written, options.clone());
    import(&target, &written, options);

    assert_same_users(&source, &target);
}
