// ABOUTME: Shared helpers for integration tests
// ABOUTME: RecordingAdapter wraps an in-memory SQLite adapter and logs every statement it runs

#![allow(dead_code)]

use anyhow::Result;
use serde_json::Value as JsonValue;
use table_interchange::adapter::{DatabaseAdapter, Row};
use table_interchange::dialect::Dialect;
use table_interchange::sqlite::SqliteAdapter;

/// SQLite adapter that records the SQL of every statement, query and
/// transaction call in order
pub struct RecordingAdapter {
    pub inner: SqliteAdapter,
    pub statements: Vec<String>,
    pub parameters_supported: bool,
    /// Statements starting with this text fail after being recorded
    pub fail_on: Option<String>,
}

impl RecordingAdapter {
    /// In-memory database initialised with `setup` (run unrecorded)
    pub fn new(setup: &str) -> Self {
        let inner = SqliteAdapter::open_in_memory().expect("Failed to open in-memory SQLite");
        inner
            .connection()
            .execute_batch(setup)
            .expect("Failed to run setup SQL");
        Self {
            inner,
            statements: Vec::new(),
            parameters_supported: true,
            fail_on: None,
        }
    }

    /// Index of the first recorded statement containing `needle`
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.statements.iter().position(|s| s.contains(needle))
    }

    pub fn matching(&self, needle: &str) -> Vec<&str> {
        self.statements
            .iter()
            .filter(|s| s.contains(needle))
            .map(String::as_str)
            .collect()
    }

    pub fn count(&self, table: &str) -> i64 {
        self.inner
            .connection()
            .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |r| r.get(0))
            .expect("Failed to count rows")
    }
}

impl DatabaseAdapter for RecordingAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&mut self, sql: &str, params: &[JsonValue]) -> Result<u64> {
        self.statements.push(sql.to_string());
        if let Some(prefix) = &self.fail_on {
            if sql.starts_with(prefix.as_str()) {
                anyhow::bail!("injected failure: {}", sql);
            }
        }
        self.inner.execute(sql, params)
    }

    fn fetch_all(&mut self, sql: &str, params: &[JsonValue]) -> Result<Vec<Row>> {
        self.statements.push(sql.to_string());
        self.inner.fetch_all(sql, params)
    }

    fn list_tables(&mut self) -> Result<Vec<String>> {
        self.inner.list_tables()
    }

    fn has_table(&mut self, table: &str) -> Result<bool> {
        self.inner.has_table(table)
    }

    fn column_names(&mut self, table: &str) -> Result<Vec<String>> {
        self.inner.column_names(table)
    }

    fn primary_key_columns(&mut self, table: &str) -> Result<Vec<String>> {
        self.inner.primary_key_columns(table)
    }

    fn table_ddl(&mut self, table: &str) -> Result<String> {
        self.inner.table_ddl(table)
    }

    fn begin_transaction(&mut self) -> Result<()> {
        self.statements.push("BEGIN".to_string());
        self.inner.begin_transaction()
    }

    fn commit_transaction(&mut self) -> Result<()> {
        self.statements.push("COMMIT".to_string());
        self.inner.commit_transaction()
    }

    fn rollback_transaction(&mut self) -> Result<()> {
        self.statements.push("ROLLBACK".to_string());
        self.inner.rollback_transaction()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    fn quote_string(&self, value: &str) -> Option<String> {
        self.inner.quote_string(value)
    }

    fn supports_parameters(&self) -> bool {
        self.parameters_supported
    }

    fn disconnect(&mut self) -> Result<()> {
        self.inner.disconnect()
    }
}

/// Rows of `table` ordered by `id`, as (id, value, SQLite storage class) triples
pub fn typed_rows(
    conn: &rusqlite::Connection,
    table: &str,
    column: &str,
) -> Vec<(i64, Option<String>, String)> {
    let sql = format!(
        "SELECT id, CAST({col} AS TEXT), typeof({col}) FROM \"{table}\" ORDER BY id",
        col = column,
        table = table
    );
    let mut stmt = conn.prepare(&sql).expect("Failed to prepare");
    stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .expect("Failed to query")
        .map(|r| r.expect("Failed to read row"))
        .collect()
}
