// ABOUTME: SQLite adapter built on rusqlite
// ABOUTME: Validates database file paths and implements DatabaseAdapter over a single connection

pub mod converter;
pub mod reader;

use crate::adapter::{DatabaseAdapter, Row};
use crate::dialect::Dialect;
use crate::utils::abbreviate_sql;
use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};

const SQLITE_EXTENSIONS: &[&str] = &["db", "sqlite", "sqlite3"];

/// True when `path` ends in `.db`, `.sqlite` or `.sqlite3`
pub fn has_sqlite_extension(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SQLITE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Validate a SQLite file path before opening it
///
/// Security checks:
/// - Rejects empty paths
/// - Requires a .db, .sqlite, or .sqlite3 extension
/// - If the path exists, it must be a regular file (not a directory)
///
/// The file does not have to exist yet: an import may target a new database.
///
/// # Examples
///
/// ```
/// # use table_interchange::sqlite::validate_sqlite_path;
/// assert!(validate_sqlite_path("/tmp/new_database.db").is_ok());
/// assert!(validate_sqlite_path("").is_err());
/// assert!(validate_sqlite_path("/etc/passwd").is_err());
/// ```
pub fn validate_sqlite_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        bail!("SQLite file path cannot be empty");
    }

    let path_buf = PathBuf::from(path);

    match path_buf.extension().and_then(|ext| ext.to_str()) {
        Some(_) if has_sqlite_extension(path) => {}
        Some(ext) => bail!(
            "Invalid SQLite file extension '{}'. \
             Must be .db, .sqlite, or .sqlite3",
            ext
        ),
        None => bail!(
            "SQLite file '{}' has no extension. \
             Must be .db, .sqlite, or .sqlite3",
            path
        ),
    }

    if path_buf.exists() && !path_buf.is_file() {
        bail!("Path '{}' is not a regular file (may be a directory)", path);
    }

    Ok(path_buf)
}

/// [`DatabaseAdapter`] over a rusqlite connection
pub struct SqliteAdapter {
    conn: Connection,
}

impl SqliteAdapter {
    /// Open (or create) the database file at `path`
    pub fn open(path: &str) -> Result<Self> {
        let path = validate_sqlite_path(path)?;

        tracing::info!("Opening SQLite database: {}", path.display());

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Self::from_connection(conn)
    }

    /// Wrap an existing connection after checking it can be queried
    pub fn from_connection(conn: Connection) -> Result<Self> {
        let version: String = conn
            .query_row("SELECT sqlite_version()", [], |row| row.get(0))
            .context("Failed to query SQLite version (database may be corrupted)")?;
        tracing::debug!("Connected to SQLite {}", version);

        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl DatabaseAdapter for SqliteAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&mut self, sql: &str, params: &[JsonValue]) -> Result<u64> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("Failed to prepare statement: {}", abbreviate_sql(sql)))?;
        let values: Vec<_> = params.iter().map(converter::json_to_sqlite_value).collect();

        // Statements that return rows (some PRAGMAs) cannot go through execute()
        if stmt.column_count() > 0 {
            let mut rows = stmt
                .query(rusqlite::params_from_iter(values.iter()))
                .with_context(|| format!("Failed to execute: {}", abbreviate_sql(sql)))?;
            while rows.next()?.is_some() {}
            return Ok(0);
        }

        let affected = stmt
            .execute(rusqlite::params_from_iter(values.iter()))
            .with_context(|| format!("Failed to execute: {}", abbreviate_sql(sql)))?;
        Ok(affected as u64)
    }

    fn fetch_all(&mut self, sql: &str, params: &[JsonValue]) -> Result<Vec<Row>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("Failed to prepare query: {}", abbreviate_sql(sql)))?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let values: Vec<_> = params.iter().map(converter::json_to_sqlite_value).collect();

        let mut rows = stmt
            .query(rusqlite::params_from_iter(values.iter()))
            .with_context(|| format!("Failed to run query: {}", abbreviate_sql(sql)))?;

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(converter::sqlite_row_to_json(row, &column_names)?);
        }
        Ok(result)
    }

    fn list_tables(&mut self) -> Result<Vec<String>> {
        reader::list_tables(&self.conn)
    }

    fn has_table(&mut self, table: &str) -> Result<bool> {
        reader::has_table(&self.conn, table)
    }

    fn column_names(&mut self, table: &str) -> Result<Vec<String>> {
        reader::column_names(&self.conn, table)
    }

    fn primary_key_columns(&mut self, table: &str) -> Result<Vec<String>> {
        reader::primary_key_columns(&self.conn, table)
    }

    fn table_ddl(&mut self, table: &str) -> Result<String> {
        reader::table_ddl(&self.conn, table)
    }

    fn begin_transaction(&mut self) -> Result<()> {
        self.conn
            .execute_batch(Dialect::Sqlite.begin_transaction_sql())
            .context("Failed to begin transaction")
    }

    fn commit_transaction(&mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .context("Failed to commit transaction")
    }

    fn rollback_transaction(&mut self) -> Result<()> {
        self.conn
            .execute_batch("ROLLBACK")
            .context("Failed to roll back transaction")
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn quote_string(&self, value: &str) -> Option<String> {
        self.conn
            .query_row("SELECT quote(?1)", [value], |row| row.get::<_, String>(0))
            .ok()
    }

    fn disconnect(&mut self) -> Result<()> {
        // The connection closes on drop; make sure no transaction is left open
        if self.in_transaction() {
            self.rollback_transaction()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs::File;

    #[test]
    fn test_validate_empty_path() {
        let result = validate_sqlite_path("");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_validate_no_extension() {
        let result = validate_sqlite_path("/tmp/test_file_no_ext");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("no extension"));
    }

    #[test]
    fn test_validate_wrong_extension() {
        let result = validate_sqlite_path("/tmp/test_file.txt");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid SQLite file extension"));
    }

    #[test]
    fn test_validate_directory_with_db_extension() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir_path = temp_dir.path().join("looks_like.db");
        std::fs::create_dir(&dir_path).unwrap();

        let result = validate_sqlite_path(dir_path.to_str().unwrap());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not a regular file"));
    }

    #[test]
    fn test_validate_valid_extensions() {
        let temp_dir = tempfile::tempdir().unwrap();

        for ext in &["db", "sqlite", "sqlite3", "DB"] {
            let file_path = temp_dir.path().join(format!("test_file.{}", ext));
            File::create(&file_path).unwrap();

            let result = validate_sqlite_path(file_path.to_str().unwrap());
            assert!(
                result.is_ok(),
                "Extension .{} should be valid, but got error: {:?}",
                ext,
                result.err()
            );
        }
    }

    #[test]
    fn test_execute_and_fetch_with_parameters() {
        let mut adapter = SqliteAdapter::open_in_memory().unwrap();
        adapter
            .execute("CREATE TABLE t (id INTEGER, name TEXT)", &[])
            .unwrap();

        let inserted = adapter
            .execute(
                "INSERT INTO t (id, name) VALUES (?, ?), (?, ?)",
                &[json!(1), json!("NULL"), json!(2), JsonValue::Null],
            )
            .unwrap();
        assert_eq!(inserted, 2);

        let rows = adapter
            .fetch_all("SELECT id, name FROM t WHERE id >= ? ORDER BY id", &[json!("1")])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], json!("NULL"));
        assert_eq!(rows[1]["name"], JsonValue::Null);
        // Column order follows the select list
        assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["id", "name"]);
    }

    #[test]
    fn test_execute_pragma_that_returns_rows() {
        let mut adapter = SqliteAdapter::open_in_memory().unwrap();
        assert!(adapter.execute("PRAGMA foreign_keys = OFF", &[]).is_ok());
        assert!(adapter.execute("PRAGMA foreign_keys", &[]).is_ok());
    }

    #[test]
    fn test_transaction_flag_tracks_connection_state() {
        let mut adapter = SqliteAdapter::open_in_memory().unwrap();
        adapter.execute("CREATE TABLE t (id INTEGER)", &[]).unwrap();
        assert!(!adapter.in_transaction());

        adapter.begin_transaction().unwrap();
        assert!(adapter.in_transaction());
        adapter.execute("INSERT INTO t VALUES (1)", &[]).unwrap();
        adapter.rollback_transaction().unwrap();
        assert!(!adapter.in_transaction());

        let rows = adapter.fetch_all("SELECT * FROM t", &[]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_native_quote_string() {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        assert_eq!(adapter.quote_string("O'Brien").as_deref(), Some("'O''Brien'"));
        assert_eq!(adapter.quote_string("").as_deref(), Some("''"));
    }
}
