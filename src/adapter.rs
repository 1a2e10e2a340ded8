// ABOUTME: Database adapter abstraction used by the exporter and importer
// ABOUTME: Defines the blocking DatabaseAdapter trait and the URL-based connection factory

use crate::dialect::Dialect;
use anyhow::{bail, Context, Result};
use serde_json::Value as JsonValue;

/// One result row, keyed by column name in select-list order.
pub type Row = serde_json::Map<String, JsonValue>;

/// Blocking access to one live database connection.
///
/// SQL passed to `execute`/`fetch_all` uses `?` placeholders regardless of
/// dialect; adapters translate them to their native form. Parameter values
/// are JSON scalars (`null`, bool, number, string).
///
/// An adapter owns its connection exclusively. Exporters and importers take
/// `&mut dyn DatabaseAdapter` and never share one between callers.
pub trait DatabaseAdapter {
    fn dialect(&self) -> Dialect;

    /// Run a statement and return the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[JsonValue]) -> Result<u64>;

    /// Run a query and return every row.
    fn fetch_all(&mut self, sql: &str, params: &[JsonValue]) -> Result<Vec<Row>>;

    /// Run a query and return its first row, if any.
    fn fetch_row(&mut self, sql: &str, params: &[JsonValue]) -> Result<Option<Row>> {
        Ok(self.fetch_all(sql, params)?.into_iter().next())
    }

    /// User tables, sorted by name. System tables are never listed.
    fn list_tables(&mut self) -> Result<Vec<String>>;

    fn has_table(&mut self, table: &str) -> Result<bool> {
        Ok(self.list_tables()?.iter().any(|t| t == table))
    }

    /// Column names of `table` in ordinal order.
    fn column_names(&mut self, table: &str) -> Result<Vec<String>>;

    /// Primary key columns of `table` in key order; empty when it has none.
    fn primary_key_columns(&mut self, _table: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// `CREATE TABLE` statement for `table`, without a trailing semicolon.
    fn table_ddl(&mut self, table: &str) -> Result<String>;

    fn begin_transaction(&mut self) -> Result<()>;
    fn commit_transaction(&mut self) -> Result<()>;
    fn rollback_transaction(&mut self) -> Result<()>;
    fn in_transaction(&self) -> bool;

    /// Quote `value` as a string literal using the driver's own primitive.
    ///
    /// `None` means no native primitive exists and callers fall back to
    /// manual escaping.
    fn quote_string(&self, _value: &str) -> Option<String> {
        None
    }

    /// Whether `?` parameters can be bound. Importing requires this.
    fn supports_parameters(&self) -> bool {
        true
    }

    fn disconnect(&mut self) -> Result<()>;
}

/// Open a fresh adapter for `url`.
///
/// Every call returns a new connection; nothing is cached between calls.
///
/// Recognised forms:
/// - `sqlite::memory:`, `sqlite://<path>`, or a bare path ending in
///   `.db`, `.sqlite` or `.sqlite3`
/// - `postgres://...` / `postgresql://...`
/// - `mysql://...`
///
/// # Examples
///
/// ```
/// # use table_interchange::adapter::connect;
/// # use table_interchange::dialect::Dialect;
/// let adapter = connect("sqlite::memory:").unwrap();
/// assert_eq!(adapter.dialect(), Dialect::Sqlite);
/// ```
pub fn connect(url: &str) -> Result<Box<dyn DatabaseAdapter>> {
    let url = url.trim();
    if url.is_empty() {
        bail!("Database URL cannot be empty");
    }

    tracing::debug!(
        "Opening database connection to {}",
        crate::utils::strip_password_from_url(url)
    );

    if url == "sqlite::memory:" || url == "sqlite://:memory:" {
        return Ok(Box::new(crate::sqlite::SqliteAdapter::open_in_memory()?));
    }
    if let Some(path) = url.strip_prefix("sqlite://") {
        return Ok(Box::new(crate::sqlite::SqliteAdapter::open(path)?));
    }
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let adapter = crate::postgres::PostgresAdapter::connect(url).with_context(|| {
            format!(
                "Failed to connect to PostgreSQL at {}",
                crate::utils::strip_password_from_url(url)
            )
        })?;
        return Ok(Box::new(adapter));
    }
    if url.starts_with("mysql://") {
        let adapter = crate::mysql::MySqlAdapter::connect(url).with_context(|| {
            format!(
                "Failed to connect to MySQL at {}",
                crate::utils::strip_password_from_url(url)
            )
        })?;
        return Ok(Box::new(adapter));
    }
    if crate::sqlite::has_sqlite_extension(url) {
        return Ok(Box::new(crate::sqlite::SqliteAdapter::open(url)?));
    }

    bail!(
        "Unsupported database URL '{}'. \
         Expected sqlite://, postgres://, postgresql://, mysql:// or a .db/.sqlite/.sqlite3 path",
        crate::utils::strip_password_from_url(url)
    )
}

/// Read the first column of the first row as a count.
///
/// Drivers disagree on how `COUNT(*)` comes back (integer, decimal string),
/// so both numbers and numeric strings are accepted.
pub fn fetch_count(
    adapter: &mut dyn DatabaseAdapter,
    sql: &str,
    params: &[JsonValue],
) -> Result<u64> {
    let row = adapter
        .fetch_row(sql, params)?
        .ok_or_else(|| anyhow::anyhow!("Count query returned no rows"))?;
    let value = row
        .values()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Count query returned no columns"))?;

    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .ok_or_else(|| anyhow::anyhow!("Count query returned non-integer {}", n)),
        JsonValue::String(s) => s
            .parse::<u64>()
            .with_context(|| format!("Count query returned non-integer '{}'", s)),
        other => bail!("Count query returned unexpected value {}", other),
    }
}
