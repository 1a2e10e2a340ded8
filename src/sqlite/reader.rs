// ABOUTME: SQLite schema introspection
// ABOUTME: Lists tables, columns and CREATE statements from sqlite_master

use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OptionalExtension};

/// List all user tables in a SQLite database
///
/// Queries sqlite_master for user-created tables, skipping the `sqlite_*`
/// internal tables (sqlite_sequence, sqlite_stat1, ...).
///
/// # Returns
///
/// Sorted vector of table names
pub fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    tracing::debug!("Listing tables from SQLite database");

    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type='table' \
             AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .context("Failed to prepare statement to list tables")?;

    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("Failed to query table list")?
        .collect::<Result<Vec<String>, _>>()
        .context("Failed to collect table names")?;

    tracing::debug!("Found {} user tables in SQLite database", tables.len());

    Ok(tables)
}

pub fn has_table(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .with_context(|| format!("Failed to look up table '{}'", table))?;
    Ok(count > 0)
}

/// Column names of `table` in declaration order
///
/// The table name is bound as a parameter to `pragma_table_info`, so it
/// needs no quoting.
pub fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
        .context("Failed to prepare column listing")?;

    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))
        .with_context(|| format!("Failed to list columns of table '{}'", table))?
        .collect::<Result<Vec<String>, _>>()
        .with_context(|| format!("Failed to collect columns of table '{}'", table))?;

    if columns.is_empty() {
        bail!("Table '{}' does not exist or has no columns", table);
    }

    Ok(columns)
}

/// Primary key columns of `table` in key order
///
/// Rowid tables without a declared key return nothing.
pub fn primary_key_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")
        .context("Failed to prepare primary key listing")?;

    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))
        .with_context(|| format!("Failed to read primary key of table '{}'", table))?
        .collect::<Result<Vec<String>, _>>()
        .with_context(|| format!("Failed to collect primary key of table '{}'", table))?;

    Ok(columns)
}

/// The `CREATE TABLE` statement stored in sqlite_master
pub fn table_ddl(conn: &Connection, table: &str) -> Result<String> {
    let ddl: Option<Option<String>> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type='table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("Failed to read schema of table '{}'", table))?;

    match ddl.flatten() {
        Some(sql) => Ok(sql.trim_end().trim_end_matches(';').to_string()),
        None => bail!("No CREATE statement found for table '{}'", table),
    }
}
