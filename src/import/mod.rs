// ABOUTME: Importer: loads SQL, JSON, YAML or CSV exports into a database
// ABOUTME: Applies conflict modes, foreign-key and transaction policy, and per-row error recovery

use crate::adapter::{fetch_count, DatabaseAdapter, Row};
use crate::dialect::Dialect;
use crate::error::InterchangeError;
use crate::filters::{TableFilter, DEFAULT_BATCH_SIZE};
use crate::formats::csv::{self as csv_format, CsvTableReader};
use crate::formats::sql::{classify_statement, split_statements, StatementKind};
use crate::formats::{json, read_text, yaml, Format, TableData};
use crate::quoting::quote_identifier;
use crate::utils::{abbreviate_sql, sanitize_identifier};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const SAVEPOINT: &str = "interchange_row";

/// What to do with rows already present in a target table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictMode {
    /// Insert alongside existing rows
    #[default]
    Append,
    /// Delete existing rows before inserting
    Replace,
    /// Leave non-empty tables untouched
    Skip,
}

impl fmt::Display for ConflictMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictMode::Append => "append",
            ConflictMode::Replace => "replace",
            ConflictMode::Skip => "skip",
        })
    }
}

impl FromStr for ConflictMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(ConflictMode::Append),
            "replace" => Ok(ConflictMode::Replace),
            "skip" => Ok(ConflictMode::Skip),
            other => Err(InterchangeError::validation(format!(
                "Unknown conflict mode '{}'. Expected append, replace or skip",
                other
            ))
            .into()),
        }
    }
}

/// Options controlling an import
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOptions {
    /// Input format; `None` detects it from the path or content
    pub format: Option<Format>,
    pub tables: Option<Vec<String>>,
    pub exclude: Vec<String>,
    pub conflict_mode: ConflictMode,
    /// Delete all rows from imported tables before anything else
    pub clear_tables: bool,
    pub use_transaction: bool,
    pub disable_foreign_keys: bool,
    /// Abort on the first failing row instead of recording it
    pub stop_on_error: bool,
    /// Rows per INSERT statement; must be positive
    pub batch_size: i64,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            format: None,
            tables: None,
            exclude: Vec::new(),
            conflict_mode: ConflictMode::Append,
            clear_tables: false,
            use_transaction: true,
            disable_foreign_keys: false,
            stop_on_error: true,
            batch_size: DEFAULT_BATCH_SIZE as i64,
        }
    }
}

/// Counters for the last import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportStatistics {
    pub rows_imported: u64,
    pub tables_imported: u64,
    /// Failures recorded while `stop_on_error` is off
    pub errors: Vec<String>,
    /// Non-fatal problems with the input, such as missing CSV files
    pub warnings: Vec<String>,
    pub table_results: BTreeMap<String, u64>,
    /// Tables left alone by [`ConflictMode::Skip`]
    pub skipped_tables: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    Started,
    Rows,
    Finished,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportProgress<'a> {
    pub table: &'a str,
    pub rows: u64,
    pub phase: ImportPhase,
}

/// Decoded input, fully validated before any write
enum Source {
    Tables(Vec<TableData>),
    Csv(Vec<CsvTableReader>),
    Sql(Vec<String>),
}

impl Source {
    /// Tables the input writes to, in first-seen order
    fn table_names(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let names: Vec<String> = match self {
            Source::Tables(tables) => tables.iter().map(|t| t.name.clone()).collect(),
            Source::Csv(readers) => readers.iter().map(|r| r.table().to_string()).collect(),
            Source::Sql(statements) => statements
                .iter()
                .filter_map(|s| match classify_statement(s) {
                    StatementKind::Insert(table) => Some(table),
                    _ => None,
                })
                .collect(),
        };
        names.into_iter().filter(|n| seen.insert(n.clone())).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableState {
    Ready,
    Skipped,
}

/// Detect the format of an import path
///
/// Directories are CSV exports. Files are recognised by extension (ignoring
/// `.gz`) and otherwise by sniffing their (decompressed) content.
pub fn detect_format(path: &Path) -> Result<Format> {
    if !path.exists() {
        return Err(InterchangeError::io(path, "input does not exist").into());
    }
    if path.is_dir() {
        return Ok(Format::Csv);
    }
    if let Some(format) = Format::from_path(path) {
        return Ok(format);
    }

    let text = read_text(path)?;
    Format::sniff(&text).ok_or_else(|| {
        InterchangeError::validation(format!(
            "Cannot detect the format of {}; pass the format explicitly",
            path.display()
        ))
        .into()
    })
}

/// Loads export files into one adapter
///
/// The order of operations is fixed: the input is decoded and validated,
/// foreign keys are disabled (if requested), tables are cleared (if
/// requested), a transaction is opened, tables are imported, and the
/// transaction is committed or rolled back before foreign keys are enabled
/// again.
///
/// # Examples
///
/// ```
/// # use table_interchange::adapter::{connect, DatabaseAdapter};
/// # use table_interchange::formats::Format;
/// # use table_interchange::import::{Importer, ImportOptions};
/// let mut db = connect("sqlite::memory:").unwrap();
/// db.execute("CREATE TABLE users (id INTEGER, name TEXT)", &[]).unwrap();
///
/// let doc = r#"{"data": {"users": {"rows": [{"id": 1, "name": "NULL"}]}}}"#;
/// let stats = Importer::new(db.as_mut(), ImportOptions::default())
///     .unwrap()
///     .import_str(doc, Format::Json)
///     .unwrap();
/// assert_eq!(stats.rows_imported, 1);
/// ```
pub struct Importer<'a> {
    adapter: &'a mut dyn DatabaseAdapter,
    options: ImportOptions,
    filter: TableFilter,
    batch_size: usize,
    statistics: ImportStatistics,
    progress: Option<Box<dyn FnMut(&ImportProgress<'_>) + 'a>>,
}

impl<'a> Importer<'a> {
    /// Validate `options` and build an importer
    pub fn new(adapter: &'a mut dyn DatabaseAdapter, options: ImportOptions) -> Result<Self> {
        if options.batch_size <= 0 {
            return Err(InterchangeError::validation(format!(
                "batch_size must be a positive integer, got {}",
                options.batch_size
            ))
            .into());
        }
        if !adapter.supports_parameters() {
            return Err(InterchangeError::Configuration(format!(
                "The {} adapter cannot bind statement parameters, which importing requires",
                adapter.dialect()
            ))
            .into());
        }

        let filter = TableFilter::new(options.tables.clone(), options.exclude.clone())?
            .with_migration_table(None);
        let batch_size = usize::try_from(options.batch_size).unwrap_or(usize::MAX);

        Ok(Self {
            adapter,
            options,
            filter,
            batch_size,
            statistics: ImportStatistics::default(),
            progress: None,
        })
    }

    /// Register a callback for per-table progress
    pub fn with_progress(mut self, callback: impl FnMut(&ImportProgress<'_>) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// Statistics of the most recent import; zeroed after a rollback
    pub fn statistics(&self) -> &ImportStatistics {
        &self.statistics
    }

    /// Import a file, or a CSV export directory
    pub fn import_file(&mut self, path: &Path) -> Result<ImportStatistics> {
        let format = match self.options.format {
            Some(format) => format,
            None => detect_format(path)?,
        };
        tracing::info!("Importing {} as {}", path.display(), format);

        let (source, warnings) = self.load_path(path, format)?;
        self.run(source, warnings)
    }

    /// Import an in-memory SQL, JSON or YAML document
    pub fn import_str(&mut self, content: &str, format: Format) -> Result<ImportStatistics> {
        let source = self.decode(content, format)?;
        self.run(source, Vec::new())
    }

    fn decode(&self, content: &str, format: Format) -> Result<Source> {
        match format {
            Format::Json => Ok(Source::Tables(json::decode(content)?)),
            Format::Yaml => Ok(Source::Tables(yaml::decode(content)?)),
            Format::Sql => Ok(Source::Sql(split_statements(content, self.adapter.dialect()))),
            Format::Csv => Err(InterchangeError::validation(
                "CSV imports read files; use import_file with a CSV file or directory",
            )
            .into()),
        }
    }

    fn load_path(&self, path: &Path, format: Format) -> Result<(Source, Vec<String>)> {
        if format != Format::Csv {
            let text = read_text(path)?;
            return Ok((self.decode(&text, format)?, Vec::new()));
        }

        let (files, warnings) = if path.is_dir() {
            let discovered = csv_format::discover(path)?;
            (discovered.files, discovered.warnings)
        } else {
            (vec![path.to_path_buf()], Vec::new())
        };

        let readers = files
            .iter()
            .map(|file| CsvTableReader::open(file))
            .collect::<Result<Vec<_>>>()?;
        Ok((Source::Csv(readers), warnings))
    }

    fn report(&mut self, table: &str, rows: u64, phase: ImportPhase) {
        if let Some(progress) = self.progress.as_mut() {
            progress(&ImportProgress { table, rows, phase });
        }
    }

    fn run(&mut self, source: Source, warnings: Vec<String>) -> Result<ImportStatistics> {
        self.statistics = ImportStatistics {
            warnings,
            ..ImportStatistics::default()
        };
        let dialect = self.adapter.dialect();

        // Must precede BEGIN: SQLite ignores foreign_keys changes inside a transaction
        let fk_disabled = if self.options.disable_foreign_keys {
            self.adapter
                .execute(dialect.foreign_key_checks_sql(false), &[])
                .context("Failed to disable foreign key checks")?;
            tracing::debug!("Foreign key checks disabled");
            true
        } else {
            false
        };

        let result = self.run_with_transaction(source);

        if fk_disabled {
            match self.adapter.execute(dialect.foreign_key_checks_sql(true), &[]) {
                Ok(_) => tracing::debug!("Foreign key checks re-enabled"),
                Err(e) if result.is_ok() => {
                    return Err(e.context("Failed to re-enable foreign key checks"))
                }
                Err(e) => tracing::warn!("Failed to re-enable foreign key checks: {:#}", e),
            }
        }

        result?;
        tracing::info!(
            "Imported {} rows into {} tables ({} errors)",
            self.statistics.rows_imported,
            self.statistics.tables_imported,
            self.statistics.errors.len()
        );
        Ok(self.statistics.clone())
    }

    fn run_with_transaction(&mut self, source: Source) -> Result<()> {
        if self.options.clear_tables {
            self.clear_tables(&source.table_names())?;
        }

        let owns_transaction = self.options.use_transaction && !self.adapter.in_transaction();
        if owns_transaction {
            self.adapter.begin_transaction()?;
        }

        let outcome = match source {
            Source::Tables(tables) => self.import_tables(tables),
            Source::Csv(readers) => self.import_csv(readers),
            Source::Sql(statements) => self.import_sql(statements),
        };

        let outcome = match outcome {
            Ok(()) if owns_transaction => self
                .adapter
                .commit_transaction()
                .context("Failed to commit import transaction"),
            other => other,
        };

        if let Err(e) = outcome {
            if owns_transaction {
                if self.adapter.in_transaction() {
                    if let Err(rollback_err) = self.adapter.rollback_transaction() {
                        tracing::warn!("Rollback failed: {:#}", rollback_err);
                    }
                }
                tracing::warn!("Import rolled back: {:#}", e);
                self.statistics.rows_imported = 0;
                self.statistics.tables_imported = 0;
                self.statistics.table_results.clear();
            }
            return Err(e);
        }
        Ok(())
    }

    fn clear_tables(&mut self, tables: &[String]) -> Result<()> {
        for table in tables {
            if !self.filter.should_include_table(table) || !self.adapter.has_table(table)? {
                continue;
            }
            let sql = format!("DELETE FROM {}", quote_identifier(table, self.adapter.dialect()));
            self.adapter
                .execute(&sql, &[])
                .with_context(|| format!("Failed to clear table '{}'", table))?;
            tracing::info!("Cleared table '{}'", sanitize_identifier(table));
        }
        Ok(())
    }

    fn row_count(&mut self, table: &str) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) AS row_count FROM {}",
            quote_identifier(table, self.adapter.dialect())
        );
        fetch_count(self.adapter, &sql, &[])
    }

    /// Apply the conflict mode before `table` is written
    ///
    /// `inserting` is false when the first statement touching the table
    /// is DDL, in which case replace mode has nothing to delete yet.
    fn prepare_table(&mut self, table: &str, inserting: bool) -> Result<TableState> {
        match self.options.conflict_mode {
            ConflictMode::Append => Ok(TableState::Ready),
            ConflictMode::Replace => {
                if inserting && self.adapter.has_table(table)? {
                    let sql =
                        format!("DELETE FROM {}", quote_identifier(table, self.adapter.dialect()));
                    let deleted = self
                        .adapter
                        .execute(&sql, &[])
                        .with_context(|| format!("Failed to replace rows of '{}'", table))?;
                    tracing::debug!("Deleted {} existing rows from '{}'", deleted, table);
                }
                Ok(TableState::Ready)
            }
            ConflictMode::Skip => {
                if self.adapter.has_table(table)? && self.row_count(table)? > 0 {
                    tracing::info!(
                        "Skipping '{}': table already has rows",
                        sanitize_identifier(table)
                    );
                    self.statistics.skipped_tables.push(table.to_string());
                    self.statistics.table_results.entry(table.to_string()).or_insert(0);
                    self.report(table, 0, ImportPhase::Skipped);
                    Ok(TableState::Skipped)
                } else {
                    Ok(TableState::Ready)
                }
            }
        }
    }

    /// Run `f`, inside a savepoint when failures are tolerated in a transaction
    ///
    /// A failed statement then rolls back only itself and the transaction
    /// stays usable. The inner result is the statement's outcome. The outer
    /// error means the savepoint itself could not be set, released or rolled
    /// back, so the state of the transaction is unknown and the import must
    /// stop.
    fn guarded<T>(
        &mut self,
        f: impl FnOnce(&mut dyn DatabaseAdapter) -> Result<T>,
    ) -> Result<Result<T>> {
        if self.options.stop_on_error || !self.adapter.in_transaction() {
            return Ok(f(&mut *self.adapter));
        }

        let dialect = self.adapter.dialect();
        self.adapter
            .execute(&dialect.savepoint_sql(SAVEPOINT), &[])
            .context("Failed to set savepoint")?;

        match f(&mut *self.adapter) {
            Ok(value) => {
                release_savepoint(self.adapter, dialect)?;
                Ok(Ok(value))
            }
            Err(e) => {
                self.adapter
                    .execute(&dialect.rollback_to_savepoint_sql(SAVEPOINT), &[])
                    .with_context(|| format!("Failed to roll back to savepoint after: {:#}", e))?;
                release_savepoint(self.adapter, dialect)?;
                Ok(Err(e))
            }
        }
    }

    fn record_error(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.statistics.errors.push(message);
    }

    fn rows_per_statement(&self, columns: usize) -> usize {
        let by_parameters = self.adapter.dialect().max_bind_parameters() / columns.max(1);
        self.batch_size.min(by_parameters).max(1)
    }

    fn import_tables(&mut self, tables: Vec<TableData>) -> Result<()> {
        for table in tables {
            self.import_rows(&table.name, table.rows.into_iter().map(Ok))?;
        }
        Ok(())
    }

    fn import_csv(&mut self, readers: Vec<CsvTableReader>) -> Result<()> {
        for reader in readers {
            let table = reader.table().to_string();
            self.import_rows(&table, reader)?;
        }
        Ok(())
    }

    /// Insert rows into one table in multi-row statements
    ///
    /// Consecutive rows with the same columns share a statement, up to the
    /// batch size and the dialect's bind-parameter limit.
    fn import_rows<I>(&mut self, table: &str, rows: I) -> Result<()>
    where
        I: Iterator<Item = Result<Row>>,
    {
        if !self.filter.should_include_table(table) {
            tracing::debug!("Skipping filtered table '{}'", sanitize_identifier(table));
            return Ok(());
        }
        if self.prepare_table(table, true)? == TableState::Skipped {
            return Ok(());
        }

        tracing::info!("Importing table '{}'", sanitize_identifier(table));
        self.report(table, 0, ImportPhase::Started);

        let mut pending: Vec<Row> = Vec::new();
        let mut imported = 0u64;
        for row in rows {
            let row = row?;
            if let Some(first) = pending.first() {
                let same_columns = first.len() == row.len() && first.keys().eq(row.keys());
                if !same_columns || pending.len() >= self.rows_per_statement(first.len()) {
                    imported += self.insert_chunk(table, &pending)?;
                    pending.clear();
                    self.report(table, imported, ImportPhase::Rows);
                }
            }
            pending.push(row);
        }
        if !pending.is_empty() {
            imported += self.insert_chunk(table, &pending)?;
        }

        self.statistics.rows_imported += imported;
        self.statistics.tables_imported += 1;
        *self
            .statistics
            .table_results
            .entry(table.to_string())
            .or_default() += imported;
        self.report(table, imported, ImportPhase::Finished);
        tracing::info!("Imported {} rows into '{}'", imported, sanitize_identifier(table));
        Ok(())
    }

    /// Insert rows that share a column list; returns how many were written
    ///
    /// When failures are tolerated, a failed multi-row statement is retried
    /// row by row so that only the bad rows are lost.
    fn insert_chunk(&mut self, table: &str, rows: &[Row]) -> Result<u64> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let columns: Vec<&String> = first.keys().collect();
        let sql = insert_sql(table, &columns, rows.len(), self.adapter.dialect());
        let params: Vec<JsonValue> = rows
            .iter()
            .flat_map(|row| {
                columns
                    .iter()
                    .map(move |c| row.get(c.as_str()).cloned().unwrap_or(JsonValue::Null))
            })
            .collect();

        match self.guarded(|adapter| adapter.execute(&sql, &params))? {
            Ok(_) => Ok(rows.len() as u64),
            Err(e) if self.options.stop_on_error => {
                Err(e.context(format!("Failed to import rows into '{}'", table)))
            }
            Err(e) if rows.len() > 1 => {
                tracing::debug!(
                    "Batch insert into '{}' failed ({:#}); retrying row by row",
                    table,
                    e
                );
                let mut written = 0;
                for row in rows {
                    written += self.insert_chunk(table, std::slice::from_ref(row))?;
                }
                Ok(written)
            }
            Err(e) => {
                self.record_error(format!("Table '{}': {:#}", sanitize_identifier(table), e));
                Ok(0)
            }
        }
    }

    /// Execute a SQL script statement by statement
    ///
    /// Transaction control in the script is ignored; the importer's own
    /// transaction policy applies. Table filters and conflict modes are
    /// applied to statements that name a table.
    fn import_sql(&mut self, statements: Vec<String>) -> Result<()> {
        let mut states: HashMap<String, TableState> = HashMap::new();
        let mut inserted_tables: BTreeSet<String> = BTreeSet::new();

        for statement in statements {
            let kind = classify_statement(&statement);
            if kind == StatementKind::Transaction {
                tracing::debug!("Ignoring transaction statement: {}", statement);
                continue;
            }

            if let Some(table) = kind.table() {
                if !self.filter.should_include_table(table) {
                    continue;
                }
                let state = match states.get(table) {
                    Some(state) => *state,
                    None => {
                        let inserting = matches!(kind, StatementKind::Insert(_));
                        let state = self.prepare_table(table, inserting)?;
                        states.insert(table.to_string(), state);
                        state
                    }
                };
                if state == TableState::Skipped {
                    continue;
                }
            }

            match self.guarded(|adapter| adapter.execute(&statement, &[]))? {
                Ok(affected) => {
                    if let StatementKind::Insert(table) = &kind {
                        self.statistics.rows_imported += affected;
                        *self
                            .statistics
                            .table_results
                            .entry(table.clone())
                            .or_default() += affected;
                        if inserted_tables.insert(table.clone()) {
                            self.report(table, affected, ImportPhase::Started);
                        }
                    }
                }
                Err(e) if self.options.stop_on_error => {
                    return Err(e.context(format!(
                        "Failed to execute statement: {}",
                        abbreviate_sql(&statement)
                    )))
                }
                Err(e) => self.record_error(format!(
                    "Statement failed ({}): {:#}",
                    abbreviate_sql(&statement),
                    e
                )),
            }
        }

        self.statistics.tables_imported = inserted_tables.len() as u64;
        for table in &inserted_tables {
            let rows = self.statistics.table_results.get(table).copied().unwrap_or_default();
            self.report(table, rows, ImportPhase::Finished);
        }
        Ok(())
    }
}

fn release_savepoint(adapter: &mut dyn DatabaseAdapter, dialect: Dialect) -> Result<()> {
    if let Some(release) = dialect.release_savepoint_sql(SAVEPOINT) {
        adapter
            .execute(&release, &[])
            .context("Failed to release savepoint")?;
    }
    Ok(())
}

/// `INSERT INTO t (a, b) VALUES (?, ?), (?, ?)` for `rows` rows
fn insert_sql(table: &str, columns: &[&String], rows: usize, dialect: Dialect) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_identifier(c, dialect))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
    let values = vec![placeholders.as_str(); rows].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_identifier(table, dialect),
        column_list,
        values
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use crate::sqlite::SqliteAdapter;

    fn db() -> SqliteAdapter {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        adapter
            .connection()
            .execute_batch(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
                 CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER);",
            )
            .unwrap();
        adapter
    }

    fn count(adapter: &SqliteAdapter, table: &str) -> i64 {
        adapter
            .connection()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_insert_sql_shape() {
        let a = "a".to_string();
        let b = "b`c".to_string();
        assert_eq!(
            insert_sql("t", &[&a, &b], 2, Dialect::MySql),
            "INSERT INTO `t` (`a`, `b``c`) VALUES (?, ?), (?, ?)"
        );
    }

    #[test]
    fn test_conflict_mode_parsing() {
        assert_eq!("Replace".parse::<ConflictMode>().unwrap(), ConflictMode::Replace);
        assert!("merge".parse::<ConflictMode>().is_err());
    }

    #[test]
    fn test_non_positive_batch_size_is_rejected() {
        for batch_size in [0, -5] {
            let mut adapter = db();
            let options = ImportOptions {
                batch_size,
                ..Default::default()
            };
            let err = Importer::new(&mut adapter, options).err().unwrap();
            assert!(matches!(classify(&err), Some(InterchangeError::Validation(_))));
        }
    }

    #[test]
    fn test_rows_per_statement_respects_parameter_limit() {
        let mut adapter = db();
        let importer = Importer::new(&mut adapter, ImportOptions::default()).unwrap();
        // SQLite allows 999 parameters: 10 columns fit 99 rows
        assert_eq!(importer.rows_per_statement(10), 99);
        assert_eq!(importer.rows_per_statement(1), 999);
        assert_eq!(importer.rows_per_statement(2000), 1);
    }

    #[test]
    fn test_import_many_rows_in_chunks() {
        let mut adapter = db();
        let rows: Vec<String> = (1..=2500)
            .map(|i| format!("{{\"id\": {}, \"name\": \"n{}\"}}", i, i))
            .collect();
        let doc = format!("{{\"data\": {{\"users\": [{}]}}}}", rows.join(","));

        let stats = Importer::new(&mut adapter, ImportOptions::default())
            .unwrap()
            .import_str(&doc, Format::Json)
            .unwrap();
        assert_eq!(stats.rows_imported, 2500);
        assert_eq!(stats.table_results["users"], 2500);
        assert_eq!(count(&adapter, "users"), 2500);
    }

    #[test]
    fn test_rows_with_different_columns() {
        let mut adapter = db();
        let doc = r#"{"data": {"users": [{"id": 1}, {"id": 2, "name": "b"}, {"name": "c", "id": 3}]}}"#;
        let stats = Importer::new(&mut adapter, ImportOptions::default())
            .unwrap()
            .import_str(doc, Format::Json)
            .unwrap();
        assert_eq!(stats.rows_imported, 3);
    }

    #[test]
    fn test_sql_script_import_skips_transaction_statements() {
        let mut adapter = db();
        let script = "BEGIN TRANSACTION;\n\
                      INSERT INTO users (id, name) VALUES (1, 'a;b'), (2, NULL);\n\
                      INSERT INTO orders (id, user_id) VALUES (1, 1);\n\
                      COMMIT;";
        let stats = Importer::new(&mut adapter, ImportOptions::default())
            .unwrap()
            .import_str(script, Format::Sql)
            .unwrap();
        assert_eq!(stats.rows_imported, 3);
        assert_eq!(stats.tables_imported, 2);
        assert_eq!(stats.table_results["users"], 2);
        assert!(!adapter.in_transaction());
    }

    #[test]
    fn test_sql_script_import_applies_table_filter() {
        let mut adapter = db();
        let script = "INSERT INTO users VALUES (1, 'a'); INSERT INTO orders VALUES (1, 1);";
        let options = ImportOptions {
            exclude: vec!["orders".to_string()],
            ..Default::default()
        };
        let stats = Importer::new(&mut adapter, options)
            .unwrap()
            .import_str(script, Format::Sql)
            .unwrap();
        assert_eq!(stats.rows_imported, 1);
        assert_eq!(count(&adapter, "orders"), 0);
    }

    #[test]
    fn test_sql_script_skip_mode_protects_existing_table_from_drop() {
        let mut adapter = db();
        adapter.execute("INSERT INTO users VALUES (1, 'keep')", &[]).unwrap();
        let script = "DROP TABLE IF EXISTS users;\n\
                      CREATE TABLE users (id INTEGER, name TEXT);\n\
                      INSERT INTO users VALUES (2, 'new');";
        let options = ImportOptions {
            conflict_mode: ConflictMode::Skip,
            ..Default::default()
        };
        let stats = Importer::new(&mut adapter, options)
            .unwrap()
            .import_str(script, Format::Sql)
            .unwrap();
        assert_eq!(stats.skipped_tables, vec!["users"]);
        assert_eq!(count(&adapter, "users"), 1);
    }

    #[test]
    fn test_import_csv_requires_a_path() {
        let mut adapter = db();
        let mut importer = Importer::new(&mut adapter, ImportOptions::default()).unwrap();
        assert!(importer.import_str("id\n1\n", Format::Csv).is_err());
    }

    #[test]
    fn test_detect_format() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_format(dir.path()).unwrap(), Format::Csv);

        let path = dir.path().join("dump");
        std::fs::write(&path, "-- dump\nINSERT INTO t VALUES (1);").unwrap();
        assert_eq!(detect_format(&path).unwrap(), Format::Sql);

        let path = dir.path().join("data.yml");
        std::fs::write(&path, "{}").unwrap();
        assert_eq!(detect_format(&path).unwrap(), Format::Yaml);

        let path = dir.path().join("mystery");
        std::fs::write(&path, "hello").unwrap();
        assert!(detect_format(&path).is_err());

        let err = detect_format(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(classify(&err), Some(InterchangeError::Io { .. })));
    }
}
