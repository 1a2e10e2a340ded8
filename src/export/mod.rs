// ABOUTME: Exporter: streams selected tables from a database into a SQL, JSON, YAML or CSV export
// ABOUTME: Validates options and WHERE clauses before touching the database and writes files atomically

pub mod reader;

use crate::adapter::DatabaseAdapter;
use crate::error::InterchangeError;
use crate::filters::{TableFilter, DEFAULT_BATCH_SIZE, DEFAULT_MIGRATION_TABLE};
use crate::formats::csv::CsvSink;
use crate::formats::json::JsonSink;
use crate::formats::sql::SqlSink;
use crate::formats::yaml::YamlSink;
use crate::formats::{ExportMetadata, ExportSink, Format, OutputStream, TableHeader};
use crate::utils::sanitize_identifier;
use crate::where_clause::ParsedPredicate;
use anyhow::{Context, Result};
use reader::TableStream;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Options controlling an export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub format: Format,
    /// Only these tables; `None` means every table
    pub tables: Option<Vec<String>>,
    pub exclude: Vec<String>,
    /// Per-table WHERE clauses, validated before use
    pub where_clauses: BTreeMap<String, String>,
    /// Maximum rows per table
    pub limit: Option<u64>,
    pub batch_size: u64,
    /// Gzip the output file (not available for CSV)
    pub compress: bool,
    /// Emit CREATE TABLE statements (SQL format)
    pub include_schema: bool,
    /// Emit DROP TABLE IF EXISTS before each table (SQL format)
    pub drop_tables: bool,
    /// Wrap the SQL script in BEGIN/COMMIT
    pub use_transaction: bool,
    /// Bookkeeping table skipped unless explicitly listed in `tables`
    pub migration_table: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: Format::Sql,
            tables: None,
            exclude: Vec::new(),
            where_clauses: BTreeMap::new(),
            limit: None,
            batch_size: DEFAULT_BATCH_SIZE,
            compress: false,
            include_schema: true,
            drop_tables: false,
            use_transaction: true,
            migration_table: Some(DEFAULT_MIGRATION_TABLE.to_string()),
        }
    }
}

/// Rows written for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableExport {
    pub table: String,
    pub rows: u64,
}

/// Outcome of a successful export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// File (or CSV directory) that was written
    pub output: Option<PathBuf>,
    pub tables: Vec<TableExport>,
    pub total_rows: u64,
}

/// Export progress reported after each batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportProgress<'a> {
    pub table: &'a str,
    pub table_index: usize,
    pub table_count: usize,
    pub rows: u64,
}

/// Streams tables out of one adapter
///
/// The adapter is owned by the caller; the exporter only borrows it.
///
/// # Examples
///
/// ```
/// # use table_interchange::adapter::{connect, DatabaseAdapter};
/// # use table_interchange::export::{Exporter, ExportOptions};
/// # use table_interchange::formats::Format;
/// let mut db = connect("sqlite::memory:").unwrap();
/// db.execute("CREATE TABLE users (id INTEGER, name TEXT)", &[]).unwrap();
/// db.execute("INSERT INTO users VALUES (1, 'ada')", &[]).unwrap();
///
/// let options = ExportOptions { format: Format::Json, ..Default::default() };
/// let mut out = Vec::new();
/// let summary = Exporter::new(db.as_mut(), options).unwrap().export_to_writer(&mut out).unwrap();
/// assert_eq!(summary.total_rows, 1);
/// ```
pub struct Exporter<'a> {
    adapter: &'a mut dyn DatabaseAdapter,
    options: ExportOptions,
    filter: TableFilter,
    progress: Option<Box<dyn FnMut(&ExportProgress<'_>) + 'a>>,
}

impl<'a> Exporter<'a> {
    /// Validate `options` and build an exporter
    ///
    /// Fails on a zero batch size, compressed CSV, empty table names and
    /// WHERE clauses that do not pass validation. No query is run here.
    pub fn new(adapter: &'a mut dyn DatabaseAdapter, options: ExportOptions) -> Result<Self> {
        if options.compress && options.format == Format::Csv {
            return Err(InterchangeError::validation(
                "Compression is not supported for CSV exports (CSV writes a directory of files)",
            )
            .into());
        }

        let filter = TableFilter::new(options.tables.clone(), options.exclude.clone())?
            .with_where_clauses(options.where_clauses.clone())
            .with_limit(options.limit)
            .with_batch_size(options.batch_size)?
            .with_migration_table(options.migration_table.clone());

        // Reject bad WHERE clauses up front, before any query runs
        filter.parse_where_clauses(adapter.dialect())?;

        Ok(Self {
            adapter,
            options,
            filter,
            progress: None,
        })
    }

    /// Register a callback invoked after every batch
    pub fn with_progress(mut self, callback: impl FnMut(&ExportProgress<'_>) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Output path actually used for `path`: compressed exports get `.gz`
    pub fn output_path(&self, path: &Path) -> PathBuf {
        let already_gz = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("gz"));
        if self.options.compress && !already_gz {
            let mut name = path.as_os_str().to_os_string();
            name.push(".gz");
            PathBuf::from(name)
        } else {
            path.to_path_buf()
        }
    }

    /// Tables that will be exported, in order
    pub fn tables(&mut self) -> Result<Vec<String>> {
        let available = self.adapter.list_tables()?;
        Ok(self.filter.resolve_tables(&available))
    }

    /// Export to `path`
    ///
    /// SQL, JSON and YAML write a single file (with `.gz` appended when
    /// compressing); CSV writes a directory. Files only appear once complete.
    pub fn export_to(&mut self, path: &Path) -> Result<ExportSummary> {
        let predicates = self.filter.parse_where_clauses(self.adapter.dialect())?;
        let tables = self.tables()?;
        let metadata = ExportMetadata::new(self.adapter.dialect(), tables.clone());

        if self.options.format == Format::Csv {
            let mut sink = CsvSink::new(path, metadata)?;
            let mut summary = self.run(&mut sink, &tables, &predicates)?;
            summary.output = Some(path.to_path_buf());
            tracing::info!(
                "Exported {} rows from {} tables to {}",
                summary.total_rows,
                summary.tables.len(),
                path.display()
            );
            return Ok(summary);
        }

        let output_path = self.output_path(path);
        let mut output = OutputStream::create(&output_path, self.options.compress)?;
        let mut summary = self.write_document(&mut output, &metadata, &tables, &predicates)?;
        summary.output = Some(output.finish()?);

        tracing::info!(
            "Exported {} rows from {} tables to {}",
            summary.total_rows,
            summary.tables.len(),
            output_path.display()
        );
        Ok(summary)
    }

    /// Export a single-document format to any writer, uncompressed
    pub fn export_to_writer<W: Write>(&mut self, out: W) -> Result<ExportSummary> {
        if self.options.format == Format::Csv {
            return Err(InterchangeError::validation(
                "CSV exports write a directory; use export_to with a directory path",
            )
            .into());
        }
        let predicates = self.filter.parse_where_clauses(self.adapter.dialect())?;
        let tables = self.tables()?;
        let metadata = ExportMetadata::new(self.adapter.dialect(), tables.clone());
        self.write_document(out, &metadata, &tables, &predicates)
    }

    fn write_document<W: Write>(
        &mut self,
        out: W,
        metadata: &ExportMetadata,
        tables: &[String],
        predicates: &BTreeMap<String, ParsedPredicate>,
    ) -> Result<ExportSummary> {
        match self.options.format {
            Format::Sql => {
                let mut sink = SqlSink::new(
                    out,
                    self.adapter.dialect(),
                    &metadata.exported_at,
                    self.options.use_transaction,
                )?;
                self.run(&mut sink, tables, predicates)
            }
            Format::Json => {
                let mut sink = JsonSink::new(out, metadata)?;
                self.run(&mut sink, tables, predicates)
            }
            Format::Yaml => {
                let mut sink = YamlSink::new(out, metadata)?;
                self.run(&mut sink, tables, predicates)
            }
            Format::Csv => {
                Err(InterchangeError::validation("CSV is not a single-document format").into())
            }
        }
    }

    fn run(
        &mut self,
        sink: &mut dyn ExportSink,
        tables: &[String],
        predicates: &BTreeMap<String, ParsedPredicate>,
    ) -> Result<ExportSummary> {
        let mut summary = ExportSummary {
            output: None,
            tables: Vec::with_capacity(tables.len()),
            total_rows: 0,
        };

        for (idx, table) in tables.iter().enumerate() {
            tracing::info!(
                "Exporting table {}/{}: '{}'",
                idx + 1,
                tables.len(),
                sanitize_identifier(table)
            );

            let columns = self
                .adapter
                .column_names(table)
                .with_context(|| format!("Failed to read columns of '{}'", table))?;

            let key = self
                .adapter
                .primary_key_columns(table)
                .with_context(|| format!("Failed to read primary key of '{}'", table))?;

            let create = if self.options.format == Format::Sql && self.options.include_schema {
                Some(self.adapter.table_ddl(table).map_err(|e| {
                    tracing::warn!("Could not read CREATE TABLE for '{}': {}", table, e);
                    e.to_string()
                }))
            } else {
                None
            };

            sink.begin_table(&TableHeader {
                name: table,
                columns: &columns,
                drop: self.options.drop_tables,
                create,
            })?;

            let mut stream = TableStream::new(
                table.as_str(),
                columns.clone(),
                predicates.get(table).cloned(),
                self.filter.limit(),
                self.filter.batch_size(),
            )
            .order_by(key);

            let mut rows = 0u64;
            while let Some(batch) = stream
                .next_batch(self.adapter)
                .with_context(|| format!("Failed to read rows from '{}'", table))?
            {
                sink.write_batch(&batch, &*self.adapter)?;
                rows += batch.len() as u64;

                if let Some(progress) = self.progress.as_mut() {
                    progress(&ExportProgress {
                        table,
                        table_index: idx,
                        table_count: tables.len(),
                        rows,
                    });
                }
            }

            sink.end_table()?;
            tracing::debug!("Exported {} rows from '{}'", rows, sanitize_identifier(table));

            summary.total_rows += rows;
            summary.tables.push(TableExport {
                table: table.clone(),
                rows,
            });
        }

        sink.finish()?;
        Ok(summary)
    }
}
