// ABOUTME: File formats shared by export and import: detection, document shape and output streams
// ABOUTME: Declares the ExportSink trait implemented by the SQL, JSON, YAML and CSV codecs

pub mod csv;
pub mod json;
pub mod sql;
pub mod yaml;

use crate::adapter::{DatabaseAdapter, Row};
use crate::dialect::Dialect;
use crate::error::InterchangeError;
use crate::export::reader::RowBatch;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;

/// Name of the manifest written next to CSV table files
pub const MANIFEST_FILE: &str = "export_metadata.json";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Sql,
    Json,
    Yaml,
    Csv,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Sql => "sql",
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Csv => "csv",
        }
    }

    /// Format implied by a file name, ignoring a trailing `.gz`
    pub fn from_path(path: &Path) -> Option<Format> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        let ext = Path::new(name).extension()?.to_str()?;
        match ext {
            "sql" => Some(Format::Sql),
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            "csv" => Some(Format::Csv),
            _ => None,
        }
    }

    /// Guess the format from file content
    pub fn sniff(content: &str) -> Option<Format> {
        let trimmed = content.trim_start_matches('\u{feff}').trim_start();

        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            return Some(Format::Json);
        }
        if trimmed.starts_with("# Table:") {
            return Some(Format::Csv);
        }
        if trimmed.starts_with("---") {
            return Some(Format::Yaml);
        }

        let upper = trimmed.to_ascii_uppercase();
        if trimmed.starts_with("--")
            || upper.starts_with("INSERT INTO")
            || upper.starts_with("CREATE TABLE")
            || upper.starts_with("DROP TABLE")
            || upper.starts_with("BEGIN")
            || upper.starts_with("START TRANSACTION")
        {
            return Some(Format::Sql);
        }

        let first_line = trimmed.lines().next().unwrap_or_default();
        if first_line == "metadata:" || first_line == "data:" {
            return Some(Format::Yaml);
        }

        None
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sql" => Ok(Format::Sql),
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            "csv" => Ok(Format::Csv),
            other => Err(InterchangeError::validation(format!(
                "Unsupported format '{}'. Expected sql, json, yaml or csv",
                other
            ))
            .into()),
        }
    }
}

/// Export metadata: the JSON/YAML `metadata` block and the CSV manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    #[serde(alias = "exportedAt")]
    pub exported_at: String,
    #[serde(alias = "databaseType")]
    pub database_type: String,
    /// Table names (JSON/YAML) or table file names (CSV), in export order
    #[serde(default)]
    pub tables: Vec<String>,
}

impl ExportMetadata {
    pub fn new(dialect: Dialect, tables: Vec<String>) -> Self {
        Self {
            exported_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            database_type: dialect.as_str().to_string(),
            tables,
        }
    }
}

/// What a sink needs to know when a table starts
#[derive(Debug, Clone)]
pub struct TableHeader<'a> {
    pub name: &'a str,
    pub columns: &'a [String],
    /// Emit `DROP TABLE IF EXISTS` before the table
    pub drop: bool,
    /// `CREATE TABLE` statement, or why it could not be read; `None` when
    /// schema output is off
    pub create: Option<std::result::Result<String, String>>,
}

/// Streaming writer for one export
///
/// Called as `begin_table`, any number of `write_batch`, `end_table` per
/// table, then `finish` once.
pub trait ExportSink {
    fn begin_table(&mut self, header: &TableHeader<'_>) -> Result<()>;

    /// `adapter` supplies native literal quoting where the format needs it
    fn write_batch(&mut self, batch: &RowBatch, adapter: &dyn DatabaseAdapter) -> Result<()>;

    fn end_table(&mut self) -> Result<()>;

    fn finish(&mut self) -> Result<()>;
}

/// A table decoded from a JSON or YAML document
#[derive(Debug, Clone, PartialEq)]
pub struct TableData {
    pub name: String,
    pub rows: Vec<Row>,
}

/// JSON type name used in validation errors
pub fn kind_of(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Extract tables from a parsed `{"metadata": ..., "data": {...}}` document
///
/// Each table may be a plain array of rows or an object with a `rows` array.
/// Anything else is a validation error naming the table and what was found.
pub fn tables_from_document(document: JsonValue) -> Result<Vec<TableData>> {
    let mut root = match document {
        JsonValue::Object(map) => map,
        other => {
            return Err(InterchangeError::validation(format!(
                "Expected the document to be a map with a 'data' key, got {}",
                kind_of(&other)
            ))
            .into())
        }
    };

    let data = match root.remove("data") {
        Some(data) => data,
        None => {
            return Err(InterchangeError::validation(
                "Document has no 'data' key holding the tables",
            )
            .into())
        }
    };

    let data = match data {
        JsonValue::Object(map) => map,
        other => {
            return Err(InterchangeError::validation(format!(
                "Expected 'data' to be a map of tables, got {}",
                kind_of(&other)
            ))
            .into())
        }
    };

    let mut tables = Vec::with_capacity(data.len());
    for (name, value) in data {
        let rows = match value {
            JsonValue::Array(rows) => rows,
            JsonValue::Object(mut table) => match table.remove("rows") {
                Some(JsonValue::Array(rows)) => rows,
                Some(other) => {
                    return Err(InterchangeError::validation(format!(
                        "Table '{}': expected 'rows' to be an array, got {}",
                        name,
                        kind_of(&other)
                    ))
                    .into())
                }
                None => {
                    return Err(InterchangeError::validation(format!(
                        "Table '{}': expected an array of rows or an object with 'rows', got object without 'rows'",
                        name
                    ))
                    .into())
                }
            },
            other => {
                return Err(InterchangeError::validation(format!(
                    "Table '{}': expected an array of rows, got {}",
                    name,
                    kind_of(&other)
                ))
                .into())
            }
        };

        let mut table_rows = Vec::with_capacity(rows.len());
        for (idx, row) in rows.into_iter().enumerate() {
            match row {
                JsonValue::Object(map) => table_rows.push(map),
                other => {
                    return Err(InterchangeError::validation(format!(
                        "Table '{}': row {} must be an object, got {}",
                        name,
                        idx + 1,
                        kind_of(&other)
                    ))
                    .into())
                }
            }
        }

        tables.push(TableData {
            name,
            rows: table_rows,
        });
    }

    Ok(tables)
}

/// Read a whole file as text, transparently un-gzipping it
pub fn read_text(path: &Path) -> Result<String> {
    let mut raw = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut raw))
        .map_err(|e| InterchangeError::io(path, e.to_string()))?;

    let bytes = if raw.starts_with(&GZIP_MAGIC) {
        let mut decoded = Vec::new();
        GzDecoder::new(raw.as_slice())
            .read_to_end(&mut decoded)
            .map_err(|e| InterchangeError::io(path, format!("gzip decompression failed: {}", e)))?;
        decoded
    } else {
        raw
    };

    String::from_utf8(bytes).map_err(|_| {
        InterchangeError::validation(format!("{} is not valid UTF-8 text", path.display())).into()
    })
}

enum Destination {
    Plain(BufWriter<NamedTempFile>),
    Gzip(GzEncoder<BufWriter<NamedTempFile>>),
}

/// File output that only appears at its destination once fully written
///
/// Bytes go to a temp file in the destination directory, optionally through
/// a gzip encoder. [`OutputStream::finish`] flushes, completes compression
/// and renames the temp file into place. Dropping an unfinished stream
/// deletes the temp file.
pub struct OutputStream {
    destination: Destination,
    path: PathBuf,
}

impl OutputStream {
    pub fn create(path: &Path, compress: bool) -> Result<Self> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let temp = NamedTempFile::new_in(&parent)
            .map_err(|e| InterchangeError::io(&parent, format!("cannot create temp file: {}", e)))?;

        let buffered = BufWriter::new(temp);
        let destination = if compress {
            Destination::Gzip(GzEncoder::new(buffered, Compression::default()))
        } else {
            Destination::Plain(buffered)
        };

        Ok(Self {
            destination,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Complete the write and move the file to its destination
    pub fn finish(self) -> Result<PathBuf> {
        let path = self.path;
        let buffered = match self.destination {
            Destination::Plain(w) => w,
            Destination::Gzip(encoder) => encoder
                .finish()
                .map_err(|e| {
                    InterchangeError::io(&path, format!("gzip compression failed: {}", e))
                })?,
        };
        let temp = buffered
            .into_inner()
            .map_err(|e| InterchangeError::io(&path, e.error().to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| InterchangeError::io(&path, e.to_string()))?;
        temp.persist(&path)
            .map_err(|e| InterchangeError::io(&path, e.error.to_string()))?;
        Ok(path)
    }
}

/// Wrap a write failure so it names the file being written
fn at_path(path: &Path, err: std::io::Error) -> std::io::Error {
    std::io::Error::new(err.kind(), InterchangeError::io(path, err.to_string()))
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let result = match &mut self.destination {
            Destination::Plain(w) => w.write(buf),
            Destination::Gzip(w) => w.write(buf),
        };
        result.map_err(|e| at_path(&self.path, e))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let result = match &mut self.destination {
            Destination::Plain(w) => w.flush(),
            Destination::Gzip(w) => w.flush(),
        };
        result.map_err(|e| at_path(&self.path, e))
    }
}

/// Write the CSV manifest atomically
pub fn write_manifest(dir: &Path, metadata: &ExportMetadata) -> Result<PathBuf> {
    let path = dir.join(MANIFEST_FILE);
    let mut output = OutputStream::create(&path, false)?;
    serde_json::to_writer_pretty(&mut output, metadata)
        .with_context(|| format!("Failed to write manifest {}", path.display()))?;
    output
        .write_all(b"\n")
        .map_err(|e| InterchangeError::io(&path, e.to_string()))?;
    output.finish()
}

/// Read the CSV manifest, if the directory has one
pub fn read_manifest(dir: &Path) -> Result<Option<ExportMetadata>> {
    let path = dir.join(MANIFEST_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let text = read_text(&path)?;
    let metadata = serde_json::from_str(&text).map_err(|e| {
        InterchangeError::validation(format!("Invalid manifest {}: {}", path.display(), e))
    })?;
    Ok(Some(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use serde_json::json;

    fn validation_message(result: Result<Vec<TableData>>) -> String {
        let err = result.unwrap_err();
        match classify(&err) {
            Some(InterchangeError::Validation(msg)) => msg.clone(),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_write_failures_name_the_output_file() {
        let failure = std::io::Error::new(std::io::ErrorKind::WriteZero, "disk full");
        let tagged = at_path(Path::new("/exports/dump.sql.gz"), failure);
        assert_eq!(tagged.kind(), std::io::ErrorKind::WriteZero);

        let err = anyhow::Error::new(tagged);
        assert!(err.to_string().contains("/exports/dump.sql.gz"));
        match classify(&err) {
            Some(InterchangeError::Io { path, .. }) => {
                assert_eq!(path, Path::new("/exports/dump.sql.gz"))
            }
            other => panic!("expected I/O error, got {:?}", other),
        }
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(Format::from_path(Path::new("dump.sql")), Some(Format::Sql));
        assert_eq!(Format::from_path(Path::new("dump.SQL.gz")), Some(Format::Sql));
        assert_eq!(Format::from_path(Path::new("a/b.yml")), Some(Format::Yaml));
        assert_eq!(Format::from_path(Path::new("data.json.gz")), Some(Format::Json));
        assert_eq!(Format::from_path(Path::new("users.csv")), Some(Format::Csv));
        assert_eq!(Format::from_path(Path::new("export.gz")), None);
        assert_eq!(Format::from_path(Path::new("export")), None);
    }

    #[test]
    fn test_format_sniff() {
        assert_eq!(Format::sniff("  {\"data\": {}}"), Some(Format::Json));
        assert_eq!(Format::sniff("-- export\nINSERT INTO t VALUES (1);"), Some(Format::Sql));
        assert_eq!(Format::sniff("insert into t values (1);"), Some(Format::Sql));
        assert_eq!(Format::sniff("metadata:\n  exported_at: x\n"), Some(Format::Yaml));
        assert_eq!(Format::sniff("---\ndata: {}\n"), Some(Format::Yaml));
        assert_eq!(Format::sniff("# Table: users\nid\n1\n"), Some(Format::Csv));
        assert_eq!(Format::sniff("hello world"), None);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("YAML".parse::<Format>().unwrap(), Format::Yaml);
        assert_eq!("yml".parse::<Format>().unwrap(), Format::Yaml);
        assert!("xml".parse::<Format>().is_err());
    }

    #[test]
    fn test_tables_from_document_accepts_both_table_shapes() {
        let doc = json!({
            "metadata": {"exported_at": "x", "database_type": "sqlite", "tables": []},
            "data": {
                "users": {"rows": [{"id": 1}]},
                "orders": [{"id": 2}, {"id": 3}]
            }
        });
        let tables = tables_from_document(doc).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "users");
        assert_eq!(tables[1].rows.len(), 2);
    }

    #[test]
    fn test_tables_from_document_rejects_malformed_shapes() {
        let msg = validation_message(tables_from_document(json!({"data": [1, 2]})));
        assert!(msg.contains("'data'") && msg.contains("array"), "{}", msg);

        let msg = validation_message(tables_from_document(json!({"data": {"users": "x"}})));
        assert!(msg.contains("'users'") && msg.contains("string"), "{}", msg);

        let msg = validation_message(tables_from_document(json!({"data": {"users": {"rows": 5}}})));
        assert!(msg.contains("'users'") && msg.contains("number"), "{}", msg);

        let msg = validation_message(tables_from_document(json!({"data": {"users": [1]}})));
        assert!(msg.contains("row 1"), "{}", msg);

        let msg = validation_message(tables_from_document(json!({"data": {"users": {"id": 1}}})));
        assert!(msg.contains("'users'"), "{}", msg);

        assert!(tables_from_document(json!("data")).is_err());
        assert!(tables_from_document(json!({"tables": {}})).is_err());
    }

    #[test]
    fn test_output_stream_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.sql");

        {
            let mut out = OutputStream::create(&path, false).unwrap();
            out.write_all(b"partial").unwrap();
            // Dropped without finish
        }
        assert!(!path.exists());

        let mut out = OutputStream::create(&path, false).unwrap();
        out.write_all(b"complete").unwrap();
        assert_eq!(out.finish().unwrap(), path);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "complete");
    }

    #[test]
    fn test_gzip_output_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json.gz");

        let mut out = OutputStream::create(&path, true).unwrap();
        out.write_all(b"{\"data\": {}}").unwrap();
        out.finish().unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[..2], &GZIP_MAGIC);
        assert_eq!(read_text(&path).unwrap(), "{\"data\": {}}");
    }

    #[test]
    fn test_read_text_missing_file_is_io_error() {
        let err = read_text(Path::new("/nonexistent/dir/file.json")).unwrap_err();
        assert!(matches!(classify(&err), Some(InterchangeError::Io { .. })));
    }

    #[test]
    fn test_manifest_round_trip_and_camel_case_alias() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = ExportMetadata::new(Dialect::Sqlite, vec!["users.csv".to_string()]);
        write_manifest(dir.path(), &metadata).unwrap();
        assert_eq!(read_manifest(dir.path()).unwrap(), Some(metadata));

        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"exportedAt": "2024-01-01T00:00:00Z", "databaseType": "mysql", "tables": ["a.csv"]}"#,
        )
        .unwrap();
        let parsed = read_manifest(dir.path()).unwrap().unwrap();
        assert_eq!(parsed.database_type, "mysql");
        assert_eq!(parsed.tables, vec!["a.csv"]);
    }
}
