// ABOUTME: CSV codec: one file per table plus an export_metadata.json manifest
// ABOUTME: NULL is written as \N and any backslash run before N gains one backslash to stay distinct

use super::{write_manifest, ExportMetadata, ExportSink, OutputStream, TableHeader, MANIFEST_FILE};
use crate::adapter::{DatabaseAdapter, Row};
use crate::error::InterchangeError;
use crate::export::reader::RowBatch;
use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// Field text for SQL NULL
pub const NULL_MARKER: &str = "\\N";

const TABLE_LINE_PREFIX: &str = "# Table:";

/// Render a value as a CSV field
pub fn encode_field(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => NULL_MARKER.to_string(),
        JsonValue::Bool(true) => "1".to_string(),
        JsonValue::Bool(false) => "0".to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) if is_null_like(s) => format!("\\{}", s),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(_) | JsonValue::Object(_) => value.to_string(),
    }
}

/// Inverse of [`encode_field`]; every non-NULL field comes back as a string
pub fn decode_field(field: &str) -> JsonValue {
    if field == NULL_MARKER {
        return JsonValue::Null;
    }
    match field.strip_prefix('\\') {
        Some(rest) if is_null_like(rest) => JsonValue::String(rest.to_string()),
        _ => JsonValue::String(field.to_string()),
    }
}

/// True for one or more backslashes followed by a single `N`
fn is_null_like(text: &str) -> bool {
    text.strip_suffix('N')
        .is_some_and(|slashes| !slashes.is_empty() && slashes.bytes().all(|b| b == b'\\'))
}

/// File name for a table's CSV file
///
/// Characters that are unsafe in file names are replaced with `_`.
pub fn table_file_name(table: &str) -> String {
    let stem: String = table
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_start_matches('.');
    if stem.is_empty() {
        "table.csv".to_string()
    } else {
        format!("{}.csv", stem)
    }
}

/// Writes one CSV file per table into a directory, then the manifest
pub struct CsvSink {
    dir: PathBuf,
    metadata: ExportMetadata,
    current: Option<::csv::Writer<OutputStream>>,
    columns: Vec<String>,
    files: Vec<String>,
}

impl CsvSink {
    /// `metadata.tables` is replaced by the file names actually written
    pub fn new(dir: &Path, metadata: ExportMetadata) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| InterchangeError::io(dir, e.to_string()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            metadata,
            current: None,
            columns: Vec::new(),
            files: Vec::new(),
        })
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }
}

impl ExportSink for CsvSink {
    fn begin_table(&mut self, header: &TableHeader<'_>) -> Result<()> {
        let mut file_name = table_file_name(header.name);
        if file_name == MANIFEST_FILE || self.files.contains(&file_name) {
            file_name = format!("{}_{}", self.files.len() + 1, file_name);
        }
        let path = self.dir.join(&file_name);

        let mut output = OutputStream::create(&path, false)?;
        writeln!(output, "{} {}", TABLE_LINE_PREFIX, header.name)
            .map_err(|e| InterchangeError::io(&path, e.to_string()))?;

        let mut writer = ::csv::Writer::from_writer(output);
        writer
            .write_record(header.columns)
            .with_context(|| format!("Failed to write CSV header to {}", path.display()))?;

        self.columns = header.columns.to_vec();
        self.current = Some(writer);
        self.files.push(file_name);
        Ok(())
    }

    fn write_batch(&mut self, batch: &RowBatch, _adapter: &dyn DatabaseAdapter) -> Result<()> {
        let writer = self
            .current
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("write_batch called before begin_table"))?;

        for row in &batch.rows {
            let record: Vec<String> = self
                .columns
                .iter()
                .map(|c| encode_field(row.get(c).unwrap_or(&JsonValue::Null)))
                .collect();
            writer.write_record(&record)?;
        }
        Ok(())
    }

    fn end_table(&mut self) -> Result<()> {
        if let Some(writer) = self.current.take() {
            let output = writer
                .into_inner()
                .map_err(|e| anyhow::anyhow!("Failed to flush CSV file: {}", e.error()))?;
            output.finish()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.end_table()?;
        self.metadata.tables = self.files.clone();
        write_manifest(&self.dir, &self.metadata)?;
        Ok(())
    }
}

/// A CSV table file opened for import
pub struct CsvTableReader {
    table: String,
    columns: Vec<String>,
    records: ::csv::Reader<Box<dyn Read>>,
    path: PathBuf,
    line: u64,
}

impl CsvTableReader {
    /// Open `path`, reading the optional `# Table:` line and the header row
    ///
    /// Without a `# Table:` line the table name is the file stem.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| InterchangeError::io(path, e.to_string()))?;
        let mut reader = BufReader::new(file);

        let mut first_line = String::new();
        reader
            .read_line(&mut first_line)
            .map_err(|e| InterchangeError::io(path, e.to_string()))?;

        let first = first_line.trim_start_matches('\u{feff}');
        let (table, source): (String, Box<dyn Read>) = match first.strip_prefix(TABLE_LINE_PREFIX) {
            Some(name) => (name.trim().to_string(), Box::new(reader) as Box<dyn Read>),
            None => {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                // The line already read is the header row
                let replay = std::io::Cursor::new(first.to_string().into_bytes());
                (stem, Box::new(replay.chain(reader)) as Box<dyn Read>)
            }
        };

        if table.is_empty() {
            return Err(InterchangeError::validation(format!(
                "{} does not name a table",
                path.display()
            ))
            .into());
        }

        let mut records = ::csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(false)
            .from_reader(source);

        let mut header = ::csv::StringRecord::new();
        let has_header = records.read_record(&mut header).map_err(|e| {
            InterchangeError::validation(format!("Invalid CSV header in {}: {}", path.display(), e))
        })?;
        if !has_header || header.iter().all(str::is_empty) {
            return Err(InterchangeError::validation(format!(
                "{} has no header row",
                path.display()
            ))
            .into());
        }

        Ok(Self {
            table,
            columns: header.iter().map(String::from).collect(),
            records,
            path: path.to_path_buf(),
            line: 1,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Read the next data row
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        let mut record = ::csv::StringRecord::new();
        let more = self.records.read_record(&mut record).map_err(|e| {
            InterchangeError::validation(format!(
                "Invalid CSV in {} after data row {}: {}",
                self.path.display(),
                self.line - 1,
                e
            ))
        })?;
        if !more {
            return Ok(None);
        }
        self.line += 1;

        if record.len() != self.columns.len() {
            return Err(InterchangeError::validation(format!(
                "{}: data row {} has {} fields, expected {}",
                self.path.display(),
                self.line - 1,
                record.len(),
                self.columns.len()
            ))
            .into());
        }

        Ok(Some(
            self.columns
                .iter()
                .zip(record.iter())
                .map(|(column, field)| (column.clone(), decode_field(field)))
                .collect(),
        ))
    }
}

impl Iterator for CsvTableReader {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

/// Table files to import from a CSV export directory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvSource {
    pub files: Vec<PathBuf>,
    /// Manifest entries that were skipped: missing files or unsafe names
    pub warnings: Vec<String>,
}

/// Resolve the table files of a CSV directory
///
/// With a manifest, its order is used and missing files produce a warning.
/// Entries that are not bare file names are skipped with a warning so a
/// manifest can never point outside `dir`. Without a manifest, every
/// `*.csv` file is used in name order.
pub fn discover(dir: &Path) -> Result<CsvSource> {
    let mut source = CsvSource::default();

    if let Some(manifest) = super::read_manifest(dir)? {
        for entry in manifest.tables {
            if Path::new(&entry).file_name() != Some(entry.as_ref()) {
                let warning = format!(
                    "Entry {:?} in {} is not a file name inside {}; skipped",
                    entry,
                    MANIFEST_FILE,
                    dir.display()
                );
                tracing::warn!("{}", warning);
                source.warnings.push(warning);
                continue;
            }
            let path = dir.join(&entry);
            if path.is_file() {
                source.files.push(path);
            } else {
                let warning = format!("File {} listed in {} not found", entry, MANIFEST_FILE);
                tracing::warn!("{}", warning);
                source.warnings.push(warning);
            }
        }
        return Ok(source);
    }

    let entries = std::fs::read_dir(dir).map_err(|e| InterchangeError::io(dir, e.to_string()))?;
    for entry in entries {
        let path = entry.map_err(|e| InterchangeError::io(dir, e.to_string()))?.path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if path.is_file() && is_csv {
            source.files.push(path);
        }
    }
    source.files.sort();
    Ok(source)
}
