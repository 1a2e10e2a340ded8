// ABOUTME: JSON document codec: {"metadata": {...}, "data": {"<table>": {"rows": [...]}}}
// ABOUTME: Streams rows out one at a time and decodes whole documents with shape validation

use super::{tables_from_document, ExportMetadata, ExportSink, TableData, TableHeader};
use crate::adapter::DatabaseAdapter;
use crate::error::InterchangeError;
use crate::export::reader::RowBatch;
use anyhow::{Context, Result};
use std::io::Write;

/// Streams a JSON export document
///
/// The document is written incrementally so only one batch is in memory at
/// a time; the result is still a single valid JSON value.
pub struct JsonSink<W: Write> {
    out: W,
    tables_written: usize,
    rows_in_table: usize,
}

impl<W: Write> JsonSink<W> {
    pub fn new(mut out: W, metadata: &ExportMetadata) -> Result<Self> {
        let metadata = serde_json::to_string_pretty(metadata)?;
        write!(out, "{{\n  \"metadata\": {},\n  \"data\": {{", indent(&metadata, "  "))?;
        Ok(Self {
            out,
            tables_written: 0,
            rows_in_table: 0,
        })
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| if i == 0 { line.to_string() } else { format!("{}{}", prefix, line) })
        .collect::<Vec<_>>()
        .join("\n")
}

impl<W: Write> ExportSink for JsonSink<W> {
    fn begin_table(&mut self, header: &TableHeader<'_>) -> Result<()> {
        if self.tables_written > 0 {
            write!(self.out, ",")?;
        }
        write!(
            self.out,
            "\n    {}: {{\n      \"rows\": [",
            serde_json::to_string(header.name)?
        )?;
        self.rows_in_table = 0;
        Ok(())
    }

    fn write_batch(&mut self, batch: &RowBatch, _adapter: &dyn DatabaseAdapter) -> Result<()> {
        for row in &batch.rows {
            if self.rows_in_table > 0 {
                write!(self.out, ",")?;
            }
            write!(self.out, "\n        ")?;
            serde_json::to_writer(&mut self.out, row)?;
            self.rows_in_table += 1;
        }
        Ok(())
    }

    fn end_table(&mut self) -> Result<()> {
        if self.rows_in_table > 0 {
            write!(self.out, "\n      ]\n    }}")?;
        } else {
            write!(self.out, "]\n    }}")?;
        }
        self.tables_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.tables_written > 0 {
            write!(self.out, "\n  }}\n}}\n")?;
        } else {
            write!(self.out, "}}\n}}\n")?;
        }
        self.out.flush().context("Failed to flush JSON output")
    }
}

/// Decode a JSON export document into its tables, in document order
pub fn decode(text: &str) -> Result<Vec<TableData>> {
    let document: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| InterchangeError::validation(format!("Invalid JSON document: {}", e)))?;
    tables_from_document(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::sqlite::SqliteAdapter;
    use serde_json::json;

    fn export(tables: &[(&str, Vec<serde_json::Value>)]) -> String {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        let metadata = ExportMetadata::new(
            Dialect::Sqlite,
            tables.iter().map(|(t, _)| t.to_string()).collect(),
        );
        let mut sink = JsonSink::new(Vec::new(), &metadata).unwrap();
        for (name, rows) in tables {
            let columns: Vec<String> = rows
                .first()
                .and_then(|r| r.as_object())
                .map(|o| o.keys().cloned().collect())
                .unwrap_or_default();
            sink.begin_table(&TableHeader {
                name,
                columns: &columns,
                drop: false,
                create: None,
            })
            .unwrap();
            // Split into two batches to cover separators between batches
            let rows: Vec<_> = rows.iter().map(|r| r.as_object().cloned().unwrap()).collect();
            for chunk in rows.chunks(2) {
                let batch = RowBatch {
                    table: name.to_string(),
                    columns: columns.clone(),
                    rows: chunk.to_vec(),
                };
                sink.write_batch(&batch, &adapter).unwrap();
            }
            sink.end_table().unwrap();
        }
        sink.finish().unwrap();
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn test_json_output_is_valid_and_preserves_values() {
        let text = export(&[
            (
                "users",
                vec![
                    json!({"id": 1, "name": "NULL"}),
                    json!({"id": 2, "name": null}),
                    json!({"id": 3, "name": ""}),
                    json!({"id": 4, "name": "00123"}),
                ],
            ),
            ("empty", vec![]),
        ]);

        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["metadata"]["database_type"], "sqlite");
        assert_eq!(doc["metadata"]["tables"], json!(["users", "empty"]));
        assert_eq!(doc["data"]["users"]["rows"][0]["name"], json!("NULL"));
        assert_eq!(doc["data"]["users"]["rows"][1]["name"], json!(null));
        assert_eq!(doc["data"]["users"]["rows"][3]["name"], json!("00123"));
        assert_eq!(doc["data"]["empty"]["rows"], json!([]));

        let tables = decode(&text).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].rows.len(), 4);
        assert_eq!(tables[0].rows[2]["name"], json!(""));
    }

    #[test]
    fn test_json_output_with_no_tables() {
        let text = export(&[]);
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["data"], json!({}));
    }

    #[test]
    fn test_decode_invalid_json_is_validation_error() {
        let err = decode("{not json").unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(InterchangeError::Validation(_))
        ));
    }
}
