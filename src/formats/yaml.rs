// ABOUTME: YAML document codec with the same metadata/data shape as the JSON codec
// ABOUTME: Rows are serialised one at a time with serde_yaml and indented into a block list

use super::{tables_from_document, ExportMetadata, ExportSink, TableData, TableHeader};
use crate::adapter::DatabaseAdapter;
use crate::error::InterchangeError;
use crate::export::reader::RowBatch;
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct MetadataBlock<'a> {
    metadata: &'a ExportMetadata,
}

/// Streams a YAML export document
pub struct YamlSink<W: Write> {
    out: W,
    tables_written: usize,
    rows_in_table: usize,
}

impl<W: Write> YamlSink<W> {
    pub fn new(mut out: W, metadata: &ExportMetadata) -> Result<Self> {
        let block = serde_yaml::to_string(&MetadataBlock { metadata })?;
        out.write_all(block.as_bytes())?;
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

/// Render a scalar key the way serde_yaml would, quoted when ambiguous
fn yaml_key(name: &str) -> Result<String> {
    Ok(serde_yaml::to_string(name)?.trim_end().to_string())
}

impl<W: Write> ExportSink for YamlSink<W> {
    fn begin_table(&mut self, header: &TableHeader<'_>) -> Result<()> {
        if self.tables_written == 0 {
            writeln!(self.out, "data:")?;
        }
        write!(self.out, "  {}:\n    rows:", yaml_key(header.name)?)?;
        self.rows_in_table = 0;
        Ok(())
    }

    fn write_batch(&mut self, batch: &RowBatch, _adapter: &dyn DatabaseAdapter) -> Result<()> {
        for row in &batch.rows {
            if self.rows_in_table == 0 {
                writeln!(self.out)?;
            }
            let rendered = serde_yaml::to_string(row)?;
            for (i, line) in rendered.lines().enumerate() {
                let prefix = if i == 0 { "    - " } else { "      " };
                writeln!(self.out, "{}{}", prefix, line)?;
            }
            self.rows_in_table += 1;
        }
        Ok(())
    }

    fn end_table(&mut self) -> Result<()> {
        if self.rows_in_table == 0 {
            writeln!(self.out, " []")?;
        }
        self.tables_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.tables_written == 0 {
            writeln!(self.out, "data: {{}}")?;
        }
        self.out.flush().context("Failed to flush YAML output")
    }
}

/// Decode a YAML export document into its tables, in document order
pub fn decode(text: &str) -> Result<Vec<TableData>> {
    let document: serde_json::Value = serde_yaml::from_str(text)
        .map_err(|e| InterchangeError::validation(format!("Invalid YAML document: {}", e)))?;
    tables_from_document(document)
}
