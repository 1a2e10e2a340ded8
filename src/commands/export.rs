// ABOUTME: Export command: connects to the source database and runs the exporter
// ABOUTME: Reports per-table progress on a spinner and prints a summary when done

use crate::adapter::connect;
use crate::export::{ExportOptions, Exporter};
use crate::utils::{sanitize_identifier, strip_password_from_url};
use anyhow::{Context, Result};
use std::path::Path;

/// Export tables from `source` to `output`
///
/// # Arguments
///
/// * `source` - Database URL (`sqlite://`, `postgres://`, `mysql://` or a SQLite file path)
/// * `output` - Destination file, or directory for CSV
/// * `options` - Export options, already merged from config file and flags
pub fn export(source: &str, output: &Path, options: ExportOptions) -> Result<()> {
    tracing::info!(
        "Exporting from {} to {} as {}",
        strip_password_from_url(source),
        output.display(),
        options.format
    );

    let mut adapter = connect(source)?;
    let spinner = super::spinner("Reading tables...");

    let result = Exporter::new(adapter.as_mut(), options).and_then(|exporter| {
        exporter
            .with_progress(|p| {
                spinner.set_message(format!(
                    "[{}/{}] {}: {} rows",
                    p.table_index + 1,
                    p.table_count,
                    sanitize_identifier(p.table),
                    p.rows
                ))
            })
            .export_to(output)
    });

    spinner.finish_and_clear();
    if let Err(e) = adapter.disconnect() {
        tracing::warn!("Failed to close source connection: {:#}", e);
    }
    let summary = result.context("Export failed")?;

    for table in &summary.tables {
        println!("  {:<40} {:>10} rows", sanitize_identifier(&table.table), table.rows);
    }
    println!(
        "Exported {} rows from {} tables to {}",
        summary.total_rows,
        summary.tables.len(),
        summary
            .output
            .as_deref()
            .unwrap_or(output)
            .display()
    );
    Ok(())
}
