// ABOUTME: Import command: connects to the target database and runs the importer
// ABOUTME: Reports per-table progress on a spinner and prints statistics and recorded errors

use crate::adapter::connect;
use crate::import::{ImportOptions, ImportPhase, Importer};
use crate::utils::{sanitize_identifier, strip_password_from_url};
use anyhow::{Context, Result};
use std::path::Path;

/// Import `input` into `target`
///
/// # Arguments
///
/// * `target` - Database URL to write into
/// * `input` - Export file (optionally gzipped) or CSV directory
/// * `options` - Import options, already merged from config file and flags
pub fn import(target: &str, input: &Path, options: ImportOptions) -> Result<()> {
    tracing::info!(
        "Importing {} into {}",
        input.display(),
        strip_password_from_url(target)
    );

    let mut adapter = connect(target)?;
    let spinner = super::spinner("Loading input...");

    let result = Importer::new(adapter.as_mut(), options).and_then(|importer| {
        importer
            .with_progress(|p| {
                let table = sanitize_identifier(p.table);
                let message = match p.phase {
                    ImportPhase::Started => format!("{}: starting", table),
                    ImportPhase::Rows => format!("{}: {} rows", table, p.rows),
                    ImportPhase::Finished => format!("{}: done ({} rows)", table, p.rows),
                    ImportPhase::Skipped => format!("{}: skipped (not empty)", table),
                };
                spinner.set_message(message);
            })
            .import_file(input)
    });

    spinner.finish_and_clear();
    if let Err(e) = adapter.disconnect() {
        tracing::warn!("Failed to close target connection: {:#}", e);
    }
    let stats = result.context("Import failed")?;

    for (table, rows) in &stats.table_results {
        println!("  {:<40} {:>10} rows", sanitize_identifier(table), rows);
    }
    for table in &stats.skipped_tables {
        println!("  skipped {} (already has rows)", sanitize_identifier(table));
    }
    for warning in &stats.warnings {
        println!("  warning: {}", warning);
    }
    for error in &stats.errors {
        println!("  error: {}", error);
    }
    println!(
        "Imported {} rows into {} tables ({} errors)",
        stats.rows_imported,
        stats.tables_imported,
        stats.errors.len()
    );
    Ok(())
}
