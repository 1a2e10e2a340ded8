// ABOUTME: Parses TOML option files for export and import runs
// ABOUTME: Converts the [export], [export.where] and [import] tables into ExportOptions and ImportOptions

use crate::error::InterchangeError;
use crate::export::ExportOptions;
use crate::formats::Format;
use crate::import::{ConflictMode, ImportOptions};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptionsFile {
    #[serde(default)]
    export: ExportSection,
    #[serde(default)]
    import: ImportSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExportSection {
    format: Option<String>,
    tables: Option<Vec<String>>,
    #[serde(default)]
    exclude: Vec<String>,
    limit: Option<u64>,
    batch_size: Option<i64>,
    compress: Option<bool>,
    include_schema: Option<bool>,
    drop_tables: Option<bool>,
    use_transaction: Option<bool>,
    migration_table: Option<String>,
    #[serde(rename = "where", default)]
    where_clauses: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ImportSection {
    format: Option<String>,
    conflict_mode: Option<String>,
    clear_tables: Option<bool>,
    use_transaction: Option<bool>,
    disable_foreign_keys: Option<bool>,
    stop_on_error: Option<bool>,
    batch_size: Option<i64>,
    tables: Option<Vec<String>>,
    #[serde(default)]
    exclude: Vec<String>,
}

/// Options read from a file; sections that are absent keep their defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileOptions {
    pub export: ExportOptions,
    pub import: ImportOptions,
}

pub fn load_options_from_file(path: &Path) -> Result<FileOptions> {
    let raw = fs::read_to_string(path)
        .map_err(|e| InterchangeError::io(path, e.to_string()))
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    parse_options(&raw).with_context(|| format!("Failed to load config file at {}", path.display()))
}

/// Parse the TOML text of an options file
pub fn parse_options(raw: &str) -> Result<FileOptions> {
    let parsed: OptionsFile = toml::from_str(raw)
        .map_err(|e| InterchangeError::validation(format!("Invalid TOML options: {}", e)))?;

    Ok(FileOptions {
        export: export_options(parsed.export)?,
        import: import_options(parsed.import)?,
    })
}

fn export_options(section: ExportSection) -> Result<ExportOptions> {
    let defaults = ExportOptions::default();

    let batch_size = match section.batch_size {
        Some(n) if n <= 0 => {
            return Err(InterchangeError::validation(format!(
                "export.batch_size must be a positive integer, got {}",
                n
            ))
            .into())
        }
        Some(n) => n as u64,
        None => defaults.batch_size,
    };

    // An empty string turns the migration table exclusion off
    let migration_table = match section.migration_table {
        Some(name) if name.trim().is_empty() => None,
        Some(name) => Some(name),
        None => defaults.migration_table,
    };

    Ok(ExportOptions {
        format: section
            .format
            .as_deref()
            .map(str::parse)
            .transpose()?
            .unwrap_or(defaults.format),
        tables: section.tables,
        exclude: section.exclude,
        where_clauses: section.where_clauses,
        limit: section.limit,
        batch_size,
        compress: section.compress.unwrap_or(defaults.compress),
        include_schema: section.include_schema.unwrap_or(defaults.include_schema),
        drop_tables: section.drop_tables.unwrap_or(defaults.drop_tables),
        use_transaction: section.use_transaction.unwrap_or(defaults.use_transaction),
        migration_table,
    })
}

fn import_options(section: ImportSection) -> Result<ImportOptions> {
    let defaults = ImportOptions::default();

    Ok(ImportOptions {
        format: section
            .format
            .as_deref()
            .map(str::parse::<Format>)
            .transpose()?,
        tables: section.tables,
        exclude: section.exclude,
        conflict_mode: section
            .conflict_mode
            .as_deref()
            .map(str::parse::<ConflictMode>)
            .transpose()?
            .unwrap_or(defaults.conflict_mode),
        clear_tables: section.clear_tables.unwrap_or(defaults.clear_tables),
        use_transaction: section.use_transaction.unwrap_or(defaults.use_transaction),
        disable_foreign_keys: section
            .disable_foreign_keys
            .unwrap_or(defaults.disable_foreign_keys),
        stop_on_error: section.stop_on_error.unwrap_or(defaults.stop_on_error),
        // Range is checked by the importer
        batch_size: section.batch_size.unwrap_or(defaults.batch_size),
    })
}
