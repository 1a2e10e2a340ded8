// ABOUTME: CLI entry point for table-interchange
// ABOUTME: Parses commands, merges config-file options with flags and routes to handlers

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use table_interchange::commands;
use table_interchange::config::{load_options_from_file, FileOptions};
use table_interchange::formats::Format;
use table_interchange::import::ConflictMode;

#[derive(Parser)]
#[command(name = "table-interchange")]
#[command(about = "Export and import relational tables as SQL, JSON, YAML or CSV", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export tables from a database to a file (or a CSV directory)
    Export {
        /// Source database URL (sqlite://, postgres://, mysql:// or a .db file)
        #[arg(long)]
        source: String,
        /// Output file, or output directory for CSV
        #[arg(long, short)]
        output: PathBuf,
        /// TOML options file ([export] section)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output format: sql, json, yaml or csv
        #[arg(long)]
        format: Option<Format>,
        /// Export only these tables (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
        /// Skip these tables (comma-separated)
        #[arg(long, value_delimiter = ',')]
        exclude: Option<Vec<String>>,
        /// Row filter for one table, as table=condition (repeatable)
        #[arg(long = "where", value_parser = parse_where)]
        where_clauses: Vec<(String, String)>,
        /// Maximum rows per table
        #[arg(long)]
        limit: Option<u64>,
        /// Rows fetched per page
        #[arg(long)]
        batch_size: Option<u64>,
        /// Gzip the output file
        #[arg(long)]
        compress: bool,
        /// Leave CREATE TABLE statements out of SQL exports
        #[arg(long)]
        no_schema: bool,
        /// Emit DROP TABLE IF EXISTS before each table in SQL exports
        #[arg(long)]
        drop_tables: bool,
        /// Do not wrap SQL exports in BEGIN/COMMIT
        #[arg(long)]
        no_transaction: bool,
        /// Migration bookkeeping table to skip ("" disables)
        #[arg(long)]
        migration_table: Option<String>,
    },
    /// Import an export file (or CSV directory) into a database
    Import {
        /// Target database URL (sqlite://, postgres://, mysql:// or a .db file)
        #[arg(long)]
        target: String,
        /// Input file (optionally .gz) or CSV directory
        #[arg(long, short)]
        input: PathBuf,
        /// TOML options file ([import] section)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Input format; detected from the input when omitted
        #[arg(long)]
        format: Option<Format>,
        /// Import only these tables (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
        /// Skip these tables (comma-separated)
        #[arg(long, value_delimiter = ',')]
        exclude: Option<Vec<String>>,
        /// Existing rows: append, replace or skip
        #[arg(long)]
        conflict_mode: Option<ConflictMode>,
        /// Delete all rows from imported tables first
        #[arg(long)]
        clear_tables: bool,
        /// Do not wrap the import in a transaction
        #[arg(long)]
        no_transaction: bool,
        /// Disable foreign key checks while importing
        #[arg(long)]
        disable_foreign_keys: bool,
        /// Record failing rows and keep going
        #[arg(long)]
        continue_on_error: bool,
        /// Rows per INSERT statement
        #[arg(long, allow_negative_numbers = true)]
        batch_size: Option<i64>,
    },
}

fn parse_where(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((table, clause)) if !table.trim().is_empty() => {
            Ok((table.trim().to_string(), clause.trim().to_string()))
        }
        _ => Err(format!("expected table=condition, got '{}'", raw)),
    }
}

fn load_file_options(config: Option<&PathBuf>) -> Result<FileOptions> {
    match config {
        Some(path) => load_options_from_file(path),
        None => Ok(FileOptions::default()),
    }
}

fn main() -> Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            source,
            output,
            config,
            format,
            tables,
            exclude,
            where_clauses,
            limit,
            batch_size,
            compress,
            no_schema,
            drop_tables,
            no_transaction,
            migration_table,
        } => {
            // Flags override the config file
            let mut options = load_file_options(config.as_ref())?.export;
            if let Some(format) = format {
                options.format = format;
            }
            if tables.is_some() {
                options.tables = tables;
            }
            if let Some(exclude) = exclude {
                options.exclude = exclude;
            }
            let where_clauses: BTreeMap<String, String> = where_clauses.into_iter().collect();
            options.where_clauses.extend(where_clauses);
            if limit.is_some() {
                options.limit = limit;
            }
            if let Some(batch_size) = batch_size {
                options.batch_size = batch_size;
            }
            options.compress |= compress;
            options.include_schema &= !no_schema;
            options.drop_tables |= drop_tables;
            options.use_transaction &= !no_transaction;
            if let Some(table) = migration_table {
                options.migration_table = (!table.trim().is_empty()).then_some(table);
            }

            commands::export(&source, &output, options)
        }
        Commands::Import {
            target,
            input,
            config,
            format,
            tables,
            exclude,
            conflict_mode,
            clear_tables,
            no_transaction,
            disable_foreign_keys,
            continue_on_error,
            batch_size,
        } => {
            let mut options = load_file_options(config.as_ref())?.import;
            if format.is_some() {
                options.format = format;
            }
            if tables.is_some() {
                options.tables = tables;
            }
            if let Some(exclude) = exclude {
                options.exclude = exclude;
            }
            if let Some(mode) = conflict_mode {
                options.conflict_mode = mode;
            }
            options.clear_tables |= clear_tables;
            options.use_transaction &= !no_transaction;
            options.disable_foreign_keys |= disable_foreign_keys;
            options.stop_on_error &= !continue_on_error;
            if let Some(batch_size) = batch_size {
                options.batch_size = batch_size;
            }

            commands::import(&target, &input, options)
        }
    }
}
