// ABOUTME: Table selection and row-limit rules shared by export and import
// ABOUTME: Handles include/exclude lists, per-table WHERE filters and the migration table

use crate::dialect::Dialect;
use crate::error::InterchangeError;
use crate::where_clause::{self, ParsedPredicate};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};

/// Rows per page when no batch size is configured.
pub const DEFAULT_BATCH_SIZE: u64 = 1000;

/// Migration bookkeeping table skipped unless it is named explicitly.
pub const DEFAULT_MIGRATION_TABLE: &str = "schema_migrations";

/// Which tables take part in an export or import, and how rows are read.
///
/// An explicit `tables` list wins over everything else: a table named there is
/// processed even if it also appears in `exclude` or is the migration table.
/// `limit` caps the total rows read per table across all pages.
#[derive(Debug, Clone)]
pub struct TableFilter {
    tables: Option<BTreeSet<String>>,
    exclude: BTreeSet<String>,
    where_clauses: BTreeMap<String, String>,
    limit: Option<u64>,
    batch_size: u64,
    migration_table: Option<String>,
}

impl Default for TableFilter {
    fn default() -> Self {
        Self {
            tables: None,
            exclude: BTreeSet::new(),
            where_clauses: BTreeMap::new(),
            limit: None,
            batch_size: DEFAULT_BATCH_SIZE,
            migration_table: Some(DEFAULT_MIGRATION_TABLE.to_string()),
        }
    }
}

impl TableFilter {
    /// Creates a filter from include/exclude lists.
    ///
    /// An empty include list is treated the same as no include list.
    pub fn new(tables: Option<Vec<String>>, exclude: Vec<String>) -> Result<Self> {
        for name in tables.iter().flatten().chain(exclude.iter()) {
            if name.trim().is_empty() {
                return Err(
                    InterchangeError::validation("Table names in filters cannot be empty").into(),
                );
            }
        }

        Ok(Self {
            tables: tables
                .filter(|t| !t.is_empty())
                .map(|t| t.into_iter().collect()),
            exclude: exclude.into_iter().collect(),
            ..Self::default()
        })
    }

    /// Creates an empty filter (every table except the migration table)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_where_clauses(mut self, where_clauses: BTreeMap<String, String>) -> Self {
        self.where_clauses = where_clauses;
        self
    }

    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the page size. Zero is rejected.
    pub fn with_batch_size(mut self, batch_size: u64) -> Result<Self> {
        if batch_size == 0 {
            return Err(InterchangeError::validation("batch_size must be greater than 0").into());
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    /// Overrides the migration table name; `None` disables the implicit exclusion.
    pub fn with_migration_table(mut self, migration_table: Option<String>) -> Self {
        self.migration_table = migration_table;
        self
    }

    /// Checks if any table selection rules are active
    pub fn is_empty(&self) -> bool {
        self.tables.is_none() && self.exclude.is_empty()
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn include_tables(&self) -> Option<&BTreeSet<String>> {
        self.tables.as_ref()
    }

    pub fn exclude_tables(&self) -> &BTreeSet<String> {
        &self.exclude
    }

    pub fn where_clause(&self, table: &str) -> Option<&str> {
        self.where_clauses.get(table).map(String::as_str)
    }

    /// Determines if a table should be processed
    pub fn should_include_table(&self, table: &str) -> bool {
        if let Some(ref include) = self.tables {
            return include.contains(table);
        }

        if self.exclude.contains(table) {
            return false;
        }

        self.migration_table.as_deref() != Some(table)
    }

    /// Applies the rules to the tables that exist, keeping their order.
    ///
    /// Explicitly included tables that do not exist are logged and dropped.
    pub fn resolve_tables(&self, available: &[String]) -> Vec<String> {
        if let Some(ref include) = self.tables {
            for name in include {
                if !available.iter().any(|t| t == name) {
                    tracing::warn!(
                        "Table '{}' was requested but does not exist",
                        crate::utils::sanitize_identifier(name)
                    );
                }
            }
        }

        available
            .iter()
            .filter(|t| self.should_include_table(t))
            .cloned()
            .collect()
    }

    /// Validates and parses every configured WHERE clause.
    ///
    /// Runs before any query is issued, so a rejected clause never reaches
    /// the database. Returns parsed predicates keyed by table; empty clauses
    /// are omitted.
    pub fn parse_where_clauses(
        &self,
        dialect: Dialect,
    ) -> Result<BTreeMap<String, ParsedPredicate>> {
        let mut parsed = BTreeMap::new();
        for (table, clause) in &self.where_clauses {
            if let Some(predicate) = where_clause::parse_for_table(table, clause, dialect)? {
                parsed.insert(table.clone(), predicate);
            }
        }
        Ok(parsed)
    }
}
