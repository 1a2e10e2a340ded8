// ABOUTME: Streams a table's rows out of a database in bounded batches
// ABOUTME: Small tables are read in one query; large or limited ones are paged in primary key order

use crate::adapter::{fetch_count, DatabaseAdapter, Row};
use crate::quoting::quote_identifier;
use crate::where_clause::ParsedPredicate;
use anyhow::Result;
use serde_json::Value as JsonValue;

/// Tables with more matching rows than this are paged
pub const STREAMING_THRESHOLD: u64 = 10_000;

/// A non-empty group of rows from one table
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RowBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Pending,
    Paging { offset: u64, fetched: u64 },
    Finished,
}

/// Cursor over one table's rows
///
/// The first call to [`TableStream::next_batch`] counts the matching rows.
/// Up to [`STREAMING_THRESHOLD`] rows with no limit are fetched in a single
/// query. Otherwise rows are fetched in pages of at most `batch_size`, never
/// asking for more than the remaining limit, and paging stops at the first
/// short page. Pages are ordered by the key set with
/// [`TableStream::order_by`] so page boundaries are stable. Batches are never
/// empty.
///
/// The cursor does not hold the adapter, so the caller is free to use the
/// same adapter between batches.
///
/// # Examples
///
/// ```
/// # use table_interchange::adapter::{connect, DatabaseAdapter};
/// # use table_interchange::export::reader::TableStream;
/// let mut db = connect("sqlite::memory:").unwrap();
/// db.execute("CREATE TABLE t (id INTEGER)", &[]).unwrap();
/// db.execute("INSERT INTO t VALUES (1), (2), (3)", &[]).unwrap();
///
/// let mut stream = TableStream::new("t", vec!["id".into()], None, Some(2), 1000);
/// let batch = stream.next_batch(db.as_mut()).unwrap().unwrap();
/// assert_eq!(batch.len(), 2);
/// assert!(stream.next_batch(db.as_mut()).unwrap().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct TableStream {
    table: String,
    columns: Vec<String>,
    predicate: Option<ParsedPredicate>,
    limit: Option<u64>,
    batch_size: u64,
    order_by: Vec<String>,
    row_count: Option<u64>,
    state: State,
}

impl TableStream {
    /// `batch_size` of 0 is treated as 1
    pub fn new(
        table: impl Into<String>,
        columns: Vec<String>,
        predicate: Option<ParsedPredicate>,
        limit: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            table: table.into(),
            columns,
            predicate: predicate.filter(|p| !p.is_empty()),
            limit,
            batch_size: batch_size.max(1),
            order_by: Vec::new(),
            row_count: None,
            state: State::Pending,
        }
    }

    /// Order pages by these columns, normally the primary key
    pub fn order_by(mut self, columns: Vec<String>) -> Self {
        self.order_by = columns;
        self
    }

    /// Look up the table's columns and primary key and build a stream over it
    pub fn open(
        adapter: &mut dyn DatabaseAdapter,
        table: &str,
        predicate: Option<ParsedPredicate>,
        limit: Option<u64>,
        batch_size: u64,
    ) -> Result<Self> {
        let columns = adapter.column_names(table)?;
        let key = adapter.primary_key_columns(table)?;
        Ok(Self::new(table, columns, predicate, limit, batch_size).order_by(key))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows matching the predicate, once the first batch was requested
    pub fn row_count(&self) -> Option<u64> {
        self.row_count
    }

    fn bindings(&self) -> Vec<JsonValue> {
        self.predicate
            .as_ref()
            .map(|p| p.bindings.iter().cloned().map(JsonValue::String).collect())
            .unwrap_or_default()
    }

    fn where_sql(&self) -> String {
        self.predicate
            .as_ref()
            .map(ParsedPredicate::where_sql)
            .unwrap_or_default()
    }

    fn select_sql(&self, adapter: &dyn DatabaseAdapter) -> String {
        let dialect = adapter.dialect();
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| quote_identifier(c, dialect))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "SELECT {} FROM {}{}",
            columns,
            quote_identifier(&self.table, dialect),
            self.where_sql()
        )
    }

    fn count(&mut self, adapter: &mut dyn DatabaseAdapter) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) AS row_count FROM {}{}",
            quote_identifier(&self.table, adapter.dialect()),
            self.where_sql()
        );
        let count = fetch_count(adapter, &sql, &self.bindings())?;
        self.row_count = Some(count);
        Ok(count)
    }

    fn batch(&self, rows: Vec<Row>) -> RowBatch {
        RowBatch {
            table: self.table.clone(),
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Fetch the next batch, or `None` once the table is exhausted
    pub fn next_batch(&mut self, adapter: &mut dyn DatabaseAdapter) -> Result<Option<RowBatch>> {
        if self.state == State::Pending {
            let count = self.count(adapter)?;

            if count == 0 {
                self.state = State::Finished;
                return Ok(None);
            }

            if count <= STREAMING_THRESHOLD && self.limit.is_none() {
                tracing::debug!("Reading {} rows from '{}' in one query", count, self.table);
                let sql = self.select_sql(adapter);
                let rows = adapter.fetch_all(&sql, &self.bindings())?;
                self.state = State::Finished;
                return Ok((!rows.is_empty()).then(|| self.batch(rows)));
            }

            tracing::debug!(
                "Paging {} rows from '{}' (batch size {}, limit {:?})",
                count,
                self.table,
                self.batch_size,
                self.limit
            );
            self.state = State::Paging {
                offset: 0,
                fetched: 0,
            };
        }

        let State::Paging { offset, fetched } = self.state else {
            return Ok(None);
        };

        let page_size = match self.limit {
            Some(limit) => self.batch_size.min(limit.saturating_sub(fetched)),
            None => self.batch_size,
        };
        if page_size == 0 {
            self.state = State::Finished;
            return Ok(None);
        }

        let dialect = adapter.dialect();
        let order_by: Vec<String> = self
            .order_by
            .iter()
            .map(|c| quote_identifier(c, dialect))
            .collect();
        let sql = format!(
            "{} {}",
            self.select_sql(adapter),
            dialect.pagination_clause(&order_by, page_size, offset)
        );
        let rows = adapter.fetch_all(&sql, &self.bindings())?;
        let received = rows.len() as u64;
        let fetched = fetched + received;

        let limit_reached = self.limit.is_some_and(|limit| fetched >= limit);
        self.state = if received < page_size || limit_reached {
            State::Finished
        } else {
            State::Paging {
                offset: offset + received,
                fetched,
            }
        };

        Ok((!rows.is_empty()).then(|| self.batch(rows)))
    }

    /// Iterate over the remaining batches
    pub fn batches(self, adapter: &mut dyn DatabaseAdapter) -> BatchIter<'_> {
        BatchIter {
            stream: self,
            adapter,
        }
    }
}

/// Iterator adapter returned by [`TableStream::batches`]
///
/// Stops after the first error.
pub struct BatchIter<'a> {
    stream: TableStream,
    adapter: &'a mut dyn DatabaseAdapter,
}

impl Iterator for BatchIter<'_> {
    type Item = Result<RowBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.stream.next_batch(self.adapter) {
            Ok(batch) => batch.map(Ok),
            Err(e) => {
                self.stream.state = State::Finished;
                Some(Err(e))
            }
        }
    }
}
