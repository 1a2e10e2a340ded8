// ABOUTME: PostgreSQL adapter built on tokio-postgres
// ABOUTME: Drives the async client on a private runtime behind the blocking DatabaseAdapter trait

pub mod connection;
pub mod params;

use crate::adapter::{fetch_count, DatabaseAdapter, Row};
use crate::dialect::{number_placeholders, Dialect};
use crate::quoting::quote_identifier;
use crate::utils::abbreviate_sql;
use anyhow::{bail, Context, Result};
use params::{can_bind_directly, PgParam};
use serde_json::Value as JsonValue;
use tokio::runtime::Runtime;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Statement};

/// [`DatabaseAdapter`] over a tokio-postgres client
///
/// Owns a current-thread runtime; every call blocks on it, which also drives
/// the spawned connection task.
pub struct PostgresAdapter {
    runtime: Runtime,
    client: Client,
    in_transaction: bool,
}

impl PostgresAdapter {
    pub fn connect(url: &str) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start runtime for PostgreSQL connection")?;
        let client = runtime.block_on(connection::connect(url))?;

        tracing::info!("Connected to PostgreSQL");

        Ok(Self {
            runtime,
            client,
            in_transaction: false,
        })
    }

    /// Prepare `sql`, numbering `?` placeholders and adding casts where a
    /// parameter cannot be encoded for the type the server inferred.
    fn prepare(&self, sql: &str, params: &[JsonValue]) -> Result<Statement> {
        let numbered = number_placeholders(sql, |_| None);
        let statement = self
            .runtime
            .block_on(self.client.prepare(&numbered))
            .with_context(|| format!("Failed to prepare: {}", abbreviate_sql(sql)))?;

        if statement.params().len() != params.len() {
            bail!(
                "Statement expects {} parameter(s) but {} were supplied",
                statement.params().len(),
                params.len()
            );
        }

        let casts: Vec<Option<String>> = statement
            .params()
            .iter()
            .zip(params)
            .map(|(ty, value)| (!can_bind_directly(ty, value)).then(|| ty.name().to_string()))
            .collect();

        if casts.iter().all(Option::is_none) {
            return Ok(statement);
        }

        let cast_sql = number_placeholders(sql, |idx| casts.get(idx - 1).cloned().flatten());
        tracing::debug!("Re-preparing with text casts: {}", abbreviate_sql(&cast_sql));

        self.runtime
            .block_on(self.client.prepare(&cast_sql))
            .with_context(|| format!("Failed to prepare: {}", abbreviate_sql(&cast_sql)))
    }

    /// Rewrite `sql` so NUMERIC columns come back as text
    ///
    /// `row_to_json` renders NUMERIC as a JSON number, which would be parsed
    /// through f64. Returned unchanged when the result has no NUMERIC column.
    fn numeric_as_text(&self, sql: &str) -> Result<String> {
        let numbered = number_placeholders(sql, |_| None);
        let statement = self
            .runtime
            .block_on(self.client.prepare(&numbered))
            .with_context(|| format!("Failed to prepare: {}", abbreviate_sql(sql)))?;

        let columns = statement.columns();
        if !columns.iter().any(|c| *c.type_() == Type::NUMERIC) {
            return Ok(sql.to_string());
        }

        let select: Vec<String> = columns
            .iter()
            .map(|c| {
                let name = quote_identifier(c.name(), Dialect::Postgres);
                if *c.type_() == Type::NUMERIC {
                    format!("n.{}::text AS {}", name, name)
                } else {
                    format!("n.{}", name)
                }
            })
            .collect();
        Ok(format!("SELECT {} FROM ({}) n", select.join(", "), sql))
    }

    fn simple(&mut self, sql: &str) -> Result<()> {
        self.runtime
            .block_on(self.client.batch_execute(sql))
            .with_context(|| format!("Failed to execute: {}", sql))
    }
}

fn bind(params: &[JsonValue]) -> Vec<PgParam<'_>> {
    params.iter().map(PgParam).collect()
}

fn as_sql_refs<'a>(bound: &'a [PgParam<'a>]) -> Vec<&'a (dyn ToSql + Sync)> {
    bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

impl DatabaseAdapter for PostgresAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn execute(&mut self, sql: &str, params: &[JsonValue]) -> Result<u64> {
        let statement = self.prepare(sql, params)?;
        let bound = bind(params);
        self.runtime
            .block_on(self.client.execute(&statement, &as_sql_refs(&bound)))
            .with_context(|| format!("Failed to execute: {}", abbreviate_sql(sql)))
    }

    fn fetch_all(&mut self, sql: &str, params: &[JsonValue]) -> Result<Vec<Row>> {
        // Let the server serialise each row so column types need no mapping here
        let wrapped = format!(
            "SELECT row_to_json(q)::text FROM ({}) q",
            self.numeric_as_text(sql)?
        );
        let statement = self.prepare(&wrapped, params)?;
        let bound = bind(params);

        let rows = self
            .runtime
            .block_on(self.client.query(&statement, &as_sql_refs(&bound)))
            .with_context(|| format!("Failed to run query: {}", abbreviate_sql(sql)))?;

        rows.iter()
            .map(|row| {
                let text: String = row.try_get(0).context("Failed to read row JSON")?;
                match serde_json::from_str(&text).context("Server returned invalid row JSON")? {
                    JsonValue::Object(map) => Ok(map),
                    other => bail!("Expected a JSON object per row, got {}", other),
                }
            })
            .collect()
    }

    fn list_tables(&mut self) -> Result<Vec<String>> {
        let rows = self.fetch_all(
            "SELECT table_name::text AS name FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
            &[],
        )?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get("name").and_then(|v| v.as_str()).map(String::from))
            .collect())
    }

    fn has_table(&mut self, table: &str) -> Result<bool> {
        let count = fetch_count(
            self,
            "SELECT COUNT(*) AS n FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name::text = ?",
            &[JsonValue::String(table.to_string())],
        )?;
        Ok(count > 0)
    }

    fn column_names(&mut self, table: &str) -> Result<Vec<String>> {
        let rows = self.fetch_all(
            "SELECT column_name::text AS name FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name::text = ? \
             ORDER BY ordinal_position",
            &[JsonValue::String(table.to_string())],
        )?;
        let columns: Vec<String> = rows
            .into_iter()
            .filter_map(|row| row.get("name").and_then(|v| v.as_str()).map(String::from))
            .collect();
        if columns.is_empty() {
            bail!("Table '{}' does not exist or has no columns", table);
        }
        Ok(columns)
    }

    fn primary_key_columns(&mut self, table: &str) -> Result<Vec<String>> {
        let rows = self.fetch_all(
            "SELECT a.attname::text AS name \
             FROM pg_index i \
             JOIN LATERAL unnest(i.indkey) WITH ORDINALITY AS k(attnum, position) ON true \
             JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = k.attnum \
             WHERE i.indrelid = to_regclass(?) AND i.indisprimary \
             ORDER BY k.position",
            &[JsonValue::String(quote_identifier(table, Dialect::Postgres))],
        )?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get("name").and_then(|v| v.as_str()).map(String::from))
            .collect())
    }

    fn table_ddl(&mut self, table: &str) -> Result<String> {
        let regclass = JsonValue::String(quote_identifier(table, Dialect::Postgres));

        let columns = self.fetch_all(
            "SELECT a.attname::text AS name, format_type(a.atttypid, a.atttypmod) AS type, \
                    a.attnotnull AS not_null, pg_get_expr(d.adbin, d.adrelid) AS default_expr \
             FROM pg_attribute a \
             LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
             WHERE a.attrelid = to_regclass(?) AND a.attnum > 0 AND NOT a.attisdropped \
             ORDER BY a.attnum",
            std::slice::from_ref(&regclass),
        )?;
        if columns.is_empty() {
            bail!("Table '{}' not found", table);
        }

        let mut definitions = Vec::with_capacity(columns.len() + 1);
        for column in &columns {
            let name = column.get("name").and_then(|v| v.as_str()).unwrap_or_default();
            let ty = column.get("type").and_then(|v| v.as_str()).unwrap_or("text");
            let mut definition = format!("{} {}", quote_identifier(name, Dialect::Postgres), ty);
            if column.get("not_null").and_then(|v| v.as_bool()) == Some(true) {
                definition.push_str(" NOT NULL");
            }
            if let Some(default) = column.get("default_expr").and_then(|v| v.as_str()) {
                definition.push_str(" DEFAULT ");
                definition.push_str(default);
            }
            definitions.push(definition);
        }

        let primary_key = self.fetch_row(
            "SELECT pg_get_constraintdef(c.oid) AS def FROM pg_constraint c \
             WHERE c.conrelid = to_regclass(?) AND c.contype = 'p'",
            std::slice::from_ref(&regclass),
        )?;
        if let Some(def) = primary_key
            .as_ref()
            .and_then(|row| row.get("def"))
            .and_then(|v| v.as_str())
        {
            definitions.push(def.to_string());
        }

        Ok(format!(
            "CREATE TABLE {} (\n  {}\n)",
            quote_identifier(table, Dialect::Postgres),
            definitions.join(",\n  ")
        ))
    }

    fn begin_transaction(&mut self) -> Result<()> {
        self.simple(Dialect::Postgres.begin_transaction_sql())?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<()> {
        self.in_transaction = false;
        self.simple("COMMIT")
    }

    fn rollback_transaction(&mut self) -> Result<()> {
        self.in_transaction = false;
        self.simple("ROLLBACK")
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn disconnect(&mut self) -> Result<()> {
        if self.in_transaction {
            self.rollback_transaction()?;
        }
        Ok(())
    }
}
