// ABOUTME: SQL script codec: writes INSERT scripts and splits scripts back into statements
// ABOUTME: Literals are rendered through the adapter's native quoting when it has one

use super::{ExportSink, TableHeader};
use crate::adapter::DatabaseAdapter;
use crate::dialect::Dialect;
use crate::export::reader::RowBatch;
use crate::quoting::{format_literal, quote_identifier};
use crate::utils::sanitize_identifier;
use anyhow::{Context, Result};
use std::io::Write;

/// Rows per multi-row INSERT statement
pub const ROWS_PER_INSERT: usize = 100;

/// Writes a SQL script: header comments, optional DROP/CREATE per table,
/// multi-row INSERTs, wrapped in BEGIN/COMMIT when requested.
pub struct SqlSink<W: Write> {
    out: W,
    dialect: Dialect,
    use_transaction: bool,
    table: Option<String>,
}

impl<W: Write> SqlSink<W> {
    pub fn new(
        mut out: W,
        dialect: Dialect,
        exported_at: &str,
        use_transaction: bool,
    ) -> Result<Self> {
        writeln!(out, "-- Table data export")?;
        writeln!(out, "-- Database: {}", dialect)?;
        writeln!(out, "-- Exported at: {}", exported_at)?;
        writeln!(out)?;
        if use_transaction {
            writeln!(out, "{};", dialect.begin_transaction_sql())?;
            writeln!(out)?;
        }

        Ok(Self {
            out,
            dialect,
            use_transaction,
            table: None,
        })
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ExportSink for SqlSink<W> {
    fn begin_table(&mut self, header: &TableHeader<'_>) -> Result<()> {
        let quoted = quote_identifier(header.name, self.dialect);
        writeln!(self.out, "-- Table: {}", sanitize_identifier(header.name))?;

        if header.drop {
            writeln!(self.out, "DROP TABLE IF EXISTS {};", quoted)?;
        }
        match &header.create {
            Some(Ok(ddl)) => writeln!(self.out, "{};", ddl.trim_end().trim_end_matches(';'))?,
            Some(Err(reason)) => writeln!(
                self.out,
                "-- CREATE TABLE for {} could not be generated: {}",
                sanitize_identifier(header.name),
                reason.split_whitespace().collect::<Vec<_>>().join(" ")
            )?,
            None => {}
        }
        writeln!(self.out)?;

        self.table = Some(quoted);
        Ok(())
    }

    fn write_batch(&mut self, batch: &RowBatch, adapter: &dyn DatabaseAdapter) -> Result<()> {
        let table = match &self.table {
            Some(t) => t.clone(),
            None => quote_identifier(&batch.table, self.dialect),
        };
        let columns = batch
            .columns
            .iter()
            .map(|c| quote_identifier(c, self.dialect))
            .collect::<Vec<_>>()
            .join(", ");

        for chunk in batch.rows.chunks(ROWS_PER_INSERT) {
            writeln!(self.out, "INSERT INTO {} ({}) VALUES", table, columns)?;
            for (idx, row) in chunk.iter().enumerate() {
                let values = batch
                    .columns
                    .iter()
                    .map(|c| {
                        let value = row.get(c).unwrap_or(&serde_json::Value::Null);
                        format_literal(value, self.dialect, |s| adapter.quote_string(s))
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let terminator = if idx + 1 == chunk.len() { ";" } else { "," };
                writeln!(self.out, "({}){}", values, terminator)?;
            }
        }
        Ok(())
    }

    fn end_table(&mut self) -> Result<()> {
        self.table = None;
        writeln!(self.out)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.use_transaction {
            writeln!(self.out, "COMMIT;")?;
        }
        self.out.flush().context("Failed to flush SQL output")
    }
}

/// What a statement in a SQL script does, as far as import cares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Insert(String),
    CreateTable(String),
    DropTable(String),
    /// BEGIN / START TRANSACTION / COMMIT / ROLLBACK / END
    Transaction,
    Other,
}

impl StatementKind {
    pub fn table(&self) -> Option<&str> {
        match self {
            StatementKind::Insert(t)
            | StatementKind::CreateTable(t)
            | StatementKind::DropTable(t) => Some(t),
            _ => None,
        }
    }
}

/// Split a script into statements on `;` outside quotes and comments
///
/// Comments are dropped and statements are returned trimmed, without the
/// terminating semicolon. Backslash escapes inside string literals are only
/// honoured for MySQL.
///
/// # Examples
///
/// ```
/// # use table_interchange::dialect::Dialect;
/// # use table_interchange::formats::sql::split_statements;
/// let script = "-- header\nINSERT INTO t VALUES ('a;b');\nDELETE FROM t;";
/// assert_eq!(
///     split_statements(script, Dialect::Sqlite),
///     vec!["INSERT INTO t VALUES ('a;b')", "DELETE FROM t"]
/// );
/// ```
pub fn split_statements(script: &str, dialect: Dialect) -> Vec<String> {
    let chars: Vec<char> = script.chars().collect();
    let backslash_escapes = dialect == Dialect::MySql;
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                current.push(c);
                i += 1;
                while i < chars.len() {
                    let ch = chars[i];
                    current.push(ch);
                    i += 1;
                    if ch == '\\' && backslash_escapes && c == '\'' {
                        if let Some(&next) = chars.get(i) {
                            current.push(next);
                            i += 1;
                        }
                    } else if ch == c {
                        // Doubled delimiter stays inside the literal
                        if chars.get(i) == Some(&c) {
                            current.push(c);
                            i += 1;
                        } else {
                            break;
                        }
                    }
                }
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
                current.push(' ');
            }
            ';' => {
                push_statement(&mut statements, &mut current);
                i += 1;
            }
            _ => {
                current.push(c);
                i += 1;
            }
        }
    }
    push_statement(&mut statements, &mut current);

    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    current.clear();
}

/// Classify a statement produced by [`split_statements`]
pub fn classify_statement(statement: &str) -> StatementKind {
    let words: Vec<String> = statement
        .split_whitespace()
        .take(5)
        .map(|w| w.to_ascii_uppercase())
        .collect();
    let word = |i: usize| words.get(i).map(String::as_str).unwrap_or_default();

    match (word(0), word(1)) {
        ("BEGIN", _) | ("COMMIT", _) | ("ROLLBACK", _) | ("END", _) => {
            return StatementKind::Transaction
        }
        ("START", "TRANSACTION") => return StatementKind::Transaction,
        _ => {}
    }

    let rest = |skip: usize| -> Option<String> {
        let mut remaining = statement.trim_start();
        for _ in 0..skip {
            let end = remaining.find(char::is_whitespace)?;
            remaining = remaining[end..].trim_start();
        }
        table_name(remaining)
    };

    let kind = match (word(0), word(1)) {
        ("INSERT", "INTO") => rest(2).map(StatementKind::Insert),
        ("CREATE", "TABLE") if word(2) == "IF" => rest(5).map(StatementKind::CreateTable),
        ("CREATE", "TABLE") => rest(2).map(StatementKind::CreateTable),
        ("DROP", "TABLE") if word(2) == "IF" => rest(4).map(StatementKind::DropTable),
        ("DROP", "TABLE") => rest(2).map(StatementKind::DropTable),
        _ => None,
    };
    kind.unwrap_or(StatementKind::Other)
}

/// Read a possibly quoted table name from the start of `text`
///
/// A schema qualifier (`schema.table`) is dropped.
fn table_name(text: &str) -> Option<String> {
    let mut name = String::new();
    let mut chars = text.chars().peekable();

    loop {
        let part = match chars.peek().copied()? {
            open @ ('"' | '`' | '[') => {
                let close = if open == '[' { ']' } else { open };
                chars.next();
                let mut part = String::new();
                loop {
                    let c = chars.next()?;
                    if c == close {
                        if chars.peek() == Some(&close) {
                            chars.next();
                            part.push(close);
                        } else {
                            break;
                        }
                    } else {
                        part.push(c);
                    }
                }
                part
            }
            _ => {
                let mut part = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '$' {
                        part.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                part
            }
        };
        name = part;

        if chars.peek() == Some(&'.') {
            chars.next();
        } else {
            break;
        }
    }

    (!name.is_empty()).then_some(name)
}
