// ABOUTME: SQL dialect lookups for MySQL, PostgreSQL, SQLite and SQL Server
// ABOUTME: Pure per-dialect mappings for quoting, literals, transactions and pagination

use crate::error::InterchangeError;
use anyhow::Result;
use std::fmt;
use std::str::FromStr;

/// SQL variant spoken by a database family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    MySql,
    Postgres,
    Sqlite,
    SqlServer,
}

impl Dialect {
    /// Adapter tag recorded in export metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "pgsql",
            Dialect::Sqlite => "sqlite",
            Dialect::SqlServer => "sqlsrv",
        }
    }

    /// Opening and closing identifier delimiters.
    pub fn identifier_delimiters(&self) -> (char, char) {
        match self {
            Dialect::MySql => ('`', '`'),
            Dialect::Postgres | Dialect::Sqlite => ('"', '"'),
            Dialect::SqlServer => ('[', ']'),
        }
    }

    pub fn boolean_literal(&self, value: bool) -> &'static str {
        match (self, value) {
            (Dialect::Postgres, true) => "TRUE",
            (Dialect::Postgres, false) => "FALSE",
            (_, true) => "1",
            (_, false) => "0",
        }
    }

    pub fn begin_transaction_sql(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "BEGIN TRANSACTION",
            Dialect::Postgres => "BEGIN",
            Dialect::MySql | Dialect::SqlServer => "START TRANSACTION",
        }
    }

    /// Statement that turns foreign-key enforcement on or off for the session.
    pub fn foreign_key_checks_sql(&self, enabled: bool) -> &'static str {
        match (self, enabled) {
            (Dialect::MySql, false) => "SET FOREIGN_KEY_CHECKS = 0",
            (Dialect::MySql, true) => "SET FOREIGN_KEY_CHECKS = 1",
            (Dialect::Postgres, false) => "SET session_replication_role = 'replica'",
            (Dialect::Postgres, true) => "SET session_replication_role = 'origin'",
            (Dialect::Sqlite, false) => "PRAGMA foreign_keys = OFF",
            (Dialect::Sqlite, true) => "PRAGMA foreign_keys = ON",
            (Dialect::SqlServer, false) => {
                "EXEC sp_MSforeachtable 'ALTER TABLE ? NOCHECK CONSTRAINT ALL'"
            }
            (Dialect::SqlServer, true) => {
                "EXEC sp_MSforeachtable 'ALTER TABLE ? WITH CHECK CHECK CONSTRAINT ALL'"
            }
        }
    }

    pub fn savepoint_sql(&self, name: &str) -> String {
        match self {
            Dialect::SqlServer => format!("SAVE TRANSACTION {}", name),
            _ => format!("SAVEPOINT {}", name),
        }
    }

    /// `None` when the dialect has no explicit release (SQL Server).
    pub fn release_savepoint_sql(&self, name: &str) -> Option<String> {
        match self {
            Dialect::SqlServer => None,
            _ => Some(format!("RELEASE SAVEPOINT {}", name)),
        }
    }

    pub fn rollback_to_savepoint_sql(&self, name: &str) -> String {
        match self {
            Dialect::SqlServer => format!("ROLLBACK TRANSACTION {}", name),
            _ => format!("ROLLBACK TO SAVEPOINT {}", name),
        }
    }

    /// Page clause appended after the WHERE clause of a SELECT.
    ///
    /// `order_by` holds already-quoted columns; with none the page order is
    /// whatever the server scans in.
    pub fn pagination_clause(&self, order_by: &[String], limit: u64, offset: u64) -> String {
        let order = order_by.join(", ");
        match self {
            Dialect::SqlServer => format!(
                "ORDER BY {} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
                if order.is_empty() { "(SELECT NULL)" } else { &order },
                offset,
                limit
            ),
            _ if order.is_empty() => format!("LIMIT {} OFFSET {}", limit, offset),
            _ => format!("ORDER BY {} LIMIT {} OFFSET {}", order, limit, offset),
        }
    }

    /// Upper bound on bind parameters in a single statement.
    pub fn max_bind_parameters(&self) -> usize {
        match self {
            Dialect::Sqlite => 999,
            Dialect::SqlServer => 2100,
            Dialect::MySql | Dialect::Postgres => 65535,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "pgsql" | "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "sqlsrv" | "sqlserver" | "mssql" => Ok(Dialect::SqlServer),
            other => Err(InterchangeError::validation(format!(
                "Unknown database dialect '{}'",
                other
            ))
            .into()),
        }
    }
}

/// Rewrite `?` placeholders into PostgreSQL's numbered `$n` form.
///
/// Placeholders inside quoted identifiers or string literals are left alone.
/// `casts` receives the 1-based parameter index and returns a server-side type
/// name when the parameter must be sent as text and cast on the server.
pub fn number_placeholders<F>(sql: &str, mut casts: F) -> String
where
    F: FnMut(usize) -> Option<String>,
{
    let mut out = String::with_capacity(sql.len() + 16);
    let mut quote: Option<char> = None;
    let mut index = 0;

    for ch in sql.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
                out.push(ch);
            }
            None => match ch {
                '\'' | '"' | '`' => {
                    quote = Some(ch);
                    out.push(ch);
                }
                '[' => {
                    quote = Some(']');
                    out.push(ch);
                }
                '?' => {
                    index += 1;
                    match casts(index) {
                        Some(type_name) => {
                            out.push_str(&format!("CAST(${}::text AS {})", index, type_name))
                        }
                        None => out.push_str(&format!("${}", index)),
                    }
                }
                _ => out.push(ch),
            },
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_literals_per_dialect() {
        assert_eq!(Dialect::Postgres.boolean_literal(true), "TRUE");
        assert_eq!(Dialect::Postgres.boolean_literal(false), "FALSE");
        assert_eq!(Dialect::MySql.boolean_literal(true), "1");
        assert_eq!(Dialect::Sqlite.boolean_literal(false), "0");
        assert_eq!(Dialect::SqlServer.boolean_literal(true), "1");
    }

    #[test]
    fn test_transaction_keywords() {
        assert_eq!(Dialect::Sqlite.begin_transaction_sql(), "BEGIN TRANSACTION");
        assert_eq!(Dialect::Postgres.begin_transaction_sql(), "BEGIN");
        assert_eq!(Dialect::MySql.begin_transaction_sql(), "START TRANSACTION");
        assert_eq!(Dialect::SqlServer.begin_transaction_sql(), "START TRANSACTION");
    }

    #[test]
    fn test_parse_adapter_tags() {
        assert_eq!("pgsql".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("mysql".parse::<Dialect>().unwrap(), Dialect::MySql);
        assert_eq!("sqlite".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert_eq!("sqlsrv".parse::<Dialect>().unwrap(), Dialect::SqlServer);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_pagination_clause() {
        assert_eq!(
            Dialect::Sqlite.pagination_clause(&[], 1000, 2000),
            "LIMIT 1000 OFFSET 2000"
        );
        assert_eq!(
            Dialect::MySql.pagination_clause(&["`a`".to_string(), "`b`".to_string()], 10, 20),
            "ORDER BY `a`, `b` LIMIT 10 OFFSET 20"
        );
        assert!(Dialect::SqlServer
            .pagination_clause(&[], 10, 0)
            .starts_with("ORDER BY (SELECT NULL) OFFSET 0 ROWS"));
        assert!(Dialect::SqlServer
            .pagination_clause(&["[id]".to_string()], 10, 0)
            .starts_with("ORDER BY [id] OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"));
    }

    #[test]
    fn test_number_placeholders_skips_quoted_regions() {
        let sql = r#"SELECT * FROM "wh?t" WHERE "a" = ? AND "b" = '?' AND "c" IN (?, ?)"#;
        let numbered = number_placeholders(sql, |_| None);
        assert_eq!(
            numbered,
            r#"SELECT * FROM "wh?t" WHERE "a" = $1 AND "b" = '?' AND "c" IN ($2, $3)"#
        );
    }

    #[test]
    fn test_number_placeholders_applies_casts() {
        let numbered = number_placeholders("INSERT INTO t (a, b) VALUES (?, ?)", |idx| {
            (idx == 2).then(|| "numeric".to_string())
        });
        assert_eq!(
            numbered,
            "INSERT INTO t (a, b) VALUES ($1, CAST($2::text AS numeric))"
        );
    }
}
