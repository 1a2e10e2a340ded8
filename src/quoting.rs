// ABOUTME: Identifier quoting and literal rendering for generated SQL
// ABOUTME: Keeps untrusted table/column names and values from terminating their tokens

use crate::dialect::Dialect;
use serde_json::Value as JsonValue;

/// Quote an identifier for the given dialect.
///
/// Wraps the name in the dialect's delimiters and doubles every embedded
/// closing delimiter, so a name like ``users`; DROP TABLE x; --`` stays a single
/// identifier. This cannot fail; every table or column name that came from
/// outside the database (imported keys, CLI options) goes through here.
///
/// # Examples
///
/// ```
/// # use table_interchange::dialect::Dialect;
/// # use table_interchange::quoting::quote_identifier;
/// assert_eq!(quote_identifier("users", Dialect::MySql), "`users`");
/// assert_eq!(quote_identifier("we\"ird", Dialect::Postgres), "\"we\"\"ird\"");
/// assert_eq!(quote_identifier("a]b", Dialect::SqlServer), "[a]]b]");
/// ```
pub fn quote_identifier(identifier: &str, dialect: Dialect) -> String {
    let (open, close) = dialect.identifier_delimiters();
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push(open);
    for ch in identifier.chars() {
        if ch == close {
            quoted.push(close);
        }
        quoted.push(ch);
    }
    quoted.push(close);
    quoted
}

/// Quote a dotted name (`schema.table`, `table.column`) part by part.
pub fn quote_qualified_identifier(parts: &[&str], dialect: Dialect) -> String {
    parts
        .iter()
        .map(|part| quote_identifier(part, dialect))
        .collect::<Vec<_>>()
        .join(".")
}

/// True for digit-only strings with a leading zero, such as `"007"`.
///
/// These look numeric but must stay strings, otherwise the zeros are lost.
/// `"0"` alone and anything with a decimal point are not leading-zero strings.
pub fn has_leading_zeros(value: &str) -> bool {
    value.len() > 1 && value.starts_with('0') && value.bytes().all(|b| b.is_ascii_digit())
}

/// True when the string is a plain decimal number (`42`, `-1.5`, `.5`, `1e10`).
pub fn is_numeric_string(value: &str) -> bool {
    let bytes = value.as_bytes();
    let mut pos = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        pos += 1;
    }

    let mut mantissa_digits = 0;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
        mantissa_digits += 1;
    }
    if pos < bytes.len() && bytes[pos] == b'.' {
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
            mantissa_digits += 1;
        }
    }
    if mantissa_digits == 0 {
        return false;
    }

    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        pos += 1;
        if matches!(bytes.get(pos), Some(b'+') | Some(b'-')) {
            pos += 1;
        }
        let exponent_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        if pos == exponent_start {
            return false;
        }
    }

    pos == bytes.len()
}

/// Manually escape and quote a string literal.
///
/// Used only when the adapter has no native quoting primitive. Single quotes
/// are doubled everywhere; MySQL also treats backslash as an escape character,
/// so backslashes and NUL bytes are escaped there too.
pub fn escape_string_literal(value: &str, dialect: Dialect) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => escaped.push_str("''"),
            '\\' if dialect == Dialect::MySql => escaped.push_str("\\\\"),
            '\0' if dialect == Dialect::MySql => escaped.push_str("\\0"),
            _ => escaped.push(ch),
        }
    }
    escaped.push('\'');
    escaped
}

/// Render a row value as a SQL literal.
///
/// - `null` becomes the bare keyword `NULL`; the string `"NULL"` becomes the
///   quoted literal `'NULL'`.
/// - Booleans follow the dialect (`1`/`0`, or `TRUE`/`FALSE` for PostgreSQL).
/// - Numeric-looking strings are emitted unquoted unless they carry leading
///   zeros, which are quoted to keep them intact. Other spellings are not
///   preserved: `"1.50"`, `"1e5"` or `"-007"` read back from a TEXT column
///   as the server's rendering of the number (`1.5`, `100000.0`, `-7`).
/// - `native_quote` is the adapter's own quoting primitive; when it returns
///   `None` the manual escaping in [`escape_string_literal`] is used.
pub fn format_literal<F>(value: &JsonValue, dialect: Dialect, native_quote: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let quote = |s: &str| native_quote(s).unwrap_or_else(|| escape_string_literal(s, dialect));

    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => dialect.boolean_literal(*b).to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => {
            if is_numeric_string(s) && !has_leading_zeros(s) {
                s.clone()
            } else {
                quote(s)
            }
        }
        JsonValue::Array(_) | JsonValue::Object(_) => quote(&value.to_string()),
    }
}
