// ABOUTME: Conversion between SQLite values and JSON row values
// ABOUTME: Maps rusqlite storage classes to JSON scalars and back for parameter binding

use anyhow::{Context, Result};
use base64::Engine;
use rusqlite::types::Value as SqliteValue;
use serde_json::Value as JsonValue;

use crate::adapter::Row;

/// Convert a single SQLite value to JSON
///
/// Maps SQLite storage classes to JSON types:
/// - INTEGER → number (i64)
/// - REAL → number (f64); NaN and infinities become strings
/// - TEXT → string
/// - BLOB → base64 string
/// - NULL → null
///
/// # Examples
///
/// ```
/// # use table_interchange::sqlite::converter::sqlite_value_to_json;
/// # use rusqlite::types::Value;
/// let json = sqlite_value_to_json(&Value::Integer(42)).unwrap();
/// assert_eq!(json, serde_json::json!(42));
/// ```
pub fn sqlite_value_to_json(value: &SqliteValue) -> Result<JsonValue> {
    match value {
        SqliteValue::Null => Ok(JsonValue::Null),

        SqliteValue::Integer(i) => Ok(JsonValue::Number((*i).into())),

        SqliteValue::Real(f) => {
            if f.is_finite() {
                serde_json::Number::from_f64(*f)
                    .map(JsonValue::Number)
                    .ok_or_else(|| anyhow::anyhow!("Failed to convert float {} to JSON number", f))
            } else {
                Ok(JsonValue::String(f.to_string()))
            }
        }

        SqliteValue::Text(s) => Ok(JsonValue::String(s.clone())),

        SqliteValue::Blob(b) => Ok(JsonValue::String(
            base64::engine::general_purpose::STANDARD.encode(b),
        )),
    }
}

/// Convert a JSON parameter into a value rusqlite can bind
///
/// Booleans bind as 0/1. Arrays and objects bind as their JSON text.
pub fn json_to_sqlite_value(value: &JsonValue) -> SqliteValue {
    match value {
        JsonValue::Null => SqliteValue::Null,
        JsonValue::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqliteValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqliteValue::Real(f)
            } else {
                SqliteValue::Text(n.to_string())
            }
        }
        JsonValue::String(s) => SqliteValue::Text(s.clone()),
        JsonValue::Array(_) | JsonValue::Object(_) => SqliteValue::Text(value.to_string()),
    }
}

/// Convert a rusqlite row into a JSON row keyed by `column_names`
pub fn sqlite_row_to_json(row: &rusqlite::Row<'_>, column_names: &[String]) -> Result<Row> {
    let mut json_row = Row::new();

    for (idx, col_name) in column_names.iter().enumerate() {
        let value: SqliteValue = row
            .get(idx)
            .with_context(|| format!("Failed to read column '{}'", col_name))?;
        let json_value = sqlite_value_to_json(&value)
            .with_context(|| format!("Failed to convert column '{}' to JSON", col_name))?;
        json_row.insert(col_name.clone(), json_value);
    }

    Ok(json_row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_convert_null() {
        assert_eq!(sqlite_value_to_json(&SqliteValue::Null).unwrap(), JsonValue::Null);
    }

    #[test]
    fn test_convert_text_keeps_null_lookalikes() {
        let value = SqliteValue::Text("NULL".to_string());
        assert_eq!(sqlite_value_to_json(&value).unwrap(), json!("NULL"));

        let value = SqliteValue::Text("00123".to_string());
        assert_eq!(sqlite_value_to_json(&value).unwrap(), json!("00123"));
    }

    #[test]
    fn test_convert_real() {
        assert_eq!(
            sqlite_value_to_json(&SqliteValue::Real(2.5)).unwrap(),
            json!(2.5)
        );
        assert_eq!(
            sqlite_value_to_json(&SqliteValue::Real(f64::INFINITY)).unwrap(),
            json!("inf")
        );
    }

    #[test]
    fn test_convert_blob_to_base64() {
        let blob = SqliteValue::Blob(vec![0x48, 0x65, 0x6c, 0x6c, 0x6f]);
        assert_eq!(sqlite_value_to_json(&blob).unwrap(), json!("SGVsbG8="));
    }

    #[test]
    fn test_json_to_sqlite_value() {
        assert_eq!(json_to_sqlite_value(&json!(null)), SqliteValue::Null);
        assert_eq!(json_to_sqlite_value(&json!(true)), SqliteValue::Integer(1));
        assert_eq!(json_to_sqlite_value(&json!(7)), SqliteValue::Integer(7));
        assert_eq!(json_to_sqlite_value(&json!(0.5)), SqliteValue::Real(0.5));
        assert_eq!(
            json_to_sqlite_value(&json!("")),
            SqliteValue::Text(String::new())
        );
        assert_eq!(
            json_to_sqlite_value(&json!({"a": 1})),
            SqliteValue::Text("{\"a\":1}".to_string())
        );
    }
}
