// ABOUTME: Conversion between MySQL protocol values and JSON row values
// ABOUTME: Keeps decimals, dates and binary data lossless as strings

use anyhow::{Context, Result};
use base64::Engine;
use mysql_async::consts::ColumnType;
use mysql_async::Value;
use serde_json::Value as JsonValue;

use crate::adapter::Row;

/// Convert a MySQL Value to a JSON scalar
///
/// - Integers → JSON numbers
/// - Floats/Doubles → JSON numbers (non-finite as strings)
/// - Bytes → UTF-8 strings (DECIMAL arrives here too, keeping its precision);
///   non-UTF-8 data is base64 encoded
/// - Dates → `YYYY-MM-DD` for DATE columns, `YYYY-MM-DD HH:MM:SS[.ffffff]` otherwise
/// - Times → `[-]HH:MM:SS[.ffffff]`
/// - NULL → null
///
/// # Examples
///
/// ```
/// # use mysql_async::{consts::ColumnType, Value};
/// # use table_interchange::mysql::converter::mysql_value_to_json;
/// let json = mysql_value_to_json(&Value::Int(42), ColumnType::MYSQL_TYPE_LONG).unwrap();
/// assert_eq!(json, serde_json::json!(42));
/// ```
pub fn mysql_value_to_json(value: &Value, column_type: ColumnType) -> Result<JsonValue> {
    match value {
        Value::NULL => Ok(JsonValue::Null),

        Value::Int(i) => Ok(JsonValue::Number((*i).into())),
        Value::UInt(u) => Ok(JsonValue::Number((*u).into())),

        Value::Float(f) => float_to_json(f64::from(*f)),
        Value::Double(d) => float_to_json(*d),

        Value::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => Ok(JsonValue::String(s.to_string())),
            Err(_) => Ok(JsonValue::String(
                base64::engine::general_purpose::STANDARD.encode(b),
            )),
        },

        Value::Date(year, month, day, hour, minute, second, micro) => {
            if column_type == ColumnType::MYSQL_TYPE_DATE {
                return Ok(JsonValue::String(format!(
                    "{:04}-{:02}-{:02}",
                    year, month, day
                )));
            }
            let mut formatted = format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            );
            if *micro > 0 {
                formatted.push_str(&format!(".{:06}", micro));
            }
            Ok(JsonValue::String(formatted))
        }

        Value::Time(is_negative, days, hours, minutes, seconds, micro) => {
            let sign = if *is_negative { "-" } else { "" };
            let total_hours = u64::from(*days) * 24 + u64::from(*hours);
            let mut formatted = format!("{}{:02}:{:02}:{:02}", sign, total_hours, minutes, seconds);
            if *micro > 0 {
                formatted.push_str(&format!(".{:06}", micro));
            }
            Ok(JsonValue::String(formatted))
        }
    }
}

fn float_to_json(f: f64) -> Result<JsonValue> {
    if f.is_finite() {
        serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .ok_or_else(|| anyhow::anyhow!("Failed to convert float {} to JSON number", f))
    } else {
        Ok(JsonValue::String(f.to_string()))
    }
}

/// Convert a JSON parameter into a MySQL protocol value
pub fn json_to_mysql_value(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::NULL,
        JsonValue::Bool(b) => Value::Int(i64::from(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt(u)
            } else {
                Value::Double(n.as_f64().unwrap_or_default())
            }
        }
        JsonValue::String(s) => Value::Bytes(s.as_bytes().to_vec()),
        JsonValue::Array(_) | JsonValue::Object(_) => Value::Bytes(value.to_string().into_bytes()),
    }
}

/// Convert a MySQL row to a JSON row keyed by column name
pub fn mysql_row_to_json(row: &mysql_async::Row) -> Result<Row> {
    let mut json_row = Row::new();

    for (idx, column) in row.columns_ref().iter().enumerate() {
        let name = column.name_str().to_string();
        let value: Value = row
            .as_ref(idx)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Failed to get column {} at index {}", name, idx))?;

        let json_value = mysql_value_to_json(&value, column.column_type())
            .with_context(|| format!("Failed to convert column '{}' to JSON", name))?;
        json_row.insert(name, json_value);
    }

    Ok(json_row)
}
