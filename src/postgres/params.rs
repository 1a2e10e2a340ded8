// ABOUTME: Binding JSON row values as PostgreSQL statement parameters
// ABOUTME: Encodes scalars for the binary protocol and picks text-plus-cast for everything else

use bytes::BytesMut;
use serde_json::Value as JsonValue;
use std::error::Error;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

type BoxError = Box<dyn Error + Sync + Send>;

/// A JSON value bound to a parameter of whatever type the server inferred.
///
/// Only combinations accepted by [`can_bind_directly`] are encoded natively.
/// For the rest the statement is rewritten as `CAST($n::text AS <type>)` and
/// the value is sent as text, letting the server do the conversion.
#[derive(Debug)]
pub struct PgParam<'a>(pub &'a JsonValue);

/// Whether `value` can be encoded in the binary format of `ty`
pub fn can_bind_directly(ty: &Type, value: &JsonValue) -> bool {
    if value.is_null() || is_text_type(ty) || *ty == Type::JSON || *ty == Type::JSONB {
        return true;
    }

    match *ty {
        Type::BOOL => value.is_boolean(),
        Type::INT2 | Type::INT4 | Type::INT8 => value.is_boolean() || value.is_i64(),
        Type::FLOAT4 | Type::FLOAT8 => value.is_number(),
        _ => false,
    }
}

fn is_text_type(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

/// Text form of a value, as sent for text and cast parameters
pub fn value_as_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_i64(value: &JsonValue) -> Result<i64, BoxError> {
    match value {
        JsonValue::Bool(b) => Ok(i64::from(*b)),
        other => other
            .as_i64()
            .ok_or_else(|| format!("cannot bind {} as an integer", other).into()),
    }
}

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        let value = self.0;
        if value.is_null() {
            return Ok(IsNull::Yes);
        }

        match *ty {
            Type::BOOL => match value {
                JsonValue::Bool(b) => b.to_sql(ty, out),
                other => Err(format!("cannot bind {} as a boolean", other).into()),
            },
            Type::INT2 => i16::try_from(as_i64(value)?)?.to_sql(ty, out),
            Type::INT4 => i32::try_from(as_i64(value)?)?.to_sql(ty, out),
            Type::INT8 => as_i64(value)?.to_sql(ty, out),
            Type::FLOAT4 | Type::FLOAT8 => {
                let f = value
                    .as_f64()
                    .ok_or_else(|| format!("cannot bind {} as a float", value))?;
                if *ty == Type::FLOAT4 {
                    (f as f32).to_sql(ty, out)
                } else {
                    f.to_sql(ty, out)
                }
            }
            Type::JSON | Type::JSONB => value.to_sql(ty, out),
            // Text-like and cast parameters
            _ => value_as_text(value).as_str().to_sql(&Type::TEXT, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
