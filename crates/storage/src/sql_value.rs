//! Lenient readers for legacy columns.
//!
//! Legacy rows were written by several application versions, so a "text"
//! column can hold integers, reals or blobs. These helpers read whatever is
//! there instead of failing the whole query.

use nanosense_core::ConfigValue;
use rusqlite::Row;
use rusqlite::types::{Value, ValueRef};

/// Read a column as text, rendering numbers and decoding blobs lossily.
pub fn text_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
    })
}

/// Read a text or blob column as raw bytes.
pub fn bytes_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Vec<u8>>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => Some(bytes.to_vec()),
        _ => None,
    })
}

/// Read an integer column, accepting numeric text.
#[allow(clippy::cast_possible_truncation, reason = "integral reals only")]
pub fn int_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<i64>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(i) => Some(i),
        ValueRef::Real(f) if f.fract() == 0.0 => Some(f as i64),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok().and_then(|s| s.trim().parse().ok()),
        _ => None,
    })
}

/// Convert a raw SQL value into a [`ConfigValue`].
#[must_use]
pub fn to_config_value(value: ValueRef<'_>) -> ConfigValue {
    match value {
        ValueRef::Null => ConfigValue::Null,
        ValueRef::Integer(i) => ConfigValue::Int(i),
        ValueRef::Real(f) => ConfigValue::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            ConfigValue::Text(String::from_utf8_lossy(bytes).into_owned())
        },
    }
}

/// Read a column as a [`ConfigValue`].
pub fn value_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<ConfigValue> {
    Ok(to_config_value(row.get_ref(idx)?))
}

/// Bind parameter for a scalar snapshot field; containers bind as JSON text.
#[must_use]
pub fn scalar_param(value: Option<&ConfigValue>) -> Value {
    match value {
        None | Some(ConfigValue::Null) => Value::Null,
        Some(ConfigValue::Bool(b)) => Value::Integer(i64::from(*b)),
        Some(ConfigValue::Int(i)) => Value::Integer(*i),
        Some(ConfigValue::Float(f)) => Value::Real(*f),
        Some(ConfigValue::Text(s)) => Value::Text(s.clone()),
        Some(other) => Value::Text(other.to_json()),
    }
}

/// Drop a row that failed to decode, logging why.
pub(crate) fn log_row_error<T>(result: rusqlite::Result<T>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("Row read error: {}", e);
            None
        },
    }
}

/// Escape `\`, `%` and `_` for a `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn escape_like_pattern(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Coerce a reference to `ToSql` trait object (avoids trivial cast lint)
pub(crate) fn coerce_to_sql<T: rusqlite::ToSql>(val: &T) -> &dyn rusqlite::ToSql {
    val
}
