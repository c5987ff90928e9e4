//! Loosely-typed configuration and result payloads.
//!
//! Snapshot configuration and legacy analysis blobs arrive as free-form JSON.
//! `ConfigValue` gives them a closed shape so canonicalization and metric
//! extraction can match on it exhaustively.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Tagged variant over every shape a JSON payload can take.
///
/// Map entries keep their source order; canonicalization is what sorts them.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConfigValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<ConfigValue>),
    Map(Vec<(String, ConfigValue)>),
}

impl ConfigValue {
    /// Parse a JSON document.
    ///
    /// # Errors
    /// Returns the decoder error when `raw` is not valid JSON.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from(value))
    }

    /// Parse a stored JSON blob, keeping undecodable text as a string.
    ///
    /// Blank input maps to `Null`.
    #[must_use]
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::Null,
            Some(trimmed) => Self::parse(trimmed).unwrap_or_else(|_| Self::Text(trimmed.to_owned())),
        }
    }

    /// Build a map from `(key, value)` pairs, preserving their order.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, ConfigValue)>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Bool(_) | Self::Int(_) | Self::Float(_))
    }

    /// Python-style truthiness: empty containers, empty text, zero and false are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Text(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Map(entries) => !entries.is_empty(),
        }
    }

    /// Look up a key in a map value. Later duplicates win, matching JSON decoding.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        match self {
            Self::Map(entries) => entries.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view used when decoding legacy sample arrays.
    ///
    /// Booleans count as 0/1 and numeric text is accepted, everything else is rejected.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "sample values fit f64")]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            Self::Null | Self::List(_) | Self::Map(_) => None,
        }
    }

    /// Render as a metric cell: `(text, is_numeric)`, or `None` for null.
    ///
    /// Booleans become `1`/`0`, containers become compact JSON.
    #[must_use]
    pub fn metric_text(&self) -> Option<(String, bool)> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some((if *b { "1" } else { "0" }.to_owned(), true)),
            Self::Int(i) => Some((i.to_string(), true)),
            Self::Float(f) => Some((format_float(*f), true)),
            Self::Text(s) => Some((s.clone(), false)),
            Self::List(_) | Self::Map(_) => Some((self.to_json(), false)),
        }
    }

    /// Compact JSON rendering in stored entry order.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "null".to_owned())
    }
}

/// Render a float the way JSON encoders do (`1.0`, not `1`).
#[must_use]
pub fn format_float(value: f64) -> String {
    serde_json::to_string(&value).unwrap_or_else(|_| value.to_string())
}

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Null, Self::Float),
            },
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<ConfigValue>> From<Option<T>> for ConfigValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl Serialize for ConfigValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Text(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            },
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            },
        }
    }
}
