//! Canonical form and fingerprint of instrument and processing snapshots.
//!
//! Two configurations that differ only in key order or in absent/null keys
//! canonicalize to the same structure, serialize to the same bytes and
//! therefore share one fingerprint.

use std::collections::BTreeMap;
use std::io;

use serde::Serialize;
use serde_json::ser::Formatter;
use sha2::{Digest, Sha256};

use crate::value::ConfigValue;

/// Top-level canonical snapshot: keys are always sorted.
pub type CanonicalMap = BTreeMap<String, Canonical>;

/// Normalized value tree. Maps are sorted and carry no null entries;
/// list elements keep their order and may be null.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Canonical {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Canonical>),
    Map(CanonicalMap),
}

/// Fields lifted to the top level of an instrument snapshot.
pub const INSTRUMENT_FIELDS: [&str; 4] =
    ["device_serial", "integration_time_ms", "averaging", "temperature"];

/// Recursively normalize a value.
///
/// Null map entries are dropped, map keys are sorted, lists recurse element-wise.
#[must_use]
pub fn normalize(value: &ConfigValue) -> Canonical {
    match value {
        ConfigValue::Null => Canonical::Null,
        ConfigValue::Bool(b) => Canonical::Bool(*b),
        ConfigValue::Int(i) => Canonical::Int(*i),
        ConfigValue::Float(f) => Canonical::Float(*f),
        ConfigValue::Text(s) => Canonical::Text(s.clone()),
        ConfigValue::List(items) => Canonical::List(items.iter().map(normalize).collect()),
        ConfigValue::Map(entries) => Canonical::Map(normalize_entries(entries)),
    }
}

fn normalize_entries(entries: &[(String, ConfigValue)]) -> CanonicalMap {
    let mut out = CanonicalMap::new();
    for (key, value) in entries {
        if value.is_null() {
            // a later null still hides an earlier value under the same key
            out.remove(key);
            continue;
        }
        out.insert(key.clone(), normalize(value));
    }
    out
}

/// Canonicalize an arbitrary map payload. Non-map payloads yield an empty map.
#[must_use]
pub fn canonicalize(payload: &ConfigValue) -> CanonicalMap {
    match payload {
        ConfigValue::Map(entries) => normalize_entries(entries),
        _ => CanonicalMap::new(),
    }
}

/// Canonical form of an instrument snapshot.
///
/// Keeps the four scalar instrument fields when non-null and adds the
/// normalized `config` only when it is non-empty.
#[must_use]
pub fn canonicalize_instrument(
    device_serial: &ConfigValue,
    integration_time_ms: &ConfigValue,
    averaging: &ConfigValue,
    temperature: &ConfigValue,
    config: &ConfigValue,
) -> CanonicalMap {
    let mut out = CanonicalMap::new();
    for (key, value) in [
        ("device_serial", device_serial),
        ("integration_time_ms", integration_time_ms),
        ("averaging", averaging),
        ("temperature", temperature),
    ] {
        if !value.is_null() {
            out.insert(key.to_owned(), normalize(value));
        }
    }
    if config.is_truthy() {
        out.insert("config".to_owned(), normalize(config));
    }
    out
}

/// Canonical form of an instrument snapshot given as a single map.
///
/// An explicit `config` entry is the configuration map; any other key
/// outside the four instrument fields is folded into it.
#[must_use]
pub fn canonicalize_instrument_map(payload: &ConfigValue) -> CanonicalMap {
    let field = |key: &str| payload.get(key).cloned().unwrap_or_default();
    let extras: Vec<(String, ConfigValue)> = match payload {
        ConfigValue::Map(entries) => entries
            .iter()
            .filter(|(k, _)| k != "config" && !INSTRUMENT_FIELDS.contains(&k.as_str()))
            .cloned()
            .collect(),
        _ => Vec::new(),
    };
    let config = match payload.get("config") {
        None => ConfigValue::Map(extras),
        Some(explicit) if extras.is_empty() => explicit.clone(),
        Some(ConfigValue::Map(entries)) => ConfigValue::Map(entries.iter().cloned().chain(extras).collect()),
        Some(other) => {
            let mut entries = extras;
            entries.push(("config".to_owned(), other.clone()));
            ConfigValue::Map(entries)
        },
    };
    canonicalize_instrument(
        &field("device_serial"),
        &field("integration_time_ms"),
        &field("averaging"),
        &field("temperature"),
        &config,
    )
}

/// Canonical form of a processing snapshot.
///
/// `name` and `version` stay top-level; every other non-null key is folded
/// into a normalized `parameters` map, added only when non-empty.
#[must_use]
pub fn canonicalize_processing(payload: &ConfigValue) -> CanonicalMap {
    let mut out = CanonicalMap::new();
    let ConfigValue::Map(entries) = payload else {
        return out;
    };
    let mut parameters = Vec::new();
    for (key, value) in entries {
        match key.as_str() {
            "name" | "version" => {
                if value.is_null() {
                    out.remove(key);
                } else {
                    out.insert(key.clone(), normalize(value));
                }
            },
            _ => parameters.push((key.clone(), value.clone())),
        }
    }
    let parameters = normalize_entries(&parameters);
    if !parameters.is_empty() {
        out.insert("parameters".to_owned(), Canonical::Map(parameters));
    }
    out
}

/// JSON formatter emitting `", "` between items and `": "` after keys.
///
/// Snapshot rows already in the store were written with these separators,
/// and live capture matches existing rows on the serialized text.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

/// Stable serialization of any canonical value: sorted keys, fixed separators,
/// non-ASCII text emitted as UTF-8.
#[must_use]
pub fn serialize_value<T: Serialize + ?Sized>(value: &T) -> String {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    if value.serialize(&mut serializer).is_err() {
        return "{}".to_owned();
    }
    String::from_utf8(buf).unwrap_or_else(|_| "{}".to_owned())
}

/// Canonical serialization of a snapshot map.
#[must_use]
pub fn serialize(canonical: &CanonicalMap) -> String {
    serialize_value(canonical)
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Fingerprint of a canonical snapshot: 64 lowercase hex characters.
#[must_use]
pub fn fingerprint(canonical: &CanonicalMap) -> String {
    sha256_hex(serialize(canonical).as_bytes())
}
