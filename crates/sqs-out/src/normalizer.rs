// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Flattening of raw records into JSON documents.
//!
//! Nested maps are merged into the parent's key space without any prefix,
//! so `{"a": {"b": 1}, "c": 2}` becomes `{"b": 1, "c": 2}`. When two levels
//! carry the same key the one walked last wins. Byte sequences become text
//! instead of base64 since the destination is a human readable JSON body.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use crate::error::NormalizeError;
use crate::record::{RawRecord, RawValue};

/// Reserved key holding the record time.
pub const TIMESTAMP_KEY: &str = "@timestamp";

/// Flat, JSON-safe representation of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Document(Map<String, Value>);

impl Document {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Canonical JSON text of the document, keys in sorted order.
    pub fn to_json(&self) -> Result<String, NormalizeError> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

/// Normalizes one record into a flat document stamped with `timestamp`.
pub fn normalize(timestamp: DateTime<Utc>, record: &RawRecord) -> Result<Document, NormalizeError> {
    let mut flat = Map::new();
    flatten_into(record, &mut flat)?;
    flat.insert(
        TIMESTAMP_KEY.to_string(),
        Value::String(format_timestamp(timestamp)),
    );
    Ok(Document(flat))
}

/// RFC 3339 in UTC with nanosecond precision.
#[must_use]
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn flatten_into(record: &RawRecord, flat: &mut Map<String, Value>) -> Result<(), NormalizeError> {
    for (key, value) in record.iter() {
        if let RawValue::Map(nested) = value {
            flatten_into(nested, flat)?;
            continue;
        }
        let key = document_key(key)?;
        let value = to_json(value, &key)?;
        flat.insert(key, value);
    }
    Ok(())
}

fn document_key(key: &RawValue) -> Result<String, NormalizeError> {
    match key {
        RawValue::String(key) => Ok(key.clone()),
        RawValue::Bytes(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        other => Err(NormalizeError::UnsupportedKey(other.kind())),
    }
}

fn to_json(value: &RawValue, key: &str) -> Result<Value, NormalizeError> {
    let json = match value {
        RawValue::Nil => Value::Null,
        RawValue::Bool(b) => Value::Bool(*b),
        RawValue::Int(i) => Value::Number(Number::from(*i)),
        RawValue::UInt(u) => Value::Number(Number::from(*u)),
        RawValue::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| NormalizeError::NonFiniteFloat(key.to_string()))?,
        RawValue::String(s) => Value::String(s.clone()),
        RawValue::Bytes(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        RawValue::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| to_json(item, key))
                .collect::<Result<_, _>>()?,
        ),
        RawValue::Map(_) => return Err(NormalizeError::MapInArray(key.to_string())),
        RawValue::Ext(kind, _) => {
            return Err(NormalizeError::Extension {
                key: key.to_string(),
                kind: *kind,
            })
        }
    };
    Ok(json)
}
