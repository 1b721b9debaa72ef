// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Dynamically typed record values as handed over by the host pipeline.
//!
//! Records arrive as msgpack. Their shape is unknown ahead of time: keys and
//! values can be of any msgpack type and maps can nest to any depth. This
//! module models them as a tagged variant ([`RawValue`]) and deserializes
//! them with `rmp-serde` through a hand-written visitor.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};

/// One dynamically typed value of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Nil,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<RawValue>),
    Map(RawRecord),
    /// msgpack extension value (type tag, payload).
    Ext(i8, Vec<u8>),
}

impl RawValue {
    /// Short type name used in log and error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            RawValue::Nil => "nil",
            RawValue::Bool(_) => "bool",
            RawValue::Int(_) => "int",
            RawValue::UInt(_) => "uint",
            RawValue::Float(_) => "float",
            RawValue::String(_) => "string",
            RawValue::Bytes(_) => "bytes",
            RawValue::Array(_) => "array",
            RawValue::Map(_) => "map",
            RawValue::Ext(..) => "ext",
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::String(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::String(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl From<RawRecord> for RawValue {
    fn from(value: RawRecord) -> Self {
        RawValue::Map(value)
    }
}

/// An unordered mapping of dynamically typed keys to values.
///
/// Entries keep the order they were decoded in, so duplicate keys and
/// collisions resolve deterministically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord(Vec<(RawValue, RawValue)>);

impl RawRecord {
    #[must_use]
    pub fn new() -> Self {
        RawRecord(Vec::new())
    }

    pub fn insert(&mut self, key: impl Into<RawValue>, value: impl Into<RawValue>) {
        self.0.push((key.into(), value.into()));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(RawValue, RawValue)> {
        self.0.iter()
    }
}

impl<K: Into<RawValue>, V: Into<RawValue>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        RawRecord(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<'de> Deserialize<'de> for RawValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(RawValueVisitor)
    }
}

struct RawValueVisitor;

impl<'de> Visitor<'de> for RawValueVisitor {
    type Value = RawValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any msgpack value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<RawValue, E> {
        Ok(RawValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<RawValue, E> {
        Ok(RawValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<RawValue, E> {
        Ok(RawValue::UInt(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<RawValue, E> {
        Ok(RawValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<RawValue, E> {
        Ok(RawValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<RawValue, E> {
        Ok(RawValue::String(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<RawValue, E> {
        Ok(RawValue::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<RawValue, E> {
        Ok(RawValue::Bytes(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<RawValue, E> {
        Ok(RawValue::Nil)
    }

    fn visit_none<E: de::Error>(self) -> Result<RawValue, E> {
        Ok(RawValue::Nil)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<RawValue, D::Error>
    where
        D: Deserializer<'de>,
    {
        RawValue::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<RawValue, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(RawValue::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<RawValue, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(entry) = map.next_entry::<RawValue, RawValue>()? {
            entries.push(entry);
        }
        Ok(RawValue::Map(RawRecord(entries)))
    }

    // rmp-serde hands extension values over as a newtype wrapping a
    // (type tag, payload) sequence.
    fn visit_newtype_struct<D>(self, deserializer: D) -> Result<RawValue, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ExtVisitor)
    }
}

struct ExtVisitor;

impl<'de> Visitor<'de> for ExtVisitor {
    type Value = RawValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a msgpack extension (type, payload)")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<RawValue, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let kind: i8 = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let payload: ExtPayload = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        Ok(RawValue::Ext(kind, payload.0))
    }
}

struct ExtPayload(Vec<u8>);

impl<'de> Deserialize<'de> for ExtPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PayloadVisitor;

        impl<'de> Visitor<'de> for PayloadVisitor {
            type Value = ExtPayload;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("extension payload bytes")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<ExtPayload, E> {
                Ok(ExtPayload(v.to_vec()))
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<ExtPayload, E> {
                Ok(ExtPayload(v))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<ExtPayload, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut bytes = Vec::new();
                while let Some(byte) = seq.next_element::<u8>()? {
                    bytes.push(byte);
                }
                Ok(ExtPayload(bytes))
            }
        }

        deserializer.deserialize_bytes(PayloadVisitor)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> RawValue {
        rmp_serde::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode(&[0xc0]), RawValue::Nil);
        assert_eq!(decode(&[0xc3]), RawValue::Bool(true));
        assert_eq!(decode(&[0x2a]), RawValue::UInt(42));
        assert_eq!(decode(&[0xff]), RawValue::Int(-1));
        assert_eq!(decode(&[0xa2, b'h', b'i']), RawValue::String("hi".to_string()));
    }

    #[test]
    fn test_decode_float() {
        let bytes = rmp_serde::to_vec(&1.5f64).unwrap();
        assert_eq!(decode(&bytes), RawValue::Float(1.5));
    }

    #[test]
    fn test_decode_bin_as_bytes() {
        // bin8 with two bytes
        assert_eq!(decode(&[0xc4, 0x02, 0xde, 0xad]), RawValue::Bytes(vec![0xde, 0xad]));
    }

    #[test]
    fn test_decode_nested_map() {
        // {"a": {"b": 1}, "c": [true]}
        let bytes = [
            0x82, 0xa1, b'a', 0x81, 0xa1, b'b', 0x01, 0xa1, b'c', 0x91, 0xc3,
        ];
        let value = decode(&bytes);
        let expected = RawValue::Map(RawRecord::from_iter([
            ("a", RawValue::Map(RawRecord::from_iter([("b", RawValue::UInt(1))]))),
            ("c", RawValue::Array(vec![RawValue::Bool(true)])),
        ]));
        assert_eq!(value, expected);
    }

    #[test]
    fn test_decode_non_string_keys() {
        // {1: "one"}
        let value = decode(&[0x81, 0x01, 0xa3, b'o', b'n', b'e']);
        let RawValue::Map(record) = value else {
            panic!("expected a map");
        };
        let (key, val) = record.iter().next().unwrap();
        assert_eq!(key, &RawValue::UInt(1));
        assert_eq!(val, &RawValue::String("one".to_string()));
    }

    #[test]
    fn test_decode_event_time_extension() {
        // fixext8, type 0, seconds = 1, nanoseconds = 2
        let bytes = [0xd7, 0x00, 0, 0, 0, 1, 0, 0, 0, 2];
        assert_eq!(decode(&bytes), RawValue::Ext(0, vec![0, 0, 0, 1, 0, 0, 0, 2]));
    }

    #[test]
    fn test_record_builder() {
        let mut record = RawRecord::new();
        assert!(record.is_empty());
        record.insert("message", "hello");
        record.insert("count", 3i64);
        assert_eq!(record.len(), 2);
        assert_eq!(RawValue::from(3i64).kind(), "int");
    }
}
