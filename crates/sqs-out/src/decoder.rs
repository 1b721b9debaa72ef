// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding of the record chunks delivered by the host on every flush.
//!
//! A chunk is a concatenation of msgpack entries, each one an array of two
//! elements. Older hosts send `[timestamp, record]`, newer ones send
//! `[[timestamp, metadata], record]`. Both layouts are accepted and the
//! metadata is ignored.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::error::DecodeError;
use crate::record::{RawRecord, RawValue};

/// msgpack extension type used by the host for `EventTime`.
const EVENT_TIME_EXT: i8 = 0;

/// Point in time attached to a record by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostTimestamp {
    /// Structured `EventTime` with nanosecond precision.
    EventTime { seconds: u32, nanoseconds: u32 },
    /// Plain integer seconds since the epoch.
    Seconds(u64),
    /// Anything else the host may send.
    Unrecognized,
}

impl HostTimestamp {
    fn from_raw(value: &RawValue) -> Self {
        match value {
            RawValue::Ext(EVENT_TIME_EXT, payload) if payload.len() == 8 => {
                let seconds = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                let nanoseconds =
                    u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
                HostTimestamp::EventTime {
                    seconds,
                    nanoseconds,
                }
            }
            RawValue::UInt(seconds) => HostTimestamp::Seconds(*seconds),
            RawValue::Int(seconds) if *seconds >= 0 => HostTimestamp::Seconds(seconds.unsigned_abs()),
            _ => HostTimestamp::Unrecognized,
        }
    }

    /// Converts to a UTC point in time, falling back to the current wall
    /// clock when the host value cannot be interpreted.
    #[must_use]
    pub fn resolve(self) -> DateTime<Utc> {
        let resolved = match self {
            HostTimestamp::EventTime {
                seconds,
                nanoseconds,
            } => DateTime::from_timestamp(i64::from(seconds), nanoseconds),
            HostTimestamp::Seconds(seconds) => i64::try_from(seconds)
                .ok()
                .and_then(|s| DateTime::from_timestamp(s, 0)),
            HostTimestamp::Unrecognized => None,
        };
        resolved.unwrap_or_else(|| {
            info!("given time is not in a known format, defaulting to now");
            Utc::now()
        })
    }
}

/// One decoded entry of a host chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct HostEntry {
    pub timestamp: HostTimestamp,
    pub record: RawRecord,
}

impl TryFrom<RawValue> for HostEntry {
    type Error = DecodeError;

    fn try_from(value: RawValue) -> Result<Self, Self::Error> {
        let RawValue::Array(mut parts) = value else {
            return Err(DecodeError::InvalidEntry("entry is not an array"));
        };
        if parts.len() != 2 {
            return Err(DecodeError::InvalidEntry("entry does not have two elements"));
        }
        let body = parts.pop();
        let header = parts.pop();

        let timestamp = match header {
            Some(RawValue::Array(header)) => header
                .first()
                .map_or(HostTimestamp::Unrecognized, HostTimestamp::from_raw),
            Some(other) => HostTimestamp::from_raw(&other),
            None => HostTimestamp::Unrecognized,
        };
        let Some(RawValue::Map(record)) = body else {
            return Err(DecodeError::InvalidEntry("record body is not a map"));
        };

        Ok(HostEntry { timestamp, record })
    }
}

/// Iterator over the entries of one host chunk.
///
/// Iteration ends at the end of the chunk, or after the first malformed
/// entry which is yielded as an error.
pub struct EntryStream<'a> {
    deserializer: rmp_serde::Deserializer<rmp_serde::decode::ReadReader<Cursor<&'a [u8]>>>,
    len: u64,
    failed: bool,
}

impl<'a> EntryStream<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        EntryStream {
            deserializer: rmp_serde::Deserializer::new(Cursor::new(data)),
            len: data.len() as u64,
            failed: false,
        }
    }
}

impl Iterator for EntryStream<'_> {
    type Item = Result<HostEntry, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.deserializer.get_ref().position() >= self.len {
            return None;
        }
        let entry = RawValue::deserialize(&mut self.deserializer)
            .map_err(DecodeError::from)
            .and_then(HostEntry::try_from);
        if entry.is_err() {
            self.failed = true;
        }
        Some(entry)
    }
}
