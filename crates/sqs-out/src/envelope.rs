// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Queue-ready message envelopes.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::NormalizeError;
use crate::normalizer::Document;

const MESSAGE_ID_PREFIX: &str = "MessageNumber-";

/// A normalized document wrapped with its delivery metadata.
///
/// Serializes to the shape of one `SendMessageBatch` request entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "MessageBody")]
    pub body: String,
    #[serde(rename = "MessageGroupId", skip_serializing_if = "Option::is_none")]
    pub group_key: Option<String>,
    #[serde(rename = "MessageAttributes", skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, MessageAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageAttribute {
    pub data_type: String,
    pub string_value: String,
}

impl MessageAttribute {
    #[must_use]
    pub fn string(value: &str) -> Self {
        MessageAttribute {
            data_type: "String".to_string(),
            string_value: value.to_string(),
        }
    }
}

/// Session-wide source of message ids. Never reset, so ids are never reused.
#[derive(Debug, Default)]
pub struct MessageCounter(u64);

impl MessageCounter {
    #[must_use]
    pub fn current(&self) -> u64 {
        self.0
    }

    fn next_id(&mut self) -> String {
        self.0 += 1;
        format!("{MESSAGE_ID_PREFIX}{}", self.0)
    }
}

/// Builds envelopes for one plugin instance.
#[derive(Debug)]
pub struct EnvelopeBuilder {
    tag_attribute: Option<String>,
    group_key: Option<String>,
    counter: MessageCounter,
}

impl EnvelopeBuilder {
    /// `group_key` must be set for FIFO destinations; configuration
    /// validation guarantees it.
    #[must_use]
    pub fn new(tag_attribute: Option<String>, group_key: Option<String>) -> Self {
        EnvelopeBuilder {
            tag_attribute,
            group_key,
            counter: MessageCounter::default(),
        }
    }

    #[must_use]
    pub fn counter(&self) -> &MessageCounter {
        &self.counter
    }

    /// Wraps `document` into an envelope.
    ///
    /// The counter only advances once the body has been serialized, so a
    /// record that fails here does not consume an id.
    pub fn build(&mut self, document: &Document, tag: &str) -> Result<Envelope, NormalizeError> {
        let body = document.to_json()?;

        let mut attributes = BTreeMap::new();
        if let Some(name) = &self.tag_attribute {
            attributes.insert(name.clone(), MessageAttribute::string(tag));
        }

        Ok(Envelope {
            id: self.counter.next_id(),
            body,
            group_key: self.group_key.clone(),
            attributes,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::normalizer::normalize;
    use crate::record::RawRecord;
    use chrono::DateTime;
    use serde_json::json;
    use std::collections::HashSet;

    fn document(message: &str) -> Document {
        let time = DateTime::from_timestamp(0, 0).unwrap();
        normalize(time, &RawRecord::from_iter([("msg", message)])).unwrap()
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut builder = EnvelopeBuilder::new(None, None);

        let first = builder.build(&document("a"), "app").unwrap();
        let second = builder.build(&document("b"), "app").unwrap();

        assert_eq!(first.id, "MessageNumber-1");
        assert_eq!(second.id, "MessageNumber-2");
        assert_eq!(builder.counter().current(), 2);
    }

    #[test]
    fn test_ids_are_unique_for_every_capacity() {
        for capacity in 1..=10 {
            let mut builder = EnvelopeBuilder::new(None, None);
            let ids: HashSet<_> = (0..capacity * 3)
                .map(|_| builder.build(&document("x"), "app").unwrap().id)
                .collect();
            assert_eq!(ids.len(), capacity * 3);
        }
    }

    #[test]
    fn test_body_is_serialized_document() {
        let mut builder = EnvelopeBuilder::new(None, None);

        let envelope = builder.build(&document("hello"), "app").unwrap();

        assert_eq!(
            envelope.body,
            r#"{"@timestamp":"1970-01-01T00:00:00.000000000Z","msg":"hello"}"#
        );
    }

    #[test]
    fn test_no_attributes_without_tag_attribute() {
        let mut builder = EnvelopeBuilder::new(None, None);

        let envelope = builder.build(&document("a"), "app").unwrap();

        assert!(envelope.attributes.is_empty());
        assert!(envelope.group_key.is_none());
    }

    #[test]
    fn test_tag_attribute_and_group_key() {
        let mut builder =
            EnvelopeBuilder::new(Some("fluent_tag".to_string()), Some("group-1".to_string()));

        let envelope = builder.build(&document("a"), "kube.app").unwrap();

        assert_eq!(envelope.group_key.as_deref(), Some("group-1"));
        assert_eq!(
            envelope.attributes.get("fluent_tag"),
            Some(&MessageAttribute::string("kube.app"))
        );
    }

    #[test]
    fn test_serialized_entry_shape() {
        let mut builder =
            EnvelopeBuilder::new(Some("tag".to_string()), Some("group".to_string()));
        let envelope = builder.build(&document("a"), "app").unwrap();

        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(
            value,
            json!({
                "Id": "MessageNumber-1",
                "MessageBody": envelope.body,
                "MessageGroupId": "group",
                "MessageAttributes": {
                    "tag": {"DataType": "String", "StringValue": "app"}
                }
            })
        );
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let mut builder = EnvelopeBuilder::new(None, None);
        let envelope = builder.build(&document("a"), "app").unwrap();

        let value = serde_json::to_value(&envelope).unwrap();

        assert!(value.get("MessageGroupId").is_none());
        assert!(value.get("MessageAttributes").is_none());
    }
}
