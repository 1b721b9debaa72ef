// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::env;

use tracing::info;
use url::Url;

use crate::accumulator::BatchCapacity;
use crate::error::ConfigError;

pub const KEY_ENDPOINT: &str = "SQSEndpoint";
pub const KEY_QUEUE_URL: &str = "QueueUrl";
pub const KEY_QUEUE_REGION: &str = "QueueRegion";
pub const KEY_MESSAGE_GROUP_ID: &str = "QueueMessageGroupId";
pub const KEY_TAG_ATTRIBUTE: &str = "PluginTagAttribute";
pub const KEY_PROXY_URL: &str = "ProxyUrl";
pub const KEY_BATCH_SIZE: &str = "BatchSize";

const FIFO_SUFFIX: &str = ".fifo";

/// Read access to configuration properties by key.
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Like [`ConfigSource::get`], treating blank values as absent.
    fn get_non_empty(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl ConfigSource for HashMap<&str, &str> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).map(|value| (*value).to_string())
    }
}

/// Process environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

/// Validated configuration of one plugin instance. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginConfig {
    /// Queue identity
    pub queue_url: String,
    /// Region used to sign requests
    pub region: String,
    /// Base URL requests are sent to
    pub endpoint: Url,
    /// Grouping key, only set for FIFO queues
    pub message_group_id: Option<String>,
    /// Name of the message attribute carrying the record tag
    pub tag_attribute: Option<String>,
    /// Optional HTTP proxy
    pub proxy_url: Option<Url>,
    /// Maximum number of messages per batch
    pub batch_size: BatchCapacity,
}

impl PluginConfig {
    /// Reads and validates every key from `source`.
    pub fn from_source<S: ConfigSource + ?Sized>(source: &S) -> Result<Self, ConfigError> {
        let endpoint = source.get_non_empty(KEY_ENDPOINT);
        let queue_url = source.get_non_empty(KEY_QUEUE_URL);
        let region = source.get_non_empty(KEY_QUEUE_REGION);
        let message_group_id = source.get_non_empty(KEY_MESSAGE_GROUP_ID);
        let tag_attribute = source.get_non_empty(KEY_TAG_ATTRIBUTE);
        let proxy_url = source.get_non_empty(KEY_PROXY_URL);
        let batch_size = source.get_non_empty(KEY_BATCH_SIZE);

        for (key, value) in [
            (KEY_ENDPOINT, &endpoint),
            (KEY_QUEUE_URL, &queue_url),
            (KEY_QUEUE_REGION, &region),
            (KEY_MESSAGE_GROUP_ID, &message_group_id),
            (KEY_TAG_ATTRIBUTE, &tag_attribute),
            (KEY_PROXY_URL, &proxy_url),
            (KEY_BATCH_SIZE, &batch_size),
        ] {
            info!("{key} is: {}", value.as_deref().unwrap_or_default());
        }

        let queue_url = queue_url.ok_or(ConfigError::MissingKey(KEY_QUEUE_URL))?;
        let region = region.ok_or(ConfigError::MissingKey(KEY_QUEUE_REGION))?;

        let is_fifo = is_fifo_queue(&queue_url);
        if is_fifo && message_group_id.is_none() {
            return Err(ConfigError::MissingMessageGroupId);
        }

        let batch_size = parse_batch_size(batch_size.as_deref())?;

        let endpoint = match endpoint {
            Some(endpoint) => endpoint,
            None => {
                let endpoint = default_endpoint(&region);
                info!("Using default regional AWS endpoint: {endpoint}");
                endpoint
            }
        };
        let endpoint = parse_url(KEY_ENDPOINT, &endpoint)?;
        let proxy_url = proxy_url
            .map(|proxy| parse_url(KEY_PROXY_URL, &proxy))
            .transpose()?;

        Ok(PluginConfig {
            queue_url,
            region,
            endpoint,
            message_group_id: message_group_id.filter(|_| is_fifo),
            tag_attribute,
            proxy_url,
            batch_size,
        })
    }

    /// Whether the destination preserves ordering within a grouping key.
    #[must_use]
    pub fn is_fifo(&self) -> bool {
        is_fifo_queue(&self.queue_url)
    }
}

fn is_fifo_queue(queue_url: &str) -> bool {
    queue_url.ends_with(FIFO_SUFFIX)
}

fn default_endpoint(region: &str) -> String {
    format!("sqs.{region}.amazonaws.com")
}

fn parse_batch_size(value: Option<&str>) -> Result<BatchCapacity, ConfigError> {
    let value = value.unwrap_or_default();
    value
        .parse::<usize>()
        .ok()
        .and_then(BatchCapacity::new)
        .ok_or_else(|| ConfigError::InvalidBatchSize(value.to_string()))
}

/// Parses a URL, assuming `https` when no scheme is given.
fn parse_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    let value = if value.contains("://") {
        value.to_string()
    } else {
        format!("https://{value}")
    };
    Url::parse(&value).map_err(|source| ConfigError::InvalidUrl { key, source })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn source(entries: &[(&'static str, &'static str)]) -> HashMap<&'static str, &'static str> {
        entries.iter().copied().collect()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            (KEY_QUEUE_URL, "https://sqs.eu-west-1.amazonaws.com/123456789012/logs"),
            (KEY_QUEUE_REGION, "eu-west-1"),
            (KEY_BATCH_SIZE, "10"),
        ]
    }

    fn without(key: &str) -> HashMap<&'static str, &'static str> {
        let mut entries = minimal();
        entries.retain(|(k, _)| *k != key);
        source(&entries)
    }

    fn with(key: &'static str, value: &'static str) -> HashMap<&'static str, &'static str> {
        let mut map = source(&minimal());
        map.insert(key, value);
        map
    }

    #[test]
    fn test_minimal_config() {
        let config = PluginConfig::from_source(&source(&minimal())).unwrap();

        assert_eq!(
            config.queue_url,
            "https://sqs.eu-west-1.amazonaws.com/123456789012/logs"
        );
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.endpoint.as_str(), "https://sqs.eu-west-1.amazonaws.com/");
        assert_eq!(config.batch_size.get(), 10);
        assert!(config.message_group_id.is_none());
        assert!(config.tag_attribute.is_none());
        assert!(config.proxy_url.is_none());
        assert!(!config.is_fifo());
    }

    #[test]
    fn test_queue_url_is_mandatory() {
        let err = PluginConfig::from_source(&without(KEY_QUEUE_URL)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(KEY_QUEUE_URL)));
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let err = PluginConfig::from_source(&with(KEY_QUEUE_URL, "   ")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(KEY_QUEUE_URL)));
    }

    #[test]
    fn test_region_is_mandatory() {
        let err = PluginConfig::from_source(&without(KEY_QUEUE_REGION)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(KEY_QUEUE_REGION)));
    }

    #[test]
    fn test_fifo_queue_requires_group_id() {
        let config = with(
            KEY_QUEUE_URL,
            "https://sqs.eu-west-1.amazonaws.com/123456789012/logs.fifo",
        );

        let err = PluginConfig::from_source(&config).unwrap_err();

        assert!(matches!(err, ConfigError::MissingMessageGroupId));
    }

    #[test]
    fn test_fifo_queue_with_group_id() {
        let mut config = with(
            KEY_QUEUE_URL,
            "https://sqs.eu-west-1.amazonaws.com/123456789012/logs.fifo",
        );
        config.insert(KEY_MESSAGE_GROUP_ID, "group-a");

        let config = PluginConfig::from_source(&config).unwrap();

        assert!(config.is_fifo());
        assert_eq!(config.message_group_id.as_deref(), Some("group-a"));
    }

    #[test]
    fn test_group_id_ignored_for_standard_queue() {
        let config = PluginConfig::from_source(&with(KEY_MESSAGE_GROUP_ID, "group-a")).unwrap();
        assert!(config.message_group_id.is_none());
    }

    #[test]
    fn test_batch_size_bounds() {
        for valid in ["1", "5", "10", " 7 "] {
            let config = PluginConfig::from_source(&with(KEY_BATCH_SIZE, valid)).unwrap();
            assert_eq!(config.batch_size.get(), valid.trim().parse::<usize>().unwrap());
        }
        for invalid in ["0", "11", "-1", "ten", "2.5"] {
            let err = PluginConfig::from_source(&with(KEY_BATCH_SIZE, invalid)).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidBatchSize(ref v) if v == invalid),
                "BatchSize '{invalid}' should be rejected"
            );
        }
    }

    #[test]
    fn test_batch_size_is_mandatory() {
        let err = PluginConfig::from_source(&without(KEY_BATCH_SIZE)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBatchSize(ref v) if v.is_empty()));
    }

    #[test]
    fn test_custom_endpoint_and_proxy() {
        let mut config = with(KEY_ENDPOINT, "http://localhost:4566");
        config.insert(KEY_PROXY_URL, "http://proxy.internal:3128");
        config.insert(KEY_TAG_ATTRIBUTE, "fluent_tag");

        let config = PluginConfig::from_source(&config).unwrap();

        assert_eq!(config.endpoint.as_str(), "http://localhost:4566/");
        assert_eq!(
            config.proxy_url.as_ref().map(Url::as_str),
            Some("http://proxy.internal:3128/")
        );
        assert_eq!(config.tag_attribute.as_deref(), Some("fluent_tag"));
    }

    #[test]
    fn test_endpoint_without_scheme_uses_https() {
        let config =
            PluginConfig::from_source(&with(KEY_ENDPOINT, "vpce-1.sqs.eu-west-1.vpce.amazonaws.com"))
                .unwrap();
        assert_eq!(config.endpoint.scheme(), "https");
    }

    #[test]
    fn test_invalid_proxy_url() {
        let err = PluginConfig::from_source(&with(KEY_PROXY_URL, "http://[::1")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { key: KEY_PROXY_URL, .. }));
    }

    #[test]
    fn test_owned_map_source() {
        let mut map: HashMap<String, String> = HashMap::new();
        map.insert("QueueUrl".to_string(), "q".to_string());
        assert_eq!(ConfigSource::get(&map, "QueueUrl").as_deref(), Some("q"));
        assert_eq!(map.get_non_empty("Missing"), None);
    }
}
