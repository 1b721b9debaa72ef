// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while reading and validating the plugin configuration.
///
/// Every variant is fatal at startup: the host receives an error from init
/// and no record is ever processed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} configuration key is mandatory")]
    MissingKey(&'static str),

    #[error("QueueMessageGroupId configuration key is mandatory for FIFO queues")]
    MissingMessageGroupId,

    #[error("BatchSize should be integer value between 1 and 10, got '{0}'")]
    InvalidBatchSize(String),

    #[error("{key} is not a valid URL: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("unable to find aws credentials: {0} is not set")]
    MissingCredentials(&'static str),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("failed to start submission runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Errors raised while decoding the host's record chunk.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed msgpack in record chunk: {0}")]
    Msgpack(#[from] rmp_serde::decode::Error),

    #[error("unexpected record entry: {0}")]
    InvalidEntry(&'static str),
}

/// Errors that make a single record unrepresentable as a JSON document.
///
/// These are recoverable: the offending record is skipped and the rest of
/// the stream continues.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("key of type {0} cannot be used as a document key")]
    UnsupportedKey(&'static str),

    #[error("value of key '{0}' is a non-finite float")]
    NonFiniteFloat(String),

    #[error("value of key '{0}' contains a map inside an array")]
    MapInArray(String),

    #[error("value of key '{key}' is a msgpack extension of type {kind}")]
    Extension { key: String, kind: i8 },

    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors returned by a batch submission.
///
/// Per-message rejections are not errors; they are reported through
/// [`crate::submitter::BatchOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("failed to send batch: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("queue rejected batch with status {status}: {code}: {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },

    #[error("unexpected response from queue: {0}")]
    InvalidResponse(String),

    #[error("failed to encode batch request: {0}")]
    Encode(#[from] serde_json::Error),
}

const RETRYABLE_CODES: &[&str] = &[
    "ThrottlingException",
    "RequestThrottled",
    "ServiceUnavailable",
    "InternalError",
    "InternalFailure",
    "KmsThrottled",
];

impl SubmitError {
    /// Whether the failure is temporary.
    ///
    /// Network failures, 5xx responses and throttling are temporary. Any
    /// other 4xx response is permanent. Only used to describe the failure in
    /// logs; the host is told the cycle failed either way.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SubmitError::Transport(_) => true,
            SubmitError::Service { status, code, .. } => {
                *status >= 500 || RETRYABLE_CODES.contains(&code.as_str())
            }
            SubmitError::InvalidResponse(_) | SubmitError::Encode(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_error(status: u16, code: &str) -> SubmitError {
        SubmitError::Service {
            status,
            code: code.to_string(),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::MissingKey("QueueUrl");
        assert_eq!(error.to_string(), "QueueUrl configuration key is mandatory");

        let error = ConfigError::InvalidBatchSize("11".to_string());
        assert_eq!(
            error.to_string(),
            "BatchSize should be integer value between 1 and 10, got '11'"
        );
    }

    #[test]
    fn test_server_errors_are_retryable() {
        assert!(service_error(500, "InternalError").is_retryable());
        assert!(service_error(503, "Whatever").is_retryable());
    }

    #[test]
    fn test_throttling_is_retryable() {
        assert!(service_error(400, "ThrottlingException").is_retryable());
        assert!(service_error(400, "RequestThrottled").is_retryable());
    }

    #[test]
    fn test_client_errors_are_permanent() {
        assert!(!service_error(400, "QueueDoesNotExist").is_retryable());
        assert!(!service_error(403, "AccessDenied").is_retryable());
        assert!(!SubmitError::InvalidResponse("garbage".to_string()).is_retryable());
    }

    #[test]
    fn test_normalize_error_display() {
        let error = NormalizeError::Extension {
            key: "ts".to_string(),
            kind: 3,
        };
        assert_eq!(
            error.to_string(),
            "value of key 'ts' is a msgpack extension of type 3"
        );
    }
}
