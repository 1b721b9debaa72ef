// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Instant;

use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder, Runtime};
use tracing::debug;
use url::Url;

use super::credentials::Credentials;
use super::sigv4;
use crate::config::PluginConfig;
use crate::envelope::Envelope;
use crate::error::{ConfigError, SubmitError};
use crate::submitter::{BatchOutcome, BatchSubmitter, FailedEntry};

const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.0";
const SEND_MESSAGE_BATCH_TARGET: &str = "AmazonSQS.SendMessageBatch";
const TARGET_HEADER: &str = "x-amz-target";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageBatchRequest<'a> {
    queue_url: &'a str,
    entries: &'a [Envelope],
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageBatchResponse {
    #[serde(default)]
    successful: Vec<IgnoredAny>,
    #[serde(default)]
    failed: Vec<FailedEntry>,
}

#[derive(Deserialize, Default)]
struct ErrorResponse {
    #[serde(rename = "__type", default)]
    kind: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

/// SQS client speaking the JSON protocol.
///
/// Owns a current-thread runtime so that callers can submit synchronously.
pub struct SqsClient {
    runtime: Runtime,
    http: reqwest::Client,
    endpoint: Url,
    host: String,
    region: String,
    credentials: Credentials,
}

impl SqsClient {
    pub fn new(config: &PluginConfig, credentials: Credentials) -> Result<Self, ConfigError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ConfigError::Runtime)?;

        let http = {
            let _guard = runtime.enter();
            let builder = match &config.proxy_url {
                Some(proxy) => reqwest::Client::builder()
                    .proxy(reqwest::Proxy::all(proxy.as_str()).map_err(ConfigError::HttpClient)?),
                // only an explicit ProxyUrl is honored
                None => reqwest::Client::builder().no_proxy(),
            };
            builder.build().map_err(ConfigError::HttpClient)?
        };

        Ok(SqsClient {
            runtime,
            http,
            host: host_header(&config.endpoint),
            endpoint: config.endpoint.clone(),
            region: config.region.clone(),
            credentials,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Sends one `SendMessageBatch` call.
    pub async fn send_message_batch(
        &self,
        entries: &[Envelope],
        queue_url: &str,
    ) -> Result<BatchOutcome, SubmitError> {
        let body = serde_json::to_vec(&SendMessageBatchRequest { queue_url, entries })?;
        let signed = sigv4::sign(
            &self.credentials,
            &self.region,
            &self.host,
            &[
                ("content-type", JSON_CONTENT_TYPE),
                (TARGET_HEADER, SEND_MESSAGE_BATCH_TARGET),
            ],
            &body,
            Utc::now(),
        );

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(TARGET_HEADER, SEND_MESSAGE_BATCH_TARGET)
            .header("x-amz-date", signed.amz_date)
            .header(AUTHORIZATION, signed.authorization);
        if let Some(token) = signed.security_token {
            request = request.header("x-amz-security-token", token);
        }

        let start = Instant::now();
        let response = request.body(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(
            "SendMessageBatch answered {status} in {} ms",
            start.elapsed().as_millis()
        );

        if !status.is_success() {
            return Err(service_error(status, &text));
        }

        let parsed: SendMessageBatchResponse = serde_json::from_str(&text)
            .map_err(|e| SubmitError::InvalidResponse(format!("{e}: {text}")))?;
        Ok(BatchOutcome {
            accepted: parsed.successful.len(),
            failed: parsed.failed,
        })
    }
}

impl BatchSubmitter for SqsClient {
    fn submit_batch(
        &mut self,
        entries: &[Envelope],
        queue_url: &str,
    ) -> Result<BatchOutcome, SubmitError> {
        self.runtime
            .block_on(self.send_message_batch(entries, queue_url))
    }
}

fn service_error(status: reqwest::StatusCode, text: &str) -> SubmitError {
    let parsed: ErrorResponse = serde_json::from_str(text).unwrap_or_default();
    let code = parsed
        .kind
        .as_deref()
        .and_then(|kind| kind.rsplit('#').next())
        .filter(|code| !code.is_empty())
        .map_or_else(
            || status.canonical_reason().unwrap_or("Unknown").replace(' ', ""),
            str::to_string,
        );
    SubmitError::Service {
        status: status.as_u16(),
        code,
        message: parsed.message.unwrap_or_else(|| text.to_string()),
    }
}

/// Value of the `Host` header the HTTP client sends for `url`.
fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}
