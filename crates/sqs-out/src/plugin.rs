// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Output plugin session: drives decoding, normalization, envelope building
//! and batching for every chunk the host flushes.

use std::os::raw::c_int;

use tracing::{debug, error, info};

use crate::accumulator::BatchAccumulator;
use crate::config::{ConfigSource, EnvSource, PluginConfig};
use crate::decoder::EntryStream;
use crate::envelope::EnvelopeBuilder;
use crate::error::{ConfigError, SubmitError};
use crate::normalizer::normalize;
use crate::sqs::{Credentials, SqsClient};
use crate::submitter::BatchSubmitter;

pub const PLUGIN_NAME: &str = "sqs";
pub const PLUGIN_DESCRIPTION: &str = "aws sqs output plugin";

/// Status reported to the host at the end of a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    Error = 0,
    Ok = 1,
    /// Part of the host protocol. Never returned: a resent chunk would
    /// duplicate batches already accepted.
    Retry = 2,
}

impl FlushStatus {
    #[must_use]
    pub fn code(self) -> c_int {
        self as c_int
    }
}

impl From<&SubmitError> for FlushStatus {
    /// Any failed submission is unrecoverable for the cycle. Batches accepted
    /// earlier in the same chunk would be delivered twice on a host retry.
    fn from(_: &SubmitError) -> Self {
        FlushStatus::Error
    }
}

/// What the host needs to know to register the plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub name: &'static str,
    pub description: &'static str,
}

/// Lifecycle every output plugin goes through.
pub trait OutputPlugin: Sized {
    fn register() -> Registration;

    fn init<C: ConfigSource + ?Sized>(properties: &C) -> Result<Self, ConfigError>;

    /// Processes one chunk of records for `tag`.
    fn flush(&mut self, data: &[u8], tag: &str) -> FlushStatus;

    fn exit(self);
}

/// One configured plugin instance.
pub struct SqsOutput<S = SqsClient> {
    config: PluginConfig,
    builder: EnvelopeBuilder,
    accumulator: BatchAccumulator<S>,
}

impl SqsOutput<SqsClient> {
    /// Builds a session that sends to the configured SQS endpoint.
    pub fn new(config: PluginConfig, credentials: Credentials) -> Result<Self, ConfigError> {
        let client = SqsClient::new(&config, credentials)?;
        Ok(SqsOutput::with_submitter(config, client))
    }
}

impl<S: BatchSubmitter> SqsOutput<S> {
    pub fn with_submitter(config: PluginConfig, submitter: S) -> Self {
        let builder = EnvelopeBuilder::new(
            config.tag_attribute.clone(),
            config.message_group_id.clone(),
        );
        let accumulator =
            BatchAccumulator::new(submitter, config.queue_url.clone(), config.batch_size);
        SqsOutput {
            config,
            builder,
            accumulator,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    #[must_use]
    pub fn submitter(&self) -> &S {
        self.accumulator.submitter()
    }

    /// Number of messages built so far in this session.
    #[must_use]
    pub fn messages_built(&self) -> u64 {
        self.builder.counter().current()
    }

    /// Runs one flush cycle over `data`.
    ///
    /// Records that cannot be represented are skipped. The cycle stops at the
    /// first failed batch submission, dropping whatever was pending.
    pub fn process_chunk(&mut self, data: &[u8], tag: &str) -> FlushStatus {
        debug!("Flushing records for tag {tag}");

        for entry in EntryStream::new(data) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    error!("Failed to decode record chunk, ignoring the rest of it: {e}");
                    break;
                }
            };

            if entry.record.is_empty() {
                info!("Skipping empty record");
                continue;
            }

            let timestamp = entry.timestamp.resolve();
            let envelope = match normalize(timestamp, &entry.record)
                .and_then(|document| self.builder.build(&document, tag))
            {
                Ok(envelope) => envelope,
                Err(e) => {
                    error!("Skipping record that cannot be encoded: {e}");
                    continue;
                }
            };

            debug!("Record string {}", envelope.body);
            debug!("Message counter {}", self.builder.counter().current());

            if let Err(e) = self.accumulator.add(envelope) {
                return self.abort(&e);
            }
        }

        match self.accumulator.flush() {
            Ok(_) => FlushStatus::Ok,
            Err(e) => self.abort(&e),
        }
    }

    fn abort(&mut self, err: &SubmitError) -> FlushStatus {
        let status = FlushStatus::from(err);
        let kind = if err.is_retryable() {
            "temporary"
        } else {
            "permanent"
        };
        error!("{err} ({kind} failure), reporting {status:?} to the host");
        self.accumulator.discard();
        status
    }
}

impl OutputPlugin for SqsOutput<SqsClient> {
    fn register() -> Registration {
        Registration {
            name: PLUGIN_NAME,
            description: PLUGIN_DESCRIPTION,
        }
    }

    fn init<C: ConfigSource + ?Sized>(properties: &C) -> Result<Self, ConfigError> {
        let config = PluginConfig::from_source(properties)?;
        let credentials = Credentials::from_source(&EnvSource)?;
        let output = SqsOutput::new(config, credentials)?;
        let kind = if output.config.is_fifo() { "FIFO" } else { "standard" };
        info!(
            "Sending to {kind} queue {} through {}",
            output.config.queue_url,
            output.submitter().endpoint()
        );
        Ok(output)
    }

    fn flush(&mut self, data: &[u8], tag: &str) -> FlushStatus {
        self.process_chunk(data, tag)
    }

    fn exit(self) {
        info!(
            "Closing session for {}, {} messages built",
            self.config.queue_url,
            self.messages_built()
        );
    }
}
