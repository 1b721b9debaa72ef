// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Boundary between the batching core and the queue client.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::envelope::Envelope;
use crate::error::SubmitError;

/// One message the destination refused.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FailedEntry {
    pub id: String,
    #[serde(default)]
    pub sender_fault: bool,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of a batch that reached the destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub accepted: usize,
    pub failed: Vec<FailedEntry>,
}

impl BatchOutcome {
    #[must_use]
    pub fn failed_ids(&self) -> BTreeSet<&str> {
        self.failed.iter().map(|entry| entry.id.as_str()).collect()
    }

    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Sends one ordered batch of envelopes to a queue and blocks until the
/// destination answered.
pub trait BatchSubmitter {
    fn submit_batch(
        &mut self,
        entries: &[Envelope],
        queue_url: &str,
    ) -> Result<BatchOutcome, SubmitError>;
}

impl<S: BatchSubmitter + ?Sized> BatchSubmitter for Box<S> {
    fn submit_batch(
        &mut self,
        entries: &[Envelope],
        queue_url: &str,
    ) -> Result<BatchOutcome, SubmitError> {
        (**self).submit_batch(entries, queue_url)
    }
}
