// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Size-bounded batching of envelopes.
//!
//! At most one batch is ever being filled. As soon as it holds `capacity`
//! envelopes it is submitted synchronously and the accumulator starts over
//! with an empty batch. Whatever is left when the record stream ends is
//! submitted by [`BatchAccumulator::flush`].
//!
//! A batch is handed to the submitter exactly once. Failed submissions are
//! reported to the caller and the batch is dropped, rejected messages are
//! logged and never re-enqueued.

use std::fmt;

use tracing::{debug, error, info};

use crate::envelope::Envelope;
use crate::error::SubmitError;
use crate::submitter::{BatchOutcome, BatchSubmitter};

/// Maximum number of entries a single `SendMessageBatch` call accepts.
pub const MAX_BATCH_CAPACITY: usize = 10;

/// Validated batch capacity, between 1 and [`MAX_BATCH_CAPACITY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchCapacity(usize);

impl BatchCapacity {
    #[must_use]
    pub fn new(capacity: usize) -> Option<Self> {
        (1..=MAX_BATCH_CAPACITY)
            .contains(&capacity)
            .then_some(BatchCapacity(capacity))
    }

    #[must_use]
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for BatchCapacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct BatchAccumulator<S> {
    submitter: S,
    queue_url: String,
    capacity: BatchCapacity,
    pending: Vec<Envelope>,
}

impl<S: BatchSubmitter> BatchAccumulator<S> {
    pub fn new(submitter: S, queue_url: String, capacity: BatchCapacity) -> Self {
        BatchAccumulator {
            submitter,
            queue_url,
            capacity,
            pending: Vec::with_capacity(capacity.get()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    /// Appends `envelope`, submitting the batch when it becomes full.
    ///
    /// Returns the outcome of the submission it triggered, if any.
    pub fn add(&mut self, envelope: Envelope) -> Result<Option<BatchOutcome>, SubmitError> {
        self.pending.push(envelope);
        if self.pending.len() < self.capacity.get() {
            return Ok(None);
        }
        debug!("Batch reached capacity of {}, submitting", self.capacity);
        self.submit().map(Some)
    }

    /// Submits the pending partial batch, if there is one.
    pub fn flush(&mut self) -> Result<Option<BatchOutcome>, SubmitError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        info!("Flushing pending {} records", self.pending.len());
        self.submit().map(Some)
    }

    /// Drops the pending batch without submitting it.
    pub fn discard(&mut self) {
        if !self.pending.is_empty() {
            debug!("Discarding {} pending records", self.pending.len());
            self.pending.clear();
        }
    }

    fn submit(&mut self) -> Result<BatchOutcome, SubmitError> {
        let batch = std::mem::replace(
            &mut self.pending,
            Vec::with_capacity(self.capacity.get()),
        );
        let outcome = self.submitter.submit_batch(&batch, &self.queue_url)?;
        for failed in &outcome.failed {
            error!(
                "Message {} was rejected by the queue: {} {} (sender fault: {})",
                failed.id,
                failed.code,
                failed.message.as_deref().unwrap_or_default(),
                failed.sender_fault
            );
        }
        debug!(
            "Batch of {} messages submitted, {} rejected",
            batch.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }
}
