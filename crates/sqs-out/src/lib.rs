// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # sqs-out
//!
//! Fluent Bit output plugin that delivers log records to Amazon SQS.
//!
//! Every record the host flushes is flattened into a single-level JSON
//! document stamped with an `@timestamp`, wrapped in a queue message and
//! sent with `SendMessageBatch` in batches of at most ten.
//!
//! - [`decoder`]: host msgpack chunks into timestamped records
//! - [`normalizer`]: nested records into flat JSON documents
//! - [`envelope`]: message ids, grouping key and tag attribute
//! - [`accumulator`]: size-bounded batching and end-of-chunk flush
//! - [`sqs`]: signed `SendMessageBatch` client
//! - [`plugin`]: the per-instance session driving all of the above
//! - [`ffi`]: entry points the host's plugin proxy loads

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]

pub mod accumulator;
pub mod config;
pub mod decoder;
pub mod envelope;
pub mod error;
pub mod ffi;
pub mod log_level;
pub mod logger;
pub mod normalizer;
pub mod plugin;
pub mod record;
pub mod sqs;
pub mod submitter;

/// Name the plugin logs under.
pub const COMPONENT: &str = "sqs-out";
