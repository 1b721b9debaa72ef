// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Amazon SQS batch submitter.

pub mod client;
pub mod credentials;
pub mod sigv4;

pub use client::SqsClient;
pub use credentials::Credentials;
