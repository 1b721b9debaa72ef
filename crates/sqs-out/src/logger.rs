// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log output in the same layout the host uses for its own messages.
//!
//! ```text
//! [2024.05.01 12:00:00] [ info] [sqs-out] QueueUrl is: https://sqs...
//! [2024.05.01 12:00:03] [error] [sqs-out] failed to send batch: ...
//! ```

use std::fmt;

use chrono::Local;
use tracing_core::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

use crate::log_level::{LogLevel, LOG_LEVEL_ENV};
use crate::COMPONENT;

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            &mut writer,
            "[{}] [{}] [{COMPONENT}] ",
            Local::now().format("%Y.%m.%d %H:%M:%S"),
            level_label(*event.metadata().level()),
        )?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Right-aligned lowercase level, five characters wide.
fn level_label(level: Level) -> &'static str {
    match level {
        Level::ERROR => "error",
        Level::WARN => " warn",
        Level::INFO => " info",
        Level::DEBUG => "debug",
        Level::TRACE => "trace",
    }
}

/// Installs the global subscriber at the level found in the environment.
///
/// Returns the level in effect. Installing twice keeps the first subscriber.
pub fn init() -> LogLevel {
    let level = LogLevel::from_env_value(std::env::var(LOG_LEVEL_ENV).ok().as_deref());
    let installed = tracing_subscriber::fmt()
        .event_format(Formatter)
        .with_max_level(level.as_level_filter())
        .try_init();
    if installed.is_ok() {
        tracing::debug!("Logging subsystem enabled at level {}", level.as_ref());
    }
    level
}
