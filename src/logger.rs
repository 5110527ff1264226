//! Tracing subscriber setup.

use std::fs::File;

use anyhow::Context;
use time::{
    format_description::{self, parse},
    OffsetDateTime,
};
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// A new timestamped file in the working directory.
    File,
    /// The process's stderr.
    Stderr,
}

/// Install the global tracing subscriber.
///
/// # Errors
/// The log file cannot be created, or a global subscriber is already set.
pub fn init_logger(target: LogTarget) -> anyhow::Result<()> {
    let writer = match target {
        LogTarget::File => {
            let file_name = get_log_file_name()?;
            let file = File::create(&file_name)
                .with_context(|| format!("could not create log file {file_name}"))?;
            BoxMakeWriter::new(file)
        }
        LogTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
    };
    // the local offset is unknown once threads exist; fall back to UTC
    let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
            .context("invalid log timestamp format")?,
    );

    let subscriber = FmtSubscriber::builder()
        .with_max_level(match target {
            LogTarget::File => Level::TRACE,
            LogTarget::Stderr => Level::INFO,
        })
        .with_ansi(false)
        .with_thread_names(true)
        .with_timer(timer)
        .with_writer(writer)
        .finish();

    set_global_default(subscriber).context(
        "Could not set global default tracing subscriber. Consider disabling logs if you are already setting a subscriber.",
    )
}

fn get_log_file_name() -> anyhow::Result<String> {
    let format = parse("[year]-[month]-[day]_[hour]:[minute]:[second]_arena_log.txt")
        .context("invalid log file name format")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&format).context("could not format log file name")
}
