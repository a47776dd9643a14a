//! Logging configuration for the lintel CLI
//!
//! Compact terminal output plus optional file logging using tracing.

use crate::Result;
use std::path::Path;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the default filter for lintel crates at the given level
///
/// `RUST_LOG` overrides it when set.
fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "lintel={level},lintel_engine={level},lintel_config={level}"
        ))
    })
}

/// Open `path` for appending
fn open_log(path: &Path) -> Result<std::fs::File> {
    Ok(std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?)
}

/// Initialize the logging system
///
/// Terminal logs go to stderr so that stdout carries only the report.
/// Verbose mode lowers the level to debug and adds timestamps.
///
/// ```ignore
/// init(false, None)?;
/// init(true, Some(Path::new("lintel.log")))?;
/// ```
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let env_filter = default_filter(if verbose { "debug" } else { "warn" });

    let terminal = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .compact();
    let terminal = if verbose {
        terminal.boxed()
    } else {
        terminal.without_time().boxed()
    };

    // Detailed file log, always at debug level
    let file = log_file.map(open_log).transpose()?.map(|file| {
        fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .with_filter(EnvFilter::new("debug"))
    });

    // A second init (tests, embedding) keeps the first subscriber
    tracing_subscriber::registry()
        .with(terminal.with_filter(env_filter))
        .with(file)
        .try_init()
        .ok();

    Ok(())
}
