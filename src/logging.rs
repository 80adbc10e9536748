//! Structured logging setup for the index core.
//!
//! The crate never decides where logs go — that's the embedder's call — but
//! it standardizes *how* spans and events are shaped so embedders get
//! consistent, parseable output if they do wire up `init_logger`.

use std::io;

use time::macros::format_description;
use time::UtcOffset;
use tracing_subscriber::{self, fmt, prelude::*};

/// Initializes a `tracing` subscriber writing to stderr with UTC timestamps.
///
/// Safe to call more than once (e.g. from multiple test binaries); a
/// double-init is swallowed rather than propagated as an error.
pub fn init_logger(no_color: bool, log_level: Option<&str>) -> io::Result<()> {
    let timer = fmt::time::OffsetTime::new(
        UtcOffset::UTC,
        format_description!("[[[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z]"),
    );

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer)
        .with_ansi(!no_color);

    let env_filter = match log_level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            if e.to_string().contains("already been set") || e.to_string().contains("SetLoggerError") {
                Ok(())
            } else {
                Err(io::Error::new(io::ErrorKind::Other, e))
            }
        }
    }
}
