//! Logging initialization
//!
//! One entry point for the binary. Filtering follows `RUST_LOG` when set.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for terminals
    Pretty,
    /// One JSON object per line, for log shippers
    Json,
}

impl LogFormat {
    /// `TWACK_LOG_FORMAT=json` selects JSON, anything else is pretty
    pub fn from_env() -> Self {
        match std::env::var("TWACK_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

static INIT_ONCE: Once = Once::new();

/// Install the global subscriber. Later calls are no-ops.
pub fn init(format: LogFormat, verbose: bool) {
    INIT_ONCE.call_once(|| {
        let default = if verbose { "twack=debug" } else { "twack=info" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);

        match format {
            LogFormat::Pretty => builder.with_target(false).init(),
            LogFormat::Json => builder.json().init(),
        }
    });
}
