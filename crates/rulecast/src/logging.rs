//! Log output for the command line tool.
//!
//! Filtering follows `RULECAST_LOG` (an `EnvFilter` directive such as
//! `rulecast_core=debug`). Logs always go to stderr so that reports on
//! stdout stay machine-readable.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV: &str = "RULECAST_LOG";

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose),
        )
        .try_init();
}
