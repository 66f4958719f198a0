//! Tracing setup for the command-line front end.
//!
//! Logs go to stderr so stdout stays reserved for reports. `RUST_LOG`
//! overrides the default filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter: INFO for this crate, WARN for dependencies.
pub const DEFAULT_FILTER: &str = "bmtest=info,warn";
/// Filter used with `--verbose`.
pub const VERBOSE_FILTER: &str = "bmtest=debug,warn";

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    }
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();
}
