//! Log output for the `covweave` binary

use crate::config::Verbosity;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// `RUST_LOG` wins over the level chosen with `-v`/`-q`. Logs go to stderr so
/// report output on stdout stays machine-readable.
pub fn init_logging(verbosity: Verbosity, ansi: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));
    let terminal = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(verbosity.is_verbose())
        .compact();
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(terminal)
        .try_init();
}
