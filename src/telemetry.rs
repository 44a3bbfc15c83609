//! Tracing setup.
//!
//! Embedding hosts call [`init`] once at startup; library code only ever
//! emits through the `tracing` macros and works with or without a
//! subscriber installed.

use tracing::metadata::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::LoggingConfig;

const ENV_FILTER_VAR: &str = "PRODSYNC_LOG";

/// Install the global subscriber. A second call is a no-op so embedding
/// tests can race without panicking.
pub fn init(logging: &LoggingConfig) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_from_verbosity(logging.verbosity).into())
        .with_env_var(ENV_FILTER_VAR)
        .from_env_lossy();

    let fmt = logging.stdout.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    let _ = Registry::default().with(fmt).with(filter).try_init();
}

fn level_from_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    }
}
