//! Tracing initialisation for the FLEXPART binaries.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored since
//! the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines for interactive runs.
    #[default]
    Pretty,
    /// Newline-delimited JSON for batch schedulers and log shipping.
    Json,
}

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `level` applies to every target.
pub fn init_tracing(format: LogFormat, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok(),
    };
}
