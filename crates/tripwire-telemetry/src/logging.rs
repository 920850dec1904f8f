//! Structured logging initialization.

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the default `info,tripwire=debug` filter. With
/// `RUST_ENV=production` lines are JSON, otherwise pretty-printed.
pub fn init_logging() -> TelemetryResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tripwire=debug"));

    let is_production = std::env::var("RUST_ENV")
        .map(|v| v == "production")
        .unwrap_or(false);

    let result = if is_production {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(true))
            .try_init()
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
