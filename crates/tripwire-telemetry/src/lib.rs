//! Prometheus metrics and structured logging for tripwire.
//!
//! - `init_logging`: tracing subscriber, JSON in production
//! - `Metrics`: facade over the process-wide Prometheus registry

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::{Metrics, PlacementOutcome};
