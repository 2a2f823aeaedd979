//! Observability for the view
//!
//! - Structured JSON logging with deterministic key ordering
//! - Typed lifecycle events
//! - Per-layer fan-out telemetry with counter aggregation
//!
//! Observability is read-only: nothing here influences request outcomes,
//! and a failing log write is ignored.
//!
//! # Usage
//!
//! ```ignore
//! use layerview::observability::{log_event, Event, FederationMetrics};
//!
//! log_event(Event::RoundStart, &[("layers", "3")]);
//!
//! let metrics = FederationMetrics::new();
//! println!("{}", metrics.snapshot().to_json());
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity, LOG_LEVEL_ENV};
pub use metrics::{
    FederationMetrics, LayerReport, LayerStatus, LayerTelemetry, MetricsSnapshot, NoOpTelemetry,
    RoundKind,
};
pub use scope::{ObservationScope, Timer};

/// Log an event at its own severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
