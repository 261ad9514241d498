//! Observability: structured JSON logging, typed events and counters
//!
//! Observability is read-only. Logging never fails the operation being
//! logged, and nothing here spawns tasks or threads.
//!
//! ```ignore
//! use memberdb::observability::{log_event, Event, MetricsRegistry};
//!
//! log_event(Event::FieldAdded, &[("field", "flag"), ("backfilled", "6")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_fanout_calls();
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Logs an event at its own severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
