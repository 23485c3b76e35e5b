//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Admission pipeline, forwarder, listeners
//!     → logging.rs (structured tracing events, x-request-id on every span)
//!     → metrics.rs (per-origin counters, fail-open and upstream error counters)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;

pub use logging::init_tracing;
pub use metrics::{PrometheusMetrics, TrafficMetrics};
