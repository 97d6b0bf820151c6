//! Push-based observability for candlecast
//!
//! Observability is **outbound only**: no HTTP server, no incoming requests.
//! Counters and gauges live in a Prometheus registry, and the reporter logs a
//! structured JSON snapshot on a fixed interval for log shippers to collect.

pub mod metrics;
pub mod reporter;

pub use metrics::Metrics;
pub use reporter::{MetricsReporter, PipelineProbe, PipelineSnapshot};
