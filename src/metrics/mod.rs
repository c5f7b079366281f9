//! Prometheus metrics for pause/resume passes
//!
//! Counters are always recorded; the HTTP endpoint only runs when a metrics
//! port is configured.

mod prometheus;

pub use prometheus::*;
