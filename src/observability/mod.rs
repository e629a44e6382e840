//! # Observability
//!
//! Prometheus metrics. Logging goes through `tracing` directly.

pub mod metrics;
