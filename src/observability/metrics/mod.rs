//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text encoding
//! - `controller_metrics` - Reconciliations, secrets, identities and requeues
//! - `command_metrics` - External command executions and failures

pub mod command_metrics;
pub mod controller_metrics;
pub mod registry;

pub use command_metrics::*;
pub use controller_metrics::*;
pub use registry::*;
