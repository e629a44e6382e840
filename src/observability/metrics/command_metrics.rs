//! # Command Metrics
//!
//! Metrics for external command executions.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{Histogram, IntCounterVec};
use std::sync::LazyLock;

static COMMAND_FAILURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "keychain_command_failures_total",
            "Total number of failed external commands by failure reason",
        ),
        &["reason"],
    )
    .expect("Failed to create COMMAND_FAILURES_TOTAL metric - this should never happen")
});

static COMMAND_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "keychain_command_duration_seconds",
            "Duration of successful external commands in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create COMMAND_DURATION metric - this should never happen")
});

pub(crate) fn register_command_metrics() -> Result<()> {
    REGISTRY.register(Box::new(COMMAND_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(COMMAND_DURATION.clone()))?;
    Ok(())
}

pub fn increment_command_failures(reason: &str) {
    COMMAND_FAILURES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn observe_command_duration(duration: f64) {
    COMMAND_DURATION.observe(duration);
}
