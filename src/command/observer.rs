//! # Command Observer
//!
//! Structured events emitted by the command runner. The runner never logs
//! directly; it reports to an injected observer so callers decide where the
//! events go (tracing + metrics in production, a recorder in tests).

use crate::observability;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Event describing one command invocation outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
    /// Executable could not be resolved on the search path
    NotFound { executable: String },
    /// Command exceeded its deadline and was killed
    TimedOut {
        executable: String,
        timeout_secs: u64,
    },
    /// Command exited non-zero
    Failed {
        executable: String,
        code: Option<i32>,
        output_len: usize,
    },
    /// Command exited zero
    Succeeded {
        executable: String,
        elapsed: Duration,
        output_len: usize,
    },
}

/// Sink for command events
pub trait CommandObserver: Send + Sync + std::fmt::Debug {
    fn observe(&self, event: &CommandEvent);
}

/// Default observer: structured `tracing` logs plus Prometheus counters
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CommandObserver for TracingObserver {
    fn observe(&self, event: &CommandEvent) {
        match event {
            CommandEvent::NotFound { executable } => {
                error!(command = %executable, "didn't find executable on PATH");
                observability::metrics::increment_command_failures("not_found");
            }
            CommandEvent::TimedOut {
                executable,
                timeout_secs,
            } => {
                warn!(command = %executable, timeout_secs, "command timed out");
                observability::metrics::increment_command_failures("timeout");
            }
            CommandEvent::Failed {
                executable,
                code,
                output_len,
            } => {
                // Output may hold secret material; log its size only.
                warn!(
                    command = %executable,
                    exit_code = ?code,
                    output_bytes = output_len,
                    "command returned non-zero"
                );
                observability::metrics::increment_command_failures("exit");
            }
            CommandEvent::Succeeded {
                executable,
                elapsed,
                output_len,
            } => {
                debug!(
                    command = %executable,
                    elapsed_secs = elapsed.as_secs_f64(),
                    output_bytes = output_len,
                    "command completed"
                );
                observability::metrics::observe_command_duration(elapsed.as_secs_f64());
            }
        }
    }
}
