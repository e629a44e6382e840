//! # Error Policy
//!
//! Turns reconcile errors into requeue actions for the watch loop.

use crate::controller::{ReconcileError, Reconciler};
use crate::crd::KeychainSecret;
use crate::observability;
use crate::store::ObjectKey;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{info, warn};

/// Map a reconcile error to a requeue
///
/// Invalid resources wait for a change; everything else is retried on a
/// schedule chosen by [`Reconciler::requeue_after_error`].
pub fn handle_reconciliation_error(
    obj: Arc<KeychainSecret>,
    error: &ReconcileError,
    ctx: Arc<Reconciler>,
) -> Action {
    let key = ObjectKey::of(obj.as_ref());

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = %key.name,
        resource.namespace = %key.namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    if let Some(delay) = ctx.requeue_after_error(&key, error) {
        let next_trigger_time = chrono::Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        info!(
            "🔄 Retrying {} in {}s (stage: {}, next: {})",
            key,
            delay.as_secs(),
            error.stage(),
            next_trigger_time.to_rfc3339()
        );
        observability::metrics::increment_requeues_total(error.reason());
        Action::requeue(delay)
    } else {
        warn!(
            "⏸️ Not retrying {} until the resource changes: {}",
            key, error
        );
        Action::await_change()
    }
}
