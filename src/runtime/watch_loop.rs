//! # Watch Loop
//!
//! Drives the reconciler from KeychainSecret events across all namespaces.
//! Managed Secrets are watched too, so deleting or editing one brings its
//! KeychainSecret back for reconcile.

use crate::constants::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use crate::controller::{ReconcileError, ReconcileOutcome, Reconciler};
use crate::crd::KeychainSecret;
use crate::runtime::error_policy::handle_reconciliation_error;
use crate::runtime::server::ServerState;
use crate::store::ObjectKey;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use kube_runtime::controller::{Action, Controller};
use kube_runtime::watcher;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Run the controller until a shutdown signal arrives
pub async fn run_watch_loop(client: Client, reconciler: Arc<Reconciler>, server_state: Arc<ServerState>) {
    let requests: Api<KeychainSecret> = Api::all(client.clone());
    let secrets: Api<Secret> = Api::all(client);
    let managed = watcher::Config::default().labels(&format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE}"));

    info!("Starting KeychainSecret watch loop");
    Controller::new(requests, watcher::Config::default())
        .owns(secrets, managed)
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => debug!(resource = %obj, ?action, "reconciled"),
                Err(e) => warn!("Controller stream error: {}", e),
            }
        })
        .await;

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("Watch loop stopped");
}

async fn reconcile(obj: Arc<KeychainSecret>, ctx: Arc<Reconciler>) -> Result<Action, ReconcileError> {
    match ctx.reconcile(&ObjectKey::of(obj.as_ref())).await? {
        ReconcileOutcome::Requeue { after, .. } => Ok(Action::requeue(after)),
        ReconcileOutcome::Deleted => Ok(Action::await_change()),
    }
}
