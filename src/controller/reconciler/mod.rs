//! # Reconciler
//!
//! One reconcile cycle for a KeychainSecret:
//!
//! 1. Read the KeychainSecret. Gone means deleted: nothing to do.
//! 2. Validate it into a [`SecretRequest`].
//! 3. Get or provision the identity for its namespace.
//! 4. Create, rotate or leave alone the managed Secret.
//! 5. Requeue after `ttl` so rotation does not depend on watch events.
//!
//! Errors are returned, never raised as panics; the error policy turns them
//! into requeues using [`Reconciler::requeue_after_error`].

mod error;
mod status;

pub use error::{ReconcileError, Retry};
pub use status::{failure_status, success_status, DiscardStatus, KubeStatusReporter, StatusReporter};

use crate::command::CommandRunner;
use crate::config::ControllerConfig;
use crate::constants::{
    DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, IDENTITY_BACKOFF_MAX_MINUTES,
    IDENTITY_BACKOFF_MIN_MINUTES,
};
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::clock::{Clock, SystemClock};
use crate::controller::identity::IdentityProvisioner;
use crate::controller::sync::SecretSynchronizer;
use crate::controller::types::{SecretRequest, SyncAction};
use crate::crd::{KeychainSecret, KeychainSecretStatus};
use crate::observability;
use crate::store::{ObjectKey, ObjectStore};
use k8s_openapi::api::core::v1::Secret;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};

/// Result of a successful reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Synced; reconcile again after `after` (the request's TTL)
    Requeue { action: SyncAction, after: Duration },
    /// The KeychainSecret no longer exists
    Deleted,
}

/// Shared reconcile context
pub struct Reconciler {
    requests: Arc<dyn ObjectStore<KeychainSecret>>,
    identities: IdentityProvisioner,
    synchronizer: SecretSynchronizer,
    clock: Arc<dyn Clock>,
    status: Arc<dyn StatusReporter>,
    /// Per-resource backoff, keyed by `namespace/name`. Only touched by the
    /// error policy and cleared on success.
    pub backoff_states: Mutex<HashMap<String, FibonacciBackoff>>,
    sync_retry: Duration,
    conflict_retry: Duration,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("identities", &self.identities)
            .field("clock", &self.clock)
            .field("sync_retry", &self.sync_retry)
            .field("conflict_retry", &self.conflict_retry)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Build a reconciler from configuration. Managed Secrets and identities
    /// share `secrets`; KeychainSecrets are read from `requests`.
    pub fn new(
        config: &ControllerConfig,
        secrets: Arc<dyn ObjectStore<Secret>>,
        requests: Arc<dyn ObjectStore<KeychainSecret>>,
        runner: CommandRunner,
    ) -> Self {
        let commands = config.keychain_commands(runner);
        Self {
            requests,
            identities: IdentityProvisioner::new(
                Arc::clone(&secrets),
                commands.clone(),
                config.controller_namespace.clone(),
                config.provision_params(),
            ),
            synchronizer: SecretSynchronizer::new(secrets, commands),
            clock: Arc::new(SystemClock),
            status: Arc::new(DiscardStatus),
            backoff_states: Mutex::new(HashMap::new()),
            sync_retry: config.sync_retry,
            conflict_retry: config.conflict_retry,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_status_reporter(mut self, status: Arc<dyn StatusReporter>) -> Self {
        self.status = status;
        self
    }

    /// Reconcile the KeychainSecret at `key`
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when any stage fails. The failure is also
    /// written to the resource status when the resource could be read.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ReconcileError> {
        let span = tracing::info_span!(
            "controller.reconcile",
            resource.name = %key.name,
            resource.namespace = %key.namespace,
        );
        async {
            let started = Instant::now();
            observability::metrics::increment_reconciliations();

            let resource = match self.requests.get(key).await {
                Ok(resource) => resource,
                Err(e) if e.is_not_found() => {
                    debug!("KeychainSecret not found, assuming deleted");
                    self.reset_backoff(key);
                    return Ok(ReconcileOutcome::Deleted);
                }
                Err(e) => return Err(self.failed(ReconcileError::Store(e))),
            };

            let result = self.reconcile_resource(key, &resource).await;
            observability::metrics::observe_reconciliation_duration(
                started.elapsed().as_secs_f64(),
            );

            match result {
                Ok((outcome, status)) => {
                    self.reset_backoff(key);
                    self.report_status(&resource, status).await;
                    Ok(outcome)
                }
                Err(e) => {
                    let status = failure_status(&e, resource.status.as_ref());
                    self.report_status(&resource, status).await;
                    Err(self.failed(e))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn reconcile_resource(
        &self,
        key: &ObjectKey,
        resource: &KeychainSecret,
    ) -> Result<(ReconcileOutcome, KeychainSecretStatus), ReconcileError> {
        let request = SecretRequest::try_from(resource)?;
        let owner_key = key.namespace.as_str();

        let identity = self
            .identities
            .get_or_create(owner_key)
            .await
            .map_err(ReconcileError::Identity)?;

        let existing = self
            .synchronizer
            .current(owner_key, &request)
            .await
            .map_err(ReconcileError::Sync)?;
        let outcome = self
            .synchronizer
            .sync(owner_key, &identity, &request, existing, self.clock.now())
            .await
            .map_err(ReconcileError::Sync)?;

        info!(
            action = %outcome.action,
            secret = %outcome.secret.name(),
            requeue_secs = request.ttl.as_secs(),
            "reconcile complete"
        );
        Ok((
            ReconcileOutcome::Requeue {
                action: outcome.action,
                after: request.ttl,
            },
            success_status(&outcome),
        ))
    }

    /// Delay before retrying `key` after `error`, or `None` to wait for the
    /// resource to change
    ///
    /// Backoff errors advance the per-resource Fibonacci sequence (1 to 10
    /// minutes). A poisoned backoff map falls back to a fixed delay.
    pub fn requeue_after_error(&self, key: &ObjectKey, error: &ReconcileError) -> Option<Duration> {
        match error.retry() {
            Retry::AwaitChange => None,
            Retry::Conflict => Some(self.conflict_retry),
            Retry::Fixed => Some(self.sync_retry),
            Retry::Backoff => {
                let seconds = match self.backoff_states.lock() {
                    Ok(mut states) => {
                        let backoff = states.entry(key.to_string()).or_insert_with(|| {
                            FibonacciBackoff::new(
                                IDENTITY_BACKOFF_MIN_MINUTES,
                                IDENTITY_BACKOFF_MAX_MINUTES,
                            )
                        });
                        backoff.next_backoff_seconds()
                    }
                    Err(e) => {
                        warn!("Failed to lock backoff_states: {}, using default backoff", e);
                        DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS
                    }
                };
                Some(Duration::from_secs(seconds))
            }
        }
    }

    fn reset_backoff(&self, key: &ObjectKey) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(&key.to_string());
        }
    }

    fn failed(&self, error: ReconcileError) -> ReconcileError {
        observability::metrics::increment_reconciliation_errors(error.stage());
        warn!(stage = error.stage(), error = %error, "reconcile failed");
        error
    }

    // Skips the write when nothing changed, so an up-to-date resource does
    // not trigger a watch event every TTL.
    async fn report_status(&self, resource: &KeychainSecret, status: KeychainSecretStatus) {
        if resource.status.as_ref() == Some(&status) {
            debug!("status unchanged, skipping update");
            return;
        }
        if let Err(e) = self.status.report(resource, &status).await {
            warn!(error = %e, "failed to update KeychainSecret status");
        }
    }
}
