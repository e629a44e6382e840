//! # Status Management
//!
//! Writes reconcile results to the KeychainSecret status subresource.
//! Reporting is best-effort: a failed status write is logged and never fails
//! the cycle that produced it.

use crate::constants::FIELD_MANAGER;
use crate::controller::reconciler::error::ReconcileError;
use crate::controller::types::{SyncAction, SyncOutcome};
use crate::crd::{KeychainSecret, KeychainSecretStatus};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::SecretReference;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};

/// Destination for KeychainSecret status updates
#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// # Errors
    ///
    /// Returns the API error if the status could not be written.
    async fn report(
        &self,
        resource: &KeychainSecret,
        status: &KeychainSecretStatus,
    ) -> Result<(), kube::Error>;
}

/// Patches `/status` through the API server
#[derive(Clone)]
pub struct KubeStatusReporter {
    client: Client,
}

impl std::fmt::Debug for KubeStatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStatusReporter").finish_non_exhaustive()
    }
}

impl KubeStatusReporter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusReporter for KubeStatusReporter {
    async fn report(
        &self,
        resource: &KeychainSecret,
        status: &KeychainSecretStatus,
    ) -> Result<(), kube::Error> {
        let api: Api<KeychainSecret> = Api::namespaced(
            self.client.clone(),
            resource.metadata.namespace.as_deref().unwrap_or("default"),
        );
        let patch = serde_json::json!({ "status": status });
        api.patch_status(
            resource.metadata.name.as_deref().unwrap_or_default(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(patch),
        )
        .await?;
        Ok(())
    }
}

/// Drops every update. Used when no status subresource is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardStatus;

#[async_trait]
impl StatusReporter for DiscardStatus {
    async fn report(
        &self,
        _resource: &KeychainSecret,
        _status: &KeychainSecretStatus,
    ) -> Result<(), kube::Error> {
        Ok(())
    }
}

/// Status after a successful sync
pub fn success_status(outcome: &SyncOutcome) -> KeychainSecretStatus {
    let (reason, message) = match outcome.action {
        SyncAction::Created => ("Created", "Secret created from keychain"),
        SyncAction::Rotated => ("Rotated", "Secret rotated from keychain"),
        SyncAction::Unchanged => ("UpToDate", "Secret is up to date"),
    };
    KeychainSecretStatus {
        secret_ref: Some(SecretReference {
            name: Some(outcome.secret.name().to_string()),
            namespace: outcome.secret.secret().metadata.namespace.clone(),
        }),
        last_update: outcome
            .secret
            .last_update()
            .map(|time| time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
        message: Some(message.to_string()),
        reason: Some(reason.to_string()),
    }
}

/// Status after a failed cycle. The Secret reference and last update time
/// from the previous status are kept, since the Secret itself is untouched.
pub fn failure_status(
    error: &ReconcileError,
    previous: Option<&KeychainSecretStatus>,
) -> KeychainSecretStatus {
    KeychainSecretStatus {
        secret_ref: previous.and_then(|s| s.secret_ref.clone()),
        last_update: previous.and_then(|s| s.last_update.clone()),
        message: Some(error.to_string()),
        reason: Some(error.reason().to_string()),
    }
}
