//! # Secret Synchronizer
//!
//! Creates the managed Secret on first sight and rotates it once its TTL has
//! elapsed. The Keychain is only queried when a write is about to happen.

use crate::command::{FetchSecretParams, KeychainCommands};
use crate::constants::{LAST_UPDATE_ANNOTATION, MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use crate::controller::error::ControllerError;
use crate::controller::types::{Identity, ManagedSecret, SecretRequest, SyncAction, SyncOutcome};
use crate::observability;
use crate::store::{ObjectKey, ObjectStore};
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

pub struct SecretSynchronizer {
    store: Arc<dyn ObjectStore<Secret>>,
    commands: KeychainCommands,
}

impl std::fmt::Debug for SecretSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretSynchronizer").finish_non_exhaustive()
    }
}

impl SecretSynchronizer {
    pub fn new(store: Arc<dyn ObjectStore<Secret>>, commands: KeychainCommands) -> Self {
        Self { store, commands }
    }

    /// The managed Secret for `request` in `owner_key`, if it exists
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] for lookup failures other than NotFound.
    pub async fn current(
        &self,
        owner_key: &str,
        request: &SecretRequest,
    ) -> Result<Option<ManagedSecret>, ControllerError> {
        match self
            .store
            .get(&ObjectKey::new(owner_key, &request.secret_name))
            .await
        {
            Ok(secret) => Ok(Some(ManagedSecret::new(secret))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Create, rotate or leave alone the managed Secret
    ///
    /// - no `existing` Secret: fetch and create it
    /// - `existing` is due (`now >= lastUpdate + ttl`): fetch and patch it
    ///   against `existing` as the baseline
    /// - otherwise: no fetch, no write
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] if the fetch or the store write fails. The
    /// fetched value is dropped on failure and never reaches the store.
    pub async fn sync(
        &self,
        owner_key: &str,
        identity: &Identity,
        request: &SecretRequest,
        existing: Option<ManagedSecret>,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome, ControllerError> {
        let key = ObjectKey::new(owner_key, &request.secret_name);

        let Some(existing) = existing else {
            let value = self.fetch(identity, request).await?;
            let created = self
                .store
                .create(&new_secret(&key, request, &value, now))
                .await?;
            observability::metrics::increment_secrets_created();
            info!(secret = %key, "created secret from keychain");
            return Ok(SyncOutcome {
                action: SyncAction::Created,
                secret: ManagedSecret::new(created),
            });
        };

        if !existing.is_due(request.ttl, now) {
            debug!(
                secret = %key,
                last_update = ?existing.last_update(),
                "secret is fresh, skipping fetch"
            );
            return Ok(SyncOutcome {
                action: SyncAction::Unchanged,
                secret: existing,
            });
        }

        let value = self.fetch(identity, request).await?;
        let rotated = rotated_secret(existing.secret(), request, &value, now);
        let patched = self.store.patch(&rotated, existing.secret()).await?;
        observability::metrics::increment_secrets_rotated();
        info!(secret = %key, "rotated secret from keychain");
        Ok(SyncOutcome {
            action: SyncAction::Rotated,
            secret: ManagedSecret::new(patched),
        })
    }

    async fn fetch(
        &self,
        identity: &Identity,
        request: &SecretRequest,
    ) -> Result<Zeroizing<Vec<u8>>, ControllerError> {
        let params = FetchSecretParams {
            name: request.name.clone(),
            group: request.group.clone(),
            identity: identity.name().to_string(),
        };
        Ok(self.commands.fetch_secret(&params).await?)
    }
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn secret_data(request: &SecretRequest, value: &[u8]) -> BTreeMap<String, ByteString> {
    BTreeMap::from([(request.name.clone(), ByteString(value.to_vec()))])
}

fn new_secret(key: &ObjectKey, request: &SecretRequest, value: &[u8], now: DateTime<Utc>) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(key.name.clone()),
            namespace: Some(key.namespace.clone()),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                MANAGED_BY_VALUE.to_string(),
            )])),
            annotations: Some(BTreeMap::from([(
                LAST_UPDATE_ANNOTATION.to_string(),
                timestamp(now),
            )])),
            owner_references: request.owner_reference.clone().map(|owner| vec![owner]),
            ..ObjectMeta::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(secret_data(request, value)),
        ..Secret::default()
    }
}

fn rotated_secret(
    existing: &Secret,
    request: &SecretRequest,
    value: &[u8],
    now: DateTime<Utc>,
) -> Secret {
    let mut rotated = existing.clone();
    rotated
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(LAST_UPDATE_ANNOTATION.to_string(), timestamp(now));
    rotated.data = Some(secret_data(request, value));
    rotated
}
