//! # Identity Provisioner
//!
//! Ensures each owner key (the namespace of a KeychainSecret) has a
//! certificate identity before any secret is fetched on its behalf.
//!
//! Identities live in the controller's own namespace rather than the owner's,
//! so only the controller decides who may turn KeychainSecrets into Secrets.
//! Namespace names are unique cluster-wide, which makes the owner key a
//! unique Secret name there as well.
//!
//! Identities are created once and never rotated or deleted here.

use crate::command::{KeychainCommands, ProvisionIdentityParams};
use crate::constants::{IDENTITY_CERT_KEY, MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use crate::controller::error::ControllerError;
use crate::controller::types::Identity;
use crate::observability;
use crate::store::{ObjectKey, ObjectStore};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct IdentityProvisioner {
    store: Arc<dyn ObjectStore<Secret>>,
    commands: KeychainCommands,
    namespace: String,
    params: ProvisionIdentityParams,
}

impl std::fmt::Debug for IdentityProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityProvisioner")
            .field("namespace", &self.namespace)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl IdentityProvisioner {
    pub fn new(
        store: Arc<dyn ObjectStore<Secret>>,
        commands: KeychainCommands,
        namespace: impl Into<String>,
        params: ProvisionIdentityParams,
    ) -> Self {
        Self {
            store,
            commands,
            namespace: namespace.into(),
            params,
        }
    }

    /// Return the identity for `owner_key`, provisioning it on first use
    ///
    /// Concurrent calls for the same key may both run the provisioning
    /// command; the store keeps whichever create lands first and every caller
    /// returns that object.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] if the lookup fails for a reason other than
    /// NotFound, the provisioning command fails, or the create fails for a
    /// reason other than AlreadyExists.
    pub async fn get_or_create(&self, owner_key: &str) -> Result<Identity, ControllerError> {
        let key = ObjectKey::new(&self.namespace, owner_key);

        match self.store.get(&key).await {
            Ok(secret) => return Ok(Identity::new(owner_key, secret)),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        info!(identity = %key, "provisioning service identity");
        let certificate = self.commands.provision_identity(&self.params).await?;

        match self.store.create(&identity_secret(&key, certificate)).await {
            Ok(created) => {
                observability::metrics::increment_identities_provisioned();
                info!(identity = %key, "service identity created");
                Ok(Identity::new(owner_key, created))
            }
            Err(e) if e.is_already_exists() => {
                debug!(identity = %key, "identity created concurrently, using stored copy");
                let stored = self.store.get(&key).await?;
                Ok(Identity::new(owner_key, stored))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn identity_secret(key: &ObjectKey, certificate: Vec<u8>) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(key.name.clone()),
            namespace: Some(key.namespace.clone()),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                MANAGED_BY_VALUE.to_string(),
            )])),
            ..ObjectMeta::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(BTreeMap::from([(
            IDENTITY_CERT_KEY.to_string(),
            ByteString(certificate),
        )])),
        ..Secret::default()
    }
}
