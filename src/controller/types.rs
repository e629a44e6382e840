//! # Controller Types
//!
//! Values passed between the reconciler, the identity provisioner and the
//! secret synchronizer.

use crate::constants::{IDENTITY_CERT_KEY, LAST_UPDATE_ANNOTATION};
use crate::controller::validation::{
    managed_secret_name, parse_ttl, validate_keychain_name, ValidationError,
};
use crate::crd::KeychainSecret;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use std::time::Duration;

/// One Keychain secret to materialize, validated from a KeychainSecret
///
/// Building a request is the only place the TTL is parsed, so a request that
/// exists always carries a usable duration.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretRequest {
    /// Keychain secret name, also the data key in the managed Secret
    pub name: String,
    pub group: Option<String>,
    pub ttl: Duration,
    /// Name of the managed Secret object
    pub secret_name: String,
    /// Reference making the KeychainSecret the managed Secret's controller
    pub owner_reference: Option<OwnerReference>,
}

impl TryFrom<&KeychainSecret> for SecretRequest {
    type Error = ValidationError;

    fn try_from(resource: &KeychainSecret) -> Result<Self, Self::Error> {
        if resource.meta().namespace.is_none() {
            return Err(ValidationError::MissingNamespace);
        }
        let spec = &resource.spec;
        validate_keychain_name("name", &spec.name)?;
        if let Some(group) = &spec.group {
            validate_keychain_name("group", group)?;
        }

        Ok(Self {
            name: spec.name.clone(),
            group: spec.group.clone(),
            ttl: parse_ttl(&spec.ttl)?,
            secret_name: managed_secret_name(&spec.name)?,
            owner_reference: resource.controller_owner_ref(&()),
        })
    }
}

/// Certificate identity for one owner key, stored in the controller namespace
#[derive(Debug, Clone)]
pub struct Identity {
    owner_key: String,
    secret: Secret,
}

impl Identity {
    pub fn new(owner_key: impl Into<String>, secret: Secret) -> Self {
        Self {
            owner_key: owner_key.into(),
            secret,
        }
    }

    /// Name of the Secret holding the certificate
    pub fn name(&self) -> &str {
        self.secret
            .metadata
            .name
            .as_deref()
            .unwrap_or(&self.owner_key)
    }

    pub fn certificate(&self) -> Option<&[u8]> {
        self.secret
            .data
            .as_ref()
            .and_then(|data| data.get(IDENTITY_CERT_KEY))
            .map(|bytes| bytes.0.as_slice())
    }
}

/// A Secret written by the synchronizer
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedSecret {
    secret: Secret,
}

impl ManagedSecret {
    pub fn new(secret: Secret) -> Self {
        Self { secret }
    }

    /// When the data was last fetched. `None` if the annotation is missing
    /// or not RFC3339.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.secret
            .metadata
            .annotations
            .as_ref()?
            .get(LAST_UPDATE_ANNOTATION)
            .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
            .map(|time| time.with_timezone(&Utc))
    }

    /// Whether `lastUpdate + ttl` has been reached at `now`
    ///
    /// A Secret with no readable `lastUpdate` is always due. A TTL too large
    /// to add to a timestamp never comes due.
    pub fn is_due(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let Some(last_update) = self.last_update() else {
            return true;
        };
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| last_update.checked_add_signed(ttl))
            .is_some_and(|deadline| now >= deadline)
    }

    pub fn data(&self, key: &str) -> Option<&[u8]> {
        self.secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .map(|bytes| bytes.0.as_slice())
    }

    pub fn name(&self) -> &str {
        self.secret.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    pub fn into_secret(self) -> Secret {
        self.secret
    }
}

/// What a sync did to the managed Secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Created,
    Rotated,
    Unchanged,
}

impl SyncAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncAction::Created => "created",
            SyncAction::Rotated => "rotated",
            SyncAction::Unchanged => "unchanged",
        }
    }
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one sync: the action taken and the Secret as now stored
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub action: SyncAction,
    pub secret: ManagedSecret,
}
