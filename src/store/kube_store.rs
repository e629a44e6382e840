//! # Kubernetes-backed Store
//!
//! [`ObjectStore`] over `kube::Api`, mapping API status codes onto
//! [`StoreError`] variants.

use crate::store::{merge_patch, ObjectKey, ObjectStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::debug;

/// Namespaced object store talking to the API server
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Debug for KubeStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl<K> Clone for KubeStore<K> {
    fn clone(&self) -> Self {
        Self::new(self.client.clone())
    }
}

impl<K> KubeStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug,
{
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn kind() -> String {
        K::kind(&()).into_owned()
    }

    fn map_error(err: kube::Error, key: &ObjectKey) -> StoreError {
        match err {
            kube::Error::Api(ref status) if status.code == 404 => StoreError::NotFound {
                kind: Self::kind(),
                key: key.clone(),
            },
            kube::Error::Api(ref status) if status.code == 409 && status.reason == "AlreadyExists" => {
                StoreError::AlreadyExists {
                    kind: Self::kind(),
                    key: key.clone(),
                }
            }
            kube::Error::Api(ref status) if status.code == 409 => StoreError::Conflict {
                kind: Self::kind(),
                key: key.clone(),
            },
            other => StoreError::Api(other),
        }
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, key: &ObjectKey) -> Result<K, StoreError> {
        self.api(&key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| Self::map_error(e, key))
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj);
        self.api(&key.namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| Self::map_error(e, &key))
    }

    async fn patch(&self, obj: &K, baseline: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(baseline);
        let resource_version = baseline
            .meta()
            .resource_version
            .clone()
            .ok_or(StoreError::MissingMetadata("resourceVersion"))?;

        let mut patch = merge_patch(&serde_json::to_value(baseline)?, &serde_json::to_value(obj)?);
        // Pin the baseline version so a concurrent write is rejected with 409
        if let Some(fields) = patch.as_object_mut() {
            let metadata = fields
                .entry("metadata")
                .or_insert_with(|| serde_json::json!({}));
            if let Some(metadata) = metadata.as_object_mut() {
                metadata.insert(
                    "resourceVersion".to_string(),
                    serde_json::Value::String(resource_version),
                );
            }
        }
        debug!(object = %key, "patching {}", Self::kind());

        self.api(&key.namespace)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| Self::map_error(e, &key))
    }
}
