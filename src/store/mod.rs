//! # Object Store
//!
//! The controller reads and writes cluster objects through three verbs only:
//! `get`, `create` and `patch`. Patches are merged against a previously read
//! baseline and conditioned on its `resourceVersion`, so concurrent writers
//! surface as [`StoreError::Conflict`] rather than lost updates.

mod kube_store;
mod memory;

pub use kube_store::KubeStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use kube::Resource;
use std::fmt;
use thiserror::Error;

/// Namespaced object coordinates
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing object, from its metadata
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self::new(
            obj.meta().namespace.as_deref().unwrap_or("default"),
            obj.meta().name.as_deref().unwrap_or_default(),
        )
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Store failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: ObjectKey },
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: ObjectKey },
    /// The baseline's resourceVersion is stale
    #[error("conflict writing {kind} {key}: object was modified")]
    Conflict { kind: String, key: ObjectKey },
    #[error("object is missing metadata.{0}")]
    MissingMetadata(&'static str),
    #[error("failed to build patch: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("API error: {0}")]
    Api(#[from] kube::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// get / create / patch over one object type
#[async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Send + Sync,
{
    /// Fetch an object. A missing object is [`StoreError::NotFound`].
    async fn get(&self, key: &ObjectKey) -> Result<K, StoreError>;

    /// Create an object. An existing object is [`StoreError::AlreadyExists`].
    async fn create(&self, obj: &K) -> Result<K, StoreError>;

    /// Merge `obj` over `baseline`, conditioned on the baseline's
    /// resourceVersion. A stale baseline is [`StoreError::Conflict`].
    async fn patch(&self, obj: &K, baseline: &K) -> Result<K, StoreError>;
}

/// Compute a JSON merge patch (RFC 7386) turning `base` into `target`
pub fn merge_patch(base: &serde_json::Value, target: &serde_json::Value) -> serde_json::Value {
    use serde_json::{Map, Value};

    match (base, target) {
        (Value::Object(base), Value::Object(target)) => {
            let mut patch = Map::new();
            for (key, target_value) in target {
                match base.get(key) {
                    Some(base_value) if base_value == target_value => {}
                    Some(base_value) => {
                        patch.insert(key.clone(), merge_patch(base_value, target_value));
                    }
                    None => {
                        patch.insert(key.clone(), target_value.clone());
                    }
                }
            }
            for key in base.keys() {
                if !target.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(patch)
        }
        _ => target.clone(),
    }
}

/// Apply a JSON merge patch (RFC 7386) in place
pub fn apply_merge_patch(doc: &mut serde_json::Value, patch: &serde_json::Value) {
    use serde_json::{Map, Value};

    let Value::Object(patch) = patch else {
        *doc = patch.clone();
        return;
    };
    if !doc.is_object() {
        *doc = Value::Object(Map::new());
    }
    if let Value::Object(doc) = doc {
        for (key, value) in patch {
            if value.is_null() {
                doc.remove(key);
            } else {
                apply_merge_patch(doc.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
