//! # In-memory Store
//!
//! An [`ObjectStore`] kept in a map, with resourceVersion bookkeeping that
//! mirrors the API server: every write bumps the version and a patch against
//! a stale baseline is rejected. Used by tests and local dry runs.

use crate::store::{apply_merge_patch, merge_patch, ObjectKey, ObjectStore, StoreError};
use async_trait::async_trait;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Map-backed object store
#[derive(Debug)]
pub struct MemoryStore<K> {
    objects: Mutex<BTreeMap<ObjectKey, K>>,
    version: AtomicU64,
    creates: AtomicUsize,
    patches: AtomicUsize,
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            version: AtomicU64::new(0),
            creates: AtomicUsize::new(0),
            patches: AtomicUsize::new(0),
        }
    }
}

impl<K> MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting it as a write
    pub fn insert(&self, mut obj: K) -> K {
        obj.meta_mut().resource_version = Some(self.next_version());
        self.lock().insert(ObjectKey::of(&obj), obj.clone());
        obj
    }

    /// Snapshot of a stored object
    pub fn object(&self, key: &ObjectKey) -> Option<K> {
        self.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of successful creates
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of successful patches
    pub fn patch_count(&self) -> usize {
        self.patches.load(Ordering::SeqCst)
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ObjectKey, K>> {
        // A panic while holding the lock leaves the map itself consistent
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn kind() -> String {
        K::kind(&()).into_owned()
    }
}

#[async_trait]
impl<K> ObjectStore<K> for MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &ObjectKey) -> Result<K, StoreError> {
        self.lock().get(key).cloned().ok_or_else(|| StoreError::NotFound {
            kind: Self::kind(),
            key: key.clone(),
        })
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj);
        let mut objects = self.lock();
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: Self::kind(),
                key,
            });
        }
        let mut stored = obj.clone();
        stored.meta_mut().resource_version = Some(self.next_version());
        objects.insert(key, stored.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn patch(&self, obj: &K, baseline: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(baseline);
        let patch = merge_patch(&serde_json::to_value(baseline)?, &serde_json::to_value(obj)?);

        let mut objects = self.lock();
        let current = objects.get(&key).ok_or_else(|| StoreError::NotFound {
            kind: Self::kind(),
            key: key.clone(),
        })?;
        if current.meta().resource_version != baseline.meta().resource_version {
            return Err(StoreError::Conflict {
                kind: Self::kind(),
                key,
            });
        }

        let mut doc = serde_json::to_value(current)?;
        apply_merge_patch(&mut doc, &patch);
        let mut stored: K = serde_json::from_value(doc)?;
        stored.meta_mut().resource_version = Some(self.next_version());
        objects.insert(key, stored.clone());
        self.patches.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;

    fn secret(name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("payments".to_string()),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_create_again_is_already_exists() {
        let store = MemoryStore::<Secret>::new();
        store.create(&secret("db")).await.unwrap();
        let err = store.create(&secret("db")).await.unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(store.create_count(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::<Secret>::new();
        let err = store.get(&ObjectKey::new("payments", "db")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_stale_baseline_conflicts() {
        let store = MemoryStore::<Secret>::new();
        let baseline = store.create(&secret("db")).await.unwrap();

        let mut first = baseline.clone();
        first.type_ = Some("Opaque".to_string());
        store.patch(&first, &baseline).await.unwrap();

        let err = store.patch(&first, &baseline).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.patch_count(), 1);
    }
}
