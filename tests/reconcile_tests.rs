//! # Reconcile Tests
//!
//! Drives the reconciler against in-memory stores, a pinned clock and shell
//! scripts standing in for the Keychain commands.
//!
//! These tests verify:
//! - First reconcile provisions an identity and creates the managed Secret
//! - Rotation happens exactly when `lastUpdate + ttl` is reached
//! - Concurrent identity provisioning stores a single identity
//! - Deleted and invalid resources are handled without running commands
//! - Failures map to the expected requeue delays
//! - A rotation that loses its write keeps the previously stored value

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use k8s_openapi::api::core::v1::Secret;
use keychain_secret_controller::command::{CommandError, CommandRunner};
use keychain_secret_controller::config::ControllerConfig;
use keychain_secret_controller::constants::LAST_UPDATE_ANNOTATION;
use keychain_secret_controller::controller::reconciler::{Retry, StatusReporter};
use keychain_secret_controller::controller::{
    ControllerError, Identity, IdentityProvisioner, ManagedSecret, ManualClock, ReconcileError,
    ReconcileOutcome, Reconciler, SecretRequest, SecretSynchronizer, SyncAction,
};
use keychain_secret_controller::store::{MemoryStore, ObjectKey, ObjectStore, StoreError};
use keychain_secret_controller::{KeychainSecret, KeychainSecretSpec, KeychainSecretStatus};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const NAMESPACE: &str = "payments";
const CONTROLLER_NAMESPACE: &str = "keychain-system";

#[derive(Debug, Default)]
struct RecordingStatus {
    reports: Mutex<Vec<KeychainSecretStatus>>,
}

impl RecordingStatus {
    fn last_reason(&self) -> Option<String> {
        self.reports
            .lock()
            .unwrap()
            .last()
            .and_then(|status| status.reason.clone())
    }
}

#[async_trait]
impl StatusReporter for RecordingStatus {
    async fn report(
        &self,
        _resource: &KeychainSecret,
        status: &KeychainSecretStatus,
    ) -> Result<(), kube::Error> {
        self.reports.lock().unwrap().push(status.clone());
        Ok(())
    }
}

/// Reads and creates reach the wrapped store; every patch fails
struct RejectingPatches {
    inner: Arc<MemoryStore<Secret>>,
}

#[async_trait]
impl ObjectStore<Secret> for RejectingPatches {
    async fn get(&self, key: &ObjectKey) -> Result<Secret, StoreError> {
        self.inner.get(key).await
    }

    async fn create(&self, obj: &Secret) -> Result<Secret, StoreError> {
        self.inner.create(obj).await
    }

    async fn patch(&self, _obj: &Secret, _baseline: &Secret) -> Result<Secret, StoreError> {
        Err(StoreError::MissingMetadata("resourceVersion"))
    }
}

/// Scripts standing in for the Keychain, plus the stores they write to
struct Harness {
    dir: tempfile::TempDir,
    secrets: Arc<MemoryStore<Secret>>,
    requests: Arc<MemoryStore<KeychainSecret>>,
    clock: Arc<ManualClock>,
    status: Arc<RecordingStatus>,
    reconciler: Reconciler,
}

fn write_script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut permissions = std::fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).unwrap();
}

fn harness_config(dir: &Path) -> ControllerConfig {
    let base = dir.display();
    ControllerConfig::new(
        CONTROLLER_NAMESPACE,
        &format!("{base}/provision"),
        &format!("{base}/get-{{{{.Name}}}}"),
    )
    .unwrap()
}

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

impl Harness {
    /// `provision` is the identity command; the fetch command prints the
    /// contents of `value` and logs each call to `fetches`.
    fn new(provision: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().display().to_string();
        write_script(dir.path(), "provision", provision);
        write_script(
            dir.path(),
            "get-DB_PASSWORD",
            &format!("echo fetch >> {base}/fetches\ncat {base}/value"),
        );
        std::fs::write(dir.path().join("value"), b"hunter2").unwrap();

        let config = harness_config(dir.path());

        let secrets = Arc::new(MemoryStore::<Secret>::new());
        let requests = Arc::new(MemoryStore::<KeychainSecret>::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let status = Arc::new(RecordingStatus::default());
        let reconciler = Reconciler::new(
            &config,
            Arc::clone(&secrets) as _,
            Arc::clone(&requests) as _,
            CommandRunner::default(),
        )
        .with_clock(Arc::clone(&clock) as _)
        .with_status_reporter(Arc::clone(&status) as _);

        Self {
            dir,
            secrets,
            requests,
            clock,
            status,
            reconciler,
        }
    }

    fn with_cert() -> Self {
        Self::new("printf 'CERT'")
    }

    fn add_request(&self, ttl: &str) -> ObjectKey {
        let mut resource = KeychainSecret::new(
            "payments-db",
            KeychainSecretSpec {
                name: "DB_PASSWORD".to_string(),
                group: Some("PAYMENTS".to_string()),
                ttl: ttl.to_string(),
            },
        );
        resource.metadata.namespace = Some(NAMESPACE.to_string());
        resource.metadata.uid = Some("0d6c2b0e".to_string());
        self.requests.insert(resource);
        ObjectKey::new(NAMESPACE, "payments-db")
    }

    fn set_value(&self, value: &str) {
        std::fs::write(self.dir.path().join("value"), value).unwrap();
    }

    fn fetch_count(&self) -> usize {
        std::fs::read_to_string(self.dir.path().join("fetches"))
            .map(|log| log.lines().count())
            .unwrap_or(0)
    }

    fn identity(&self) -> Identity {
        let secret = self
            .secrets
            .object(&ObjectKey::new(CONTROLLER_NAMESPACE, NAMESPACE))
            .expect("identity exists");
        Identity::new(NAMESPACE, secret)
    }

    fn managed_secret(&self) -> ManagedSecret {
        ManagedSecret::new(
            self.secrets
                .object(&ObjectKey::new(NAMESPACE, "db-password"))
                .expect("managed secret exists"),
        )
    }
}

#[tokio::test]
async fn test_first_reconcile_creates_identity_and_secret() {
    let harness = Harness::with_cert();
    let key = harness.add_request("24h");

    let outcome = harness.reconciler.reconcile(&key).await.unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::Requeue {
            action: SyncAction::Created,
            after: Duration::from_secs(24 * 60 * 60),
        }
    );

    let identity = harness
        .secrets
        .object(&ObjectKey::new(CONTROLLER_NAMESPACE, NAMESPACE))
        .expect("identity stored in controller namespace");
    assert_eq!(identity.data.unwrap()["cert"].0, b"CERT");

    let managed = harness.managed_secret();
    assert_eq!(managed.data("DB_PASSWORD"), Some(&b"hunter2"[..]));
    assert_eq!(managed.last_update(), Some(start_time()));
    let owners = managed.secret().metadata.owner_references.clone().unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].kind, "KeychainSecret");
    assert_eq!(owners[0].name, "payments-db");

    assert_eq!(harness.secrets.create_count(), 2);
    assert_eq!(harness.fetch_count(), 1);
    assert_eq!(harness.status.last_reason().as_deref(), Some("Created"));
}

#[tokio::test]
async fn test_rotation_happens_exactly_at_ttl() {
    let harness = Harness::with_cert();
    let key = harness.add_request("1h");
    harness.reconciler.reconcile(&key).await.unwrap();

    // t < T + D: no fetch, no write
    harness.set_value("rotated");
    harness.clock.advance(chrono::Duration::seconds(3599));
    let outcome = harness.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Requeue {
            action: SyncAction::Unchanged,
            after: Duration::from_secs(3600),
        }
    );
    assert_eq!(harness.secrets.patch_count(), 0);
    assert_eq!(harness.fetch_count(), 1);
    assert_eq!(harness.managed_secret().data("DB_PASSWORD"), Some(&b"hunter2"[..]));

    // t == T + D: exactly one patch with a new lastUpdate
    harness.clock.advance(chrono::Duration::seconds(1));
    let outcome = harness.reconciler.reconcile(&key).await.unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Requeue {
            action: SyncAction::Rotated,
            ..
        }
    ));
    assert_eq!(harness.secrets.patch_count(), 1);
    assert_eq!(harness.fetch_count(), 2);

    let managed = harness.managed_secret();
    assert_eq!(managed.data("DB_PASSWORD"), Some(&b"rotated"[..]));
    assert_eq!(
        managed.last_update(),
        Some(start_time() + chrono::Duration::hours(1))
    );

    // The rotation reset the clock for the next period
    harness.clock.advance(chrono::Duration::minutes(30));
    harness.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(harness.secrets.patch_count(), 1);
}

#[tokio::test]
async fn test_secret_without_last_update_is_rotated() {
    let harness = Harness::with_cert();
    let key = harness.add_request("24h");
    harness.reconciler.reconcile(&key).await.unwrap();

    let mut stripped = harness.managed_secret().into_secret();
    stripped
        .metadata
        .annotations
        .as_mut()
        .unwrap()
        .remove(LAST_UPDATE_ANNOTATION);
    harness.secrets.insert(stripped);

    let outcome = harness.reconciler.reconcile(&key).await.unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Requeue {
            action: SyncAction::Rotated,
            ..
        }
    ));
    assert_eq!(harness.managed_secret().last_update(), Some(start_time()));
}

#[tokio::test]
async fn test_concurrent_identity_provisioning_stores_one_identity() {
    let harness = Harness::with_cert();
    let config = ControllerConfig::new(
        CONTROLLER_NAMESPACE,
        &format!("{}/provision", harness.dir.path().display()),
        "unused",
    )
    .unwrap();
    let provisioner = IdentityProvisioner::new(
        Arc::clone(&harness.secrets) as _,
        config.keychain_commands(CommandRunner::default()),
        CONTROLLER_NAMESPACE,
        config.provision_params(),
    );

    let (first, second) = tokio::join!(
        provisioner.get_or_create(NAMESPACE),
        provisioner.get_or_create(NAMESPACE)
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(harness.secrets.len(), 1);
    assert_eq!(harness.secrets.create_count(), 1);
    assert_eq!(first.certificate(), Some(&b"CERT"[..]));
    assert_eq!(first.certificate(), second.certificate());
    assert_eq!(first.name(), second.name());
}

#[tokio::test]
async fn test_deleted_resource_is_not_requeued() {
    let harness = Harness::with_cert();

    let outcome = harness
        .reconciler
        .reconcile(&ObjectKey::new(NAMESPACE, "gone"))
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Deleted);
    assert!(harness.secrets.is_empty());
    assert_eq!(harness.fetch_count(), 0);
}

#[tokio::test]
async fn test_invalid_ttl_is_rejected_before_any_command() {
    let harness = Harness::with_cert();
    let key = harness.add_request("1d");

    let err = harness.reconciler.reconcile(&key).await.unwrap_err();

    assert!(matches!(err, ReconcileError::Config(_)));
    assert_eq!(harness.reconciler.requeue_after_error(&key, &err), None);
    assert!(harness.secrets.is_empty());
    assert_eq!(harness.fetch_count(), 0);
    assert_eq!(harness.status.last_reason().as_deref(), Some("InvalidSpec"));
}

#[tokio::test]
async fn test_identity_failure_backs_off() {
    let harness = Harness::new("exit 7");
    let key = harness.add_request("24h");

    let err = harness.reconciler.reconcile(&key).await.unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::Identity(ControllerError::Command(CommandError::Exit {
            code: Some(7),
            ..
        }))
    ));
    assert!(harness.secrets.is_empty());
    assert_eq!(harness.fetch_count(), 0);
    assert_eq!(harness.status.last_reason().as_deref(), Some("IdentityFailed"));

    let delays: Vec<Duration> = (0..4)
        .map(|_| harness.reconciler.requeue_after_error(&key, &err).unwrap())
        .collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_secs(60),
            Duration::from_secs(60),
            Duration::from_secs(120),
            Duration::from_secs(180),
        ]
    );
}

#[tokio::test]
async fn test_success_resets_backoff() {
    let harness = Harness::new("exit 7");
    let key = harness.add_request("24h");
    let err = harness.reconciler.reconcile(&key).await.unwrap_err();
    harness.reconciler.requeue_after_error(&key, &err);
    harness.reconciler.requeue_after_error(&key, &err);
    harness.reconciler.requeue_after_error(&key, &err);

    // Provisioning starts working
    write_script(harness.dir.path(), "provision", "printf 'CERT'");
    harness.reconciler.reconcile(&key).await.unwrap();

    assert!(harness.reconciler.backoff_states.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_failure_uses_fixed_retry() {
    let harness = Harness::with_cert();
    write_script(harness.dir.path(), "get-DB_PASSWORD", "exit 3");
    let key = harness.add_request("24h");

    let err = harness.reconciler.reconcile(&key).await.unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::Sync(ControllerError::Command(CommandError::Exit { .. }))
    ));
    assert_eq!(
        harness.reconciler.requeue_after_error(&key, &err),
        Some(Duration::from_secs(300))
    );
    // Identity was provisioned, the managed Secret was not written
    assert_eq!(harness.secrets.len(), 1);
    assert_eq!(harness.status.last_reason().as_deref(), Some("FetchFailed"));
}

#[tokio::test]
async fn test_rotation_against_stale_secret_conflicts() {
    let harness = Harness::with_cert();
    let key = harness.add_request("1h");
    harness.reconciler.reconcile(&key).await.unwrap();

    // The Secret is rewritten after this copy was read
    let stale = harness.managed_secret();
    harness.secrets.insert(stale.clone().into_secret());
    harness.set_value("rotated");

    let synchronizer = SecretSynchronizer::new(
        Arc::clone(&harness.secrets) as _,
        harness_config(harness.dir.path()).keychain_commands(CommandRunner::default()),
    );
    let request = SecretRequest::try_from(&harness.requests.object(&key).unwrap()).unwrap();
    let err = synchronizer
        .sync(
            NAMESPACE,
            &harness.identity(),
            &request,
            Some(stale),
            start_time() + chrono::Duration::hours(1),
        )
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert!(err.is_retryable());
    let err = ReconcileError::Sync(err);
    assert_eq!(err.retry(), Retry::Conflict);
    assert_eq!(err.reason(), "StoreConflict");
    assert_eq!(
        harness.reconciler.requeue_after_error(&key, &err),
        Some(Duration::from_secs(5))
    );

    assert_eq!(harness.secrets.patch_count(), 0);
    let managed = harness.managed_secret();
    assert_eq!(managed.data("DB_PASSWORD"), Some(&b"hunter2"[..]));
    assert_eq!(managed.last_update(), Some(start_time()));
}

#[tokio::test]
async fn test_failed_rotation_write_keeps_previous_value() {
    let harness = Harness::with_cert();
    let key = harness.add_request("1h");
    harness.reconciler.reconcile(&key).await.unwrap();

    let reconciler = Reconciler::new(
        &harness_config(harness.dir.path()),
        Arc::new(RejectingPatches {
            inner: Arc::clone(&harness.secrets),
        }),
        Arc::clone(&harness.requests) as _,
        CommandRunner::default(),
    )
    .with_clock(Arc::clone(&harness.clock) as _);
    harness.set_value("rotated");
    harness.clock.advance(chrono::Duration::hours(1));

    let err = reconciler.reconcile(&key).await.unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::Sync(ControllerError::Store(StoreError::MissingMetadata(_)))
    ));
    assert_eq!(err.reason(), "StoreFailed");
    assert_eq!(
        reconciler.requeue_after_error(&key, &err),
        Some(Duration::from_secs(60))
    );

    // Fetched, but never written
    assert_eq!(harness.fetch_count(), 2);
    assert_eq!(harness.secrets.patch_count(), 0);
    let managed = harness.managed_secret();
    assert_eq!(managed.data("DB_PASSWORD"), Some(&b"hunter2"[..]));
    assert_eq!(managed.last_update(), Some(start_time()));
}
