//! # Constants
//!
//! Default values shared across the controller.

/// Namespace the controller stores identities in when none is configured
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "keychain-system";

/// Default per-command timeout (seconds)
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Identity provisioning parameters
pub const DEFAULT_IDENTITY_ALGORITHM: &str = "rsa:4096";
pub const DEFAULT_IDENTITY_VALIDITY_DAYS: u32 = 365;
pub const DEFAULT_IDENTITY_SUBJECT: &str = "/CN=keychain-controller/O=Aqueduct/C=US";

/// Data key holding the certificate inside an identity Secret
pub const IDENTITY_CERT_KEY: &str = "cert";

/// Annotation recording when a managed Secret was last fetched (RFC3339)
pub const LAST_UPDATE_ANNOTATION: &str = "keychain.aqueduct.k8s.facebook.com/last-update";

/// Label marking Secrets written by this controller
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "keychain-secret-controller";

/// Default TTL applied when a KeychainSecret omits one
pub const DEFAULT_TTL: &str = "24h";

/// Requeue after a failed secret sync (seconds)
pub const DEFAULT_SYNC_RETRY_SECS: u64 = 300;

/// Requeue after an optimistic-concurrency conflict (seconds)
pub const DEFAULT_CONFLICT_RETRY_SECS: u64 = 5;

/// Fibonacci backoff bounds for identity provisioning failures (minutes)
pub const IDENTITY_BACKOFF_MIN_MINUTES: u64 = 1;
pub const IDENTITY_BACKOFF_MAX_MINUTES: u64 = 10;

/// Fallback requeue when backoff state cannot be read (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// HTTP server for metrics and probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "keychain-secret-controller";
