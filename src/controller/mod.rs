//! # Controller
//!
//! KeychainSecret reconciliation: identity provisioning, secret sync and the
//! reconcile cycle that drives them.

pub mod backoff;
pub mod clock;
pub mod error;
pub mod identity;
pub mod reconciler;
pub mod sync;
pub mod types;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ControllerError;
pub use identity::IdentityProvisioner;
pub use reconciler::{ReconcileError, ReconcileOutcome, Reconciler};
pub use sync::SecretSynchronizer;
pub use types::{Identity, ManagedSecret, SecretRequest, SyncAction, SyncOutcome};
pub use validation::ValidationError;
