//! # Reconcile Errors
//!
//! What went wrong in a reconcile cycle, and how soon it is worth retrying.

use crate::controller::error::ControllerError;
use crate::controller::validation::ValidationError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Reading the KeychainSecret itself failed
    #[error("failed to read KeychainSecret: {0}")]
    Store(#[source] StoreError),
    /// The KeychainSecret does not describe a valid request
    #[error("invalid KeychainSecret: {0}")]
    Config(#[from] ValidationError),
    #[error("identity provisioning failed: {0}")]
    Identity(#[source] ControllerError),
    #[error("secret sync failed: {0}")]
    Sync(#[source] ControllerError),
}

/// How the error policy should schedule the next attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// Only a change to the resource can help
    AwaitChange,
    /// Lost a write race; re-read soon
    Conflict,
    /// Fixed sync retry delay
    Fixed,
    /// Per-resource Fibonacci backoff
    Backoff,
}

impl ReconcileError {
    /// Stage label used in logs and metrics
    pub fn stage(&self) -> &'static str {
        match self {
            ReconcileError::Store(_) => "read",
            ReconcileError::Config(_) => "validate",
            ReconcileError::Identity(_) => "identity",
            ReconcileError::Sync(_) => "sync",
        }
    }

    /// CamelCase reason recorded in the KeychainSecret status
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::Store(_) => "StoreFailed",
            ReconcileError::Config(_) => "InvalidSpec",
            ReconcileError::Identity(_) => "IdentityFailed",
            ReconcileError::Sync(e) if e.is_conflict() => "StoreConflict",
            ReconcileError::Sync(ControllerError::Store(_)) => "StoreFailed",
            ReconcileError::Sync(_) => "FetchFailed",
        }
    }

    /// Transient sync failures retry on a fixed delay. Sync failures that
    /// need an operator, like a missing executable, back off instead of
    /// polling; template failures only clear when the resource changes.
    pub fn retry(&self) -> Retry {
        match self {
            ReconcileError::Config(_) | ReconcileError::Sync(ControllerError::Template(_)) => {
                Retry::AwaitChange
            }
            ReconcileError::Sync(e) if e.is_conflict() => Retry::Conflict,
            ReconcileError::Sync(e) if e.is_retryable() => Retry::Fixed,
            ReconcileError::Sync(_) | ReconcileError::Store(_) | ReconcileError::Identity(_) => {
                Retry::Backoff
            }
        }
    }
}
