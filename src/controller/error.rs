//! # Controller Errors
//!
//! Failures raised by the identity provisioner and the secret synchronizer.

use crate::command::{CommandError, KeychainCommandError, TemplateError};
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Command(#[from] CommandError),
    /// Expansion failed for these parameters, e.g. a required field rendered empty
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<KeychainCommandError> for ControllerError {
    fn from(err: KeychainCommandError) -> Self {
        match err {
            KeychainCommandError::Template(e) => ControllerError::Template(e),
            KeychainCommandError::Command(e) => ControllerError::Command(e),
        }
    }
}

impl ControllerError {
    /// A write lost an optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self, ControllerError::Store(e) if e.is_conflict())
    }

    /// Whether retrying without operator action may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ControllerError::Command(e) => e.is_retryable(),
            ControllerError::Template(_) => false,
            ControllerError::Store(StoreError::MissingMetadata(_)) => false,
            ControllerError::Store(_) => true,
        }
    }
}
