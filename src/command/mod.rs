//! # External Commands
//!
//! Process execution with path resolution, deadlines and exit classification,
//! plus the templated Keychain commands built on top of it.

pub mod error;
pub mod keychain;
pub mod observer;
pub mod runner;
pub mod template;

pub use error::{CommandError, TemplateError};
pub use keychain::{
    FetchSecretParams, KeychainCommandError, KeychainCommands, ProvisionIdentityParams,
};
pub use observer::{CommandEvent, CommandObserver, TracingObserver};
pub use runner::{CommandRunner, CommandSpec};
pub use template::{CommandTemplate, TemplateParams};
