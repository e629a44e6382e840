//! # Configuration
//!
//! Controller-level configuration loaded from environment variables
//! (populated from a ConfigMap via `envFrom` in the deployment).
//!
//! Command templates are parsed here, so a malformed template stops the
//! controller at startup instead of failing every reconcile.

mod controller;
mod server;

pub use controller::{
    ConfigError, ControllerConfig, GENERATE_CERT_COMMAND_ENV, GET_SECRET_COMMAND_ENV,
};
pub use server::ServerConfig;

/// Load configuration from environment variables
///
/// # Errors
///
/// Returns [`ConfigError`] if the controller configuration is invalid.
pub fn load_config() -> Result<(ControllerConfig, ServerConfig), ConfigError> {
    Ok((ControllerConfig::from_env()?, ServerConfig::from_env()))
}
