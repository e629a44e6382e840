//! # Controller Configuration
//!
//! Command templates, identity parameters and retry settings.

use crate::command::{
    CommandRunner, CommandTemplate, FetchSecretParams, KeychainCommands, ProvisionIdentityParams,
    TemplateError,
};
use crate::constants::{
    DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_CONFLICT_RETRY_SECS, DEFAULT_CONTROLLER_NAMESPACE,
    DEFAULT_IDENTITY_ALGORITHM, DEFAULT_IDENTITY_SUBJECT, DEFAULT_IDENTITY_VALIDITY_DAYS,
    DEFAULT_SYNC_RETRY_SECS,
};
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the identity provisioning template
pub const GENERATE_CERT_COMMAND_ENV: &str = "GENERATE_CERT_COMMAND";
/// Environment variable holding the secret fetch template
pub const GET_SECRET_COMMAND_ENV: &str = "GET_SECRET_COMMAND";

/// Invalid controller configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Controller configuration
///
/// Built once at startup and handed to each component; nothing reads the
/// process environment after that.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace identities are stored in
    pub controller_namespace: String,
    /// Timeout applied to each external command (seconds)
    pub command_timeout_secs: u64,
    /// Identity certificate parameters
    pub identity_algorithm: String,
    pub identity_validity_days: u32,
    pub identity_subject: String,
    /// Requeue delay after a failed secret sync
    pub sync_retry: Duration,
    /// Requeue delay after an optimistic-concurrency conflict
    pub conflict_retry: Duration,
    pub provision_template: CommandTemplate,
    pub fetch_template: CommandTemplate,
}

impl ControllerConfig {
    /// Configuration with the two command templates and defaults elsewhere
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Template`] if either template is malformed.
    pub fn new(
        controller_namespace: impl Into<String>,
        provision_template: &str,
        fetch_template: &str,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            controller_namespace: controller_namespace.into(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            identity_algorithm: DEFAULT_IDENTITY_ALGORITHM.to_string(),
            identity_validity_days: DEFAULT_IDENTITY_VALIDITY_DAYS,
            identity_subject: DEFAULT_IDENTITY_SUBJECT.to_string(),
            sync_retry: Duration::from_secs(DEFAULT_SYNC_RETRY_SECS),
            conflict_retry: Duration::from_secs(DEFAULT_CONFLICT_RETRY_SECS),
            provision_template: CommandTemplate::parse::<ProvisionIdentityParams>(
                GENERATE_CERT_COMMAND_ENV,
                provision_template,
            )?,
            fetch_template: CommandTemplate::parse::<FetchSecretParams>(
                GET_SECRET_COMMAND_ENV,
                fetch_template,
            )?,
        })
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a template is missing or malformed, or a
    /// numeric setting does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// See [`ControllerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provision = lookup(GENERATE_CERT_COMMAND_ENV)
            .ok_or(ConfigError::Missing(GENERATE_CERT_COMMAND_ENV))?;
        let fetch =
            lookup(GET_SECRET_COMMAND_ENV).ok_or(ConfigError::Missing(GET_SECRET_COMMAND_ENV))?;
        let namespace = lookup("CONTROLLER_NAMESPACE")
            .or_else(|| lookup("POD_NAMESPACE"))
            .unwrap_or_else(|| DEFAULT_CONTROLLER_NAMESPACE.to_string());

        let mut config = Self::new(namespace, &provision, &fetch)?;
        config.command_timeout_secs = parse_or(
            &lookup,
            "COMMAND_TIMEOUT_SECS",
            DEFAULT_COMMAND_TIMEOUT_SECS,
        )?;
        config.identity_validity_days = parse_or(
            &lookup,
            "IDENTITY_VALIDITY_DAYS",
            DEFAULT_IDENTITY_VALIDITY_DAYS,
        )?;
        if let Some(subject) = lookup("IDENTITY_SUBJECT") {
            config.identity_subject = subject;
        }
        if let Some(algorithm) = lookup("IDENTITY_ALGORITHM") {
            config.identity_algorithm = algorithm;
        }
        config.sync_retry = Duration::from_secs(parse_or(
            &lookup,
            "SYNC_RETRY_SECS",
            DEFAULT_SYNC_RETRY_SECS,
        )?);
        Ok(config)
    }

    /// Parameters the identity template is rendered with
    pub fn provision_params(&self) -> ProvisionIdentityParams {
        ProvisionIdentityParams {
            algorithm: self.identity_algorithm.clone(),
            days: self.identity_validity_days,
            subject: self.identity_subject.clone(),
        }
    }

    /// Templated Keychain commands backed by `runner`
    pub fn keychain_commands(&self, runner: CommandRunner) -> KeychainCommands {
        KeychainCommands::new(
            runner,
            self.provision_template.clone(),
            self.fetch_template.clone(),
            self.command_timeout_secs,
        )
    }
}

/// Unlike the server settings, a malformed value here is rejected rather
/// than silently replaced with the default.
fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_with_defaults() {
        let config = ControllerConfig::from_lookup(lookup(&[
            (GENERATE_CERT_COMMAND_ENV, "/opt/keychain/provision-{{.Days}}"),
            (GET_SECRET_COMMAND_ENV, "/opt/keychain/get-{{.Name}}"),
        ]))
        .unwrap();
        assert_eq!(config.controller_namespace, DEFAULT_CONTROLLER_NAMESPACE);
        assert_eq!(config.command_timeout_secs, DEFAULT_COMMAND_TIMEOUT_SECS);
        assert_eq!(config.sync_retry, Duration::from_secs(300));
        assert_eq!(config.provision_params().algorithm, "rsa:4096");
        assert_eq!(config.provision_params().days, 365);
    }

    #[test]
    fn test_controller_namespace_falls_back_to_pod_namespace() {
        let config = ControllerConfig::from_lookup(lookup(&[
            (GENERATE_CERT_COMMAND_ENV, "provision"),
            (GET_SECRET_COMMAND_ENV, "get"),
            ("POD_NAMESPACE", "keychain"),
        ]))
        .unwrap();
        assert_eq!(config.controller_namespace, "keychain");
    }

    #[test]
    fn test_missing_template_is_fatal() {
        let err = ControllerConfig::from_lookup(lookup(&[(GET_SECRET_COMMAND_ENV, "get")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(GENERATE_CERT_COMMAND_ENV)));
    }

    #[test]
    fn test_malformed_template_is_fatal() {
        let err = ControllerConfig::from_lookup(lookup(&[
            (GENERATE_CERT_COMMAND_ENV, "provision {{.Days"),
            (GET_SECRET_COMMAND_ENV, "get"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Template(TemplateError::Syntax { .. })));
    }

    #[test]
    fn test_template_field_mismatch_is_fatal() {
        // Name belongs to the fetch parameters, not the provisioning ones
        let err = ControllerConfig::from_lookup(lookup(&[
            (GENERATE_CERT_COMMAND_ENV, "provision {{.Name}}"),
            (GET_SECRET_COMMAND_ENV, "get"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Template(TemplateError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = ControllerConfig::from_lookup(lookup(&[
            (GENERATE_CERT_COMMAND_ENV, "provision"),
            (GET_SECRET_COMMAND_ENV, "get"),
            ("COMMAND_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "COMMAND_TIMEOUT_SECS", .. }));
    }
}
