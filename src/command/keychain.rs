//! # Keychain Commands
//!
//! The two templated commands the controller shells out to: provisioning a
//! service identity certificate and fetching a Keychain secret.

use crate::command::error::{CommandError, TemplateError};
use crate::command::runner::{CommandRunner, CommandSpec};
use crate::command::template::{CommandTemplate, TemplateParams};
use serde::Serialize;
use thiserror::Error;
use zeroize::Zeroizing;

/// Parameters for the identity provisioning template
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ProvisionIdentityParams {
    /// Key algorithm, e.g. `rsa:4096`
    pub algorithm: String,
    /// Certificate validity period in days
    pub days: u32,
    /// Certificate subject, e.g. `/CN=example/O=Example/C=US`
    pub subject: String,
}

impl TemplateParams for ProvisionIdentityParams {
    const FIELDS: &'static [&'static str] = &["Algorithm", "Days", "Subject"];
}

/// Parameters for the secret fetch template
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct FetchSecretParams {
    /// Keychain secret name
    pub name: String,
    /// Keychain group, rendered empty when absent
    pub group: Option<String>,
    /// Name of the identity Secret authenticating the fetch
    pub identity: String,
}

impl TemplateParams for FetchSecretParams {
    const FIELDS: &'static [&'static str] = &["Name", "Group", "Identity"];
}

/// Failure expanding or running a Keychain command
#[derive(Debug, Error)]
pub enum KeychainCommandError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Templated Keychain commands sharing one runner and timeout
#[derive(Debug, Clone)]
pub struct KeychainCommands {
    runner: CommandRunner,
    provision_template: CommandTemplate,
    fetch_template: CommandTemplate,
    timeout_secs: u64,
}

impl KeychainCommands {
    pub fn new(
        runner: CommandRunner,
        provision_template: CommandTemplate,
        fetch_template: CommandTemplate,
        timeout_secs: u64,
    ) -> Self {
        Self {
            runner,
            provision_template,
            fetch_template,
            timeout_secs,
        }
    }

    /// Run the provisioning command and return the certificate bytes
    ///
    /// # Errors
    ///
    /// Returns [`KeychainCommandError`] if the template cannot be expanded or the
    /// command fails.
    pub async fn provision_identity(
        &self,
        params: &ProvisionIdentityParams,
    ) -> Result<Vec<u8>, KeychainCommandError> {
        let command_line = self.provision_template.expand(params)?;
        Ok(self.run(command_line).await?)
    }

    /// Run the fetch command and return the secret bytes.
    /// Only this buffer is wiped on drop; copies made from it are not.
    ///
    /// # Errors
    ///
    /// Returns [`KeychainCommandError`] if the template cannot be expanded or the
    /// command fails.
    pub async fn fetch_secret(
        &self,
        params: &FetchSecretParams,
    ) -> Result<Zeroizing<Vec<u8>>, KeychainCommandError> {
        let command_line = self.fetch_template.expand(params)?;
        Ok(Zeroizing::new(self.run(command_line).await?))
    }

    // The expanded line is the executable name, with no separate arguments.
    async fn run(&self, command_line: String) -> Result<Vec<u8>, CommandError> {
        self.runner
            .run(&CommandSpec::new(command_line, self.timeout_secs))
            .await
    }
}
