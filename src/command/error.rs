//! # Command Error Types
//!
//! Classified failures returned by the command runner and template expander.

use thiserror::Error;

/// Failure running an external command
#[derive(Debug, Error)]
pub enum CommandError {
    /// The executable could not be resolved on the search path.
    /// No process was spawned.
    #[error("executable '{executable}' not found: {source}")]
    NotFound {
        executable: String,
        #[source]
        source: which::Error,
    },
    /// The command exceeded its allotted duration and was killed
    #[error("command '{executable}' timed out after {timeout_secs}s")]
    Timeout {
        executable: String,
        timeout_secs: u64,
    },
    /// The command ran and exited with a non-zero status
    #[error("command '{executable}' exited with {}", describe_exit(.code))]
    Exit {
        executable: String,
        /// `None` when the process was terminated by a signal
        code: Option<i32>,
        /// Standard output captured before the process exited
        output: Vec<u8>,
    },
    /// The resolved executable could not be started
    #[error("failed to spawn '{executable}': {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },
    /// Reading output or waiting on the child failed
    #[error("i/o error while running '{executable}': {source}")]
    Io {
        executable: String,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    /// Whether retrying the same command may succeed without operator action
    pub fn is_retryable(&self) -> bool {
        match self {
            CommandError::NotFound { .. } | CommandError::Spawn { .. } => false,
            CommandError::Timeout { .. } | CommandError::Exit { .. } | CommandError::Io { .. } => {
                true
            }
        }
    }
}

#[allow(clippy::ref_option, reason = "Called from the thiserror format with a field reference")]
fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Malformed command template or unrenderable parameters.
///
/// These are configuration errors: retrying a reconcile cannot fix them.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template '{template}' has malformed placeholder at byte {offset}: {snippet}")]
    Syntax {
        template: String,
        offset: usize,
        snippet: String,
    },
    #[error("template '{template}' references unknown field '{field}'")]
    UnknownField { template: String, field: String },
    #[error("template '{template}' expanded to an empty command")]
    Empty { template: String },
    #[error("failed to render parameters for template '{template}': {source}")]
    Render {
        template: String,
        #[source]
        source: serde_json::Error,
    },
}
