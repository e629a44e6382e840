//! # Command Runner
//!
//! Resolves an executable, runs it under a deadline and classifies the result.
//!
//! The deadline is checked after the process call returns, before the exit
//! status is looked at, so a killed process is always reported as a timeout
//! and never as a non-zero exit.

use crate::command::error::CommandError;
use crate::command::observer::{CommandEvent, CommandObserver, TracingObserver};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::Instant;

/// A command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Name of the executable, relative (looked up on PATH) or absolute
    pub executable: String,
    /// Arguments passed to the executable
    pub args: Vec<String>,
    /// Seconds before the process is killed. Zero expires immediately.
    pub timeout_secs: u64,
}

impl CommandSpec {
    pub fn new(executable: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            timeout_secs,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Runs external commands and reports outcomes to an observer
#[derive(Debug, Clone)]
pub struct CommandRunner {
    observer: Arc<dyn CommandObserver>,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(Arc::new(TracingObserver))
    }
}

impl CommandRunner {
    pub fn new(observer: Arc<dyn CommandObserver>) -> Self {
        Self { observer }
    }

    /// Run a command and return its captured standard output
    ///
    /// # Errors
    ///
    /// - [`CommandError::NotFound`] if the executable cannot be resolved (nothing is spawned)
    /// - [`CommandError::Timeout`] if the deadline passed; the child is killed and reaped
    /// - [`CommandError::Exit`] if the process exited non-zero within the deadline
    /// - [`CommandError::Spawn`] / [`CommandError::Io`] for OS-level failures
    pub async fn run(&self, spec: &CommandSpec) -> Result<Vec<u8>, CommandError> {
        let path = self.resolve(&spec.executable)?;

        let timeout = Duration::from_secs(spec.timeout_secs);
        let started = Instant::now();
        let deadline = started + timeout;

        // kill_on_drop covers every early return and a dropped future
        let mut child = Command::new(&path)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                executable: spec.executable.clone(),
                source,
            })?;

        let outcome = tokio::time::timeout_at(deadline, collect_output(&mut child)).await;

        if Instant::now() >= deadline {
            // Process call may have returned just as the deadline passed;
            // the deadline wins either way.
            if let Err(e) = child.kill().await {
                tracing::debug!(command = %spec.executable, error = %e, "kill after timeout failed (process already exited)");
            }
            self.observer.observe(&CommandEvent::TimedOut {
                executable: spec.executable.clone(),
                timeout_secs: spec.timeout_secs,
            });
            return Err(CommandError::Timeout {
                executable: spec.executable.clone(),
                timeout_secs: spec.timeout_secs,
            });
        }

        let (status, output) = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(source)) => {
                return Err(CommandError::Io {
                    executable: spec.executable.clone(),
                    source,
                })
            }
            // timeout_at only elapses once the deadline has passed, handled above
            Err(_elapsed) => {
                return Err(CommandError::Timeout {
                    executable: spec.executable.clone(),
                    timeout_secs: spec.timeout_secs,
                })
            }
        };

        if !status.success() {
            self.observer.observe(&CommandEvent::Failed {
                executable: spec.executable.clone(),
                code: status.code(),
                output_len: output.len(),
            });
            return Err(CommandError::Exit {
                executable: spec.executable.clone(),
                code: status.code(),
                output,
            });
        }

        self.observer.observe(&CommandEvent::Succeeded {
            executable: spec.executable.clone(),
            elapsed: started.elapsed(),
            output_len: output.len(),
        });
        Ok(output)
    }

    fn resolve(&self, executable: &str) -> Result<PathBuf, CommandError> {
        which::which(executable).map_err(|source| {
            self.observer.observe(&CommandEvent::NotFound {
                executable: executable.to_string(),
            });
            CommandError::NotFound {
                executable: executable.to_string(),
                source,
            }
        })
    }
}

/// Read stdout to completion while waiting on the child
async fn collect_output(child: &mut Child) -> std::io::Result<(ExitStatus, Vec<u8>)> {
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("child stdout was not piped"))?;
    let mut buf = Vec::new();
    let (read, status) = tokio::join!(stdout.read_to_end(&mut buf), child.wait());
    read?;
    Ok((status?, buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_builder() {
        let spec = CommandSpec::new("sleep", 5).arg("1").args(["2", "3"]);
        assert_eq!(spec.executable, "sleep");
        assert_eq!(spec.args, vec!["1", "2", "3"]);
        assert_eq!(spec.timeout_secs, 5);
    }

    #[tokio::test]
    async fn test_echo_output_is_captured() {
        let runner = CommandRunner::default();
        let output = runner
            .run(&CommandSpec::new("echo", 5).arg("keychain"))
            .await
            .unwrap();
        assert_eq!(output, b"keychain\n");
    }

    #[tokio::test]
    async fn test_exit_code_is_reported() {
        let runner = CommandRunner::default();
        let err = runner
            .run(&CommandSpec::new("sh", 5).args(["-c", "exit 3"]))
            .await
            .unwrap_err();
        match err {
            CommandError::Exit { code, .. } => assert_eq!(code, Some(3)),
            other => panic!("expected exit failure, got {other:?}"),
        }
    }
}
