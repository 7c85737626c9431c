//! Agent-facing command-execution bridge.
//!
//! `CommandExecutor` turns one text command into a structured
//! success/failure outcome. This is a terminal error boundary: every fault
//! from sandbox acquisition or execution is converted into a failure
//! outcome, never propagated to the calling agent loop.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use helios_core::Result;

use crate::project::{self, ProjectStore};
use crate::registry::SandboxRegistry;
use crate::runtime::WORKSPACE_MOUNT;

/// Session used when the caller does not name one.
pub const DEFAULT_SESSION: &str = "default";

/// One command execution request.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Shell command to execute.
    pub command: String,
    /// Optional subdirectory of `/workspace` to run in.
    pub folder: Option<String>,
    /// Session hook; accepted and logged, sessions are not yet materialized.
    pub session_name: Option<String>,
    /// Deadline in seconds; falls back to the configured default.
    pub timeout_secs: Option<u64>,
}

impl RunRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            folder: None,
            session_name: None,
            timeout_secs: None,
        }
    }

    pub fn in_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// Uniform result of a command execution.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Success {
        output: String,
        exit_code: i64,
        cwd: String,
    },
    Failure {
        message: String,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The output text on success, the message on failure.
    pub fn text(&self) -> &str {
        match self {
            Self::Success { output, .. } => output,
            Self::Failure { message } => message,
        }
    }
}

/// Executes shell commands inside one sandbox, acquired through the
/// registry's get-or-start contract on every call.
pub struct CommandExecutor {
    registry: Arc<SandboxRegistry>,
    sandbox_id: String,
}

impl CommandExecutor {
    pub fn new(registry: Arc<SandboxRegistry>, sandbox_id: impl Into<String>) -> Self {
        Self {
            registry,
            sandbox_id: sandbox_id.into(),
        }
    }

    /// Resolve the executor's sandbox id from an external project record.
    pub async fn for_project(
        registry: Arc<SandboxRegistry>,
        store: &dyn ProjectStore,
        project_id: &str,
    ) -> Result<Self> {
        let provision = project::resolve_sandbox(store, project_id).await?;
        tracing::info!(project_id = %project_id, sandbox_id = %provision.id, "Resolved project sandbox");
        Ok(Self::new(registry, provision.id))
    }

    pub fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    /// Execute a command and return a structured outcome. Never fails:
    /// faults become failure outcomes carrying a descriptive message.
    pub async fn run(&self, request: RunRequest) -> RunOutcome {
        match self.try_run(&request).await {
            Ok(outcome) => outcome,
            Err(e) => RunOutcome::Failure {
                message: format!("Error executing command: {}", e),
            },
        }
    }

    async fn try_run(&self, request: &RunRequest) -> Result<RunOutcome> {
        let cwd = match request.folder.as_deref() {
            Some(folder) => {
                let folder = folder.trim_matches('/');
                if folder.is_empty() {
                    WORKSPACE_MOUNT.to_string()
                } else {
                    format!("{}/{}", WORKSPACE_MOUNT, folder)
                }
            }
            None => WORKSPACE_MOUNT.to_string(),
        };

        let session = request.session_name.as_deref().unwrap_or(DEFAULT_SESSION);
        let timeout_secs = request
            .timeout_secs
            .unwrap_or(self.registry.config().exec_timeout_secs);

        tracing::debug!(
            sandbox_id = %self.sandbox_id,
            session = %session,
            cwd = %cwd,
            timeout_secs,
            command = %request.command,
            "Executing command"
        );

        let shell_command = format!("cd {} && {}", cwd, request.command);

        let handle = self.registry.get_or_start(&self.sandbox_id).await?;
        let result = handle
            .exec(&shell_command, Duration::from_secs(timeout_secs))
            .await?;

        let output = String::from_utf8_lossy(&result.output).into_owned();

        if result.timed_out {
            return Ok(RunOutcome::Failure {
                message: format!(
                    "Command timed out after {}s. Partial output: {}",
                    timeout_secs, output
                ),
            });
        }

        if result.exit_code == 0 {
            Ok(RunOutcome::Success {
                output,
                exit_code: 0,
                cwd,
            })
        } else {
            let mut message = format!("Command failed with exit code {}", result.exit_code);
            if !output.is_empty() {
                message.push_str(": ");
                message.push_str(&output);
            }
            Ok(RunOutcome::Failure { message })
        }
    }
}
