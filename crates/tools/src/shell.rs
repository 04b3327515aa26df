//! `run_command` — execute an allowlisted program in the workspace.
//!
//! The program is spawned directly, not through a shell, so arguments are
//! passed verbatim and shell metacharacters have no effect.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Command;
use toolwright_core::capability::{CapabilityDefinition, CapabilityHandler, Input, ParamSpec, ParamType};
use toolwright_core::error::HandlerError;
use tracing::{debug, warn};

use crate::workspace::{Workspace, str_arg};

pub const NAME: &str = "run_command";

pub struct RunCommand {
    workspace: Workspace,
    /// If non-empty, only these base commands are allowed.
    allowed_commands: Vec<String>,
}

impl RunCommand {
    pub fn new(workspace: Workspace, allowed_commands: Vec<String>) -> Self {
        Self {
            workspace,
            allowed_commands,
        }
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowed_commands.is_empty() {
            return true;
        }
        self.allowed_commands.iter().any(|a| a == command)
    }

    pub fn definition(self) -> CapabilityDefinition {
        let description = if self.allowed_commands.is_empty() {
            "Run a program in the workspace and return its exit code, stdout and stderr.".to_string()
        } else {
            format!(
                "Run a program in the workspace and return its exit code, stdout and stderr. \
                 Allowed programs: {}.",
                self.allowed_commands.join(", ")
            )
        };
        CapabilityDefinition::new(NAME, description, Arc::new(self))
            .risky()
            .in_group("system")
            .with_param(
                "command",
                ParamSpec::required(ParamType::String).described("Program name, without arguments"),
            )
            .with_param(
                "args",
                ParamSpec::optional(ParamType::TextCollection)
                    .with_default(serde_json::json!([]))
                    .described("Arguments, one per element"),
            )
    }
}

#[async_trait]
impl CapabilityHandler for RunCommand {
    async fn call(&self, input: Input) -> Result<serde_json::Value, HandlerError> {
        let command = str_arg(&input, "command")?.trim();
        let args: Vec<&str> = input
            .get("args")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        if !self.is_command_allowed(command) {
            return Err(HandlerError::PermissionDenied {
                capability: NAME.into(),
                reason: format!("command '{command}' is not in the allowlist"),
            });
        }

        debug!(command = %command, ?args, "Running command");
        let output = Command::new(command)
            .args(&args)
            .current_dir(self.workspace.root())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| HandlerError::ExecutionFailed {
                capability: NAME.into(),
                reason: format!("failed to start '{command}': {e}"),
            })?;

        let exit_code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            warn!(command = %command, exit_code, "Command failed");
        }
        Ok(serde_json::json!({
            "exit_code": exit_code,
            "stdout": String::from_utf8_lossy(&output.stdout).trim_end(),
            "stderr": String::from_utf8_lossy(&output.stderr).trim_end(),
        }))
    }
}
