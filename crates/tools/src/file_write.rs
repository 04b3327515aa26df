//! `write_file` — create or overwrite a file within the workspace.

use async_trait::async_trait;
use std::sync::Arc;
use toolwright_core::capability::{CapabilityDefinition, CapabilityHandler, Input, ParamSpec, ParamType};
use toolwright_core::error::HandlerError;
use tracing::info;

use crate::workspace::{Workspace, str_arg};

pub const NAME: &str = "write_file";

pub struct WriteFile {
    workspace: Workspace,
}

impl WriteFile {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    pub fn definition(self) -> CapabilityDefinition {
        CapabilityDefinition::new(
            NAME,
            "Write content to a file in the workspace. Creates the file and missing parent \
             directories; overwrites an existing file.",
            Arc::new(self),
        )
        .risky()
        .idempotent()
        .in_group("files")
        .with_param(
            "path",
            ParamSpec::required(ParamType::String).described("File path, relative to the workspace"),
        )
        .with_param(
            "content",
            ParamSpec::required(ParamType::String).described("The full new contents"),
        )
    }
}

#[async_trait]
impl CapabilityHandler for WriteFile {
    async fn call(&self, input: Input) -> Result<serde_json::Value, HandlerError> {
        let raw_path = str_arg(&input, "path")?;
        let content = str_arg(&input, "content")?;
        let path = self.workspace.resolve_for(NAME, raw_path)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        info!(path = %path.display(), bytes = content.len(), "File written");

        Ok(serde_json::Value::String(format!(
            "Wrote {} bytes to {raw_path}",
            content.len()
        )))
    }
}
