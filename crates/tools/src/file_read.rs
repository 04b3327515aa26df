//! `read_file` — read file contents within the workspace.

use async_trait::async_trait;
use std::sync::Arc;
use toolwright_core::capability::{CapabilityDefinition, CapabilityHandler, Input, ParamSpec, ParamType};
use toolwright_core::error::HandlerError;

use crate::workspace::{Workspace, str_arg};

pub const NAME: &str = "read_file";

pub struct ReadFile {
    workspace: Workspace,
}

impl ReadFile {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    pub fn definition(self) -> CapabilityDefinition {
        CapabilityDefinition::new(
            NAME,
            "Read the text contents of a file in the workspace.",
            Arc::new(self),
        )
        .read_only()
        .in_group("files")
        .with_param(
            "path",
            ParamSpec::required(ParamType::String).described("File path, relative to the workspace"),
        )
    }
}

#[async_trait]
impl CapabilityHandler for ReadFile {
    async fn call(&self, input: Input) -> Result<serde_json::Value, HandlerError> {
        let path = self.workspace.resolve_for(NAME, str_arg(&input, "path")?)?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| HandlerError::ExecutionFailed {
                capability: NAME.into(),
                reason: format!("failed to read {}: {e}", path.display()),
            })?;
        Ok(serde_json::Value::String(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(value: serde_json::Value) -> Input {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn read_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test.txt"), "Hello, world!\n").unwrap();

        let tool = ReadFile::new(Workspace::new(dir.path()));
        let value = tool.call(input(json!({"path": "test.txt"}))).await.unwrap();
        assert_eq!(value, json!("Hello, world!\n"));
    }

    #[tokio::test]
    async fn read_nonexistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFile::new(Workspace::new(dir.path()));
        let err = tool.call(input(json!({"path": "missing.txt"}))).await.unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFile::new(Workspace::new(dir.path()));
        let err = tool.call(Input::new()).await.unwrap_err();
        assert!(matches!(err, HandlerError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn path_traversal_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFile::new(Workspace::new(dir.path()));
        let err = tool
            .call(input(json!({"path": "../../../etc/passwd"})))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::PermissionDenied { .. }));
    }
}
