//! `list_files` — directory listing.

use async_trait::async_trait;
use std::sync::Arc;
use toolwright_core::capability::{CapabilityDefinition, CapabilityHandler, Input, ParamSpec, ParamType};
use toolwright_core::error::HandlerError;
use tracing::debug;

use crate::workspace::{Workspace, str_arg};

pub const NAME: &str = "list_files";

/// Lists entry names in a directory, sorted, with `/` after directories.
pub struct ListFiles {
    workspace: Workspace,
}

impl ListFiles {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    pub fn definition(self) -> CapabilityDefinition {
        CapabilityDefinition::new(
            NAME,
            "List the files and directories inside a directory of the workspace.",
            Arc::new(self),
        )
        .read_only()
        .idempotent()
        .in_group("files")
        .with_param(
            "directory",
            ParamSpec::optional(ParamType::String)
                .with_default(serde_json::json!("."))
                .described("Directory to list, relative to the workspace"),
        )
    }
}

#[async_trait]
impl CapabilityHandler for ListFiles {
    async fn call(&self, input: Input) -> Result<serde_json::Value, HandlerError> {
        let directory = str_arg(&input, "directory").unwrap_or(".");
        let path = self.workspace.resolve_for(NAME, directory)?;
        debug!(path = %path.display(), "Listing directory");

        let mut entries = tokio::fs::read_dir(&path).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_dir() {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();
        Ok(serde_json::json!(names))
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
    async fn lists_sorted_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let tool = ListFiles::new(Workspace::new(dir.path()));
        let value = tool.call(input(json!({"directory": "."}))).await.unwrap();
        assert_eq!(value, json!(["a.txt", "b.txt", "sub/"]));
    }

    #[tokio::test]
    async fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ListFiles::new(Workspace::new(dir.path()));
        let err = tool
            .call(input(json!({"directory": "nope"})))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Io(_)));
    }

    #[tokio::test]
    async fn traversal_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ListFiles::new(Workspace::new(dir.path()));
        let err = tool
            .call(input(json!({"directory": ".."})))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::PermissionDenied { .. }));
    }

    #[test]
    fn definition_is_read_only() {
        let def = ListFiles::new(Workspace::new(".")).definition();
        assert_eq!(def.name, "list_files");
        assert!(!def.risky);
        assert!(def.hints.read_only && def.hints.idempotent);
        assert!(!def.parameters["directory"].required);
    }
}
