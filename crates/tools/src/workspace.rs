//! Workspace scoping — file capabilities only touch paths under one root.

use std::path::{Component, Path, PathBuf};
use toolwright_core::error::HandlerError;

/// Error returned when a path escapes the workspace.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path traversal detected in '{path}'")]
    Traversal { path: String },

    #[error("path '{path}' is outside the workspace")]
    OutsideWorkspace { path: String },
}

/// The directory file capabilities are confined to.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Scope to `root`, canonicalized when it exists.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` (relative to the root, or absolute under it).
    pub fn resolve(&self, path: &str) -> Result<PathBuf, PathError> {
        let candidate = Path::new(path);
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(PathError::Traversal { path: path.into() });
        }

        let resolved = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };
        if !resolved.starts_with(&self.root) {
            return Err(PathError::OutsideWorkspace { path: path.into() });
        }
        Ok(resolved)
    }

    /// [`resolve`](Self::resolve) with the error mapped for `capability`.
    pub(crate) fn resolve_for(&self, capability: &str, path: &str) -> Result<PathBuf, HandlerError> {
        self.resolve(path).map_err(|e| HandlerError::PermissionDenied {
            capability: capability.into(),
            reason: e.to_string(),
        })
    }
}

/// Pull a string argument out of an already-validated input.
pub(crate) fn str_arg<'a>(
    input: &'a toolwright_core::capability::Input,
    name: &str,
) -> Result<&'a str, HandlerError> {
    input
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerError::InvalidArguments(format!("missing '{name}' argument")))
}
