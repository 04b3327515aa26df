//! Built-in capabilities for Toolwright.
//!
//! Capabilities give the agent the ability to interact with its workspace:
//! list directories, read and write files, and run allowlisted programs.
//! File access is confined to one workspace root.

pub mod file_read;
pub mod file_write;
pub mod list_files;
pub mod shell;
pub mod workspace;

use std::path::PathBuf;
use toolwright_config::ToolsConfig;
use toolwright_core::capability::CapabilityDefinition;
use toolwright_core::error::RegistryError;
use toolwright_core::registry::CapabilityRegistry;

pub use workspace::{PathError, Workspace};

/// Every built-in capability, scoped to `root`.
///
/// Security defaults:
/// - `write_file` and `run_command` are risky and need approval in safe mode
/// - `run_command` only starts programs named in `config.allowed_commands`
pub fn builtin_capabilities(root: impl Into<PathBuf>, config: &ToolsConfig) -> Vec<CapabilityDefinition> {
    let workspace = Workspace::new(root);
    vec![
        list_files::ListFiles::new(workspace.clone()).definition(),
        file_read::ReadFile::new(workspace.clone()).definition(),
        file_write::WriteFile::new(workspace.clone()).definition(),
        shell::RunCommand::new(workspace, config.allowed_commands.clone()).definition(),
    ]
}

/// A registry holding the built-in capabilities.
pub fn default_registry(
    root: impl Into<PathBuf>,
    config: &ToolsConfig,
) -> Result<CapabilityRegistry, RegistryError> {
    let registry = CapabilityRegistry::new();
    registry.register_batch(builtin_capabilities(root, config))?;
    Ok(registry)
}
