//! Error types for the Toolwright domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the orchestrator decides
//! which of them are recoverable (fed back to the model) and which end a task.

use thiserror::Error;

/// The top-level error type for all Toolwright operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model service errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Capability registry errors ---
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    // --- Decision parsing ---
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    // --- Compaction ---
    #[error("Compaction error: {0}")]
    Compaction(#[from] CompactionError),

    // --- Budget ---
    #[error("Budget exceeded: projected {projected} > ceiling {ceiling}")]
    BudgetExceeded { projected: u64, ceiling: u64 },

    #[error("Budget exceeded after compaction: projected {projected} > ceiling {ceiling}")]
    BudgetExceededPostCompaction { projected: u64, ceiling: u64 },

    // --- Cancellation ---
    #[error("Task cancelled")]
    Cancelled,

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model service not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Capability name conflict: '{name}' is already registered")]
    NameConflict { name: String },

    #[error("Capability source '{source_name}' failed: {reason}")]
    SourceFailed { source_name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Capability execution failed: {capability} — {reason}")]
    ExecutionFailed { capability: String, reason: String },

    #[error("Permission denied: {capability} — {reason}")]
    PermissionDenied { capability: String, reason: String },

    #[error("Invalid capability arguments: {0}")]
    InvalidArguments(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("model response too large: {length} characters (limit {limit})")]
    ResponseTooLarge { length: usize, limit: usize },
}

#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("summarizer request failed: {0}")]
    Summarizer(#[source] ModelError),

    #[error("continuation acknowledgment failed: {0}")]
    Acknowledgment(#[source] ModelError),

    #[error("summarizer returned an empty summary")]
    EmptySummary,

    #[error("summary would not reduce cost: {before} -> {after}")]
    NoReduction { before: u64, after: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_error_displays_correctly() {
        let err = Error::Model(ModelError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn name_conflict_names_the_capability() {
        let err = Error::Registry(RegistryError::NameConflict {
            name: "list_files".into(),
        });
        assert!(err.to_string().contains("list_files"));
    }

    #[test]
    fn compaction_error_wraps_model_error() {
        let err = CompactionError::Summarizer(ModelError::Timeout(30));
        assert!(err.to_string().contains("30s"));
    }
}
