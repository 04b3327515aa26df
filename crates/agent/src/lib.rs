//! The orchestration loop — the heart of Toolwright.
//!
//! Each cycle follows **Budget → Decide → Validate → Approve → Execute**:
//!
//! 1. **Price** the next request and compact history when it crosses the
//!    threshold
//! 2. **Ask** the model service for a decision and parse its reply
//! 3. **Stop** on a final decision
//! 4. **Check** the named capability and its input against the registry
//! 5. **Gate** risky capabilities behind approval
//! 6. **Execute** and feed the outcome back as the next turn
//!
//! The loop ends on a final decision, when the iteration limit is reached,
//! or on a non-recoverable error.

pub mod approval;
pub mod budget;
pub mod compactor;
pub mod executor;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod validator;

#[cfg(test)]
mod test_helpers;

pub use approval::{ApprovalCallback, ApprovalGate, ApprovalPrompt, FnApproval, TerminalApprover};
pub use budget::{BudgetTracker, ToolOverhead};
pub use compactor::{CompactionReport, Compactor};
pub use orchestrator::{Orchestrator, StepOutcome, StepRecord, TaskResult, TaskStatus};
pub use parser::{DecisionFormat, DecisionParser};
pub use validator::ValidationError;
