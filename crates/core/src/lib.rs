//! # Toolwright Core
//!
//! Domain types, traits, and error definitions for the Toolwright agent
//! orchestration core. This crate has **no framework dependencies** — it
//! defines the domain model that the other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is a trait here (`ModelService`, `CapabilityHandler`,
//! `CapabilitySource`). Implementations live in their own crates, which
//! keeps the orchestration loop testable with scripted mocks.

pub mod capability;
pub mod conversation;
pub mod cost;
pub mod decision;
pub mod error;
pub mod event;
pub mod model;
pub mod registry;

// Re-export key types at crate root for ergonomics
pub use capability::{
    ApprovalOutcome, CapabilityDefinition, CapabilityHandler, CapabilityHints,
    ExecutionOutcome, FnHandler, Input, ParamSpec, ParamType,
};
pub use conversation::{ConversationState, Role, Turn};
pub use cost::{EstimationStrategy, estimate};
pub use decision::{Decision, DecisionStatus};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use model::{ModelRequest, ModelService};
pub use registry::{CapabilityRegistry, CapabilitySource, RegistrySnapshot, StaticSource};
