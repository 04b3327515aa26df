//! Capability definitions — the tools the model may choose from.
//!
//! A capability pairs a schema (name, description, risk flag, hints, typed
//! parameters) with a handler. The schema is what the model sees and what the
//! validator checks; the handler is only ever invoked by the executor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::HandlerError;

/// Parameter map passed to a capability.
pub type Input = serde_json::Map<String, serde_json::Value>;

/// The closed set of parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    /// A list whose elements are all strings
    TextCollection,
    Number,
    Integer,
    Boolean,
    List,
    Any,
}

impl ParamType {
    /// Whether `value` has this type.
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::TextCollection => value
                .as_array()
                .is_some_and(|items| items.iter().all(|v| v.is_string())),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::List => value.is_array(),
            ParamType::Any => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::TextCollection => "text_collection",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::List => "list",
            ParamType::Any => "any",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Schema for one parameter. Used only for validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub param_type: ParamType,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ParamSpec {
    pub fn required(param_type: ParamType) -> Self {
        Self {
            param_type,
            required: true,
            default: None,
            description: String::new(),
        }
    }

    pub fn optional(param_type: ParamType) -> Self {
        Self {
            param_type,
            required: false,
            default: None,
            description: String::new(),
        }
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Behavioral hints shown to the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityHints {
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub idempotent: bool,
}

/// The code behind a capability.
///
/// Handlers own their side effects. They may fail with a [`HandlerError`];
/// the executor also contains panics, so a handler cannot take down the loop.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn call(&self, input: Input) -> Result<serde_json::Value, HandlerError>;
}

/// Adapts a plain closure into a [`CapabilityHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> CapabilityHandler for FnHandler<F>
where
    F: Fn(Input) -> Result<serde_json::Value, HandlerError> + Send + Sync,
{
    async fn call(&self, input: Input) -> Result<serde_json::Value, HandlerError> {
        (self.0)(input)
    }
}

/// A named, schema-described, invocable capability.
#[derive(Clone)]
pub struct CapabilityDefinition {
    pub name: String,
    pub description: String,
    pub risky: bool,
    pub hints: CapabilityHints,
    /// Ordered by name so catalogue rendering is stable
    pub parameters: BTreeMap<String, ParamSpec>,
    /// Tags used by `CapabilityRegistry::by_group`
    pub groups: Vec<String>,
    handler: Arc<dyn CapabilityHandler>,
}

impl CapabilityDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            risky: false,
            hints: CapabilityHints::default(),
            parameters: BTreeMap::new(),
            groups: Vec::new(),
            handler,
        }
    }

    /// Build a definition around a synchronous closure.
    pub fn from_fn<F>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(Input) -> Result<serde_json::Value, HandlerError> + Send + Sync + 'static,
    {
        Self::new(name, description, Arc::new(FnHandler(f)))
    }

    pub fn risky(mut self) -> Self {
        self.risky = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.hints.read_only = true;
        self
    }

    pub fn idempotent(mut self) -> Self {
        self.hints.idempotent = true;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.parameters.insert(name.into(), spec);
        self
    }

    pub fn in_group(mut self, tag: impl Into<String>) -> Self {
        self.groups.push(tag.into());
        self
    }

    pub fn handler(&self) -> &Arc<dyn CapabilityHandler> {
        &self.handler
    }

    /// Everything about the capability except its handler, as JSON.
    pub fn metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "risky": self.risky,
            "hints": self.hints,
            "parameters": self.parameters,
            "groups": self.groups,
        })
    }
}

impl fmt::Debug for CapabilityDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDefinition")
            .field("name", &self.name)
            .field("risky", &self.risky)
            .field("hints", &self.hints)
            .field("parameters", &self.parameters)
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

/// The result of the approval gate for one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    pub approved: bool,
    /// The input to execute with; may differ from the request if edited
    pub input: Input,
}

impl ApprovalOutcome {
    pub fn approve(input: Input) -> Self {
        Self {
            approved: true,
            input,
        }
    }

    pub fn deny(input: Input) -> Self {
        Self {
            approved: false,
            input,
        }
    }
}

/// The result of running a capability handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success { value: serde_json::Value },
    Failure { error: String },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }
}
