//! Input validation against a capability's parameter schema.
//!
//! Validation is total: every violation is reported, not just the first, so
//! the model can correct all of them in one retry.

use serde::Serialize;
use std::fmt;
use toolwright_core::capability::{CapabilityDefinition, Input};

/// One schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    /// A required parameter is absent
    Missing { param: String },
    /// A present parameter has the wrong type
    TypeMismatch {
        param: String,
        expected: String,
        found: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Missing { param } => {
                write!(f, "missing required parameter '{param}'")
            }
            ValidationError::TypeMismatch {
                param,
                expected,
                found,
            } => write!(f, "parameter '{param}' must be {expected}, got {found}"),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "object",
    }
}

/// Check `input` against the schema of `def`. An empty result means valid.
///
/// Parameters not named in the schema are ignored.
pub fn validate(def: &CapabilityDefinition, input: &Input) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for (name, spec) in &def.parameters {
        match input.get(name) {
            None if spec.required => errors.push(ValidationError::Missing {
                param: name.clone(),
            }),
            None => {}
            Some(value) if !spec.param_type.matches(value) => {
                errors.push(ValidationError::TypeMismatch {
                    param: name.clone(),
                    expected: spec.param_type.to_string(),
                    found: json_kind(value).to_string(),
                })
            }
            Some(_) => {}
        }
    }
    errors
}

/// Fill in declared defaults for optional parameters the input leaves out.
pub fn apply_defaults(def: &CapabilityDefinition, mut input: Input) -> Input {
    for (name, spec) in &def.parameters {
        if let Some(default) = &spec.default
            && !input.contains_key(name)
        {
            input.insert(name.clone(), default.clone());
        }
    }
    input
}

/// Render violations as the text fed back to the model.
pub fn describe(action: &str, errors: &[ValidationError]) -> String {
    let mut text = format!("Invalid input for '{action}':");
    for error in errors {
        text.push_str("\n- ");
        text.push_str(&error.to_string());
    }
    text
}
