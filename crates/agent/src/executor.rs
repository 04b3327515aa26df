//! Capability execution inside an isolation boundary.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use toolwright_core::capability::{CapabilityDefinition, ExecutionOutcome, Input};
use tracing::{debug, warn};

/// Run the handler of `def` with already validated input.
///
/// Handler errors and panics both become [`ExecutionOutcome::Failure`]; this
/// function never fails and never unwinds.
pub async fn execute(def: &CapabilityDefinition, input: Input) -> ExecutionOutcome {
    let started = Instant::now();
    let call = AssertUnwindSafe(def.handler().call(input)).catch_unwind();

    let outcome = match call.await {
        Ok(Ok(value)) => ExecutionOutcome::Success { value },
        Ok(Err(e)) => {
            warn!(capability = %def.name, error = %e, "Capability failed");
            ExecutionOutcome::Failure {
                error: e.to_string(),
            }
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(capability = %def.name, panic = %message, "Capability panicked");
            ExecutionOutcome::Failure {
                error: format!("capability '{}' panicked: {message}", def.name),
            }
        }
    };

    debug!(
        capability = %def.name,
        success = outcome.is_success(),
        duration_ms = started.elapsed().as_millis() as u64,
        "Capability executed"
    );
    outcome
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Render an outcome as the text of the next user turn.
pub fn describe(action: &str, outcome: &ExecutionOutcome) -> String {
    match outcome {
        ExecutionOutcome::Success { value } => {
            let body = match value {
                serde_json::Value::String(s) => s.clone(),
                other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
            };
            format!("Result of '{action}':\n{body}")
        }
        ExecutionOutcome::Failure { error } => format!("Error from '{action}': {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolwright_core::error::HandlerError;

    #[tokio::test]
    async fn success_wraps_value() {
        let def = CapabilityDefinition::from_fn("list_files", "", |_| Ok(json!(["a", "b", "c"])));
        let outcome = execute(&def, Input::new()).await;
        assert_eq!(
            outcome,
            ExecutionOutcome::Success {
                value: json!(["a", "b", "c"])
            }
        );
    }

    #[tokio::test]
    async fn handler_error_becomes_failure() {
        let def = CapabilityDefinition::from_fn("read_file", "", |_| {
            Err(HandlerError::ExecutionFailed {
                capability: "read_file".into(),
                reason: "no such file".into(),
            })
        });
        let outcome = execute(&def, Input::new()).await;
        match outcome {
            ExecutionOutcome::Failure { error } => assert!(error.contains("no such file")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let def = CapabilityDefinition::from_fn("boom", "", |_| panic!("kaboom"));
        let outcome = execute(&def, Input::new()).await;
        match outcome {
            ExecutionOutcome::Failure { error } => {
                assert!(error.contains("boom"));
                assert!(error.contains("kaboom"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn describe_formats_both_outcomes() {
        let ok = describe("list_files", &ExecutionOutcome::Success { value: json!("a\nb") });
        assert_eq!(ok, "Result of 'list_files':\na\nb");
        let err = describe(
            "read_file",
            &ExecutionOutcome::Failure {
                error: "missing".into(),
            },
        );
        assert_eq!(err, "Error from 'read_file': missing");
    }
}
