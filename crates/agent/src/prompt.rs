//! System prompt rendering: the response-format preamble and the capability
//! catalogue.
//!
//! Rendering is deterministic. The catalogue follows registry order and each
//! capability's parameters are listed by name.

use std::fmt::Write;
use toolwright_core::registry::RegistrySnapshot;

/// Instructions describing the accepted decision encodings.
pub const PREAMBLE: &str = "\
You are an agent that completes tasks by calling capabilities, one per reply.
After each call you will receive its result and may call another.

Reply in exactly one of these forms.

1. Tagged block:
ACTION: <capability name>
INPUT: {\"param\": \"value\"}
REASONING: <why this step>
STATUS: continue

2. A single JSON object:
{\"action\": \"<capability name>\", \"input\": {\"param\": \"value\"}, \"reasoning\": \"<why>\", \"status\": \"continue\"}

3. Loose block, one parameter per line:
ACTION: <capability name>
INPUT:
  param: value
REASONING: <why this step>
STATUS: continue

When the task is done, reply with:
STATUS: final
ANSWER: <your answer to the user>
";

/// The capability catalogue section of the system prompt.
pub fn render_catalogue(snapshot: &RegistrySnapshot) -> String {
    if snapshot.is_empty() {
        return "## Capabilities\n\n(none available)\n".to_string();
    }

    let mut out = String::from("## Capabilities\n");
    for def in snapshot.all() {
        let mut flags = Vec::new();
        if def.risky {
            flags.push("requires approval");
        }
        if def.hints.read_only {
            flags.push("read-only");
        }
        if def.hints.idempotent {
            flags.push("idempotent");
        }

        let _ = write!(out, "\n### {}", def.name);
        if !flags.is_empty() {
            let _ = write!(out, " ({})", flags.join(", "));
        }
        let _ = writeln!(out, "\n{}", def.description);

        for (name, spec) in &def.parameters {
            let requirement = if spec.required { "required" } else { "optional" };
            let _ = write!(out, "- {name}: {} ({requirement})", spec.param_type);
            if let Some(default) = &spec.default {
                let _ = write!(out, " [default: {default}]");
            }
            if !spec.description.is_empty() {
                let _ = write!(out, " {}", spec.description);
            }
            out.push('\n');
        }
    }
    out
}

/// Full system prompt: preamble followed by the catalogue.
pub fn system_prompt(catalogue: &str) -> String {
    format!("{PREAMBLE}\n{catalogue}")
}
