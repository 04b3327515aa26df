//! The structured action request extracted from one model turn.

use serde::{Deserialize, Serialize};

use crate::capability::Input;

/// Whether the loop should continue or the model considers the task done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    Continue,
    Final,
}

impl DecisionStatus {
    /// Interpret a free-form status word. Unknown words mean "continue".
    pub fn from_word(word: &str) -> Self {
        match word.trim().trim_matches(|c| c == '"' || c == '\'').to_ascii_lowercase().as_str() {
            "final" | "done" | "complete" | "completed" | "finish" | "finished" => Self::Final,
            _ => Self::Continue,
        }
    }
}

/// A parsed decision. Lives for exactly one orchestration cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Name of the capability to invoke (empty for a bare final answer)
    pub action: String,

    /// Parameters for the capability
    #[serde(default)]
    pub input: Input,

    /// The model's stated reasoning
    #[serde(default)]
    pub reasoning: String,

    pub status: DecisionStatus,
}

impl Decision {
    /// A final decision whose answer is `answer`.
    pub fn final_answer(answer: impl Into<String>) -> Self {
        Self {
            action: String::new(),
            input: Input::new(),
            reasoning: answer.into(),
            status: DecisionStatus::Final,
        }
    }

    pub fn is_final(&self) -> bool {
        self.status == DecisionStatus::Final
    }

    /// The answer carried by a final decision: `input.answer` when it is a
    /// string, otherwise the reasoning.
    pub fn answer(&self) -> &str {
        self.input
            .get("answer")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.reasoning)
    }
}
