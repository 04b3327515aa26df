//! Cost estimation.
//!
//! Uses a character-based heuristic rather than a tokenizer. The ratio is an
//! empirically tuned constant, so it is exposed as a replaceable
//! [`EstimationStrategy`]. The default strategy multiplies the estimate by a
//! safety factor so it acts as an upper bound rather than a best guess.

use serde::{Deserialize, Serialize};

/// Fixed framing cost added to every turn (role label, delimiters).
pub const TURN_OVERHEAD: u64 = 4;

/// Default safety multiplier for [`EstimationStrategy::Conservative`].
pub const DEFAULT_SAFETY_MULTIPLIER: f64 = 1.2;

/// How text length maps to estimated cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimationStrategy {
    /// ~4 characters per unit. Good for English prose.
    Standard,
    /// ~3 characters per unit. Source code and JSON tokenize more densely.
    Code,
    /// The standard ratio scaled by a multiplier greater than 1.0.
    Conservative { safety_multiplier: f64 },
}

impl EstimationStrategy {
    /// Characters per cost unit before any safety scaling.
    pub fn chars_per_unit(&self) -> usize {
        match self {
            Self::Standard | Self::Conservative { .. } => 4,
            Self::Code => 3,
        }
    }
}

impl Default for EstimationStrategy {
    fn default() -> Self {
        Self::Conservative {
            safety_multiplier: DEFAULT_SAFETY_MULTIPLIER,
        }
    }
}

/// Estimate the cost of a piece of text. Deterministic and linear in the
/// length of `text`. Rounds up.
pub fn estimate(text: &str, strategy: EstimationStrategy) -> u64 {
    if text.is_empty() {
        return 0;
    }
    let chars = text.chars().count();
    let base = chars.div_ceil(strategy.chars_per_unit()) as u64;
    match strategy {
        EstimationStrategy::Conservative { safety_multiplier } => {
            (base as f64 * safety_multiplier.max(1.0)).ceil() as u64
        }
        _ => base,
    }
}

/// Estimated cost of a turn carrying `content`, including framing overhead.
pub fn turn_cost(content: &str, strategy: EstimationStrategy) -> u64 {
    TURN_OVERHEAD + estimate(content, strategy)
}
