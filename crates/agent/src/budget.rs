//! Budget tracking — projected cost, compaction trigger, warning threshold.
//!
//! The tracker is stateless with respect to any one conversation: all running
//! totals live on [`ConversationState`]. It carries the settings used to
//! create new conversations and to price the capability catalogue.

use toolwright_config::{BudgetConfig, ToolOverheadMode};
use toolwright_core::conversation::ConversationState;
use toolwright_core::cost::{self, EstimationStrategy};

/// Cost of describing the available capabilities to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOverhead {
    /// `base + per_capability * enabled capabilities`
    Flat { base: u64, per_capability: u64 },
    /// `base + estimate(rendered catalogue)`
    Calibrated { base: u64 },
}

impl ToolOverhead {
    pub fn compute(&self, catalogue: &str, capabilities: usize, strategy: EstimationStrategy) -> u64 {
        match *self {
            ToolOverhead::Flat {
                base,
                per_capability,
            } => base + per_capability * capabilities as u64,
            ToolOverhead::Calibrated { base } => base + cost::estimate(catalogue, strategy),
        }
    }
}

impl Default for ToolOverhead {
    fn default() -> Self {
        ToolOverhead::Calibrated { base: 200 }
    }
}

/// Estimated cost of the next request: everything already in the
/// conversation, the pending turn, and the capability catalogue.
pub fn projected_cost(state: &ConversationState, new_turn_text: &str, tool_overhead: u64) -> u64 {
    state.cost_estimate() + state.estimate_turn(new_turn_text) + tool_overhead
}

/// Whether `projected` crosses the conversation's compaction threshold.
pub fn needs_compaction(state: &ConversationState, projected: u64) -> bool {
    projected > state.compaction_threshold()
}

/// Budget settings shared by every conversation an orchestrator runs.
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    pub cost_ceiling: u64,
    pub compact_at_fraction: f64,
    pub warning_fraction: f64,
    pub auto_compact: bool,
    pub strategy: EstimationStrategy,
    pub tool_overhead: ToolOverhead,
}

impl BudgetTracker {
    pub fn from_config(config: &BudgetConfig) -> Self {
        let tool_overhead = match config.tool_overhead {
            ToolOverheadMode::Calibrated => ToolOverhead::Calibrated {
                base: config.tool_overhead_base,
            },
            ToolOverheadMode::Flat => ToolOverhead::Flat {
                base: config.tool_overhead_base,
                per_capability: config.tool_overhead_per_capability,
            },
        };
        Self {
            cost_ceiling: config.cost_ceiling,
            compact_at_fraction: config.compact_at_fraction,
            warning_fraction: config.warning_fraction,
            auto_compact: config.auto_compact,
            strategy: config.strategy(),
            tool_overhead,
        }
    }

    /// A fresh conversation carrying these budget settings.
    pub fn new_conversation(&self) -> ConversationState {
        ConversationState::new()
            .with_ceiling(self.cost_ceiling)
            .with_compact_at_fraction(self.compact_at_fraction)
            .with_auto_compact(self.auto_compact)
            .with_strategy(self.strategy)
    }

    /// Overhead of the rendered capability catalogue.
    pub fn tool_overhead(&self, catalogue: &str, capabilities: usize, strategy: EstimationStrategy) -> u64 {
        self.tool_overhead.compute(catalogue, capabilities, strategy)
    }

    /// Whether the conversation has crossed the warning fraction.
    pub fn needs_warning(&self, state: &ConversationState) -> bool {
        let threshold = (state.cost_ceiling as f64 * self.warning_fraction).floor() as u64;
        state.cost_estimate() > threshold
    }
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::from_config(&BudgetConfig::default())
    }
}
