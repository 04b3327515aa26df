//! Turn and ConversationState domain types.
//!
//! A conversation is an append-only sequence of role-labeled turns plus the
//! budget bookkeeping that travels with it. One `ConversationState` is owned
//! by exactly one orchestrator run and passed explicitly, never shared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cost::{self, EstimationStrategy};

/// Default maximum estimated cost for a conversation.
pub const DEFAULT_COST_CEILING: u64 = 200_000;
/// Default fraction of the ceiling at which compaction triggers.
pub const DEFAULT_COMPACT_AT_FRACTION: f64 = 0.85;

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The caller, or the orchestrator speaking on its behalf
    User,
    /// The model service
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single immutable message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: String,

    /// Who produced this turn
    pub role: Role,

    /// The text content
    pub content: String,

    /// Estimated cost, fixed when the turn is created
    pub cost: u64,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a turn, estimating its cost with `strategy`.
    pub fn new(role: Role, content: impl Into<String>, strategy: EstimationStrategy) -> Self {
        let content = content.into();
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            cost: cost::turn_cost(&content, strategy),
            content,
            timestamp: Utc::now(),
        }
    }

    /// Create a user turn.
    pub fn user(content: impl Into<String>, strategy: EstimationStrategy) -> Self {
        Self::new(Role::User, content, strategy)
    }

    /// Create an assistant turn.
    pub fn assistant(content: impl Into<String>, strategy: EstimationStrategy) -> Self {
        Self::new(Role::Assistant, content, strategy)
    }
}

/// Per-conversation turn history and budget bookkeeping.
///
/// `cost_estimate` always equals the sum of the turn costs plus
/// `reserved_overhead`. It is recomputed from scratch after every structural
/// change rather than adjusted incrementally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    turns: Vec<Turn>,
    cost_estimate: u64,
    reserved_overhead: u64,

    /// Maximum allowed cumulative estimated cost
    pub cost_ceiling: u64,

    /// Fraction of the ceiling at which compaction triggers
    pub compact_at_fraction: f64,

    /// Whether the orchestrator compacts automatically
    pub auto_compact: bool,

    /// Strategy used to cost new turns
    pub strategy: EstimationStrategy,

    /// Number of successful compactions
    pub compaction_count: u32,

    /// When the last successful compaction happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_compaction_time: Option<DateTime<Utc>>,
}

impl ConversationState {
    /// Create an empty conversation with default budget settings.
    pub fn new() -> Self {
        Self {
            turns: Vec::new(),
            cost_estimate: 0,
            reserved_overhead: 0,
            cost_ceiling: DEFAULT_COST_CEILING,
            compact_at_fraction: DEFAULT_COMPACT_AT_FRACTION,
            auto_compact: true,
            strategy: EstimationStrategy::default(),
            compaction_count: 0,
            last_compaction_time: None,
        }
    }

    pub fn with_ceiling(mut self, ceiling: u64) -> Self {
        self.cost_ceiling = ceiling;
        self
    }

    pub fn with_compact_at_fraction(mut self, fraction: f64) -> Self {
        self.compact_at_fraction = fraction;
        self
    }

    pub fn with_auto_compact(mut self, enabled: bool) -> Self {
        self.auto_compact = enabled;
        self
    }

    pub fn with_strategy(mut self, strategy: EstimationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// The ordered turn history.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Sum of turn costs plus the reserved overhead.
    pub fn cost_estimate(&self) -> u64 {
        self.cost_estimate
    }

    /// Cost reserved for framing that is sent with every request but is not
    /// a turn (the system preamble).
    pub fn reserved_overhead(&self) -> u64 {
        self.reserved_overhead
    }

    pub fn set_reserved_overhead(&mut self, overhead: u64) {
        self.reserved_overhead = overhead;
        self.recompute_cost();
    }

    /// Append an already-built turn.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.recompute_cost();
    }

    /// Build a turn with this conversation's strategy and append it.
    pub fn push_text(&mut self, role: Role, content: impl Into<String>) {
        let turn = Turn::new(role, content, self.strategy);
        self.push(turn);
    }

    /// Replace the whole turn sequence. Used by compaction only.
    pub fn replace_turns(&mut self, turns: Vec<Turn>) {
        self.turns = turns;
        self.recompute_cost();
    }

    /// Estimated cost of `text` as a new turn under this conversation's strategy.
    pub fn estimate_turn(&self, text: &str) -> u64 {
        cost::turn_cost(text, self.strategy)
    }

    /// Ceiling scaled by the compaction fraction, rounded down.
    pub fn compaction_threshold(&self) -> u64 {
        (self.cost_ceiling as f64 * self.compact_at_fraction).floor() as u64
    }

    fn recompute_cost(&mut self) {
        self.cost_estimate =
            self.reserved_overhead + self.turns.iter().map(|t| t.cost).sum::<u64>();
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}
