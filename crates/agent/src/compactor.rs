//! Compactor — model-assisted history compression.
//!
//! Older turns are summarized by the model service and replaced by two
//! synthetic turns (a continuation turn carrying the summary and the model's
//! acknowledgment). The most recent `2 * preserve_recent_pairs` turns are kept
//! verbatim. The state is only touched after both model calls succeed and
//! the result is cheaper than what it replaces.

use chrono::Utc;
use std::time::Duration;
use toolwright_core::conversation::{ConversationState, Turn};
use toolwright_core::error::{CompactionError, ModelError};
use toolwright_core::model::{ModelRequest, ModelService};
use tracing::{debug, info};

/// Default number of recent user/assistant pairs kept verbatim.
pub const DEFAULT_PRESERVE_RECENT_PAIRS: usize = 2;

const SUMMARY_INSTRUCTION: &str = "You are compressing the history of an agent conversation so it can \
continue within its budget. Write a concise summary of the transcript you are given. Retain every \
decision made, open questions, key outputs of tool calls (file names, values, errors), and the next \
steps. Drop redundant, repeated, or superseded material. Reply with the summary only.";

const DEFAULT_ACKNOWLEDGMENT: &str = "Understood. I will continue the task from this summary.";

/// What a compaction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    /// False when there was nothing old enough to summarize
    pub performed: bool,
    pub turns_before: usize,
    pub turns_after: usize,
    pub cost_before: u64,
    pub cost_after: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Compactor {
    timeout: Option<Duration>,
}

impl Compactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each summarizer call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Compact `state` in place, keeping the last `preserve_recent_pairs`
    /// pairs. On error `state` is unchanged.
    pub async fn compact(
        &self,
        state: &mut ConversationState,
        preserve_recent_pairs: usize,
        summarizer: &dyn ModelService,
    ) -> Result<CompactionReport, CompactionError> {
        let turns_before = state.len();
        let cost_before = state.cost_estimate();
        let keep = preserve_recent_pairs.saturating_mul(2);

        if turns_before <= keep {
            debug!(turns = turns_before, keep, "Nothing to compact");
            return Ok(CompactionReport {
                performed: false,
                turns_before,
                turns_after: turns_before,
                cost_before,
                cost_after: cost_before,
            });
        }

        let split = turns_before - keep;
        let (older, recent) = state.turns().split_at(split);

        let transcript = render_transcript(older);
        let summary_request = ModelRequest::new(vec![Turn::user(transcript, state.strategy)])
            .with_system(SUMMARY_INSTRUCTION);
        let summary = self
            .call(summarizer, summary_request)
            .await
            .map_err(CompactionError::Summarizer)?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(CompactionError::EmptySummary);
        }

        let continuation = Turn::user(
            format!(
                "This conversation was compacted to stay within its budget. \
                 Summary of the earlier turns:\n\n{summary}\n\nContinue the task from here."
            ),
            state.strategy,
        );
        let ack_request = ModelRequest::new(vec![continuation.clone()]);
        let acknowledgment = self
            .call(summarizer, ack_request)
            .await
            .map_err(CompactionError::Acknowledgment)?;
        let acknowledgment = match acknowledgment.trim() {
            "" => DEFAULT_ACKNOWLEDGMENT.to_string(),
            text => text.to_string(),
        };

        let mut turns = Vec::with_capacity(2 + recent.len());
        turns.push(continuation);
        turns.push(Turn::assistant(acknowledgment, state.strategy));
        turns.extend(recent.iter().cloned());

        let cost_after = state.reserved_overhead() + turns.iter().map(|t| t.cost).sum::<u64>();
        if cost_after >= cost_before {
            return Err(CompactionError::NoReduction {
                before: cost_before,
                after: cost_after,
            });
        }

        state.replace_turns(turns);
        state.compaction_count += 1;
        state.last_compaction_time = Some(Utc::now());

        let report = CompactionReport {
            performed: true,
            turns_before,
            turns_after: state.len(),
            cost_before,
            cost_after: state.cost_estimate(),
        };
        info!(
            turns_before,
            turns_after = report.turns_after,
            cost_before,
            cost_after = report.cost_after,
            "Conversation compacted"
        );
        Ok(report)
    }

    async fn call(
        &self,
        summarizer: &dyn ModelService,
        request: ModelRequest,
    ) -> Result<String, ModelError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, summarizer.send(request))
                .await
                .map_err(|_| ModelError::Timeout(limit.as_secs()))?,
            None => summarizer.send(request).await,
        }
    }
}

/// Older turns as role-labeled sections.
fn render_transcript(turns: &[Turn]) -> String {
    let mut out = String::from("Transcript to summarize:\n");
    for turn in turns {
        out.push_str("\n### ");
        out.push_str(turn.role.label());
        out.push('\n');
        out.push_str(&turn.content);
        out.push('\n');
    }
    out
}
