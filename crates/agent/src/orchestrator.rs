//! The orchestration loop.
//!
//! One run drives one task over one [`ConversationState`]:
//!
//! 1. Check cancellation and the iteration limit
//! 2. Price the next request; compact first when it crosses the threshold
//! 3. Send the pending turn to the model service and parse the reply
//! 4. Stop on a final decision
//! 5. Otherwise resolve the capability, validate, gate, execute
//! 6. Turn the outcome into the next pending turn and loop
//!
//! Recoverable problems (unknown capability, invalid input, denial, handler
//! failure) are fed back to the model as the next turn. Everything else ends
//! the run with [`TaskStatus::Failed`].

use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use toolwright_config::{AppConfig, CompactionFailurePolicy, IterationLimit};
use toolwright_core::capability::{ExecutionOutcome, Input};
use toolwright_core::conversation::{ConversationState, Role, Turn};
use toolwright_core::cost;
use toolwright_core::error::{Error, ModelError};
use toolwright_core::event::{DomainEvent, EventBus};
use toolwright_core::model::{ModelRequest, ModelService};
use toolwright_core::registry::CapabilityRegistry;
use tracing::{debug, info, warn};

use crate::approval::{ApprovalCallback, ApprovalGate};
use crate::budget::{self, BudgetTracker};
use crate::compactor::{Compactor, DEFAULT_PRESERVE_RECENT_PAIRS};
use crate::executor;
use crate::parser::DecisionParser;
use crate::prompt;
use crate::validator::{self, ValidationError};

/// Default timeout for each model service call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// How a task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// The model returned a final decision
    Completed,
    /// The iteration limit was reached first
    Exhausted,
    /// A non-recoverable error ended the task
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Completed => "completed",
            TaskStatus::Exhausted => "exhausted",
            TaskStatus::Failed => "failed",
        })
    }
}

/// What happened to one decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    Executed { outcome: ExecutionOutcome },
    Denied,
    Invalid { errors: Vec<ValidationError> },
    UnknownCapability,
}

/// One non-final decision and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub iteration: u32,
    pub action: String,
    pub input: Input,
    pub outcome: StepOutcome,
}

/// The structured result of a run.
#[derive(Debug)]
pub struct TaskResult {
    pub status: TaskStatus,
    /// The final answer, when completed
    pub answer: Option<String>,
    /// The error that ended the task, when failed
    pub error: Option<Error>,
    /// Cycles started
    pub iterations: u32,
    pub history: Vec<StepRecord>,
    /// The conversation as it stood at the end
    pub state: ConversationState,
}

impl TaskResult {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Drives tasks against a model service and a capability registry.
pub struct Orchestrator {
    model: Arc<dyn ModelService>,
    /// Used for compaction; the decision model when unset
    summarizer: Option<Arc<dyn ModelService>>,
    registry: Arc<CapabilityRegistry>,
    parser: DecisionParser,
    gate: ApprovalGate,
    budget: BudgetTracker,
    compactor: Compactor,
    preserve_recent_pairs: usize,
    max_iterations: IterationLimit,
    request_timeout: Duration,
    on_compaction_failure: CompactionFailurePolicy,
    event_bus: Arc<EventBus>,
    cancel: Option<CancellationToken>,
}

impl Orchestrator {
    /// An orchestrator with default settings and safe mode on.
    pub fn new(model: Arc<dyn ModelService>, registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            model,
            summarizer: None,
            registry,
            parser: DecisionParser::default(),
            gate: ApprovalGate::new(true),
            budget: BudgetTracker::default(),
            compactor: Compactor::new().with_timeout(DEFAULT_REQUEST_TIMEOUT),
            preserve_recent_pairs: DEFAULT_PRESERVE_RECENT_PAIRS,
            max_iterations: IterationLimit::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            on_compaction_failure: CompactionFailurePolicy::default(),
            event_bus: Arc::new(EventBus::default()),
            cancel: None,
        }
    }

    /// An orchestrator configured from `config`.
    pub fn from_config(
        config: &AppConfig,
        model: Arc<dyn ModelService>,
        registry: Arc<CapabilityRegistry>,
    ) -> Self {
        let timeout = Duration::from_secs(config.agent.request_timeout_secs);
        Self {
            parser: DecisionParser::new(config.agent.max_response_chars),
            gate: ApprovalGate::new(config.agent.safe_mode),
            budget: BudgetTracker::from_config(&config.budget),
            compactor: Compactor::new().with_timeout(timeout),
            preserve_recent_pairs: config.budget.preserve_recent_pairs,
            max_iterations: config.agent.max_iterations,
            request_timeout: timeout,
            on_compaction_failure: config.agent.on_compaction_failure,
            ..Self::new(model, registry)
        }
    }

    pub fn with_gate(mut self, gate: ApprovalGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_approval_callback(mut self, callback: Arc<dyn ApprovalCallback>) -> Self {
        self.gate = self.gate.with_callback(callback);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn ModelService>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_budget(mut self, budget: BudgetTracker) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_parser(mut self, parser: DecisionParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_max_iterations(mut self, limit: IterationLimit) -> Self {
        self.max_iterations = limit;
        self
    }

    pub fn with_preserve_recent_pairs(mut self, pairs: usize) -> Self {
        self.preserve_recent_pairs = pairs;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self.compactor = Compactor::new().with_timeout(timeout);
        self
    }

    pub fn with_compaction_failure_policy(mut self, policy: CompactionFailurePolicy) -> Self {
        self.on_compaction_failure = policy;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// External abort signal, checked between states.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn budget(&self) -> &BudgetTracker {
        &self.budget
    }

    /// Run `task` in a fresh conversation.
    pub async fn run(&self, task: &str) -> Result<TaskResult, Error> {
        self.run_with_state(task, self.budget.new_conversation()).await
    }

    /// Run `task` as the next user turn of an existing conversation.
    ///
    /// Only a configuration problem is an `Err`; every other ending,
    /// including failures, is reported through [`TaskResult`].
    pub async fn run_with_state(
        &self,
        task: &str,
        mut state: ConversationState,
    ) -> Result<TaskResult, Error> {
        if self.max_iterations == IterationLimit::Unbounded && self.cancel.is_none() {
            return Err(Error::Config {
                message: "an unbounded iteration limit requires a cancellation token".into(),
            });
        }

        state.set_reserved_overhead(cost::estimate(prompt::PREAMBLE, state.strategy));
        info!(
            model = self.model.name(),
            turns = state.len(),
            cost_estimate = state.cost_estimate(),
            "Starting task"
        );

        let mut iterations = 0u32;
        let mut history = Vec::new();
        let mut pending = task.to_string();

        let (status, answer, error) = loop {
            if self.is_cancelled() {
                warn!(iterations, "Task cancelled");
                break (TaskStatus::Failed, None, Some(Error::Cancelled));
            }
            if self.max_iterations.exhausted(iterations) {
                warn!(iterations, "Iteration limit reached");
                break (TaskStatus::Exhausted, None, None);
            }

            iterations += 1;
            self.event_bus.publish(DomainEvent::CycleStarted {
                iteration: iterations,
                cost_estimate: state.cost_estimate(),
                timestamp: Utc::now(),
            });
            debug!(iteration = iterations, cost_estimate = state.cost_estimate(), "Cycle started");

            // ── Budget ──
            let snapshot = self.registry.snapshot();
            let catalogue = prompt::render_catalogue(&snapshot);
            let overhead = self
                .budget
                .tool_overhead(&catalogue, snapshot.len(), state.strategy);
            if let Err(e) = self.ensure_budget(&mut state, &pending, overhead).await {
                break (TaskStatus::Failed, None, Some(e));
            }

            // ── Await decision ──
            // The user turn joins the state only together with its reply.
            let user_turn = Turn::user(std::mem::take(&mut pending), state.strategy);
            let mut turns = state.turns().to_vec();
            turns.push(user_turn.clone());
            let request = ModelRequest::new(turns).with_system(prompt::system_prompt(&catalogue));
            let reply = match self.send(request).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(error = %e, "Model call did not complete");
                    break (TaskStatus::Failed, None, Some(e));
                }
            };
            state.push(user_turn);
            state.push_text(Role::Assistant, reply.clone());
            if self.is_cancelled() {
                warn!(iterations, "Task cancelled after the model replied");
                break (TaskStatus::Failed, None, Some(Error::Cancelled));
            }

            let decision = match self.parser.parse(&reply, &snapshot.names()) {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(error = %e, "Model reply could not be parsed");
                    break (TaskStatus::Failed, None, Some(e.into()));
                }
            };
            self.event_bus.publish(DomainEvent::DecisionParsed {
                iteration: iterations,
                action: decision.action.clone(),
                is_final: decision.is_final(),
                timestamp: Utc::now(),
            });

            // ── Terminal check ──
            if decision.is_final() {
                break (TaskStatus::Completed, Some(decision.answer().to_string()), None);
            }

            let mut step = StepRecord {
                iteration: iterations,
                action: decision.action.clone(),
                input: decision.input.clone(),
                outcome: StepOutcome::UnknownCapability,
            };

            let Some(def) = snapshot.lookup(&decision.action).cloned() else {
                debug!(action = %decision.action, "Unknown capability");
                pending = format!(
                    "Unknown capability '{}'. Available capabilities: {}.",
                    decision.action,
                    snapshot.names().join(", ")
                );
                history.push(step);
                continue;
            };

            // ── Validate ──
            let errors = validator::validate(&def, &decision.input);
            if !errors.is_empty() {
                debug!(action = %def.name, violations = errors.len(), "Invalid input");
                pending = validator::describe(&def.name, &errors);
                step.outcome = StepOutcome::Invalid { errors };
                history.push(step);
                continue;
            }

            // ── Approval ──
            let approval = self
                .gate
                .request_approval(&def, decision.input.clone(), &decision.reasoning)
                .await;
            if self.gate.requires_approval(&def) {
                self.event_bus.publish(DomainEvent::ApprovalResolved {
                    capability: def.name.clone(),
                    approved: approval.approved,
                    timestamp: Utc::now(),
                });
            }
            if !approval.approved {
                info!(capability = %def.name, "Execution denied");
                pending = format!(
                    "The request to run '{}' was denied. Do not retry it unchanged; \
                     choose another approach or finish.",
                    def.name
                );
                step.outcome = StepOutcome::Denied;
                history.push(step);
                continue;
            }
            if approval.input != decision.input {
                let errors = validator::validate(&def, &approval.input);
                step.input = approval.input.clone();
                if !errors.is_empty() {
                    pending = validator::describe(&def.name, &errors);
                    step.outcome = StepOutcome::Invalid { errors };
                    history.push(step);
                    continue;
                }
            }

            if self.is_cancelled() {
                warn!(iterations, capability = %def.name, "Task cancelled before execution");
                break (TaskStatus::Failed, None, Some(Error::Cancelled));
            }

            // ── Execute ──
            let input = validator::apply_defaults(&def, approval.input);
            let started = Instant::now();
            let outcome = executor::execute(&def, input).await;
            self.event_bus.publish(DomainEvent::CapabilityExecuted {
                capability: def.name.clone(),
                success: outcome.is_success(),
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });

            // ── Append ──
            pending = executor::describe(&def.name, &outcome);
            step.outcome = StepOutcome::Executed { outcome };
            history.push(step);
        };

        self.event_bus.publish(DomainEvent::TaskFinished {
            status: status.to_string(),
            iterations,
            timestamp: Utc::now(),
        });
        info!(
            %status,
            iterations,
            steps = history.len(),
            cost_estimate = state.cost_estimate(),
            compactions = state.compaction_count,
            "Task finished"
        );

        Ok(TaskResult {
            status,
            answer,
            error,
            iterations,
            history,
            state,
        })
    }

    /// Make room for the pending turn, compacting when needed. An `Err`
    /// ends the task.
    async fn ensure_budget(
        &self,
        state: &mut ConversationState,
        pending: &str,
        overhead: u64,
    ) -> Result<(), Error> {
        let projected = budget::projected_cost(state, pending, overhead);

        if !state.auto_compact {
            if self.budget.needs_warning(state) {
                warn!(
                    cost_estimate = state.cost_estimate(),
                    cost_ceiling = state.cost_ceiling,
                    "Conversation is nearing its budget"
                );
                self.event_bus.publish(DomainEvent::BudgetWarning {
                    cost_estimate: state.cost_estimate(),
                    cost_ceiling: state.cost_ceiling,
                    timestamp: Utc::now(),
                });
            }
            if projected > state.cost_ceiling {
                return Err(Error::BudgetExceeded {
                    projected,
                    ceiling: state.cost_ceiling,
                });
            }
            return Ok(());
        }

        if !budget::needs_compaction(state, projected) {
            return Ok(());
        }

        info!(projected, threshold = state.compaction_threshold(), "Compacting before send");
        let summarizer = self.summarizer.as_deref().unwrap_or(self.model.as_ref());
        match self
            .compactor
            .compact(state, self.preserve_recent_pairs, summarizer)
            .await
        {
            Ok(report) => {
                self.event_bus.publish(DomainEvent::CompactionCompleted {
                    performed: report.performed,
                    turns_before: report.turns_before,
                    turns_after: report.turns_after,
                    cost_before: report.cost_before,
                    cost_after: report.cost_after,
                    timestamp: Utc::now(),
                });
                let projected = budget::projected_cost(state, pending, overhead);
                if projected > state.cost_ceiling {
                    return Err(Error::BudgetExceededPostCompaction {
                        projected,
                        ceiling: state.cost_ceiling,
                    });
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Compaction failed");
                self.event_bus.publish(DomainEvent::CompactionFailed {
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                match self.on_compaction_failure {
                    CompactionFailurePolicy::Abort => Err(e.into()),
                    CompactionFailurePolicy::Proceed if projected > state.cost_ceiling => {
                        Err(Error::BudgetExceeded {
                            projected,
                            ceiling: state.cost_ceiling,
                        })
                    }
                    CompactionFailurePolicy::Proceed => Ok(()),
                }
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// One model call, bounded by the request timeout and abandoned as soon
    /// as the run is cancelled.
    async fn send(&self, request: ModelRequest) -> Result<String, Error> {
        let call = async {
            tokio::time::timeout(self.request_timeout, self.model.send(request))
                .await
                .map_err(|_| ModelError::Timeout(self.request_timeout.as_secs()))?
        };
        let reply = match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(Error::Cancelled),
                reply = call => reply,
            },
            None => call.await,
        };
        Ok(reply?)
    }
}
