//! End-to-end tests: the orchestrator driving the built-in capabilities
//! against a real temporary workspace, with a scripted model service.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use toolwright_agent::{ApprovalCallback, ApprovalGate, FnApproval, Orchestrator, StepOutcome, TaskStatus};
use toolwright_config::{AppConfig, IterationLimit, ToolsConfig};
use toolwright_core::error::ModelError;
use toolwright_core::{
    ApprovalOutcome, ConversationState, DomainEvent, Error, EstimationStrategy, ExecutionOutcome,
    Input, ModelRequest, ModelService, Role,
};

/// Replays canned replies and records every request.
struct Script {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl Script {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelService for Script {
    fn name(&self) -> &str {
        "script"
    }

    async fn send(&self, request: ModelRequest) -> Result<String, ModelError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::MalformedResponse("script exhausted".into()))
    }
}

/// Always gives the same reply.
struct Stuck(&'static str);

#[async_trait]
impl ModelService for Stuck {
    fn name(&self) -> &str {
        "stuck"
    }

    async fn send(&self, _request: ModelRequest) -> Result<String, ModelError> {
        Ok(self.0.to_string())
    }
}

fn orchestrator(dir: &tempfile::TempDir, model: Arc<dyn ModelService>) -> Orchestrator {
    let registry = toolwright_tools::default_registry(dir.path(), &ToolsConfig::default()).unwrap();
    Orchestrator::from_config(&AppConfig::default(), model, Arc::new(registry))
}

fn decide(approved: bool) -> Arc<dyn ApprovalCallback> {
    Arc::new(FnApproval(move |_: &str, input: &Input, _: &str| {
        if approved {
            ApprovalOutcome::approve(input.clone())
        } else {
            ApprovalOutcome::deny(input.clone())
        }
    }))
}

#[tokio::test]
async fn lists_workspace_then_answers() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.md"), "# notes").unwrap();
    std::fs::create_dir(dir.path().join("src")).unwrap();

    let model = Script::new(&[
        "ACTION: list_files\nINPUT: {}\nREASONING: see what is here\nSTATUS: continue",
        "STATUS: final\nANSWER: One file and one directory.",
    ]);
    let result = orchestrator(&dir, model.clone())
        .run("What is in this directory?")
        .await
        .unwrap();

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.answer.as_deref(), Some("One file and one directory."));
    match &result.history[0].outcome {
        StepOutcome::Executed {
            outcome: ExecutionOutcome::Success { value },
        } => assert_eq!(value, &serde_json::json!(["notes.md", "src/"])),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let requests = model.requests();
    let system = requests[0].system.as_deref().unwrap();
    assert!(system.contains("### write_file (requires approval"));
    assert!(requests[1].turns.last().unwrap().content.contains("notes.md"));
}

#[tokio::test]
async fn denied_write_leaves_workspace_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let model = Script::new(&[
        r#"{"action": "write_file", "input": {"path": "out.txt", "content": "hello"}, "reasoning": "save it", "status": "continue"}"#,
        "STATUS: final\nANSWER: The write was refused.",
    ]);
    let result = orchestrator(&dir, model.clone())
        .with_approval_callback(decide(false))
        .run("Save hello to out.txt")
        .await
        .unwrap();

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.history[0].outcome, StepOutcome::Denied);
    assert!(!dir.path().join("out.txt").exists());
    let requests = model.requests();
    let feedback = &requests[1].turns.last().unwrap().content;
    assert!(feedback.contains("denied"));
}

#[tokio::test]
async fn approved_write_creates_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let model = Script::new(&[
        "ACTION: write_file\nINPUT: {\"path\": \"nested/out.txt\", \"content\": \"hello\"}\nREASONING: save it\nSTATUS: continue",
        "STATUS: final\nANSWER: Saved.",
    ]);
    let result = orchestrator(&dir, model)
        .with_approval_callback(decide(true))
        .run("Save hello to nested/out.txt")
        .await
        .unwrap();

    assert!(result.is_completed());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("nested/out.txt")).unwrap(),
        "hello"
    );
}

#[tokio::test]
async fn unsafe_mode_runs_risky_capabilities_without_asking() {
    let dir = tempfile::tempdir().unwrap();
    let model = Script::new(&[
        r#"{"action": "write_file", "input": {"path": "a.txt", "content": "x"}, "status": "continue"}"#,
        "STATUS: final\nANSWER: done",
    ]);
    let result = orchestrator(&dir, model)
        .with_gate(ApprovalGate::new(false))
        .run("write a.txt")
        .await
        .unwrap();

    assert!(result.is_completed());
    assert!(dir.path().join("a.txt").exists());
}

#[tokio::test]
async fn escaping_the_workspace_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let model = Script::new(&[
        r#"{"action": "read_file", "input": {"path": "../../etc/passwd"}, "status": "continue"}"#,
        "STATUS: final\nANSWER: Not allowed.",
    ]);
    let result = orchestrator(&dir, model.clone())
        .run("read the password file")
        .await
        .unwrap();

    assert!(result.is_completed());
    assert!(matches!(
        &result.history[0].outcome,
        StepOutcome::Executed {
            outcome: ExecutionOutcome::Failure { .. }
        }
    ));
    let requests = model.requests();
    let feedback = &requests[1].turns.last().unwrap().content;
    assert!(feedback.starts_with("Error from 'read_file'"));
}

#[tokio::test]
async fn invalid_input_is_fed_back_for_correction() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
    let model = Script::new(&[
        "ACTION: read_file\nINPUT: {}\nSTATUS: continue",
        "ACTION: read_file\nINPUT: {\"path\": \"a.txt\"}\nSTATUS: continue",
        "STATUS: final\nANSWER: alpha",
    ]);
    let result = orchestrator(&dir, model.clone()).run("read a.txt").await.unwrap();

    assert!(result.is_completed());
    assert!(matches!(result.history[0].outcome, StepOutcome::Invalid { .. }));
    assert!(matches!(result.history[1].outcome, StepOutcome::Executed { .. }));
    let requests = model.requests();
    let feedback = &requests[1].turns.last().unwrap().content;
    assert!(feedback.contains("Invalid input for 'read_file'"));
    assert!(feedback.contains("path"));
}

#[tokio::test]
async fn a_model_stuck_on_an_unknown_capability_exhausts() {
    let dir = tempfile::tempdir().unwrap();
    let result = orchestrator(&dir, Arc::new(Stuck("ACTION: launch_rockets\nSTATUS: continue")))
        .with_max_iterations(IterationLimit::Bounded(3))
        .run("launch")
        .await
        .unwrap();

    assert_eq!(result.status, TaskStatus::Exhausted);
    assert_eq!(result.iterations, 3);
    assert!(
        result
            .history
            .iter()
            .all(|s| s.outcome == StepOutcome::UnknownCapability)
    );
}

#[tokio::test]
async fn unbounded_without_cancellation_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = orchestrator(&dir, Arc::new(Stuck("STATUS: final\nANSWER: hi")))
        .with_max_iterations(IterationLimit::Unbounded)
        .run("hi")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}

#[tokio::test]
async fn long_history_is_compacted_before_the_next_send() {
    let dir = tempfile::tempdir().unwrap();
    let strategy = EstimationStrategy::Standard;
    let mut state = ConversationState::new()
        .with_ceiling(10_000)
        .with_strategy(strategy);
    for i in 0..5 {
        state.push_text(Role::User, format!("question {i} {}", "q".repeat(4000)));
        state.push_text(Role::Assistant, format!("answer {i} {}", "a".repeat(4000)));
    }

    let summarizer = Script::new(&["Five long questions were answered.", "Understood."]);
    let model = Script::new(&["STATUS: final\nANSWER: Picking up where we left off."]);
    let orchestrator = orchestrator(&dir, model.clone()).with_summarizer(summarizer.clone());
    let mut events = orchestrator.event_bus().subscribe();

    let result = orchestrator
        .run_with_state("and one more thing", state)
        .await
        .unwrap();

    assert!(result.is_completed());
    assert_eq!(result.state.compaction_count, 1);
    assert_eq!(summarizer.requests().len(), 2);

    // continuation + acknowledgment + two preserved pairs, then this cycle's exchange
    let requests = model.requests();
    let sent = &requests[0].turns;
    assert_eq!(sent.len(), 7);
    assert!(sent[0].content.contains("Five long questions were answered."));
    assert_eq!(sent[1].content, "Understood.");
    assert!(sent[2].content.starts_with("question 3"));
    assert_eq!(sent[6].content, "and one more thing");

    let mut compacted = false;
    while let Ok(event) = events.try_recv() {
        if let DomainEvent::CompactionCompleted {
            cost_before,
            cost_after,
            ..
        } = event.as_ref()
        {
            assert!(cost_after < cost_before);
            compacted = true;
        }
    }
    assert!(compacted);
}
