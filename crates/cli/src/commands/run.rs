//! `toolwright run` — drive one task through the orchestration loop.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toolwright_agent::{ApprovalGate, Orchestrator, StepOutcome, TaskResult};
use toolwright_config::{AppConfig, IterationLimit};
use toolwright_core::DomainEvent;
use toolwright_providers::OpenAiCompatModel;
use tracing::info;

pub async fn run(
    task: &str,
    unsafe_mode: bool,
    max_iterations: Option<IterationLimit>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if unsafe_mode {
        config.agent.safe_mode = false;
    }
    if let Some(limit) = max_iterations {
        config.agent.max_iterations = limit;
    }
    config.validate()?;

    let model = Arc::new(OpenAiCompatModel::from_config(&config.provider)?);
    let cwd = std::env::current_dir()?;
    let registry = Arc::new(toolwright_tools::default_registry(&cwd, &config.tools)?);
    info!(
        workspace = %cwd.display(),
        model = %config.provider.model,
        safe_mode = config.agent.safe_mode,
        "Starting run"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted; stopping after the current step.");
                cancel.cancel();
            }
        });
    }

    let orchestrator = Orchestrator::from_config(&config, model, registry)
        .with_gate(ApprovalGate::new(config.agent.safe_mode))
        .with_cancellation(cancel);

    let mut events = orchestrator.event_bus().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.as_ref() {
                DomainEvent::CompactionCompleted {
                    performed: true,
                    cost_before,
                    cost_after,
                    ..
                } => eprintln!("[history compacted: {cost_before} -> {cost_after}]"),
                DomainEvent::BudgetWarning {
                    cost_estimate,
                    cost_ceiling,
                    ..
                } => eprintln!("[budget warning: {cost_estimate}/{cost_ceiling}]"),
                _ => {}
            }
        }
    });

    if !config.agent.safe_mode {
        eprintln!("Safe mode is off: risky capabilities run without approval.");
    }

    let result = orchestrator.run(task).await?;
    print_result(&result);

    if let Some(error) = result.error {
        return Err(error.into());
    }
    Ok(())
}

fn print_result(result: &TaskResult) {
    for step in &result.history {
        let summary = match &step.outcome {
            StepOutcome::Executed { outcome } if outcome.is_success() => "ok",
            StepOutcome::Executed { .. } => "error",
            StepOutcome::Denied => "denied",
            StepOutcome::Invalid { .. } => "invalid input",
            StepOutcome::UnknownCapability => "unknown capability",
        };
        eprintln!("  #{} {} ({summary})", step.iteration, step.action);
    }
    eprintln!(
        "Status: {} after {} iteration(s)",
        result.status, result.iterations
    );

    if let Some(answer) = &result.answer {
        println!("{answer}");
    }
}
