//! Approval gate — consent before running risk-classified capabilities.
//!
//! Non-risky capabilities, and everything when safe mode is off, pass
//! straight through. Otherwise a programmatic [`ApprovalCallback`] decides,
//! or, when none is configured, an interactive [`ApprovalPrompt`] asks a
//! human.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use toolwright_core::capability::{ApprovalOutcome, CapabilityDefinition, Input};
use tracing::{debug, warn};

/// Upper bound on prompt rounds before the interactive flow gives up and
/// denies.
pub const MAX_PROMPT_ROUNDS: usize = 8;

/// Programmatic approver.
#[async_trait]
pub trait ApprovalCallback: Send + Sync {
    async fn decide(&self, action: &str, input: &Input, reasoning: &str) -> ApprovalOutcome;
}

/// Adapts a plain closure into an [`ApprovalCallback`].
pub struct FnApproval<F>(pub F);

#[async_trait]
impl<F> ApprovalCallback for FnApproval<F>
where
    F: Fn(&str, &Input, &str) -> ApprovalOutcome + Send + Sync,
{
    async fn decide(&self, action: &str, input: &Input, reasoning: &str) -> ApprovalOutcome {
        (self.0)(action, input, reasoning)
    }
}

/// Interactive approver, used when no callback is configured.
#[async_trait]
pub trait ApprovalPrompt: Send + Sync {
    async fn prompt(
        &self,
        def: &CapabilityDefinition,
        input: &Input,
        reasoning: &str,
    ) -> ApprovalOutcome;
}

/// The checkpoint every decision passes before execution.
#[derive(Clone)]
pub struct ApprovalGate {
    safe_mode: bool,
    callback: Option<Arc<dyn ApprovalCallback>>,
    prompt: Arc<dyn ApprovalPrompt>,
}

impl ApprovalGate {
    /// A gate that prompts on the terminal for risky capabilities.
    pub fn new(safe_mode: bool) -> Self {
        Self {
            safe_mode,
            callback: None,
            prompt: Arc::new(TerminalApprover::stdio()),
        }
    }

    pub fn with_callback(mut self, callback: Arc<dyn ApprovalCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn ApprovalPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn safe_mode(&self) -> bool {
        self.safe_mode
    }

    /// Whether executing `def` needs consent under the current mode.
    pub fn requires_approval(&self, def: &CapabilityDefinition) -> bool {
        def.risky && self.safe_mode
    }

    pub async fn request_approval(
        &self,
        def: &CapabilityDefinition,
        input: Input,
        reasoning: &str,
    ) -> ApprovalOutcome {
        if !self.requires_approval(def) {
            return ApprovalOutcome::approve(input);
        }

        let outcome = match &self.callback {
            Some(callback) => callback.decide(&def.name, &input, reasoning).await,
            None => self.prompt.prompt(def, &input, reasoning).await,
        };
        debug!(
            capability = %def.name,
            approved = outcome.approved,
            edited = outcome.input != input,
            "Approval resolved"
        );
        outcome
    }
}

impl std::fmt::Debug for ApprovalGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalGate")
            .field("safe_mode", &self.safe_mode)
            .field("callback", &self.callback.is_some())
            .finish_non_exhaustive()
    }
}

// ── Terminal prompt ───────────────────────────────────────────────────────

/// Line-oriented approve / deny / edit / view prompt over any async
/// reader and writer.
pub struct TerminalApprover<R, W> {
    io: Mutex<(R, W)>,
}

impl TerminalApprover<BufReader<tokio::io::Stdin>, tokio::io::Stderr> {
    /// Read answers from stdin, write prompts to stderr.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stderr())
    }
}

impl<R, W> TerminalApprover<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    pub fn into_inner(self) -> (R, W) {
        self.io.into_inner()
    }

    async fn converse(
        &self,
        def: &CapabilityDefinition,
        input: &Input,
        reasoning: &str,
    ) -> std::io::Result<ApprovalOutcome> {
        let mut guard = self.io.lock().await;
        let (reader, writer) = &mut *guard;
        let mut current = input.clone();

        let header = format!(
            "\n┌─ Approval required: {}\n│ Reasoning: {}\n│ Input:     {}\n└─\n",
            def.name,
            reasoning.trim(),
            serde_json::Value::Object(current.clone()),
        );
        writer.write_all(header.as_bytes()).await?;

        for _ in 0..MAX_PROMPT_ROUNDS {
            writer
                .write_all(b"  [a]pprove  [d]eny  [e]dit  [v]iew > ")
                .await?;
            writer.flush().await?;

            let Some(choice) = read_line(reader).await? else {
                return Ok(ApprovalOutcome::deny(current));
            };
            match choice.to_ascii_lowercase().as_str() {
                "a" | "approve" | "y" | "yes" => return Ok(ApprovalOutcome::approve(current)),
                "d" | "deny" | "n" | "no" => return Ok(ApprovalOutcome::deny(current)),
                "e" | "edit" => {
                    writer.write_all(b"  New input (JSON object): ").await?;
                    writer.flush().await?;
                    let Some(edited) = read_line(reader).await? else {
                        return Ok(ApprovalOutcome::deny(current));
                    };
                    match serde_json::from_str::<serde_json::Value>(&edited) {
                        Ok(serde_json::Value::Object(map)) => {
                            current = map;
                            let note = format!(
                                "  Input updated: {}\n",
                                serde_json::Value::Object(current.clone())
                            );
                            writer.write_all(note.as_bytes()).await?;
                        }
                        Ok(_) => {
                            writer
                                .write_all(b"  Input must be a JSON object; keeping the previous input.\n")
                                .await?;
                        }
                        Err(e) => {
                            let note = format!("  Invalid JSON ({e}); keeping the previous input.\n");
                            writer.write_all(note.as_bytes()).await?;
                        }
                    }
                }
                "v" | "view" => {
                    let metadata = serde_json::to_string_pretty(&def.metadata())
                        .unwrap_or_else(|_| def.metadata().to_string());
                    writer.write_all(metadata.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                }
                other => {
                    let note = format!("  Unrecognized choice '{other}'.\n");
                    writer.write_all(note.as_bytes()).await?;
                }
            }
        }

        writer
            .write_all(b"  Too many prompts; denying.\n")
            .await?;
        Ok(ApprovalOutcome::deny(current))
    }
}

/// Next trimmed line, or `None` at end of input.
async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

#[async_trait]
impl<R, W> ApprovalPrompt for TerminalApprover<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn prompt(
        &self,
        def: &CapabilityDefinition,
        input: &Input,
        reasoning: &str,
    ) -> ApprovalOutcome {
        match self.converse(def, input, reasoning).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(capability = %def.name, error = %e, "Approval prompt failed; denying");
                ApprovalOutcome::deny(input.clone())
            }
        }
    }
}
