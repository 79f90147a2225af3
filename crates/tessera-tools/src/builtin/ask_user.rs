// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Sent to the TUI when the agent asks a free-text question; the TUI sends
/// the answer back via `answer_tx`.
pub struct QuestionRequest {
    pub id: String,
    pub question: String,
    pub answer_tx: oneshot::Sender<String>,
}

/// Pauses the host UI's spinner/terminal state around an interactive prompt,
/// and resumes it once the answer is collected.
pub type PauseHook = Arc<dyn Fn() + Send + Sync>;

/// Ask the user a single free-text question and return their answer.
///
/// In TUI mode a `question_tx` channel is provided; the tool sends a
/// [`QuestionRequest`] and awaits the answer from the UI. In plain terminal
/// mode stdin must be a TTY; in headless/CI mode the tool returns an error
/// telling the model to proceed on its best judgement.
pub struct AskUserTool {
    question_tx: Option<mpsc::Sender<QuestionRequest>>,
    force_headless: bool,
    on_start: Option<PauseHook>,
    on_end: Option<PauseHook>,
}

impl AskUserTool {
    pub fn new() -> Self {
        Self { question_tx: None, force_headless: false, on_start: None, on_end: None }
    }

    /// Create a TUI-aware instance that sends questions via `tx`.
    pub fn new_tui(tx: mpsc::Sender<QuestionRequest>) -> Self {
        Self { question_tx: Some(tx), force_headless: false, on_start: None, on_end: None }
    }

    /// Create an instance that always behaves as headless (non-interactive).
    /// Use in tests and CI environments where stdin must not be read.
    pub fn new_headless() -> Self {
        Self { question_tx: None, force_headless: true, on_start: None, on_end: None }
    }

    /// Register pause/resume hooks invoked around an interactive prompt so
    /// the host UI can release the terminal (spinners, raw mode) while the
    /// user types their answer.
    pub fn with_pause_hooks(mut self, on_start: PauseHook, on_end: PauseHook) -> Self {
        self.on_start = Some(on_start);
        self.on_end = Some(on_end);
        self
    }
}

impl Default for AskUserTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &str {
        "ask_user"
    }

    fn description(&self) -> &str {
        "Pause and ask the user a single free-text question, then return their answer.\n\
         Unavailable in headless/CI/piped mode — returns an error there; proceed on your\n\
         best judgement and state your assumptions clearly if that happens.\n\
         Use sparingly: only when a decision genuinely cannot be inferred from context."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to ask the user"
                }
            },
            "required": ["question"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let question = match call.args.get("question").and_then(|v| v.as_str()) {
            Some(q) => q.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'question'"),
        };

        debug!(question = %question, "ask_user tool");

        if let Some(hook) = &self.on_start {
            hook();
        }
        let result = self.ask(&call.id, question).await;
        if let Some(hook) = &self.on_end {
            hook();
        }
        result
    }
}

impl AskUserTool {
    async fn ask(&self, call_id: &str, question: String) -> ToolOutput {
        // ── TUI mode ─────────────────────────────────────────────────────────
        if let Some(tx) = &self.question_tx {
            let (answer_tx, answer_rx) = oneshot::channel();
            let req = QuestionRequest { id: call_id.to_string(), question, answer_tx };
            if tx.send(req).await.is_err() {
                return ToolOutput::err(call_id, "TUI question channel closed unexpectedly");
            }
            return match answer_rx.await {
                Ok(answer) => ToolOutput::ok(call_id, answer),
                Err(_) => ToolOutput::err(call_id, "Question was cancelled by the user"),
            };
        }

        // ── Plain terminal / headless mode ────────────────────────────────────
        if self.force_headless || !stdin_is_tty() {
            return ToolOutput::err(
                call_id,
                format!(
                    "ask_user is unavailable in non-interactive (headless/CI/piped) mode.\n\
                     The following question could not be answered: {question}\n\
                     Proceed with your best judgement and state your assumptions clearly."
                ),
            );
        }

        eprintln!();
        eprintln!("╔══ Question from agent ══════════════════════════╗");
        eprintln!("  {question}");
        eprintln!("╚══════════════════════════════════════════════════╝");
        eprint!("  Answer: ");
        let answer = read_stdin_line().await;
        eprintln!();

        ToolOutput::ok(call_id, answer)
    }
}

/// Returns true only when stdin is connected to an interactive terminal.
/// Uses `libc::isatty` on Unix; always false on other platforms.
fn stdin_is_tty() -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: isatty is async-signal-safe and only reads an fd number.
        unsafe { libc::isatty(std::io::stdin().as_raw_fd()) != 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

async fn read_stdin_line() -> String {
    use tokio::io::AsyncBufReadExt;
    let stdin = tokio::io::stdin();
    let mut reader = tokio::io::BufReader::new(stdin);
    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(_) => line.trim_end_matches('\n').trim_end_matches('\r').to_string(),
        Err(_) => String::new(),
    }
}
