// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The turn loop: calls the model, dispatches the tool calls it asks for,
//! and repeats until it stops asking or `max_turns` is exhausted (§4.1).

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use tessera_model::{CancelToken, Message, ModelEvent, ModelProvider, Part, Request, ToolChoice, ToolSpec};
use tessera_tools::{ApprovalManager, ToolCall as ToolInvocation, ToolOutputPart, ToolRegistry};

use crate::allowed_tools::AllowedTools;
use crate::events::UIEvent;
use crate::session::{SessionStatus, SessionStore};
use crate::stream_adapter::{phase_for_tool, StreamAdapter};

const SEARCH_TOOL_NAMES: &[&str] = &["web_search", "read_url"];

/// A struct of optional closures rather than global mutable state (§9), so
/// multiple Engines (e.g. a parent and its sub-agents) can run concurrently
/// without stepping on each other.
#[derive(Clone)]
pub struct EngineCallbacks {
    pub on_event: Arc<dyn Fn(UIEvent) + Send + Sync>,
}

impl EngineCallbacks {
    pub fn new(on_event: impl Fn(UIEvent) + Send + Sync + 'static) -> Self {
        Self { on_event: Arc::new(on_event) }
    }

    fn emit(&self, ev: UIEvent) {
        (self.on_event)(ev);
    }
}

pub struct Engine {
    model: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    approvals: Arc<ApprovalManager>,
    store: Arc<dyn SessionStore>,
    allowed_tools: AllowedTools,
    max_turns: u32,
    /// Tool forced on the final turn so the model emits a structured final
    /// answer instead of more tool calls (e.g. `set_output`).
    last_turn_tool_choice: Option<String>,
    /// Tool choice sent on every non-final turn's request.
    tool_choice: ToolChoice,
    /// Whether a turn's tool calls dispatch concurrently (`Request::
    /// parallel_tool_calls`) or strictly in order.
    parallel_tool_calls: bool,
    tool_result_char_cap: usize,
}

impl Engine {
    pub fn new(
        model: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        approvals: Arc<ApprovalManager>,
        store: Arc<dyn SessionStore>,
        max_turns: u32,
    ) -> Self {
        Self {
            model,
            tools,
            approvals,
            store,
            allowed_tools: AllowedTools::all(),
            max_turns,
            last_turn_tool_choice: None,
            tool_choice: ToolChoice::Auto,
            parallel_tool_calls: true,
            tool_result_char_cap: 16_000,
        }
    }

    pub fn with_last_turn_tool_choice(mut self, tool_name: impl Into<String>) -> Self {
        self.last_turn_tool_choice = Some(tool_name.into());
        self
    }

    /// Tool choice sent on every non-final turn (§4.1 step 1). Defaults to
    /// `Auto`; `Required` with an empty effective tool set is a synthetic
    /// error rather than a provider call (§8).
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    pub fn with_tool_result_char_cap(mut self, cap: usize) -> Self {
        self.tool_result_char_cap = cap;
        self
    }

    fn effective_tool_specs(&self, search: bool) -> Vec<ToolSpec> {
        self.tools
            .schemas()
            .into_iter()
            .filter(|s| self.allowed_tools.is_allowed(&s.name))
            .filter(|s| search || !SEARCH_TOOL_NAMES.contains(&s.name.as_str()))
            .map(|s| ToolSpec { name: s.name, description: s.description, json_schema: s.parameters })
            .collect()
    }

    /// Run the turn loop for `session_id` until the model stops calling
    /// tools, a `set_output` call declares a final answer, or `max_turns` is
    /// exhausted. Returns the final structured output, if one was declared.
    pub async fn run(
        &self,
        ctx: CancelToken,
        session_id: &str,
        model_name: &str,
        search: bool,
        callbacks: EngineCallbacks,
    ) -> anyhow::Result<Option<Value>> {
        let mut total_tool_calls: u32 = 0;
        let mut total_input: u64 = 0;
        let mut total_output: u64 = 0;

        for turn in 0..self.max_turns {
            if ctx.is_cancelled() {
                self.store.update_status(session_id, SessionStatus::Interrupted).await.ok();
                callbacks.emit(UIEvent::Error("cancelled".into()));
                callbacks.emit(UIEvent::Done);
                return Ok(None);
            }

            callbacks.emit(UIEvent::Phase("Thinking".into()));

            let messages = self.store.get_messages(session_id, None, 0).await?;
            let is_last_turn = turn + 1 == self.max_turns;

            let mut req = Request::new(model_name, session_id, messages);
            req.tools = self.effective_tool_specs(search);
            req.tool_choice = self.tool_choice.clone();
            req.parallel_tool_calls = self.parallel_tool_calls;
            req.search = search;
            if is_last_turn {
                req.last_turn_tool_choice = self.last_turn_tool_choice.clone();
            }

            if req.tools.is_empty() && matches!(req.tool_choice, ToolChoice::Required) {
                self.store.update_status(session_id, SessionStatus::Error).await.ok();
                callbacks.emit(UIEvent::Error(
                    "tool_choice is Required but no tool is available for this turn".into(),
                ));
                callbacks.emit(UIEvent::Done);
                return Ok(None);
            }

            let parallel = req.parallel_tool_calls;
            let mut stream = self.model.stream(ctx.clone(), req).await?;

            let mut adapter = StreamAdapter::new();
            let mut text = String::new();
            let mut tool_calls: Vec<(String, String, String)> = Vec::new(); // (id, name, arguments)
            let mut stream_error: Option<String> = None;

            while let Some(item) = stream.next().await {
                if ctx.is_cancelled() {
                    break;
                }
                let ev = match item {
                    Ok(ev) => ev,
                    Err(e) => {
                        stream_error = Some(e.to_string());
                        break;
                    }
                };

                match &ev {
                    ModelEvent::TextDelta(s) => text.push_str(s),
                    ModelEvent::ToolCall(call) => {
                        tool_calls.push((call.id.clone(), call.name.clone(), call.arguments.clone()));
                    }
                    ModelEvent::Usage(u) => {
                        total_input += u.input;
                        total_output += u.output;
                    }
                    ModelEvent::Error(msg) => stream_error = Some(msg.clone()),
                    _ => {}
                }

                let is_done = matches!(ev, ModelEvent::Done);
                if let Some(ui_ev) = adapter.translate_model_event(&ev) {
                    callbacks.emit(ui_ev);
                }
                if is_done {
                    break;
                }
            }

            if let Some(msg) = stream_error {
                warn!(error = %msg, "model stream error");
                self.store.update_status(session_id, SessionStatus::Error).await.ok();
                callbacks.emit(UIEvent::Error(msg));
                callbacks.emit(UIEvent::Done);
                return Ok(None);
            }

            let mut assistant_parts = Vec::new();
            if !text.is_empty() {
                assistant_parts.push(Part::text(text));
            }
            for (id, name, args) in &tool_calls {
                assistant_parts.push(Part::tool_call(id.clone(), name.clone(), args.clone()));
            }
            if !assistant_parts.is_empty() {
                self.store
                    .add_message(session_id, Message::new(tessera_model::Role::Assistant, assistant_parts))
                    .await?;
            }

            if tool_calls.is_empty() {
                self.store
                    .update_metrics(session_id, turn + 1, total_tool_calls, total_input, total_output)
                    .await
                    .ok();
                self.store.update_status(session_id, SessionStatus::Complete).await.ok();
                callbacks.emit(UIEvent::Done);
                return Ok(None);
            }

            // The assistant turn is already persisted above — dispatch begins
            // only after that write succeeds, so a crash mid-dispatch still
            // leaves the model's intent in the transcript.
            total_tool_calls += tool_calls.len() as u32;
            let dispatch_adapter = std::sync::Mutex::new(adapter);
            let dispatched = if parallel {
                futures::future::join_all(tool_calls.iter().map(|(id, name, args)| {
                    self.dispatch_one(id.clone(), name.clone(), args.clone(), &callbacks, &dispatch_adapter)
                }))
                .await
            } else {
                let mut out = Vec::with_capacity(tool_calls.len());
                for (id, name, args) in &tool_calls {
                    out.push(
                        self.dispatch_one(id.clone(), name.clone(), args.clone(), &callbacks, &dispatch_adapter)
                            .await,
                    );
                }
                out
            };

            let mut result_parts = Vec::new();
            let mut final_output = None;

            for outcome in dispatched {
                match outcome {
                    DispatchOutcome::Result { id, name, content } => {
                        result_parts.push(Part::tool_result(id, name, content));
                    }
                    DispatchOutcome::FinalOutput { id, name, content, value } => {
                        result_parts.push(Part::tool_result(id, name, content));
                        final_output = Some(value);
                    }
                    DispatchOutcome::ActivateSkill { id, name, content, allowed_tools } => {
                        result_parts.push(Part::tool_result(id, name, content));
                        self.allowed_tools.narrow(allowed_tools);
                    }
                }
            }

            self.store.add_message(session_id, Message::tool_results(result_parts)).await?;
            self.store
                .update_metrics(session_id, turn + 1, total_tool_calls, total_input, total_output)
                .await
                .ok();

            if let Some(value) = final_output {
                self.store.update_status(session_id, SessionStatus::Complete).await.ok();
                callbacks.emit(UIEvent::Done);
                return Ok(Some(value));
            }
        }

        // Max turns exhausted is not itself a failure (§7): the synthetic
        // notice stands in for a final answer, so the session still reaches
        // Complete rather than Error.
        self.store.update_status(session_id, SessionStatus::Complete).await.ok();
        callbacks.emit(UIEvent::Text(
            "\n\n[stopped: reached the maximum number of turns for this run]".into(),
        ));
        callbacks.emit(UIEvent::Done);
        Ok(None)
    }

    async fn dispatch_one(
        &self,
        call_id: String,
        name: String,
        arguments: String,
        callbacks: &EngineCallbacks,
        adapter: &std::sync::Mutex<StreamAdapter>,
    ) -> DispatchOutcome {
        let info_preview =
            if arguments.len() > 80 { format!("{}…", &arguments[..80]) } else { arguments.clone() };
        if let Some(ev) = adapter.lock().unwrap().tool_start(&call_id, &name, &info_preview) {
            callbacks.emit(ev);
        }
        callbacks.emit(UIEvent::Phase(phase_for_tool(&name)));

        let output = self.execute_tool_call(&call_id, &name, &arguments).await;

        if let Some(ev) = adapter.lock().unwrap().tool_end(&call_id, !output.is_error) {
            callbacks.emit(ev);
        }

        for part in &output.parts {
            match part {
                ToolOutputPart::Diff(d) => {
                    callbacks.emit(UIEvent::Diff { path: name.clone(), old: String::new(), new: d.clone() });
                }
                ToolOutputPart::Image(data_url) => {
                    callbacks.emit(UIEvent::Image { path: data_url.clone() });
                }
                ToolOutputPart::Text(_) => {}
            }
        }

        let truncated = self.truncate(&output.content);

        match output.event {
            Some(tessera_tools::ToolEvent::FinalOutput(value)) => {
                DispatchOutcome::FinalOutput { id: call_id, name, content: truncated, value }
            }
            Some(tessera_tools::ToolEvent::ActivateSkill { name: skill_name, allowed_tools }) => {
                debug!(skill = %skill_name, "skill activated");
                DispatchOutcome::ActivateSkill { id: call_id, name, content: truncated, allowed_tools }
            }
            None => DispatchOutcome::Result { id: call_id, name, content: truncated },
        }
    }

    async fn execute_tool_call(&self, call_id: &str, name: &str, arguments: &str) -> tessera_tools::ToolOutput {
        if !self.allowed_tools.is_allowed(name) {
            return tessera_tools::ToolOutput::err(
                call_id,
                format!("tool \"{name}\" is not available — the active skill's allow-list does not include it"),
            );
        }

        let args: Value = match serde_json::from_str(arguments) {
            Ok(v) => v,
            Err(e) => return tessera_tools::ToolOutput::err(call_id, format!("invalid arguments JSON: {e}")),
        };

        let call = ToolInvocation { id: call_id.to_string(), name: name.to_string(), args };

        let Some(tool) = self.tools.get(name) else {
            return tessera_tools::ToolOutput::err(call_id, format!("unknown tool: {name}"));
        };

        if let Some(kind) = tool.approval_kind(&call) {
            if !self.approvals.check(kind).await {
                return tessera_tools::ToolOutput::err(call_id, "denied by the approval manager");
            }
        }

        tool.execute(&call).await
    }

    fn truncate(&self, content: &str) -> String {
        if self.tool_result_char_cap == 0 || content.chars().count() <= self.tool_result_char_cap {
            return content.to_string();
        }
        let head = self.tool_result_char_cap * 3 / 4;
        let tail = self.tool_result_char_cap - head;
        let chars: Vec<char> = content.chars().collect();
        let head_part: String = chars[..head].iter().collect();
        let tail_part: String = chars[chars.len() - tail..].iter().collect();
        format!("{head_part}\n...[truncated {} chars]...\n{tail_part}", chars.len() - self.tool_result_char_cap)
    }
}

enum DispatchOutcome {
    Result { id: String, name: String, content: String },
    FinalOutput { id: String, name: String, content: String, value: Value },
    ActivateSkill { id: String, name: String, content: String, allowed_tools: Vec<String> },
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use serde_json::json;
    use tessera_config::ToolsConfig;
    use tessera_model::{MockProvider, ScriptedTurn, ToolCallEvent};
    use tessera_tools::{ToolOutput, ToolRegistry};

    use crate::session::{InMemorySessionStore, Session};

    use super::*;

    async fn fresh_session(store: &Arc<InMemorySessionStore>) -> String {
        let session = Session::new("mock", "mock-model");
        let id = session.id.clone();
        store.create(session).await.unwrap();
        store.add_message(&id, Message::user("hello")).await.unwrap();
        id
    }

    fn events_sink() -> (EngineCallbacks, Arc<StdMutex<Vec<UIEvent>>>) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let log2 = log.clone();
        (EngineCallbacks::new(move |ev| log2.lock().unwrap().push(ev)), log)
    }

    #[tokio::test]
    async fn text_only_turn_ends_the_run_without_final_output() {
        let store = InMemorySessionStore::new();
        let session_id = fresh_session(&store).await;
        let model = Arc::new(MockProvider::single_text_reply("all done"));
        let tools = Arc::new(ToolRegistry::new());
        let approvals = Arc::new(ApprovalManager::from_config("test", &ToolsConfig::default()));

        let engine = Engine::new(model, tools, approvals, store, 5);
        let (callbacks, log) = events_sink();
        let result = engine.run(CancelToken::new(), &session_id, "mock-model", false, callbacks).await.unwrap();

        assert!(result.is_none());
        let events = log.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, UIEvent::Text(t) if t == "all done")));
        assert!(matches!(events.last().unwrap(), UIEvent::Done));
    }

    #[tokio::test]
    async fn tool_call_dispatches_and_records_result() {
        struct EchoTool;
        #[async_trait::async_trait]
        impl tessera_tools::Tool for EchoTool {
            fn name(&self) -> &str {
                "echo"
            }
            fn description(&self) -> &str {
                "echoes"
            }
            fn parameters_schema(&self) -> Value {
                json!({"type": "object"})
            }
            async fn execute(&self, call: &tessera_tools::ToolCall) -> ToolOutput {
                ToolOutput::ok(&call.id, "echoed")
            }
        }

        let store = InMemorySessionStore::new();
        let session_id = fresh_session(&store).await;

        let turns: Vec<ScriptedTurn> = vec![
            vec![
                ModelEvent::ToolCall(ToolCallEvent { id: "c1".into(), name: "echo".into(), arguments: "{}".into() }),
                ModelEvent::Done,
            ],
            vec![ModelEvent::TextDelta("finished".into()), ModelEvent::Done],
        ];
        let model = Arc::new(MockProvider::new(turns));
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let tools = Arc::new(registry);
        let approvals = Arc::new(ApprovalManager::from_config("test", &ToolsConfig::default()));

        let engine = Engine::new(model, tools, approvals, store.clone(), 5);
        let (callbacks, log) = events_sink();
        let result = engine.run(CancelToken::new(), &session_id, "mock-model", false, callbacks).await.unwrap();

        assert!(result.is_none());
        let events = log.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, UIEvent::ToolStart { name, .. } if name == "echo")));
        assert!(events.iter().any(|e| matches!(e, UIEvent::ToolEnd { success: true, .. })));

        let messages = store.get_messages(&session_id, None, 0).await.unwrap();
        assert!(messages.iter().any(|m| m.tool_calls().iter().any(|(_, n, _)| *n == "echo")));
    }

    #[tokio::test]
    async fn set_output_tool_ends_run_with_final_value() {
        let store = InMemorySessionStore::new();
        let session_id = fresh_session(&store).await;

        let turns: Vec<ScriptedTurn> = vec![vec![
            ModelEvent::ToolCall(ToolCallEvent {
                id: "c1".into(),
                name: "set_output".into(),
                arguments: r#"{"result": "42"}"#.into(),
            }),
            ModelEvent::Done,
        ]];
        let model = Arc::new(MockProvider::new(turns));
        let mut registry = ToolRegistry::new();
        registry.register(tessera_tools::SetOutputTool::default());
        let tools = Arc::new(registry);
        let approvals = Arc::new(ApprovalManager::from_config("test", &ToolsConfig::default()));

        let engine = Engine::new(model, tools, approvals, store, 5).with_last_turn_tool_choice("set_output");
        let (callbacks, _log) = events_sink();
        let result = engine.run(CancelToken::new(), &session_id, "mock-model", false, callbacks).await.unwrap();

        assert_eq!(result, Some(json!({"result": "42"})));
    }

    #[tokio::test]
    async fn unknown_tool_call_yields_error_result_but_run_continues() {
        let store = InMemorySessionStore::new();
        let session_id = fresh_session(&store).await;

        let turns: Vec<ScriptedTurn> = vec![
            vec![
                ModelEvent::ToolCall(ToolCallEvent {
                    id: "c1".into(),
                    name: "nonexistent".into(),
                    arguments: "{}".into(),
                }),
                ModelEvent::Done,
            ],
            vec![ModelEvent::TextDelta("recovered".into()), ModelEvent::Done],
        ];
        let model = Arc::new(MockProvider::new(turns));
        let tools = Arc::new(ToolRegistry::new());
        let approvals = Arc::new(ApprovalManager::from_config("test", &ToolsConfig::default()));

        let engine = Engine::new(model, tools, approvals, store, 5);
        let (callbacks, log) = events_sink();
        let result = engine.run(CancelToken::new(), &session_id, "mock-model", false, callbacks).await.unwrap();

        assert!(result.is_none());
        let events = log.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, UIEvent::ToolEnd { success: false, .. })));
    }

    #[tokio::test]
    async fn max_turns_exhausted_emits_stop_notice() {
        let store = InMemorySessionStore::new();
        let session_id = fresh_session(&store).await;

        let turn: ScriptedTurn = vec![
            ModelEvent::ToolCall(ToolCallEvent { id: "c".into(), name: "noop".into(), arguments: "{}".into() }),
            ModelEvent::Done,
        ];
        let model = Arc::new(MockProvider::new(vec![turn.clone(), turn.clone()]));

        struct NoopTool(AtomicUsize);
        #[async_trait::async_trait]
        impl tessera_tools::Tool for NoopTool {
            fn name(&self) -> &str {
                "noop"
            }
            fn description(&self) -> &str {
                "does nothing"
            }
            fn parameters_schema(&self) -> Value {
                json!({"type": "object"})
            }
            async fn execute(&self, call: &tessera_tools::ToolCall) -> ToolOutput {
                self.0.fetch_add(1, Ordering::SeqCst);
                ToolOutput::ok(&call.id, "noop")
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(NoopTool(AtomicUsize::new(0)));
        let tools = Arc::new(registry);
        let approvals = Arc::new(ApprovalManager::from_config("test", &ToolsConfig::default()));

        let engine = Engine::new(model, tools, approvals, store, 2);
        let (callbacks, log) = events_sink();
        let result = engine.run(CancelToken::new(), &session_id, "mock-model", false, callbacks).await.unwrap();

        assert!(result.is_none());
        let events = log.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, UIEvent::Text(t) if t.contains("maximum number of turns"))));
    }

    #[tokio::test]
    async fn cancelled_token_stops_the_run_immediately() {
        let store = InMemorySessionStore::new();
        let session_id = fresh_session(&store).await;
        let model = Arc::new(MockProvider::single_text_reply("should not run"));
        let tools = Arc::new(ToolRegistry::new());
        let approvals = Arc::new(ApprovalManager::from_config("test", &ToolsConfig::default()));

        let engine = Engine::new(model, tools, approvals, store, 5);
        let ctx = CancelToken::new();
        ctx.cancel();
        let (callbacks, log) = events_sink();
        let result = engine.run(ctx, &session_id, "mock-model", false, callbacks).await.unwrap();

        assert!(result.is_none());
        let events = log.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, UIEvent::Error(_))));
    }

    #[tokio::test]
    async fn text_only_completion_marks_session_complete() {
        let store = InMemorySessionStore::new();
        let session_id = fresh_session(&store).await;
        let model = Arc::new(MockProvider::single_text_reply("all done"));
        let tools = Arc::new(ToolRegistry::new());
        let approvals = Arc::new(ApprovalManager::from_config("test", &ToolsConfig::default()));

        let engine = Engine::new(model, tools, approvals, store.clone(), 5);
        let (callbacks, _log) = events_sink();
        engine.run(CancelToken::new(), &session_id, "mock-model", false, callbacks).await.unwrap();

        assert_eq!(store.get(&session_id).await.unwrap().status, crate::session::SessionStatus::Complete);
    }

    #[tokio::test]
    async fn max_turns_exhausted_marks_session_complete_not_error() {
        let store = InMemorySessionStore::new();
        let session_id = fresh_session(&store).await;

        let turn: ScriptedTurn = vec![
            ModelEvent::ToolCall(ToolCallEvent { id: "c".into(), name: "noop".into(), arguments: "{}".into() }),
            ModelEvent::Done,
        ];
        let model = Arc::new(MockProvider::new(vec![turn.clone(), turn.clone()]));

        struct NoopTool;
        #[async_trait::async_trait]
        impl tessera_tools::Tool for NoopTool {
            fn name(&self) -> &str {
                "noop"
            }
            fn description(&self) -> &str {
                "does nothing"
            }
            fn parameters_schema(&self) -> Value {
                json!({"type": "object"})
            }
            async fn execute(&self, call: &tessera_tools::ToolCall) -> ToolOutput {
                ToolOutput::ok(&call.id, "noop")
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(NoopTool);
        let tools = Arc::new(registry);
        let approvals = Arc::new(ApprovalManager::from_config("test", &ToolsConfig::default()));

        let engine = Engine::new(model, tools, approvals, store.clone(), 2);
        let (callbacks, _log) = events_sink();
        engine.run(CancelToken::new(), &session_id, "mock-model", false, callbacks).await.unwrap();

        assert_eq!(store.get(&session_id).await.unwrap().status, crate::session::SessionStatus::Complete);
    }

    #[tokio::test]
    async fn cancelled_token_marks_session_interrupted() {
        let store = InMemorySessionStore::new();
        let session_id = fresh_session(&store).await;
        let model = Arc::new(MockProvider::single_text_reply("should not run"));
        let tools = Arc::new(ToolRegistry::new());
        let approvals = Arc::new(ApprovalManager::from_config("test", &ToolsConfig::default()));

        let engine = Engine::new(model, tools, approvals, store.clone(), 5);
        let ctx = CancelToken::new();
        ctx.cancel();
        let (callbacks, _log) = events_sink();
        engine.run(ctx, &session_id, "mock-model", false, callbacks).await.unwrap();

        assert_eq!(store.get(&session_id).await.unwrap().status, crate::session::SessionStatus::Interrupted);
    }

    #[tokio::test]
    async fn required_tool_choice_with_no_tools_is_a_synthetic_error() {
        let store = InMemorySessionStore::new();
        let session_id = fresh_session(&store).await;
        let model = Arc::new(MockProvider::single_text_reply("unreachable"));
        let tools = Arc::new(ToolRegistry::new());
        let approvals = Arc::new(ApprovalManager::from_config("test", &ToolsConfig::default()));

        let engine =
            Engine::new(model.clone(), tools, approvals, store.clone(), 5).with_tool_choice(ToolChoice::Required);
        let (callbacks, log) = events_sink();
        let result = engine.run(CancelToken::new(), &session_id, "mock-model", false, callbacks).await.unwrap();

        assert!(result.is_none());
        assert!(model.seen_requests.lock().unwrap().is_empty(), "provider must not be called");
        let events = log.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, UIEvent::Error(_))));
        assert_eq!(store.get(&session_id).await.unwrap().status, crate::session::SessionStatus::Error);
    }

    #[tokio::test]
    async fn sequential_dispatch_runs_tool_calls_in_order() {
        struct OrderTool(Arc<StdMutex<Vec<String>>>);
        #[async_trait::async_trait]
        impl tessera_tools::Tool for OrderTool {
            fn name(&self) -> &str {
                "order"
            }
            fn description(&self) -> &str {
                "records call order"
            }
            fn parameters_schema(&self) -> Value {
                json!({"type": "object"})
            }
            async fn execute(&self, call: &tessera_tools::ToolCall) -> ToolOutput {
                self.0.lock().unwrap().push(call.id.clone());
                ToolOutput::ok(&call.id, "ok")
            }
        }

        let store = InMemorySessionStore::new();
        let session_id = fresh_session(&store).await;

        let turns: Vec<ScriptedTurn> = vec![
            vec![
                ModelEvent::ToolCall(ToolCallEvent { id: "a".into(), name: "order".into(), arguments: "{}".into() }),
                ModelEvent::ToolCall(ToolCallEvent { id: "b".into(), name: "order".into(), arguments: "{}".into() }),
                ModelEvent::Done,
            ],
            vec![ModelEvent::TextDelta("done".into()), ModelEvent::Done],
        ];
        let model = Arc::new(MockProvider::new(turns));
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        registry.register(OrderTool(seen.clone()));
        let tools = Arc::new(registry);
        let approvals = Arc::new(ApprovalManager::from_config("test", &ToolsConfig::default()));

        let engine = Engine::new(model, tools, approvals, store, 5).with_parallel_tool_calls(false);
        let (callbacks, _log) = events_sink();
        engine.run(CancelToken::new(), &session_id, "mock-model", false, callbacks).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn search_flag_controls_whether_search_tools_are_sent() {
        let store = InMemorySessionStore::new();
        let session_id = fresh_session(&store).await;
        let model = Arc::new(MockProvider::single_text_reply("ok"));
        let mut registry = ToolRegistry::new();
        registry.register(tessera_tools::WebSearchTool::default());
        registry.register(tessera_tools::ReadUrlTool);
        let tools = Arc::new(registry);
        let approvals = Arc::new(ApprovalManager::from_config("test", &ToolsConfig::default()));

        let engine = Engine::new(model.clone(), tools, approvals, store, 5);
        let (callbacks, _log) = events_sink();
        engine.run(CancelToken::new(), &session_id, "mock-model", false, callbacks).await.unwrap();

        let seen = model.seen_requests.lock().unwrap();
        assert!(seen[0].tools.is_empty(), "search tools must be excluded when search=false");
    }
}
