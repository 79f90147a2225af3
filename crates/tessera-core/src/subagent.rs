// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The `spawn_agent` tool (§4.7): delegates a focused prompt to a named
//! sub-agent and returns its final answer. Grounded on the task-delegation
//! tool that builds its own excluded-from-itself registry per call — adapted
//! here to use `AgentDef`-driven configuration, a parented Approval Manager,
//! and UI event forwarding instead of a mode-gated, text-only collection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::debug;

use tessera_config::ToolsConfig;
use tessera_model::ModelProvider;
use tessera_tools::{
    ApprovalManager, EditFileTool, FindTool, GrepTool, ReadFileTool, ReadUrlTool, SetOutputTool,
    ShellTool, Tool, ToolCall, ToolOutput, ToolRegistry, ViewImageTool, WebSearchTool, WriteFileTool,
};

use crate::agent_def::AgentDef;
use crate::engine::{Engine, EngineCallbacks};
use crate::events::UIEvent;
use crate::session::{Session, SessionStore};

/// Forwards an in-flight sub-agent's UI events to the host, tagged with the
/// call_id of the `spawn_agent` invocation that started it.
pub type SubAgentEventSink = Arc<dyn Fn(&str, UIEvent) + Send + Sync>;

pub struct SpawnAgentTool {
    caller: AgentDef,
    agents: Arc<HashMap<String, AgentDef>>,
    model: Arc<dyn ModelProvider>,
    tools_config: Arc<ToolsConfig>,
    approvals: Arc<ApprovalManager>,
    store: Arc<dyn SessionStore>,
    parent_session_id: String,
    depth: usize,
    parallelism: Arc<Semaphore>,
    on_event: SubAgentEventSink,
}

impl SpawnAgentTool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        caller: AgentDef,
        agents: Arc<HashMap<String, AgentDef>>,
        model: Arc<dyn ModelProvider>,
        tools_config: Arc<ToolsConfig>,
        approvals: Arc<ApprovalManager>,
        store: Arc<dyn SessionStore>,
        parent_session_id: impl Into<String>,
        depth: usize,
        on_event: SubAgentEventSink,
    ) -> Self {
        let parallelism = Arc::new(Semaphore::new(caller.spawn.max_parallel.max(1)));
        Self {
            caller,
            agents,
            model,
            tools_config,
            approvals,
            store,
            parent_session_id: parent_session_id.into(),
            depth,
            parallelism,
            on_event,
        }
    }

    /// Build the tool surface for a sub-agent run: the full built-in set
    /// filtered by its `tools.enabled`/`tools.disabled`, plus `set_output`
    /// when it declares an output schema, plus a nested `spawn_agent` for
    /// one more level of recursion (bounded by `max_depth`).
    fn build_sub_registry(&self, def: &AgentDef, child_depth: usize) -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        let allow = |name: &str| {
            if !def.tools.enabled.is_empty() {
                def.tools.enabled.iter().any(|n| n == name)
            } else {
                !def.tools.disabled.iter().any(|n| n == name)
            }
        };

        if allow("read_file") {
            reg.register(ReadFileTool);
        }
        if allow("write_file") {
            reg.register(WriteFileTool);
        }
        if allow("edit_file") {
            reg.register(EditFileTool);
        }
        if allow("grep") {
            reg.register(GrepTool);
        }
        if allow("find") {
            reg.register(FindTool);
        }
        if allow("view_image") {
            reg.register(ViewImageTool);
        }
        if allow("shell") {
            reg.register(ShellTool { timeout_secs: self.tools_config.timeout_secs });
        }
        if def.search && allow("web_search") {
            reg.register(WebSearchTool { api_key: self.tools_config.web.search.api_key.clone() });
        }
        if def.search && allow("read_url") {
            reg.register(ReadUrlTool);
        }
        if let Some(out) = &def.output_tool {
            let schema = out.schema.clone().unwrap_or_else(|| {
                let param = out.param.clone().unwrap_or_else(|| "result".to_string());
                json!({
                    "type": "object",
                    "properties": { param: { "description": "The final answer." } },
                    "required": [param],
                    "additionalProperties": true,
                })
            });
            reg.register(SetOutputTool::new(schema));
        }

        if child_depth < def.spawn.max_depth && allow("spawn_agent") {
            reg.register(SpawnAgentTool::new(
                def.clone(),
                self.agents.clone(),
                self.model.clone(),
                self.tools_config.clone(),
                self.approvals.clone(),
                self.store.clone(),
                self.parent_session_id.clone(),
                child_depth,
                self.on_event.clone(),
            ));
        }

        reg
    }
}

#[async_trait]
impl Tool for SpawnAgentTool {
    fn name(&self) -> &str {
        "spawn_agent"
    }

    fn description(&self) -> &str {
        "Delegate a focused task to a named sub-agent and return its final answer. \
         The sub-agent runs its own turn loop with its own tool surface and does not \
         see this conversation beyond the prompt given to it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent": {
                    "type": "string",
                    "description": "Name of the agent definition to spawn"
                },
                "prompt": {
                    "type": "string",
                    "description": "The task description for the sub-agent"
                },
                "max_rounds": {
                    "type": "integer",
                    "description": "Override the sub-agent's configured max_turns"
                }
            },
            "required": ["agent", "prompt"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let agent_name = match call.args.get("agent").and_then(|v| v.as_str()) {
            Some(n) => n.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'agent'"),
        };
        let prompt = match call.args.get("prompt").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'prompt'"),
        };

        if !self.caller.may_spawn(&agent_name) {
            return ToolOutput::err(
                &call.id,
                format!("not permitted to spawn agent \"{agent_name}\""),
            );
        }
        if self.depth >= self.caller.spawn.max_depth {
            return ToolOutput::err(
                &call.id,
                format!("maximum sub-agent depth ({}) reached", self.caller.spawn.max_depth),
            );
        }
        let Some(def) = self.agents.get(&agent_name) else {
            return ToolOutput::err(&call.id, format!("unknown agent: {agent_name}"));
        };

        let _permit = match self.parallelism.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => return ToolOutput::err(&call.id, "sub-agent scheduler is shutting down"),
        };

        let max_turns = call
            .args
            .get("max_rounds")
            .and_then(|v| v.as_u64())
            .map(|n| n as u32)
            .unwrap_or(def.max_turns);

        let parent_session = match self.store.get(&self.parent_session_id).await {
            Ok(s) => s,
            Err(e) => return ToolOutput::err(&call.id, format!("parent session lookup failed: {e}")),
        };
        let child_session = Session::child_of(&parent_session, def.name.clone());
        let child_id = child_session.id.clone();
        if let Err(e) = self.store.create(child_session).await {
            return ToolOutput::err(&call.id, format!("failed to create sub-agent session: {e}"));
        }
        if let Err(e) = self.store.add_message(&child_id, tessera_model::Message::user(&prompt)).await {
            return ToolOutput::err(&call.id, format!("failed to seed sub-agent prompt: {e}"));
        }

        debug!(agent = %agent_name, depth = self.depth + 1, session = %child_id, "spawn_agent: starting sub-agent");

        let child_depth = AtomicUsize::new(self.depth + 1).load(Ordering::Relaxed);
        let sub_registry = Arc::new(self.build_sub_registry(def, child_depth));

        let sub_approvals = Arc::new(ApprovalManager::new(format!("{}:{}", call.id, agent_name)));
        if let Err(e) = sub_approvals.set_parent(self.approvals.clone()) {
            return ToolOutput::err(&call.id, format!("approval parenting failed: {e}"));
        }

        let mut engine = Engine::new(
            self.model.clone(),
            sub_registry,
            sub_approvals,
            self.store.clone(),
            max_turns,
        );
        if let Some(out) = &def.output_tool {
            engine = engine.with_last_turn_tool_choice(out.name.clone());
        }

        let call_id = call.id.clone();
        let sink = self.on_event.clone();
        let callbacks = EngineCallbacks::new(move |ev| sink(&call_id, ev));

        let timeout_secs = if def.spawn.default_timeout > 0 { def.spawn.default_timeout } else { 300 };
        let run = engine.run(
            tessera_model::CancelToken::new(),
            &child_id,
            def.model.as_deref().unwrap_or("default"),
            def.search,
            callbacks,
        );

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), run).await;

        match outcome {
            Err(_) => ToolOutput::err(&call.id, format!("sub-agent \"{agent_name}\" timed out after {timeout_secs}s")),
            Ok(Err(e)) => ToolOutput::err(&call.id, format!("sub-agent \"{agent_name}\" failed: {e}")),
            Ok(Ok(Some(value))) => ToolOutput::ok(&call.id, value.to_string()),
            Ok(Ok(None)) => {
                let messages = self.store.get_messages(&child_id, None, 0).await.unwrap_or_default();
                let text = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == tessera_model::Role::Assistant)
                    .map(|m| m.text_content())
                    .unwrap_or_default();
                if text.is_empty() {
                    ToolOutput::ok(&call.id, "(sub-agent produced no text output)")
                } else {
                    ToolOutput::ok(&call.id, text)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use tessera_model::{MockProvider, ScriptedTurn};

    use crate::session::InMemorySessionStore;

    use super::*;

    fn caller_def(allowed: &[&str], max_depth: usize) -> AgentDef {
        let yaml = format!(
            "name: caller\nsystem_prompt: p\nspawn:\n  max_parallel: 2\n  max_depth: {max_depth}\n  allowed_agents:\n{}\n",
            allowed.iter().map(|a| format!("    - {a}")).collect::<Vec<_>>().join("\n")
        );
        AgentDef::from_yaml(&yaml).unwrap()
    }

    fn reviewer_def() -> AgentDef {
        AgentDef::from_yaml("name: reviewer\nsystem_prompt: \"You review.\"\nmax_turns: 3\n").unwrap()
    }

    async fn new_parent_session(store: &Arc<InMemorySessionStore>) -> String {
        let session = Session::new("mock", "mock-model");
        let id = session.id.clone();
        store.create(session).await.unwrap();
        id
    }

    #[tokio::test]
    async fn spawning_an_unlisted_agent_is_denied() {
        let store = InMemorySessionStore::new();
        let parent_id = new_parent_session(&store).await;
        let model = Arc::new(MockProvider::single_text_reply("ok"));
        let agents = Arc::new(HashMap::from([("reviewer".to_string(), reviewer_def())]));
        let approvals = Arc::new(ApprovalManager::from_config("parent", &ToolsConfig::default()));
        let log = Arc::new(StdMutex::new(Vec::new()));
        let log2 = log.clone();

        let tool = SpawnAgentTool::new(
            caller_def(&["someone_else"], 2),
            agents,
            model,
            Arc::new(ToolsConfig::default()),
            approvals,
            store,
            parent_id,
            0,
            Arc::new(move |id, ev| log2.lock().unwrap().push((id.to_string(), ev))),
        );

        let call = ToolCall {
            id: "c1".into(),
            name: "spawn_agent".into(),
            args: json!({"agent": "reviewer", "prompt": "look at this"}),
        };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("not permitted"));
    }

    #[tokio::test]
    async fn empty_allowed_agents_permits_any_name() {
        let store = InMemorySessionStore::new();
        let parent_id = new_parent_session(&store).await;
        let turns: Vec<ScriptedTurn> =
            vec![vec![tessera_model::ModelEvent::TextDelta("reviewed".into()), tessera_model::ModelEvent::Done]];
        let model = Arc::new(MockProvider::new(turns));
        let agents = Arc::new(HashMap::from([("reviewer".to_string(), reviewer_def())]));
        let approvals = Arc::new(ApprovalManager::from_config("parent", &ToolsConfig::default()));

        let tool = SpawnAgentTool::new(
            caller_def(&[], 2),
            agents,
            model,
            Arc::new(ToolsConfig::default()),
            approvals,
            store,
            parent_id,
            0,
            Arc::new(|_id, _ev| {}),
        );

        let call = ToolCall {
            id: "c1".into(),
            name: "spawn_agent".into(),
            args: json!({"agent": "reviewer", "prompt": "look at this"}),
        };
        let out = tool.execute(&call).await;
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn spawning_an_allowed_agent_runs_and_returns_text() {
        let store = InMemorySessionStore::new();
        let parent_id = new_parent_session(&store).await;
        let turns: Vec<ScriptedTurn> =
            vec![vec![tessera_model::ModelEvent::TextDelta("reviewed".into()), tessera_model::ModelEvent::Done]];
        let model = Arc::new(MockProvider::new(turns));
        let agents = Arc::new(HashMap::from([("reviewer".to_string(), reviewer_def())]));
        let approvals = Arc::new(ApprovalManager::from_config("parent", &ToolsConfig::default()));
        let log = Arc::new(StdMutex::new(Vec::new()));
        let log2 = log.clone();

        let tool = SpawnAgentTool::new(
            caller_def(&["reviewer"], 2),
            agents,
            model,
            Arc::new(ToolsConfig::default()),
            approvals,
            store,
            parent_id,
            0,
            Arc::new(move |id, ev| log2.lock().unwrap().push((id.to_string(), ev))),
        );

        let call = ToolCall {
            id: "c1".into(),
            name: "spawn_agent".into(),
            args: json!({"agent": "reviewer", "prompt": "look at this"}),
        };
        let out = tool.execute(&call).await;
        assert!(!out.is_error);
        assert_eq!(out.content, "reviewed");

        let log = log.lock().unwrap();
        assert!(log.iter().all(|(id, _)| id == "c1"));
        assert!(log.iter().any(|(_, ev)| matches!(ev, UIEvent::Done)));
    }

    #[tokio::test]
    async fn depth_at_the_cap_is_rejected() {
        let store = InMemorySessionStore::new();
        let parent_id = new_parent_session(&store).await;
        let model = Arc::new(MockProvider::single_text_reply("ok"));
        let agents = Arc::new(HashMap::from([("reviewer".to_string(), reviewer_def())]));
        let approvals = Arc::new(ApprovalManager::from_config("parent", &ToolsConfig::default()));

        let tool = SpawnAgentTool::new(
            caller_def(&["reviewer"], 1),
            agents,
            model,
            Arc::new(ToolsConfig::default()),
            approvals,
            store,
            parent_id,
            1,
            Arc::new(|_id, _ev| {}),
        );

        let call = ToolCall {
            id: "c1".into(),
            name: "spawn_agent".into(),
            args: json!({"agent": "reviewer", "prompt": "x"}),
        };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("maximum sub-agent depth"));
    }

    #[tokio::test]
    async fn unknown_agent_name_is_an_error() {
        let store = InMemorySessionStore::new();
        let parent_id = new_parent_session(&store).await;
        let model = Arc::new(MockProvider::single_text_reply("ok"));
        let agents = Arc::new(HashMap::new());
        let approvals = Arc::new(ApprovalManager::from_config("parent", &ToolsConfig::default()));

        let tool = SpawnAgentTool::new(
            caller_def(&["ghost"], 2),
            agents,
            model,
            Arc::new(ToolsConfig::default()),
            approvals,
            store,
            parent_id,
            0,
            Arc::new(|_id, _ev| {}),
        );

        let call = ToolCall {
            id: "c1".into(),
            name: "spawn_agent".into(),
            args: json!({"agent": "ghost", "prompt": "x"}),
        };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("unknown agent"));
    }
}
