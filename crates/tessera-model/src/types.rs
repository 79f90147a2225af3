// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who produced a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        };
        write!(f, "{s}")
    }
}

/// A single piece of a [`Message`]. A message can mix several parts — an
/// assistant turn with prose and two tool calls is `[Text, ToolCall, ToolCall]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text(String),
    ToolCall {
        id: String,
        name: String,
        /// Opaque JSON blob, not yet parsed — the registry parses it at dispatch.
        arguments: String,
    },
    ToolResult {
        id: String,
        name: String,
        content: String,
    },
    Image {
        media_type: String,
        base64: String,
    },
}

impl Part {
    pub fn text(s: impl Into<String>) -> Self {
        Part::Text(s.into())
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Part::ToolCall { id: id.into(), name: name.into(), arguments: arguments.into() }
    }

    pub fn tool_result(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Part::ToolResult { id: id.into(), name: name.into(), content: content.into() }
    }

    pub fn as_tool_call(&self) -> Option<(&str, &str, &str)> {
        match self {
            Part::ToolCall { id, name, arguments } => Some((id, name, arguments)),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A role paired with an ordered list of parts.
///
/// Messages are never mutated after construction — they are appended to a
/// session's transcript in allocation order and read back in that order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![Part::text(text)])
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![Part::text(text)])
    }

    /// Build a tool-role message from a set of results. Per the data model
    /// invariant, tool-role messages contain only `ToolResult` parts.
    pub fn tool_results(parts: Vec<Part>) -> Self {
        debug_assert!(parts.iter().all(|p| matches!(p, Part::ToolResult { .. })));
        Self::new(Role::Tool, parts)
    }

    /// Concatenate all `Text` parts, in order.
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// All `ToolCall` parts, in order.
    pub fn tool_calls(&self) -> Vec<(&str, &str, &str)> {
        self.parts.iter().filter_map(Part::as_tool_call).collect()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::ToolCall { .. }))
    }
}

/// A tool's advertised name, description, and JSON schema for its arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub json_schema: Value,
}

/// How the provider should decide whether (and which) tool to call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Name(String),
    Required,
}

/// The full input to a single Engine `stream()` call.
#[derive(Debug, Clone)]
pub struct Request {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: ToolChoice,
    /// Forces a specific tool on the final turn so the model emits a
    /// structured "final answer" shape instead of more tool calls.
    pub last_turn_tool_choice: Option<String>,
    pub parallel_tool_calls: bool,
    pub search: bool,
    pub force_external_search: bool,
    pub max_turns: u32,
    pub session_id: String,
    pub debug: bool,
}

impl Request {
    pub fn new(model: impl Into<String>, session_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            last_turn_tool_choice: None,
            parallel_tool_calls: true,
            search: false,
            force_external_search: false,
            max_turns: 20,
            session_id: session_id.into(),
            debug: false,
        }
    }
}

/// A complete (never partial) tool call reported by the provider. Arguments
/// are guaranteed to be parseable JSON by the time this event is emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Token usage reported by the provider, typically as a single terminal event.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input: u64,
    pub output: u64,
    pub cached: u64,
}

/// Events produced by a [`crate::provider::ModelProvider`] for one turn.
///
/// Contract (see `ModelProvider::stream`): zero or more `TextDelta`/
/// `ReasoningDelta`, zero or more complete `ToolCall`s, at most one `Usage`,
/// exactly one terminal `Done` or `Error`.
#[derive(Debug, Clone)]
pub enum ModelEvent {
    TextDelta(String),
    ReasoningDelta(String),
    ToolCall(ToolCallEvent),
    Phase(String),
    Usage(Usage),
    Retry { attempt: u32, max: u32, wait_secs: u64 },
    Error(String),
    Done,
}
