// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

use crate::events::ToolEvent;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
}

/// A single content item in a rich tool output.
///
/// Most tools produce only `Text`. Vision-capable tools (e.g. `view_image`)
/// may produce a mix of `Text` and `Image` items.
#[derive(Debug, Clone)]
pub enum ToolOutputPart {
    /// Plain UTF-8 text.
    Text(String),
    /// Base64 data URL: `data:<mime>;base64,<b64>`.
    Image(String),
    /// A unified diff, rendered separately from plain text by the stream adapter.
    Diff(String),
}

/// The result of executing a tool.
///
/// `content` is always the plain-text representation of the output (the
/// concatenation of all `Text` parts) and is what gets folded back into the
/// conversation as the tool-result message. `parts` carries the richer
/// structure (diffs, images) that the stream adapter surfaces as separate
/// UI events.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    pub parts: Vec<ToolOutputPart>,
    /// If true, the tool execution failed non-fatally (returned error message).
    pub is_error: bool,
    /// Side-channel event for the Engine (e.g. `set_output`'s final answer,
    /// `activate_skill`'s allowed-tools narrowing). `None` for ordinary tools.
    pub event: Option<ToolEvent>,
}

impl ToolOutput {
    /// Successful plain-text result.
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let text = content.into();
        let call_id = call_id.into();
        Self {
            call_id,
            content: text.clone(),
            parts: vec![ToolOutputPart::Text(text)],
            is_error: false,
            event: None,
        }
    }

    /// Error result containing a plain-text error message.
    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        let text = msg.into();
        let call_id = call_id.into();
        Self {
            call_id,
            content: text.clone(),
            parts: vec![ToolOutputPart::Text(text)],
            is_error: true,
            event: None,
        }
    }

    /// Result with arbitrary parts (text, diffs, and/or images).
    ///
    /// `content` is set to the concatenation of all Text parts.
    pub fn with_parts(call_id: impl Into<String>, parts: Vec<ToolOutputPart>) -> Self {
        let text = parts
            .iter()
            .filter_map(|p| match p {
                ToolOutputPart::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            call_id: call_id.into(),
            content: text,
            parts,
            is_error: false,
            event: None,
        }
    }

    /// Attach a side-channel event to this output.
    pub fn with_event(mut self, event: ToolEvent) -> Self {
        self.event = Some(event);
        self
    }

    pub fn has_images(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, ToolOutputPart::Image(_)))
    }

    pub fn diffs(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            ToolOutputPart::Diff(d) => Some(d.as_str()),
            _ => None,
        })
    }
}

/// What an invocation of a tool touches outside of process memory, for the
/// Approval Manager to gate. `None` means the tool is pure / in-memory (e.g.
/// `activate_skill`) and never needs a prompt.
#[derive(Debug, Clone)]
pub enum ApprovalKind {
    ReadFile(std::path::PathBuf),
    WriteFile(std::path::PathBuf),
    Shell(String),
}

/// Trait that every built-in and user-defined tool must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters.
    fn parameters_schema(&self) -> Value;

    /// What this particular invocation touches, for Approval Manager gating.
    /// Tools that never leave memory (e.g. `activate_skill`, `set_output`)
    /// keep the default `None` and always execute once dispatched.
    fn approval_kind(&self, _call: &ToolCall) -> Option<ApprovalKind> {
        None
    }

    /// Execute the tool. Errors should be wrapped in [`ToolOutput::err`].
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;

    struct MinimalTool;

    #[async_trait]
    impl Tool for MinimalTool {
        fn name(&self) -> &str {
            "minimal"
        }
        fn description(&self) -> &str {
            "a minimal tool"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, "ok")
        }
    }

    #[test]
    fn default_approval_kind_is_none() {
        let call = ToolCall { id: "1".into(), name: "minimal".into(), args: json!({}) };
        assert!(MinimalTool.approval_kind(&call).is_none());
    }

    #[test]
    fn ok_output_is_not_error() {
        let out = ToolOutput::ok("1", "done");
        assert!(!out.is_error);
        assert_eq!(out.content, "done");
    }

    #[test]
    fn err_output_is_error() {
        let out = ToolOutput::err("1", "boom");
        assert!(out.is_error);
        assert_eq!(out.content, "boom");
    }

    #[test]
    fn with_parts_joins_only_text_parts() {
        let out = ToolOutput::with_parts(
            "1",
            vec![
                ToolOutputPart::Text("a".into()),
                ToolOutputPart::Image("data:image/png;base64,xx".into()),
                ToolOutputPart::Text("b".into()),
            ],
        );
        assert_eq!(out.content, "a\nb");
        assert!(out.has_images());
    }

    #[test]
    fn diffs_iterator_extracts_diff_parts_only() {
        let out = ToolOutput::with_parts(
            "1",
            vec![ToolOutputPart::Text("t".into()), ToolOutputPart::Diff("-a\n+b".into())],
        );
        let diffs: Vec<&str> = out.diffs().collect();
        assert_eq!(diffs, vec!["-a\n+b"]);
    }
}
