// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Translates provider-level [`tessera_model::ModelEvent`]s and Engine-level
//! tool-dispatch occurrences into the external [`UIEvent`] stream (§4.5).
//!
//! Two responsibilities live here rather than in the Engine directly: a
//! stable `call_id` per tool invocation (the provider's id is already stable,
//! but sub-agent dispatch mints its own), and deduplication so a retried
//! stream segment never produces two `ToolStart`s for the same call.

use std::collections::HashSet;

use tessera_model::ModelEvent;

use crate::events::UIEvent;

/// Human-readable phase label for a tool name, shown while it runs.
pub fn phase_for_tool(name: &str) -> String {
    match name {
        "read_file" => "Reading file".to_string(),
        "write_file" => "Writing file".to_string(),
        "edit_file" => "Editing file".to_string(),
        "grep" => "Searching".to_string(),
        "find" => "Finding files".to_string(),
        "shell" => "Running command".to_string(),
        "read_url" => "Fetching URL".to_string(),
        "web_search" => "Searching the web".to_string(),
        "view_image" => "Viewing image".to_string(),
        "ask_user" => "Waiting for input".to_string(),
        "spawn_agent" => "Running sub-agent".to_string(),
        "activate_skill" => "Activating skill".to_string(),
        "set_output" => "Finalizing answer".to_string(),
        other => format!("Running {other}"),
    }
}

#[derive(Default)]
pub struct StreamAdapter {
    started: HashSet<String>,
    ended: HashSet<String>,
}

impl StreamAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one provider event. `ToolCall` has no direct `UIEvent`
    /// counterpart — it's accumulated by the Engine and dispatched later,
    /// which is when `tool_start`/`tool_end` below fire.
    pub fn translate_model_event(&mut self, ev: &ModelEvent) -> Option<UIEvent> {
        match ev {
            ModelEvent::TextDelta(s) => Some(UIEvent::Text(s.clone())),
            ModelEvent::ReasoningDelta(s) => Some(UIEvent::Reasoning(s.clone())),
            ModelEvent::ToolCall(_) => None,
            ModelEvent::Phase(p) => Some(UIEvent::Phase(p.clone())),
            ModelEvent::Usage(u) => Some(UIEvent::Usage(*u)),
            ModelEvent::Retry { attempt, max, wait_secs } => {
                Some(UIEvent::Retry { attempt: *attempt, max: *max, wait_secs: *wait_secs })
            }
            ModelEvent::Error(msg) => Some(UIEvent::Error(msg.clone())),
            ModelEvent::Done => Some(UIEvent::Done),
        }
    }

    pub fn tool_start(&mut self, call_id: &str, name: &str, info: &str) -> Option<UIEvent> {
        if !self.started.insert(call_id.to_string()) {
            return None;
        }
        Some(UIEvent::ToolStart { call_id: call_id.to_string(), name: name.to_string(), info: info.to_string() })
    }

    pub fn tool_end(&mut self, call_id: &str, success: bool) -> Option<UIEvent> {
        if !self.ended.insert(call_id.to_string()) {
            return None;
        }
        Some(UIEvent::ToolEnd { call_id: call_id.to_string(), success })
    }
}

#[cfg(test)]
mod tests {
    use tessera_model::Usage;

    use super::*;

    #[test]
    fn text_delta_translates_to_text_event() {
        let mut a = StreamAdapter::new();
        let ev = a.translate_model_event(&ModelEvent::TextDelta("hi".into())).unwrap();
        assert!(matches!(ev, UIEvent::Text(s) if s == "hi"));
    }

    #[test]
    fn tool_call_has_no_direct_translation() {
        let mut a = StreamAdapter::new();
        let ev = ModelEvent::ToolCall(tessera_model::ToolCallEvent {
            id: "c1".into(),
            name: "grep".into(),
            arguments: "{}".into(),
        });
        assert!(a.translate_model_event(&ev).is_none());
    }

    #[test]
    fn usage_translates_to_usage_event() {
        let mut a = StreamAdapter::new();
        let ev = a
            .translate_model_event(&ModelEvent::Usage(Usage { input: 1, output: 2, cached: 0 }))
            .unwrap();
        assert!(matches!(ev, UIEvent::Usage(u) if u.input == 1));
    }

    #[test]
    fn tool_start_dedupes_repeats() {
        let mut a = StreamAdapter::new();
        assert!(a.tool_start("c1", "grep", "x").is_some());
        assert!(a.tool_start("c1", "grep", "x").is_none());
    }

    #[test]
    fn tool_end_dedupes_repeats() {
        let mut a = StreamAdapter::new();
        assert!(a.tool_end("c1", true).is_some());
        assert!(a.tool_end("c1", true).is_none());
    }

    #[test]
    fn distinct_call_ids_each_get_their_own_events() {
        let mut a = StreamAdapter::new();
        assert!(a.tool_start("c1", "grep", "x").is_some());
        assert!(a.tool_start("c2", "shell", "ls").is_some());
    }

    #[test]
    fn phase_for_known_tool_is_human_readable() {
        assert_eq!(phase_for_tool("read_file"), "Reading file");
    }

    #[test]
    fn phase_for_unknown_tool_falls_back_to_running_prefix() {
        assert_eq!(phase_for_tool("custom_tool"), "Running custom_tool");
    }
}
