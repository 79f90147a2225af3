// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tool that declares the agent's structured final answer.
//!
//! Typically forced via `last_turn_tool_choice` on the last turn of a turn
//! loop so the model emits a final structured shape instead of more tool
//! calls. The declared value is carried out of the turn loop as a
//! [`ToolEvent::FinalOutput`] side-channel event rather than folded back into
//! the conversation as an ordinary tool result.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::events::ToolEvent;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct SetOutputTool {
    schema: Value,
}

impl SetOutputTool {
    /// Create a `set_output` tool whose parameters follow the agent's
    /// configured output schema (an arbitrary JSON Schema object).
    pub fn new(schema: Value) -> Self {
        Self { schema }
    }
}

impl Default for SetOutputTool {
    fn default() -> Self {
        Self::new(json!({
            "type": "object",
            "properties": {
                "result": { "description": "The final structured answer." }
            },
            "required": ["result"],
            "additionalProperties": true
        }))
    }
}

#[async_trait]
impl Tool for SetOutputTool {
    fn name(&self) -> &str {
        "set_output"
    }

    fn description(&self) -> &str {
        "Declare the agent's final structured answer for this turn loop. \
         Call this once you have everything needed to answer; no further tool calls \
         are expected after this one."
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        debug!(call_id = %call.id, "set_output tool");
        ToolOutput::ok(&call.id, "final output recorded")
            .with_event(ToolEvent::FinalOutput(call.args.clone()))
    }
}
