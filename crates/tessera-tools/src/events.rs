// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Side-channel events a tool can emit alongside its [`crate::ToolOutput`] to
//! signal state changes the Engine needs to react to, rather than returning
//! them as ordinary text.

use serde_json::Value;

/// Emitted by `set_output` when the model declares its structured final
/// answer — typically forced via `last_turn_tool_choice` on the last turn.
#[derive(Debug, Clone)]
pub enum ToolEvent {
    FinalOutput(Value),
    /// Emitted by `activate_skill`: the Engine should narrow its allowed-tools
    /// view to `allowed_tools` for the remainder of the turn loop.
    ActivateSkill { name: String, allowed_tools: Vec<String> },
}
