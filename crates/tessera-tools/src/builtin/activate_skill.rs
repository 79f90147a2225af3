// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tool that activates a named skill, narrowing the allowed-tools set for the
//! remainder of the turn loop.
//!
//! Unlike a tool that returns instructions as text, activation is a pure
//! side-effect: the tool emits a [`ToolEvent::ActivateSkill`] that the Engine
//! applies to its `AllowedTools` view. The model calls this tool after
//! recognising that a user request matches one of the skills listed in the
//! system prompt's `<available_skills>` block.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::events::ToolEvent;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// A named narrowing of the tool set the model may activate.
#[derive(Debug, Clone)]
pub struct SkillSpec {
    pub name: String,
    pub description: String,
    /// Tool names the model may call once this skill is active. An empty
    /// list means "no further tool calls" (text-only for the rest of the turn).
    pub allowed_tools: Vec<String>,
}

fn build_description(skills: &[SkillSpec]) -> String {
    if skills.is_empty() {
        return "Activate a named skill, narrowing the available tools. \
                No skills are currently available."
            .to_string();
    }

    let skill_list: String = skills
        .iter()
        .map(|s| {
            format!(
                "  <skill>\n    <name>{}</name>\n    <description>{}</description>\n  </skill>",
                s.name,
                s.description.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Activate a named skill for the rest of this turn loop. Activation narrows the\n\
         set of tools the model may call to the skill's allow-list; calls to any other\n\
         tool are rejected until a new turn loop begins.\n\n\
         <available_skills>\n{skill_list}\n</available_skills>"
    )
}

pub struct ActivateSkillTool {
    skills: Arc<[SkillSpec]>,
    description: String,
}

impl ActivateSkillTool {
    pub fn new(skills: Arc<[SkillSpec]>) -> Self {
        let description = build_description(&skills);
        Self { skills, description }
    }
}

#[async_trait]
impl Tool for ActivateSkillTool {
    fn name(&self) -> &str {
        "activate_skill"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "The name of the skill to activate"
                }
            },
            "required": ["name"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let name = match call.args.get("name").and_then(|v| v.as_str()) {
            Some(n) => n.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'name' parameter"),
        };

        debug!(skill = %name, "activate_skill tool");

        let skill = match self.skills.iter().find(|s| s.name == name) {
            Some(s) => s,
            None => {
                let available =
                    self.skills.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(", ");
                return ToolOutput::err(
                    &call.id,
                    format!(
                        "skill \"{name}\" not found. Available skills: {}",
                        if available.is_empty() { "(none)" } else { &available }
                    ),
                );
            }
        };

        ToolOutput::ok(&call.id, format!("activated skill \"{name}\"")).with_event(
            ToolEvent::ActivateSkill { name: skill.name.clone(), allowed_tools: skill.allowed_tools.clone() },
        )
    }
}
