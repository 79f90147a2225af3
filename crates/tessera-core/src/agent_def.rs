// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The Agent definition file schema (§6) — a YAML document describing one
//! agent's system prompt, model, tool surface, and sub-agent posture.

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_max_turns() -> u32 {
    20
}
fn default_max_parallel() -> usize {
    3
}
fn default_max_depth() -> usize {
    2
}
fn default_spawn_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsFilter {
    /// When non-empty, only these tool names are registered.
    #[serde(default)]
    pub enabled: Vec<String>,
    /// Names removed from the full built-in set. Ignored when `enabled` is
    /// non-empty.
    #[serde(default)]
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadConfig {
    /// Directories implicitly read-approved for this agent, merged with the
    /// global config's `tools.read_dirs`.
    #[serde(default)]
    pub dirs: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Shell glob patterns auto-approved for this agent, merged with the
    /// global config's `tools.auto_approve_patterns`.
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub auto_run: bool,
    /// Named scripts this agent may invoke without a full shell grant.
    #[serde(default)]
    pub scripts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnConfig {
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_spawn_timeout")]
    pub default_timeout: u64,
    /// Agent names this agent may spawn via `spawn_agent`. Empty means none.
    #[serde(default)]
    pub allowed_agents: Vec<String>,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            max_depth: default_max_depth(),
            default_timeout: default_spawn_timeout(),
            allowed_agents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputToolConfig {
    /// Tool name exposed for the final-answer call (default `set_output`).
    #[serde(default = "OutputToolConfig::default_name")]
    pub name: String,
    /// Single top-level parameter name carrying the answer when no full
    /// JSON Schema is given.
    pub param: Option<String>,
    pub description: Option<String>,
    /// Full JSON Schema for the parameters of the output tool. Takes
    /// precedence over `param` when present.
    pub schema: Option<Value>,
}

impl OutputToolConfig {
    fn default_name() -> String {
        "set_output".to_string()
    }
}

/// One agent's complete definition, as loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDef {
    pub name: String,
    pub system_prompt: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default)]
    pub search: bool,
    #[serde(default)]
    pub load_project_instructions: bool,
    #[serde(default)]
    pub tools: ToolsFilter,
    #[serde(default)]
    pub read: ReadConfig,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub spawn: SpawnConfig,
    pub output_tool: Option<OutputToolConfig>,
    pub default_prompt: Option<String>,
    pub on_complete: Option<String>,
}

impl AgentDef {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Whether `name` is permitted to be spawned by this agent via
    /// `spawn_agent`. An empty `allowed_agents` list means no restriction.
    pub fn may_spawn(&self, name: &str) -> bool {
        self.spawn.allowed_agents.is_empty() || self.spawn.allowed_agents.iter().any(|a| a == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_definition_uses_defaults() {
        let def = AgentDef::from_yaml("name: reviewer\nsystem_prompt: \"You review code.\"\n").unwrap();
        assert_eq!(def.name, "reviewer");
        assert_eq!(def.max_turns, 20);
        assert!(!def.search);
        assert_eq!(def.spawn.max_parallel, 3);
        assert_eq!(def.spawn.max_depth, 2);
        assert_eq!(def.spawn.default_timeout, 300);
    }

    #[test]
    fn tools_enabled_list_parses() {
        let yaml = "name: a\nsystem_prompt: p\ntools:\n  enabled:\n    - grep\n    - read_file\n";
        let def = AgentDef::from_yaml(yaml).unwrap();
        assert_eq!(def.tools.enabled, vec!["grep".to_string(), "read_file".to_string()]);
        assert!(def.tools.disabled.is_empty());
    }

    #[test]
    fn spawn_allowed_agents_gate_may_spawn() {
        let yaml = "name: a\nsystem_prompt: p\nspawn:\n  allowed_agents:\n    - reviewer\n";
        let def = AgentDef::from_yaml(yaml).unwrap();
        assert!(def.may_spawn("reviewer"));
        assert!(!def.may_spawn("other"));
    }

    #[test]
    fn empty_allowed_agents_means_no_restriction() {
        let def = AgentDef::from_yaml("name: a\nsystem_prompt: p\n").unwrap();
        assert!(def.may_spawn("anything"));
    }

    #[test]
    fn output_tool_with_schema_parses() {
        let yaml = "name: a\nsystem_prompt: p\noutput_tool:\n  name: set_output\n  schema:\n    type: object\n";
        let def = AgentDef::from_yaml(yaml).unwrap();
        let out = def.output_tool.unwrap();
        assert_eq!(out.name, "set_output");
        assert!(out.schema.is_some());
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let result = AgentDef::from_yaml("system_prompt: p\n");
        assert!(result.is_err());
    }
}
