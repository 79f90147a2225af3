// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod agent_def;
mod allowed_tools;
mod engine;
mod events;
mod session;
mod stream_adapter;
mod subagent;
mod tool_tracker;

pub use agent_def::{AgentDef, OutputToolConfig, ReadConfig, ShellConfig, SpawnConfig, ToolsFilter};
pub use allowed_tools::AllowedTools;
pub use engine::{Engine, EngineCallbacks};
pub use events::UIEvent;
pub use session::{
    InMemorySessionStore, ListOptions, Session, SessionMetrics, SessionStatus, SessionStore,
    SessionStoreError,
};
pub use stream_adapter::{phase_for_tool, StreamAdapter};
pub use subagent::{SpawnAgentTool, SubAgentEventSink};
pub use tool_tracker::{Segment, ToolCallStatus, ToolTracker};
