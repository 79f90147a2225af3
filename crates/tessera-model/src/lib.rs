// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod cancel;
pub mod mock;
pub mod provider;
pub mod types;

pub use cancel::CancelToken;
pub use mock::{MockProvider, ScriptedTurn};
pub use provider::{ModelEventStream, ModelProvider};
pub use types::{
    Message, ModelEvent, Part, Request, Role, ToolCallEvent, ToolChoice, ToolSpec, Usage,
};
