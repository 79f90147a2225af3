// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The external, tagged-union event stream a host UI consumes.
//!
//! `UIEvent` is a superset of [`tessera_model::ModelEvent`]: it adds
//! `ToolStart`/`ToolEnd` (with a stable `call_id`), `Image`, and `Diff`, none
//! of which the provider itself ever emits — they are Engine-level
//! occurrences produced during tool dispatch (§4.1).

use serde::{Deserialize, Serialize};

use tessera_model::Usage;

/// One event in the UIEvent stream. Serializes as `{"type": "...", ...}` to
/// match the external tagged-union shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UIEvent {
    Text(String),
    Reasoning(String),
    ToolStart {
        call_id: String,
        name: String,
        info: String,
    },
    ToolEnd {
        call_id: String,
        success: bool,
    },
    Image {
        path: String,
    },
    Diff {
        path: String,
        old: String,
        new: String,
    },
    Phase(String),
    Usage(Usage),
    Retry {
        attempt: u32,
        max: u32,
        wait_secs: u64,
    },
    Done,
    Error(String),
}

impl UIEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UIEvent::Done | UIEvent::Error(_))
    }
}
