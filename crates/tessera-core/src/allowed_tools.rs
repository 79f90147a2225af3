// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tracks which tools the model may currently call.
//!
//! Skill activation narrows this mid-turn-loop (§9): rather than a
//! side-channel flag on the tool instance itself, the Engine owns one
//! `AllowedTools` view and applies `ToolEvent::ActivateSkill` to it.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug)]
enum Scope {
    All,
    Only(HashSet<String>),
}

/// The set of tool names callable right now. Starts as `All` (every tool the
/// registry holds); `narrow()` restricts it for the remainder of the run.
pub struct AllowedTools {
    scope: Mutex<Scope>,
}

impl AllowedTools {
    pub fn all() -> Self {
        Self { scope: Mutex::new(Scope::All) }
    }

    pub fn only(names: impl IntoIterator<Item = String>) -> Self {
        Self { scope: Mutex::new(Scope::Only(names.into_iter().collect())) }
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        match &*self.scope.lock().unwrap() {
            Scope::All => true,
            Scope::Only(set) => set.contains(name),
        }
    }

    /// Apply a skill activation, restricting the allowed set to exactly
    /// `allowed_tools` (an empty list means text-only for the rest of the
    /// turn loop).
    pub fn narrow(&self, allowed_tools: Vec<String>) {
        *self.scope.lock().unwrap() = Scope::Only(allowed_tools.into_iter().collect());
    }

    pub fn is_narrowed(&self) -> bool {
        matches!(&*self.scope.lock().unwrap(), Scope::Only(_))
    }
}

impl Default for AllowedTools {
    fn default() -> Self {
        Self::all()
    }
}
