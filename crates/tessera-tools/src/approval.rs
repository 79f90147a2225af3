// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-session approval gating for tool invocations that reach outside of
//! process memory (file reads/writes, shell commands).

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};

use regex::Regex;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

use tessera_config::ToolsConfig;

use crate::tool::ApprovalKind;

/// The answer a prompt callback (or a cached decision) gives for one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalResult {
    /// Allow, and remember this path/command as always-allowed for the session.
    Allow,
    /// Allow this single invocation only; do not cache.
    AllowOnce,
    /// Deny this single invocation only; do not cache.
    Deny,
    /// Deny, and remember this path/command as always-denied for the session.
    DenyAll,
}

impl ApprovalResult {
    fn proceeds(self) -> bool {
        matches!(self, ApprovalResult::Allow | ApprovalResult::AllowOnce)
    }
}

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("assigning {0} as parent would create a cycle")]
    WouldCreateCycle(String),
}

type PromptFuture = Pin<Box<dyn Future<Output = ApprovalResult> + Send>>;
pub type PromptFn = Arc<dyn Fn(PromptRequest) -> PromptFuture + Send + Sync>;

/// What is being asked about, passed to the host's prompt callback.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub path_or_command: String,
    pub is_write: bool,
    pub is_shell: bool,
}

fn sticky_key(kind: &ApprovalKind) -> String {
    match kind {
        ApprovalKind::ReadFile(p) => format!("read:{}", p.display()),
        ApprovalKind::WriteFile(p) => format!("write:{}", p.display()),
        ApprovalKind::Shell(cmd) => format!("shell:{cmd}"),
    }
}

/// Decides, per tool invocation, whether to proceed.
///
/// Decision order: yolo → auto_run (shell only) → allow-list → sticky
/// decision → prompt. If no prompt callback is set, the default is Deny.
pub struct ApprovalManager {
    id: String,
    yolo: bool,
    auto_run: bool,
    read_dirs: Vec<PathBuf>,
    write_dirs: Vec<PathBuf>,
    shell_allow: Vec<Regex>,
    sticky: Mutex<HashMap<String, bool>>,
    prompt: RwLock<Option<PromptFn>>,
    prompt_lock: AsyncMutex<()>,
    parent: RwLock<Option<Arc<ApprovalManager>>>,
}

impl ApprovalManager {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            yolo: false,
            auto_run: false,
            read_dirs: Vec::new(),
            write_dirs: Vec::new(),
            shell_allow: Vec::new(),
            sticky: Mutex::new(HashMap::new()),
            prompt: RwLock::new(None),
            prompt_lock: AsyncMutex::new(()),
            parent: RwLock::new(None),
        }
    }

    pub fn from_config(id: impl Into<String>, cfg: &ToolsConfig) -> Self {
        let mut mgr = Self::new(id);
        mgr.yolo = cfg.yolo;
        mgr.auto_run = cfg.auto_run;
        mgr.read_dirs = cfg.read_dirs.iter().map(PathBuf::from).collect();
        mgr.write_dirs = cfg.write_dirs.iter().map(PathBuf::from).collect();
        mgr.shell_allow = cfg
            .auto_approve_patterns
            .iter()
            .filter_map(|p| glob_to_regex(p))
            .collect();
        mgr
    }

    pub fn set_prompt_callback(&self, f: PromptFn) {
        *self.prompt.write().unwrap() = Some(f);
    }

    /// Assign `parent` as this manager's parent, refusing if that would form
    /// a cycle (parent is, transitively, this manager itself).
    pub fn set_parent(self: &Arc<Self>, parent: Arc<ApprovalManager>) -> Result<(), ApprovalError> {
        let mut cursor = Some(parent.clone());
        while let Some(node) = cursor {
            if Arc::ptr_eq(&node, self) {
                return Err(ApprovalError::WouldCreateCycle(parent.id.clone()));
            }
            cursor = node.parent.read().unwrap().clone();
        }
        *self.parent.write().unwrap() = Some(parent);
        Ok(())
    }

    fn dir_allows(dirs: &[PathBuf], path: &Path) -> bool {
        dirs.iter().any(|d| path.starts_with(d))
    }

    fn local_decision(&self, kind: &ApprovalKind) -> Option<bool> {
        if self.yolo {
            return Some(true);
        }
        match kind {
            ApprovalKind::Shell(cmd) => {
                if self.auto_run {
                    return Some(true);
                }
                if self.shell_allow.iter().any(|re| re.is_match(cmd)) {
                    return Some(true);
                }
            }
            ApprovalKind::ReadFile(p) => {
                if Self::dir_allows(&self.write_dirs, p) || Self::dir_allows(&self.read_dirs, p) {
                    return Some(true);
                }
            }
            ApprovalKind::WriteFile(p) => {
                if Self::dir_allows(&self.write_dirs, p) {
                    return Some(true);
                }
            }
        }
        let key = sticky_key(kind);
        self.sticky.lock().unwrap().get(&key).copied()
    }

    /// Check whether `kind` may proceed. Delegates to the parent first; only
    /// prompts locally if neither this manager nor its parent has authority.
    pub async fn check(&self, kind: ApprovalKind) -> bool {
        if let Some(decision) = self.local_decision(&kind) {
            return decision;
        }

        if let Some(parent) = self.parent.read().unwrap().clone() {
            // The parent may itself have no authority and fall through to
            // Deny; in that case we still get a chance to prompt locally
            // only if the parent has no prompt callback configured either.
            if parent.has_authority(&kind) || parent.prompt.read().unwrap().is_some() {
                return Box::pin(parent.check(kind)).await;
            }
        }

        self.prompt_locally(kind).await
    }

    fn has_authority(&self, kind: &ApprovalKind) -> bool {
        self.local_decision(kind).is_some()
    }

    async fn prompt_locally(&self, kind: ApprovalKind) -> bool {
        let cb = self.prompt.read().unwrap().clone();
        let Some(cb) = cb else { return false };

        let _guard = self.prompt_lock.lock().await;
        // Re-check: another waiter may have just cached a sticky decision
        // for this exact key while we waited for the lock.
        if let Some(decision) = self.local_decision(&kind) {
            return decision;
        }

        let (path_or_command, is_write, is_shell) = match &kind {
            ApprovalKind::ReadFile(p) => (p.display().to_string(), false, false),
            ApprovalKind::WriteFile(p) => (p.display().to_string(), true, false),
            ApprovalKind::Shell(cmd) => (cmd.clone(), false, true),
        };
        let result = cb(PromptRequest { path_or_command, is_write, is_shell }).await;

        match result {
            ApprovalResult::Allow => {
                self.sticky.lock().unwrap().insert(sticky_key(&kind), true);
            }
            ApprovalResult::DenyAll => {
                self.sticky.lock().unwrap().insert(sticky_key(&kind), false);
            }
            ApprovalResult::AllowOnce | ApprovalResult::Deny => {}
        }
        result.proceeds()
    }
}

/// Convert a simple shell glob pattern to a [`Regex`].
/// Only `*` (match anything) and `?` (match one char) are supported.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}
