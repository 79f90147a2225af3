// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Session records and the store contract the Engine and Sub-agent Runner
//! persist through (§4.8). The store is external; this module defines its
//! interface, a concrete in-memory implementation for tests, and the
//! ordering guarantees callers may rely on.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use tessera_model::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Complete,
    Error,
    Interrupted,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub turns: u32,
    pub tool_calls: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One conversation's metadata, independent of its message transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub parent_id: Option<String>,
    pub is_subagent: bool,
    pub provider: String,
    pub model: String,
    pub agent: Option<String>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub user_turns: u32,
    pub metrics: SessionMetrics,
}

impl Session {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            is_subagent: false,
            provider: provider.into(),
            model: model.into(),
            agent: None,
            summary: None,
            created_at: now,
            updated_at: now,
            status: SessionStatus::Active,
            user_turns: 0,
            metrics: SessionMetrics::default(),
        }
    }

    /// Build a child session for a `spawn_agent` invocation.
    pub fn child_of(parent: &Session, agent: impl Into<String>) -> Self {
        let mut s = Session::new(parent.provider.clone(), parent.model.clone());
        s.parent_id = Some(parent.id.clone());
        s.is_subagent = true;
        s.agent = Some(agent.into());
        s
    }
}

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("no session with id {0}")]
    NotFound(String),
    #[error("ambiguous id prefix {0} matches multiple sessions")]
    AmbiguousPrefix(String),
    #[error("no current session is set")]
    NoCurrentSession,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub limit: Option<usize>,
    /// Restrict to sessions whose `parent_id` equals this value (`Some(None)`
    /// for top-level sessions only; `None` for no filtering).
    pub parent_id: Option<Option<String>>,
}

/// The persistence contract the Engine and Sub-agent Runner call.
///
/// Ordering guarantee: for any session, the N-th message returned by
/// `get_messages` is the N-th message added by `add_message`/
/// `replace_messages`. Implementations must serialize concurrent writes to
/// the same session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: Session) -> Result<(), SessionStoreError>;
    async fn get(&self, id: &str) -> Result<Session, SessionStoreError>;
    async fn get_by_prefix(&self, id_prefix: &str) -> Result<Session, SessionStoreError>;
    async fn list(&self, opts: ListOptions) -> Result<Vec<Session>, SessionStoreError>;
    async fn get_current(&self) -> Result<Session, SessionStoreError>;
    async fn set_current(&self, id: &str) -> Result<(), SessionStoreError>;

    async fn add_message(&self, session_id: &str, msg: Message) -> Result<(), SessionStoreError>;
    async fn replace_messages(
        &self,
        session_id: &str,
        msgs: Vec<Message>,
    ) -> Result<(), SessionStoreError>;
    async fn get_messages(
        &self,
        session_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Message>, SessionStoreError>;

    async fn update_status(&self, id: &str, status: SessionStatus) -> Result<(), SessionStoreError>;
    async fn update_metrics(
        &self,
        id: &str,
        turns: u32,
        tool_calls: u32,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<(), SessionStoreError>;
    async fn increment_user_turns(&self, id: &str) -> Result<(), SessionStoreError>;
}

struct Record {
    session: Session,
    messages: Vec<Message>,
}

/// Reference `SessionStore` implementation guarded by a single async mutex —
/// the vehicle for the Engine's own test suite. A durable (SQL/KV) store is
/// out of scope; this satisfies the full contract and its ordering
/// guarantees so such a store can be substituted without changing callers.
pub struct InMemorySessionStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Record>,
    current: Option<String>,
}

impl InMemorySessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { inner: Mutex::new(Inner::default()) })
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: Session) -> Result<(), SessionStoreError> {
        let mut inner = self.inner.lock().await;
        let id = session.id.clone();
        let is_first = inner.sessions.is_empty();
        inner.sessions.insert(id.clone(), Record { session, messages: Vec::new() });
        if is_first {
            inner.current = Some(id);
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Session, SessionStoreError> {
        let inner = self.inner.lock().await;
        inner
            .sessions
            .get(id)
            .map(|r| r.session.clone())
            .ok_or_else(|| SessionStoreError::NotFound(id.to_string()))
    }

    async fn get_by_prefix(&self, id_prefix: &str) -> Result<Session, SessionStoreError> {
        let inner = self.inner.lock().await;
        let mut matches = inner.sessions.values().filter(|r| r.session.id.starts_with(id_prefix));
        let first = matches.next().ok_or_else(|| SessionStoreError::NotFound(id_prefix.to_string()))?;
        if matches.next().is_some() {
            return Err(SessionStoreError::AmbiguousPrefix(id_prefix.to_string()));
        }
        Ok(first.session.clone())
    }

    async fn list(&self, opts: ListOptions) -> Result<Vec<Session>, SessionStoreError> {
        let inner = self.inner.lock().await;
        let mut sessions: Vec<Session> = inner
            .sessions
            .values()
            .map(|r| r.session.clone())
            .filter(|s| match &opts.parent_id {
                None => true,
                Some(expected) => &s.parent_id == expected,
            })
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        if let Some(limit) = opts.limit {
            sessions.truncate(limit);
        }
        Ok(sessions)
    }

    async fn get_current(&self) -> Result<Session, SessionStoreError> {
        let inner = self.inner.lock().await;
        let id = inner.current.as_ref().ok_or(SessionStoreError::NoCurrentSession)?;
        inner
            .sessions
            .get(id)
            .map(|r| r.session.clone())
            .ok_or_else(|| SessionStoreError::NotFound(id.clone()))
    }

    async fn set_current(&self, id: &str) -> Result<(), SessionStoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.sessions.contains_key(id) {
            return Err(SessionStoreError::NotFound(id.to_string()));
        }
        inner.current = Some(id.to_string());
        Ok(())
    }

    async fn add_message(&self, session_id: &str, msg: Message) -> Result<(), SessionStoreError> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionStoreError::NotFound(session_id.to_string()))?;
        record.messages.push(msg);
        record.session.updated_at = Utc::now();
        Ok(())
    }

    async fn replace_messages(
        &self,
        session_id: &str,
        msgs: Vec<Message>,
    ) -> Result<(), SessionStoreError> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionStoreError::NotFound(session_id.to_string()))?;
        record.messages = msgs;
        record.session.updated_at = Utc::now();
        Ok(())
    }

    async fn get_messages(
        &self,
        session_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Message>, SessionStoreError> {
        let inner = self.inner.lock().await;
        let record = inner
            .sessions
            .get(session_id)
            .ok_or_else(|| SessionStoreError::NotFound(session_id.to_string()))?;
        let slice = record.messages.iter().skip(offset);
        let out: Vec<Message> = match limit {
            Some(n) => slice.take(n).cloned().collect(),
            None => slice.cloned().collect(),
        };
        Ok(out)
    }

    async fn update_status(&self, id: &str, status: SessionStatus) -> Result<(), SessionStoreError> {
        let mut inner = self.inner.lock().await;
        let record = inner.sessions.get_mut(id).ok_or_else(|| SessionStoreError::NotFound(id.to_string()))?;
        record.session.status = status;
        record.session.updated_at = Utc::now();
        Ok(())
    }

    async fn update_metrics(
        &self,
        id: &str,
        turns: u32,
        tool_calls: u32,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<(), SessionStoreError> {
        let mut inner = self.inner.lock().await;
        let record = inner.sessions.get_mut(id).ok_or_else(|| SessionStoreError::NotFound(id.to_string()))?;
        record.session.metrics = SessionMetrics { turns, tool_calls, input_tokens, output_tokens };
        record.session.updated_at = Utc::now();
        Ok(())
    }

    async fn increment_user_turns(&self, id: &str) -> Result<(), SessionStoreError> {
        let mut inner = self.inner.lock().await;
        let record = inner.sessions.get_mut(id).ok_or_else(|| SessionStoreError::NotFound(id.to_string()))?;
        record.session.user_turns += 1;
        Ok(())
    }
}
