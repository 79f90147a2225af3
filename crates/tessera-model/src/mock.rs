// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! A scripted, deterministic [`ModelProvider`] used to drive Engine tests
//! without a live API. Each call to `stream()` consumes the next turn's
//! worth of scripted events; once the script is exhausted it returns a
//! single `Done` (a text-only, tool-free turn) so a test run terminates
//! cleanly instead of panicking.

use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use crate::cancel::CancelToken;
use crate::provider::{ModelEventStream, ModelProvider};
use crate::types::{ModelEvent, Request};

/// One scripted provider turn: the sequence of events it emits for a single
/// `stream()` call (the caller determines how many calls happen).
pub type ScriptedTurn = Vec<ModelEvent>;

pub struct MockProvider {
    name: String,
    model_name: String,
    turns: Mutex<Vec<ScriptedTurn>>,
    /// Every request this provider has seen, for test assertions.
    pub seen_requests: Mutex<Vec<Request>>,
}

impl MockProvider {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            name: "mock".to_string(),
            model_name: "mock-model".to_string(),
            turns: Mutex::new(turns),
            seen_requests: Mutex::new(Vec::new()),
        }
    }

    /// Convenience constructor: a single turn emitting `text` then `Done`.
    pub fn single_text_reply(text: impl Into<String>) -> Self {
        Self::new(vec![vec![ModelEvent::TextDelta(text.into()), ModelEvent::Done]])
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn stream(&self, _ctx: CancelToken, req: Request) -> anyhow::Result<ModelEventStream> {
        self.seen_requests.lock().unwrap().push(req);

        let turn = {
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                vec![ModelEvent::Done]
            } else {
                turns.remove(0)
            }
        };

        let events: Vec<anyhow::Result<ModelEvent>> = turn.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(events)))
    }
}
