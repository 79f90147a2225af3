// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::cancel::CancelToken;
use crate::types::{ModelEvent, Request};

pub type ModelEventStream = Pin<Box<dyn Stream<Item = anyhow::Result<ModelEvent>> + Send>>;

/// Contract: `stream(ctx, Request) -> EventStream`. Implementations own retry
/// backoff for transient failures (surfaced as `ModelEvent::Retry`) and must
/// emit exactly one terminal `Done` or `Error`.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display and logging.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send a request and return a streaming response. `ctx` must be honored:
    /// once cancelled, the adapter should stop producing events promptly.
    async fn stream(&self, ctx: CancelToken, req: Request) -> anyhow::Result<ModelEventStream>;

    /// Whether this provider can satisfy `search` natively, in which case
    /// the Engine does not inject the built-in `web_search`/`read_url` tools
    /// unless `force_external_search` is set.
    fn supports_native_search(&self) -> bool {
        false
    }
}
