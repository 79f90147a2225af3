// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::io::{self, IsTerminal, Read};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::Cli;
use tessera_core::{Engine, EngineCallbacks, InMemorySessionStore, Session, SessionStore, UIEvent};
use tessera_model::{CancelToken, Message, MockProvider, ModelEvent, ScriptedTurn};
use tessera_tools::{
    ApprovalManager, EditFileTool, FindTool, GrepTool, ReadFileTool, ReadUrlTool, ShellTool,
    ToolRegistry, WebSearchTool, WriteFileTool,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = tessera_config::load(cli.config.as_deref()).context("loading configuration")?;

    let prompt = match &cli.prompt {
        Some(p) => p.clone(),
        None => {
            let mut buf = String::new();
            if io::stdin().is_terminal() {
                anyhow::bail!("no prompt given and stdin is a terminal; pass PROMPT or pipe input");
            }
            io::stdin().read_to_string(&mut buf).context("reading prompt from stdin")?;
            buf
        }
    };

    let mut registry = ToolRegistry::new();
    registry.register(ReadFileTool);
    registry.register(WriteFileTool);
    registry.register(EditFileTool);
    registry.register(GrepTool);
    registry.register(FindTool);
    registry.register(ShellTool { timeout_secs: config.tools.timeout_secs });
    if cli.search {
        registry.register(WebSearchTool { api_key: config.tools.web.search.api_key.clone() });
        registry.register(ReadUrlTool);
    }
    let registry = Arc::new(registry);

    let mut approval_cfg = config.tools.clone();
    if cli.yolo {
        approval_cfg.yolo = true;
    }
    let approvals = Arc::new(ApprovalManager::from_config("cli", &approval_cfg));

    let store = InMemorySessionStore::new();
    let model_name = cli.model.clone().unwrap_or_else(|| config.model.name.clone());
    let session = Session::new(config.model.provider.clone(), model_name.clone());
    let session_id = session.id.clone();
    store.create(session).await.context("creating session")?;
    store.add_message(&session_id, Message::user(&prompt)).await.context("seeding prompt")?;

    // No live provider wire protocol is wired into this core; a scripted
    // provider echoes the prompt back so the turn loop, tool dispatch, and
    // event stream can be exercised end-to-end without a network call.
    let turns: Vec<ScriptedTurn> = vec![vec![
        ModelEvent::TextDelta(format!("(no model provider configured) received: {prompt}")),
        ModelEvent::Done,
    ]];
    let model = Arc::new(MockProvider::new(turns));

    let engine = Engine::new(model, registry, approvals, store.clone(), config.agent.max_tool_rounds)
        .with_tool_result_char_cap(config.agent.tool_result_token_cap * 4);

    let callbacks = EngineCallbacks::new(|ev| print_event(&ev));
    let result = engine
        .run(CancelToken::new(), &session_id, &model_name, cli.search, callbacks)
        .await
        .context("running the agent turn loop")?;

    if let Some(value) = result {
        println!("\n{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

fn print_event(ev: &UIEvent) {
    use std::io::Write;
    match ev {
        UIEvent::Text(s) => {
            print!("{s}");
            let _ = io::stdout().flush();
        }
        UIEvent::Reasoning(_) => {}
        UIEvent::ToolStart { name, info, .. } => eprintln!("\n[tool] {name}: {info}"),
        UIEvent::ToolEnd { success, .. } => eprintln!("[tool] {}", if *success { "ok" } else { "failed" }),
        UIEvent::Image { .. } | UIEvent::Diff { .. } => {}
        UIEvent::Phase(p) => eprintln!("[phase] {p}"),
        UIEvent::Usage(_) => {}
        UIEvent::Retry { attempt, max, wait_secs } => {
            eprintln!("[retry] attempt {attempt}/{max}, waiting {wait_secs}s")
        }
        UIEvent::Done => println!(),
        UIEvent::Error(msg) => eprintln!("[error] {msg}"),
    }
}

/// Tracing goes to stderr by default; when `TESSERA_LOG_FILE` is set, logs
/// are redirected there instead so a future full-screen UI attached to
/// stdout/stderr is never corrupted by interleaved log lines.
fn init_logging(verbosity: u8) {
    let filter = if let Ok(f) = EnvFilter::try_from_default_env() {
        f
    } else {
        match verbosity {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            _ => EnvFilter::new("debug"),
        }
    };

    if let Ok(log_path) = std::env::var("TESSERA_LOG_FILE") {
        if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_ansi(false).with_writer(std::sync::Mutex::new(file)))
                .with(filter)
                .try_init();
            return;
        }
    }

    let _ = tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).try_init();
}
