// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::Parser;

/// A terminal LLM agent: drives a multi-turn conversation with a model
/// provider, interleaving prose with tool calls.
#[derive(Parser, Debug)]
#[command(name = "tessera", version, about)]
pub struct Cli {
    /// Initial prompt. Read from stdin if omitted and stdin is not a TTY.
    #[arg(value_name = "PROMPT")]
    pub prompt: Option<String>,

    /// Path to the agent definition YAML for this run.
    #[arg(long, short = 'a')]
    pub agent: Option<PathBuf>,

    /// Model name to use, overriding the agent definition / config default.
    #[arg(long, short = 'm', env = "TESSERA_MODEL")]
    pub model: Option<String>,

    /// Path to the config file (overrides the default search path).
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Enable native/external web search for this run.
    #[arg(long)]
    pub search: bool,

    /// Auto-approve every tool call for this run (equivalent to `tools.yolo`).
    #[arg(long)]
    pub yolo: bool,

    /// Verbosity: repeat for more detail (only observed when headless).
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}
