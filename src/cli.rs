// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "conductor", about = "Run LLM-driven conversational agents", version)]
pub struct Cli {
    /// Path to the config file (default: $XDG_CONFIG_HOME/conductor/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log to stderr (RUST_LOG controls the filter)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a conversation from an agent spec file and run it to completion
    Run {
        /// YAML file describing the agent spec
        #[arg(long)]
        spec: PathBuf,
        /// The user prompt that starts the conversation
        #[arg(long)]
        prompt: String,
        /// Opaque session tag stamped onto the conversation
        #[arg(long, default_value = "")]
        session: String,
        /// Number of parallel conversations to launch from the same spec
        #[arg(long, default_value_t = 1)]
        parallel: usize,
    },
    /// Continue an existing conversation with a new prompt
    Resume {
        /// Identifier of the conversation to resume
        #[arg(long)]
        conversation: Uuid,
        /// The user prompt appended to the transcript
        #[arg(long)]
        prompt: String,
    },
    /// Duplicate an existing conversation and run the copy with a new prompt.
    /// The parent is left untouched.
    Fork {
        /// Identifier of the conversation to fork
        #[arg(long)]
        conversation: Uuid,
        /// The user prompt the fork starts from
        #[arg(long)]
        prompt: String,
    },
    /// Print the resolved configuration
    ShowConfig,
}

/// Spec file shape: the persisted AgentSpec minus the generated fields.
#[derive(Debug, serde::Deserialize)]
pub struct SpecFile {
    pub name: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: String,
    pub instructions: String,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    #[serde(default)]
    pub auto_compact: bool,
    #[serde(default)]
    pub compact_at_percent: Option<u32>,
    #[serde(default)]
    pub compaction_prompt: String,
    #[serde(default = "default_true")]
    pub shell_access: bool,
    #[serde(default)]
    pub web_search: bool,
    #[serde(default)]
    pub structured_output: bool,
    #[serde(default)]
    pub structured_output_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_true() -> bool {
    true
}
