// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use uuid::Uuid;

use cli::{Cli, Commands, SpecFile};
use conductor_model::ReasoningEffort;
use conductor_runtime::Runtime;
use conductor_store::{AgentSpec, MemoryStore, ProviderTag, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = conductor_config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::ShowConfig => {
            println!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        Commands::Run {
            spec,
            prompt,
            session,
            parallel,
        } => run_command(config, &spec, &prompt, &session, parallel.max(1)).await,
        Commands::Resume {
            conversation,
            prompt,
        } => resume_command(config, conversation, &prompt).await,
        Commands::Fork {
            conversation,
            prompt,
        } => fork_command(config, conversation, &prompt).await,
    }
}

/// One wired process: provider + store + runtime under a ctrl-c-cancelable
/// root token.
struct App {
    store: Arc<dyn Store>,
    runtime: Arc<Runtime>,
}

fn build_app(config: &conductor_config::Config) -> anyhow::Result<App> {
    let provider = conductor_model::from_config(&config.model)?;
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

    let root = CancellationToken::new();
    let runtime = Runtime::new(root.clone(), Arc::clone(&store), provider, config);

    // Ctrl-C cancels the root; every job unwinds to a persisted `canceled`.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, canceling all conversations");
            root.cancel();
        }
    });

    Ok(App { store, runtime })
}

async fn run_command(
    config: conductor_config::Config,
    spec_path: &std::path::Path,
    prompt: &str,
    session: &str,
    parallel: usize,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(spec_path)
        .with_context(|| format!("failed to read spec file {}", spec_path.display()))?;
    let file: SpecFile = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse spec file {}", spec_path.display()))?;
    let spec = build_spec(&file)?;

    let app = build_app(&config)?;
    app.store.insert_agent_spec(&spec).await?;

    let mut ids = Vec::with_capacity(parallel);
    for _ in 0..parallel {
        let instance = app
            .runtime
            .new_conversation_instance_from_spec(spec.id, session)
            .await?;
        let id = instance.id();
        app.runtime.run_conversation_instance(instance, prompt)?;
        ids.push(id);
    }

    finish_and_report(&app, &ids).await
}

async fn resume_command(
    config: conductor_config::Config,
    conversation_id: Uuid,
    prompt: &str,
) -> anyhow::Result<()> {
    let app = build_app(&config)?;

    let instance = app.runtime.new_conversation_instance(conversation_id).await?;
    let id = instance.id();
    app.runtime.run_conversation_instance(instance, prompt)?;

    finish_and_report(&app, &[id]).await
}

async fn fork_command(
    config: conductor_config::Config,
    conversation_id: Uuid,
    prompt: &str,
) -> anyhow::Result<()> {
    let app = build_app(&config)?;

    let fork = app.runtime.fork_conversation(conversation_id).await?;
    let instance = app.runtime.new_conversation_instance(fork.id).await?;
    let id = instance.id();
    app.runtime.run_conversation_instance(instance, prompt)?;

    finish_and_report(&app, &[id]).await
}

/// Wait for the given conversations, drain the scheduler, and print each
/// final transcript.
async fn finish_and_report(app: &App, ids: &[Uuid]) -> anyhow::Result<()> {
    for id in ids {
        app.runtime.wait_for_conversation(*id).await;
    }
    app.runtime.shutdown().await;

    for id in ids {
        let conversation = app.store.get_conversation(*id).await?;
        println!("── conversation {id} [{}]", conversation.status);
        for message in &conversation.messages {
            let role = format!("{:?}", message.role).to_lowercase();
            if let Some(call) = &message.tool_call {
                println!("[{role}] -> {}({})", call.name, call.arguments);
            } else {
                println!("[{role}] {}", message.content);
            }
        }
        println!(
            "tokens: {} in / {} out / {} cached, cost: {} cents",
            conversation.input_tokens,
            conversation.output_tokens,
            conversation.cached_tokens,
            conversation.cost
        );
    }

    Ok(())
}

fn build_spec(file: &SpecFile) -> anyhow::Result<AgentSpec> {
    let provider = match file.provider.as_str() {
        "openai" => ProviderTag::OpenAi,
        "mock" => ProviderTag::Mock,
        other => anyhow::bail!("unknown provider {other:?} in spec file"),
    };

    let mut spec = AgentSpec::new(&file.name, provider, &file.model, &file.instructions)?;
    if let Some(effort) = &file.reasoning_effort {
        spec.reasoning_effort = match effort.as_str() {
            "low" => ReasoningEffort::Low,
            "medium" => ReasoningEffort::Medium,
            "high" => ReasoningEffort::High,
            other => anyhow::bail!("unknown reasoning effort {other:?}"),
        };
    }
    spec.auto_compact = file.auto_compact;
    if let Some(pct) = file.compact_at_percent {
        spec.compact_at_percent = pct;
    }
    spec.compaction_prompt = file.compaction_prompt.clone();
    spec.shell_access = file.shell_access;
    spec.web_search = file.web_search;
    spec.structured_output = file.structured_output;
    spec.structured_output_schema = file.structured_output_schema.clone();
    spec.allowed_tools = file.allowed_tools.clone();
    spec.validate()?;
    Ok(spec)
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
