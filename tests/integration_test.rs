// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Whole-stack smoke test: config → provider → runtime → store, with the
//! scripted provider standing in for the network.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use conductor_config::{Config, ShellConfig};
use conductor_model::{ChatResponse, LlmProvider, Role, ScriptedProvider};
use conductor_runtime::Runtime;
use conductor_store::{AgentSpec, ConversationStatus, MemoryStore, ProviderTag, Store};

#[tokio::test]
async fn agent_runs_a_shell_command_end_to_end() {
    let sandbox = tempfile::tempdir().unwrap();
    let config = Config {
        shell: ShellConfig {
            root_dir: sandbox.path().display().to_string(),
            allowed_workdirs: Vec::new(),
            default_workdir: ".".into(),
            timeout_secs: 30,
        },
        ..Config::default()
    };

    let provider = Arc::new(ScriptedProvider::new(vec![
        ChatResponse::tool_call_reply(
            "resp_1",
            "shell",
            "call_1",
            r#"{"command":"echo integration-marker > proof.txt; cat proof.txt"}"#,
        ),
        ChatResponse::text_reply("resp_2", "the file is in place"),
    ]));

    let store = Arc::new(MemoryStore::new());
    let spec = AgentSpec::new(
        "integrator",
        ProviderTag::Mock,
        "gpt-5",
        "You verify the toolchain.",
    )
    .unwrap();
    store.insert_agent_spec(&spec).await.unwrap();

    let root = CancellationToken::new();
    let runtime = Runtime::new(
        root,
        Arc::clone(&store) as Arc<dyn Store>,
        provider as Arc<dyn LlmProvider>,
        &config,
    );

    let instance = runtime
        .new_conversation_instance_from_spec(spec.id, "it-session")
        .await
        .unwrap();
    let id = instance.id();
    runtime
        .run_conversation_instance(instance, "prove the shell works")
        .unwrap();
    runtime.wait_for_conversation(id).await;
    runtime.shutdown().await;

    // The command really ran inside the sandbox.
    let proof = std::fs::read_to_string(sandbox.path().join("proof.txt")).unwrap();
    assert_eq!(proof.trim(), "integration-marker");

    let conversation = store.get_conversation(id).await.unwrap();
    assert_eq!(conversation.status, ConversationStatus::Succeeded);
    assert_eq!(conversation.session_id, "it-session");
    assert_eq!(
        conversation.messages.last().unwrap().content,
        "the file is in place"
    );
    assert!(conversation
        .messages
        .iter()
        .any(|m| m.role == Role::Tool && m.content.contains("integration-marker")));
}
