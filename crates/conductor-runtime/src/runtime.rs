// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::error;
use uuid::Uuid;

use conductor_config::{Config, ShellConfig};
use conductor_mcp::{McpClient, Mux, ShellServer};
use conductor_model::{Error, LlmProvider, Message, Result, ToolDefinition};
use conductor_store::{Conversation, Store};

use crate::instance::{hook_map, ConversationInstance};
use crate::scheduler::Scheduler;

/// Standing policy appended to every spec's instructions at conversation
/// birth.  Backs up the anti-loop guard in the inference loop by telling the
/// model up front not to repeat identical tool calls.
const DEFAULT_AGENT_POLICY: &str = "\n\
Policy:\n\
- Use tools only when strictly necessary. Do not re-run a tool just to \"confirm\".\n\
- NEVER call the same tool with identical arguments twice in a row. If you must retry, briefly explain why and change the arguments.";

/// Owns the in-flight conversation instances (through the scheduler's job
/// table) and wires each instance's collaborators.
pub struct Runtime {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) provider: Arc<dyn LlmProvider>,
    pub(crate) scheduler: Scheduler,
    shell: ShellConfig,
}

impl Runtime {
    pub fn new(
        root: CancellationToken,
        store: Arc<dyn Store>,
        provider: Arc<dyn LlmProvider>,
        config: &Config,
    ) -> Arc<Self> {
        let grace = Duration::from_secs(config.runtime.shutdown_grace_secs);
        Arc::new(Self {
            store,
            provider,
            scheduler: Scheduler::with_grace(root, grace),
            shell: config.shell.clone(),
        })
    }

    /// Create a new conversation from a spec and persist it.
    ///
    /// Snapshots every behavior-affecting spec field onto the conversation,
    /// so the instance stays runnable even if the spec is edited or deleted
    /// afterwards.
    pub async fn new_conversation_instance_from_spec(
        &self,
        agent_spec_id: Uuid,
        session_id: &str,
    ) -> Result<ConversationInstance> {
        const OP: &str = "runtime.new_conversation_instance_from_spec";

        let mut spec = self
            .store
            .get_agent_spec(agent_spec_id)
            .await
            .map_err(|e| Error::wrap(OP, e))?;
        spec.instructions.push_str(DEFAULT_AGENT_POLICY);

        let messages = vec![Message::system(&spec.instructions)];
        let mut conversation =
            Conversation::from_spec(&spec, messages).map_err(|e| Error::wrap(OP, e))?;
        conversation.session_id = session_id.to_string();

        self.new_instance(conversation, true).await
    }

    /// Rehydrate an instance from an existing conversation row.
    ///
    /// The originating spec is deliberately not consulted: it may have been
    /// edited or deleted since the conversation was born.
    pub async fn new_conversation_instance(
        &self,
        conversation_id: Uuid,
    ) -> Result<ConversationInstance> {
        const OP: &str = "runtime.new_conversation_instance";

        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await
            .map_err(|e| Error::wrap(OP, e))?;

        self.new_instance(conversation, false).await
    }

    /// Fork: duplicate an existing conversation (full transcript, fresh id,
    /// zeroed counters) and persist the copy.  The parent is untouched and
    /// never blocked by its forks.
    pub async fn fork_conversation(&self, conversation_id: Uuid) -> Result<Conversation> {
        const OP: &str = "runtime.fork_conversation";

        let parent = self
            .store
            .get_conversation(conversation_id)
            .await
            .map_err(|e| Error::wrap(OP, e))?;
        let fork = parent.clone_conversation(false).map_err(|e| Error::wrap(OP, e))?;
        self.store
            .insert_conversation(&fork)
            .await
            .map_err(|e| Error::wrap(OP, e))?;
        Ok(fork)
    }

    pub(crate) async fn new_instance(
        &self,
        mut conversation: Conversation,
        is_new: bool,
    ) -> Result<ConversationInstance> {
        const OP: &str = "runtime.new_instance";

        let mux = if conversation.shell_access {
            let shell = ShellServer::new(
                &self.shell.root_dir,
                &self.shell.allowed_workdirs,
                &self.shell.default_workdir,
                Duration::from_secs(self.shell.timeout_secs),
            )
            .map_err(|e| Error::wrap(OP, e))?;
            let clients: Vec<Box<dyn McpClient>> = vec![Box::new(shell)];
            Some(Mux::connect(clients).await.map_err(|e| Error::wrap(OP, e))?)
        } else {
            None
        };

        let discovered = mux.as_ref().map(|m| m.list_tools()).unwrap_or_default();
        conversation.tools = filter_allowed_tools(discovered, &conversation.allowed_tools);

        if is_new {
            self.store
                .insert_conversation(&conversation)
                .await
                .map_err(|e| Error::wrap(OP, e))?;
        } else {
            self.store
                .update_conversation(&conversation)
                .await
                .map_err(|e| Error::wrap(OP, e))?;
        }

        let hooks = self
            .store
            .list_hooks_for_agent(&conversation.agent_name)
            .await
            .map_err(|e| Error::wrap(OP, e))?;

        Ok(ConversationInstance {
            conversation,
            provider: Arc::clone(&self.provider),
            mux,
            hooks: hook_map(hooks),
        })
    }

    /// Schedule one inference job for the instance.
    ///
    /// The job name is derived from the conversation id, so a conversation
    /// can never have two active jobs; resubmitting while one runs is
    /// rejected by the scheduler.
    pub fn run_conversation_instance(
        self: &Arc<Self>,
        mut instance: ConversationInstance,
        prompt: &str,
    ) -> Result<()> {
        const OP: &str = "runtime.run_conversation_instance";

        let job_name = format!("agent:{}", instance.id());
        let runtime = Arc::clone(self);
        let prompt = prompt.to_string();

        self.scheduler
            .run_once(&job_name, move |token| async move {
                let conversation_id = instance.id();
                if let Err(err) = runtime.run_instance_job(token, &mut instance, &prompt).await {
                    error!(conversation_id = %conversation_id, error = %err, "conversation failed");
                }
            })
            .map_err(|e| Error::wrap(OP, e))
    }

    /// Fail fast on unknown model identifiers.  Used at spec-creation time.
    pub async fn validate_model(&self, model: &str) -> Result<()> {
        self.provider.validate_model(model).await
    }

    /// Block until the job for `conversation_id` (if any) has finished.
    pub async fn wait_for_conversation(&self, conversation_id: Uuid) {
        self.scheduler.wait_for(&format!("agent:{conversation_id}")).await;
    }

    /// Cancel every in-flight job and wait for the drain, bounded by the
    /// configured grace period.  Each job's cancel path persists a terminal
    /// `canceled` status on its way out.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}

fn filter_allowed_tools(tools: Vec<ToolDefinition>, allowed: &[String]) -> Vec<ToolDefinition> {
    if allowed.is_empty() || (allowed.len() == 1 && allowed[0].eq_ignore_ascii_case("all")) {
        return tools;
    }
    let allowed_set: HashSet<&str> = allowed
        .iter()
        .filter(|name| !name.is_empty())
        .map(|name| name.as_str())
        .collect();
    tools
        .into_iter()
        .filter(|tool| allowed_set.contains(tool.name.as_str()))
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: String::new(),
            schema: json!({"type": "object"}),
        }
    }

    #[test]
    fn empty_allow_list_keeps_everything() {
        let tools = filter_allowed_tools(vec![tool("a"), tool("b")], &[]);
        assert_eq!(tools.len(), 2);
    }

    #[test]
    fn all_sentinel_keeps_everything() {
        let tools = filter_allowed_tools(vec![tool("a"), tool("b")], &["ALL".to_string()]);
        assert_eq!(tools.len(), 2);
    }

    #[test]
    fn explicit_list_filters_tools() {
        let tools = filter_allowed_tools(
            vec![tool("shell"), tool("search")],
            &["shell".to_string()],
        );
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "shell");
    }

    #[test]
    fn empty_names_in_allow_list_are_ignored() {
        let tools = filter_allowed_tools(
            vec![tool("shell")],
            &[String::new(), "shell".to_string()],
        );
        assert_eq!(tools.len(), 1);
    }
}
