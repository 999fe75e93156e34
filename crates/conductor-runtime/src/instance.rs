// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use conductor_mcp::Mux;
use conductor_model::LlmProvider;
use conductor_store::{Conversation, Hook, HookEvent};

/// Live runtime wrapper around a persisted [`Conversation`] for the
/// duration of one inference job.
///
/// Binds the row to its transient collaborators: the provider adapter, the
/// tool mux (absent when the conversation has no shell access), and the
/// hooks that matched the agent at construction time.
pub struct ConversationInstance {
    pub conversation: Conversation,
    pub(crate) provider: Arc<dyn LlmProvider>,
    pub(crate) mux: Option<Mux>,
    pub(crate) hooks: HashMap<HookEvent, Vec<Hook>>,
}

impl ConversationInstance {
    pub fn id(&self) -> Uuid {
        self.conversation.id
    }

    pub fn agent_name(&self) -> &str {
        &self.conversation.agent_name
    }

    pub(crate) fn hooks_for(&self, event: HookEvent) -> Vec<Hook> {
        self.hooks.get(&event).cloned().unwrap_or_default()
    }
}

/// Group hooks by event type for O(1) lookup per loop step.
pub(crate) fn hook_map(hooks: Vec<Hook>) -> HashMap<HookEvent, Vec<Hook>> {
    let mut map: HashMap<HookEvent, Vec<Hook>> = HashMap::new();
    for hook in hooks {
        map.entry(hook.event_type).or_default().push(hook);
    }
    map
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
