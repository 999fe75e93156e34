// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use conductor_model::{Error, ErrorKind, Result};

use crate::conversation::Conversation;
use crate::hook::Hook;
use crate::spec::AgentSpec;
use crate::store::Store;

/// In-memory [`Store`] implementation.
///
/// The reference implementation for tests and single-process runs; a
/// relational driver can replace it without the runtime noticing.
#[derive(Default)]
pub struct MemoryStore {
    specs: RwLock<HashMap<Uuid, AgentSpec>>,
    conversations: RwLock<HashMap<Uuid, Conversation>>,
    hooks: RwLock<HashMap<Uuid, Hook>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    // ── Agent specs ───────────────────────────────────────────────────────────

    async fn insert_agent_spec(&self, spec: &AgentSpec) -> Result<()> {
        const OP: &str = "store.insert_agent_spec";

        spec.validate().map_err(|e| Error::wrap(OP, e))?;
        let mut specs = self.specs.write().await;
        if specs.contains_key(&spec.id) {
            return Err(Error::new(OP, ErrorKind::Invalid, "agent spec already exists"));
        }
        specs.insert(spec.id, spec.clone());
        Ok(())
    }

    async fn update_agent_spec(&self, spec: &AgentSpec) -> Result<()> {
        const OP: &str = "store.update_agent_spec";

        spec.validate().map_err(|e| Error::wrap(OP, e))?;
        let mut specs = self.specs.write().await;
        if !specs.contains_key(&spec.id) {
            return Err(Error::new(OP, ErrorKind::NotFound, "agent spec not found"));
        }
        specs.insert(spec.id, spec.clone());
        Ok(())
    }

    async fn get_agent_spec(&self, id: Uuid) -> Result<AgentSpec> {
        const OP: &str = "store.get_agent_spec";

        self.specs.read().await.get(&id).cloned().ok_or_else(|| {
            Error::new(OP, ErrorKind::NotFound, format!("agent spec {id} not found"))
        })
    }

    async fn delete_agent_spec(&self, id: Uuid) -> Result<()> {
        const OP: &str = "store.delete_agent_spec";

        self.specs.write().await.remove(&id).map(|_| ()).ok_or_else(|| {
            Error::new(OP, ErrorKind::NotFound, format!("agent spec {id} not found"))
        })
    }

    async fn list_agent_specs(&self) -> Result<Vec<AgentSpec>> {
        let mut specs: Vec<AgentSpec> = self.specs.read().await.values().cloned().collect();
        specs.sort_by_key(|s| s.id);
        Ok(specs)
    }

    // ── Conversations ─────────────────────────────────────────────────────────

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        const OP: &str = "store.insert_conversation";

        conversation.validate().map_err(|e| Error::wrap(OP, e))?;
        let mut conversations = self.conversations.write().await;
        if conversations.contains_key(&conversation.id) {
            return Err(Error::new(OP, ErrorKind::Invalid, "conversation already exists"));
        }
        conversations.insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn update_conversation(&self, conversation: &Conversation) -> Result<()> {
        const OP: &str = "store.update_conversation";

        conversation.validate().map_err(|e| Error::wrap(OP, e))?;
        let mut conversations = self.conversations.write().await;
        if !conversations.contains_key(&conversation.id) {
            return Err(Error::new(OP, ErrorKind::NotFound, "conversation not found"));
        }
        conversations.insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Conversation> {
        const OP: &str = "store.get_conversation";

        self.conversations.read().await.get(&id).cloned().ok_or_else(|| {
            Error::new(OP, ErrorKind::NotFound, format!("conversation {id} not found"))
        })
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<()> {
        const OP: &str = "store.delete_conversation";

        self.conversations.write().await.remove(&id).map(|_| ()).ok_or_else(|| {
            Error::new(OP, ErrorKind::NotFound, format!("conversation {id} not found"))
        })
    }

    async fn list_conversations(&self, session_id: Option<&str>) -> Result<Vec<Conversation>> {
        let mut conversations: Vec<Conversation> = self
            .conversations
            .read()
            .await
            .values()
            .filter(|c| session_id.map_or(true, |s| c.session_id == s))
            .cloned()
            .collect();
        conversations.sort_by_key(|c| c.id);
        Ok(conversations)
    }

    // ── Hooks ─────────────────────────────────────────────────────────────────

    async fn insert_hook(&self, hook: &Hook) -> Result<()> {
        const OP: &str = "store.insert_hook";

        hook.validate().map_err(|e| Error::wrap(OP, e))?;
        let mut hooks = self.hooks.write().await;
        if hooks.contains_key(&hook.id) {
            return Err(Error::new(OP, ErrorKind::Invalid, "hook already exists"));
        }
        hooks.insert(hook.id, hook.clone());
        Ok(())
    }

    async fn update_hook(&self, hook: &Hook) -> Result<()> {
        const OP: &str = "store.update_hook";

        hook.validate().map_err(|e| Error::wrap(OP, e))?;
        let mut hooks = self.hooks.write().await;
        if !hooks.contains_key(&hook.id) {
            return Err(Error::new(OP, ErrorKind::NotFound, "hook not found"));
        }
        hooks.insert(hook.id, hook.clone());
        Ok(())
    }

    async fn get_hook(&self, id: Uuid) -> Result<Hook> {
        const OP: &str = "store.get_hook";

        self.hooks.read().await.get(&id).cloned().ok_or_else(|| {
            Error::new(OP, ErrorKind::NotFound, format!("hook {id} not found"))
        })
    }

    async fn delete_hook(&self, id: Uuid) -> Result<()> {
        const OP: &str = "store.delete_hook";

        self.hooks.write().await.remove(&id).map(|_| ()).ok_or_else(|| {
            Error::new(OP, ErrorKind::NotFound, format!("hook {id} not found"))
        })
    }

    async fn list_hooks(&self) -> Result<Vec<Hook>> {
        let mut hooks: Vec<Hook> = self.hooks.read().await.values().cloned().collect();
        hooks.sort_by_key(|h| h.id);
        Ok(hooks)
    }

    async fn list_hooks_for_agent(&self, agent_name: &str) -> Result<Vec<Hook>> {
        let mut hooks: Vec<Hook> = self
            .hooks
            .read()
            .await
            .values()
            .filter(|h| h.matches_agent(agent_name))
            .cloned()
            .collect();
        hooks.sort_by_key(|h| h.id);
        Ok(hooks)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
