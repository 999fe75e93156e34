// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use uuid::Uuid;

use conductor_model::Result;

use crate::conversation::Conversation;
use crate::hook::Hook;
use crate::spec::AgentSpec;

/// Minimal repository surface the runtime consumes.
///
/// The relational driver behind it is deliberately out of scope; the runtime
/// only relies on the semantics below.  Identifiers are UUIDv7, so the id
/// doubles as a monotone list cursor and `list_*` results are ordered by it.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Agent specs ───────────────────────────────────────────────────────────

    async fn insert_agent_spec(&self, spec: &AgentSpec) -> Result<()>;
    async fn update_agent_spec(&self, spec: &AgentSpec) -> Result<()>;
    async fn get_agent_spec(&self, id: Uuid) -> Result<AgentSpec>;
    async fn delete_agent_spec(&self, id: Uuid) -> Result<()>;
    async fn list_agent_specs(&self) -> Result<Vec<AgentSpec>>;

    // ── Conversations ─────────────────────────────────────────────────────────

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()>;
    async fn update_conversation(&self, conversation: &Conversation) -> Result<()>;
    async fn get_conversation(&self, id: Uuid) -> Result<Conversation>;
    async fn delete_conversation(&self, id: Uuid) -> Result<()>;
    /// Ordered by id; `session_id` filters when provided.
    async fn list_conversations(&self, session_id: Option<&str>) -> Result<Vec<Conversation>>;

    // ── Hooks ─────────────────────────────────────────────────────────────────

    async fn insert_hook(&self, hook: &Hook) -> Result<()>;
    async fn update_hook(&self, hook: &Hook) -> Result<()>;
    async fn get_hook(&self, id: Uuid) -> Result<Hook>;
    async fn delete_hook(&self, id: Uuid) -> Result<()>;
    async fn list_hooks(&self) -> Result<Vec<Hook>>;
    /// Enabled hooks whose agent_name matches `agent_name` or is a wildcard.
    async fn list_hooks_for_agent(&self, agent_name: &str) -> Result<Vec<Hook>>;
}
