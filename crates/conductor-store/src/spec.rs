// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use conductor_model::{Error, ErrorKind, ReasoningEffort, Result};

/// LLM provider an agent spec targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTag {
    OpenAi,
    Mock,
}

impl ProviderTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Mock => "mock",
        }
    }
}

impl std::fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The versioned template from which conversations are born.
///
/// Immutable from an instance's point of view: conversations snapshot every
/// behavior-affecting field at birth, so editing or deleting a spec never
/// changes a running or resumable conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: Uuid,
    pub name: String,
    pub provider: ProviderTag,
    pub model: String,
    #[serde(default)]
    pub reasoning_effort: ReasoningEffort,
    pub instructions: String,
    #[serde(default)]
    pub auto_compact: bool,
    #[serde(default = "default_compact_at_percent")]
    pub compact_at_percent: u32,
    #[serde(default)]
    pub compaction_prompt: String,
    #[serde(default = "default_true")]
    pub shell_access: bool,
    #[serde(default)]
    pub web_search: bool,
    #[serde(default)]
    pub structured_output: bool,
    #[serde(default)]
    pub structured_output_schema: Option<Value>,
    /// Tool names surfaced to the model.  Empty or `["all"]` permits every
    /// discovered tool.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_compact_at_percent() -> u32 {
    90
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

impl AgentSpec {
    pub fn new(
        name: impl Into<String>,
        provider: ProviderTag,
        model: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Result<Self> {
        const OP: &str = "agent_spec.new";

        let spec = Self {
            id: Uuid::now_v7(),
            name: name.into().trim().to_string(),
            provider,
            model: model.into().trim().to_string(),
            reasoning_effort: ReasoningEffort::default(),
            instructions: instructions.into().trim().to_string(),
            auto_compact: false,
            compact_at_percent: default_compact_at_percent(),
            compaction_prompt: String::new(),
            shell_access: true,
            web_search: false,
            structured_output: false,
            structured_output_schema: None,
            allowed_tools: Vec::new(),
            version: 1,
        };
        spec.validate().map_err(|e| Error::wrap(OP, e))?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        const OP: &str = "agent_spec.validate";

        if self.name.is_empty() {
            return Err(Error::new(OP, ErrorKind::Invalid, "name is required"));
        }
        if self.model.is_empty() {
            return Err(Error::new(OP, ErrorKind::Invalid, "model is required"));
        }
        if self.instructions.is_empty() {
            return Err(Error::new(OP, ErrorKind::Invalid, "instructions are required"));
        }
        if self.version == 0 {
            return Err(Error::new(OP, ErrorKind::Invalid, "version must be > 0"));
        }
        if !(1..=100).contains(&self.compact_at_percent) {
            return Err(Error::new(
                OP,
                ErrorKind::Invalid,
                "compact_at_percent must be within 1..=100",
            ));
        }
        if self.auto_compact && self.compaction_prompt.trim().is_empty() {
            return Err(Error::new(
                OP,
                ErrorKind::Invalid,
                "auto_compact requires a compaction_prompt",
            ));
        }
        if self.structured_output && self.structured_output_schema.is_none() {
            return Err(Error::new(
                OP,
                ErrorKind::Invalid,
                "structured_output requires structured_output_schema",
            ));
        }
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> AgentSpec {
        AgentSpec::new("coder", ProviderTag::OpenAi, "gpt-5", "You write code.").unwrap()
    }

    #[test]
    fn new_spec_has_sane_defaults() {
        let s = spec();
        assert_eq!(s.version, 1);
        assert_eq!(s.compact_at_percent, 90);
        assert!(s.shell_access);
        assert!(!s.auto_compact);
    }

    #[test]
    fn ids_are_time_ordered() {
        let a = spec();
        let b = spec();
        assert!(a.id < b.id, "uuid v7 ids must sort by creation time");
    }

    #[test]
    fn name_and_instructions_are_trimmed() {
        let s = AgentSpec::new("  coder  ", ProviderTag::OpenAi, " gpt-5 ", "  do things  ").unwrap();
        assert_eq!(s.name, "coder");
        assert_eq!(s.model, "gpt-5");
        assert_eq!(s.instructions, "do things");
    }

    #[test]
    fn empty_name_is_invalid() {
        let err = AgentSpec::new("  ", ProviderTag::OpenAi, "gpt-5", "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn compact_percent_out_of_range_is_invalid() {
        let mut s = spec();
        s.compact_at_percent = 0;
        assert!(s.validate().is_err());
        s.compact_at_percent = 101;
        assert!(s.validate().is_err());
        s.compact_at_percent = 100;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn auto_compact_requires_prompt() {
        let mut s = spec();
        s.auto_compact = true;
        assert!(s.validate().is_err());
        s.compaction_prompt = "Summarize the conversation so far".into();
        assert!(s.validate().is_ok());
    }

    #[test]
    fn structured_output_requires_schema() {
        let mut s = spec();
        s.structured_output = true;
        assert!(s.validate().is_err());
        s.structured_output_schema = Some(serde_json::json!({"type": "object"}));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn spec_round_trips_through_json() {
        let s = spec();
        let json = serde_json::to_string(&s).unwrap();
        let back: AgentSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, s.id);
        assert_eq!(back.name, s.name);
        assert_eq!(back.compact_at_percent, 90);
    }
}
