// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

use conductor_model::{Result, ToolDefinition};

/// Content returned by one tool invocation.
///
/// Mirrors the MCP result shape: zero or more text parts, optional
/// structured content, and a tool-level error flag.  Tool-level failures
/// (`is_error = true`) are data for the model; protocol-level failures are
/// `Err` on the call itself.
#[derive(Debug, Clone, Default)]
pub struct ToolContent {
    pub text: Vec<String>,
    pub structured: Option<Value>,
    pub is_error: bool,
}

impl ToolContent {
    pub fn text_part(text: impl Into<String>) -> Self {
        Self {
            text: vec![text.into()],
            ..Default::default()
        }
    }

    pub fn structured(value: Value) -> Self {
        Self {
            structured: Some(value),
            ..Default::default()
        }
    }

    /// A tool-level failure surfaced to the model as error text.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            text: vec![message.into()],
            structured: None,
            is_error: true,
        }
    }
}

/// The only surface the multiplexer consumes from an MCP server, whether the
/// server runs in-process or behind a stdio transport.
#[async_trait]
pub trait McpClient: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>>;

    async fn call_tool(&self, name: &str, arguments: &Value) -> Result<ToolContent>;
}
