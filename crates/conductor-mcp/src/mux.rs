// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use conductor_model::{Error, ErrorKind, Result, ToolCall, ToolDefinition};

use crate::client::McpClient;

/// Aggregates one or more MCP clients behind a single tool view and routes
/// calls to the owning client.
///
/// The merged view is refreshed once at construction; a tool name is
/// globally unique for the lifetime of the mux.  When two clients expose the
/// same name, only the first registration is visible.
pub struct Mux {
    clients: Vec<Box<dyn McpClient>>,
    tool_to_client: HashMap<String, usize>,
    merged_tools: Vec<ToolDefinition>,
}

impl std::fmt::Debug for Mux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mux")
            .field("clients", &self.clients.len())
            .field("tool_to_client", &self.tool_to_client)
            .field("merged_tools", &self.merged_tools)
            .finish()
    }
}

impl Mux {
    pub async fn connect(clients: Vec<Box<dyn McpClient>>) -> Result<Self> {
        const OP: &str = "mux.connect";

        if clients.is_empty() {
            return Err(Error::new(OP, ErrorKind::Invalid, "no MCP clients provided"));
        }

        let mut merged_tools = Vec::new();
        let mut tool_to_client = HashMap::new();

        for (client_index, client) in clients.iter().enumerate() {
            let tools = client.list_tools().await.map_err(|e| Error::wrap(OP, e))?;
            for tool in tools {
                // First writer wins on duplicate tool names.
                if tool_to_client.contains_key(&tool.name) {
                    warn!(tool = %tool.name, client_index, "duplicate tool name, keeping first");
                    continue;
                }
                tool_to_client.insert(tool.name.clone(), client_index);
                merged_tools.push(tool);
            }
        }

        Ok(Self {
            clients,
            tool_to_client,
            merged_tools,
        })
    }

    /// The cached merged tool view.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.merged_tools.clone()
    }

    /// Route a call by tool name and return a text payload for the
    /// transcript: text parts newline-joined, falling back to the JSON
    /// encoding of structured content, then to an empty string.
    pub async fn call_tool(&self, call: &ToolCall) -> Result<String> {
        const OP: &str = "mux.call_tool";

        let Some(&client_index) = self.tool_to_client.get(&call.name) else {
            return Err(Error::new(
                OP,
                ErrorKind::NotFound,
                format!("unknown tool: {}", call.name),
            ));
        };

        let arguments: Value = if call.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&call.arguments).map_err(|e| {
                Error::with_source(OP, ErrorKind::Invalid, "tool arguments are not valid JSON", e)
            })?
        };

        debug!(tool = %call.name, call_id = %call.call_id, "dispatching tool call");

        let content = self.clients[client_index]
            .call_tool(&call.name, &arguments)
            .await
            .map_err(|e| Error::wrap(OP, e))?;

        let combined = content.text.join("\n");
        if !combined.is_empty() {
            return Ok(combined);
        }

        if let Some(structured) = &content.structured {
            return serde_json::to_string(structured)
                .map_err(|e| Error::internal(OP, e));
        }

        // Nothing useful returned; still succeed with an empty payload.
        Ok(String::new())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::client::ToolContent;

    struct FakeClient {
        tools: Vec<ToolDefinition>,
        reply: ToolContent,
    }

    impl FakeClient {
        fn with_tool(name: &str, reply: ToolContent) -> Self {
            Self {
                tools: vec![ToolDefinition {
                    name: name.into(),
                    description: format!("fake tool {name}"),
                    schema: json!({"type": "object"}),
                }],
                reply,
            }
        }
    }

    #[async_trait]
    impl McpClient for FakeClient {
        async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
            Ok(self.tools.clone())
        }

        async fn call_tool(&self, _name: &str, _arguments: &Value) -> Result<ToolContent> {
            Ok(self.reply.clone())
        }
    }

    fn call(name: &str, args: &str) -> ToolCall {
        ToolCall {
            name: name.into(),
            call_id: "call_1".into(),
            arguments: args.into(),
        }
    }

    #[tokio::test]
    async fn connect_requires_at_least_one_client() {
        let err = Mux::connect(vec![]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[tokio::test]
    async fn merged_view_contains_all_tools() {
        let mux = Mux::connect(vec![
            Box::new(FakeClient::with_tool("alpha", ToolContent::text_part("a"))) as Box<dyn McpClient>,
            Box::new(FakeClient::with_tool("beta", ToolContent::text_part("b"))),
        ])
        .await
        .unwrap();
        let mut names: Vec<String> = mux.list_tools().into_iter().map(|t| t.name).collect();
        names.sort();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn first_writer_wins_on_name_collision() {
        let mux = Mux::connect(vec![
            Box::new(FakeClient::with_tool("shell", ToolContent::text_part("first"))) as Box<dyn McpClient>,
            Box::new(FakeClient::with_tool("shell", ToolContent::text_part("second"))),
        ])
        .await
        .unwrap();
        assert_eq!(mux.list_tools().len(), 1);
        let out = mux.call_tool(&call("shell", "{}")).await.unwrap();
        assert_eq!(out, "first");
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let mux = Mux::connect(vec![Box::new(FakeClient::with_tool(
            "shell",
            ToolContent::text_part("x"),
        )) as Box<dyn McpClient>])
        .await
        .unwrap();
        let err = mux.call_tool(&call("missing", "{}")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn text_parts_are_newline_joined() {
        let reply = ToolContent {
            text: vec!["line one".into(), "line two".into()],
            ..Default::default()
        };
        let mux = Mux::connect(vec![
            Box::new(FakeClient::with_tool("t", reply)) as Box<dyn McpClient>
        ])
        .await
        .unwrap();
        assert_eq!(mux.call_tool(&call("t", "{}")).await.unwrap(), "line one\nline two");
    }

    #[tokio::test]
    async fn structured_content_is_json_encoded_when_no_text() {
        let reply = ToolContent::structured(json!({"exit_code": 0, "stdout": "ok"}));
        let mux = Mux::connect(vec![
            Box::new(FakeClient::with_tool("t", reply)) as Box<dyn McpClient>
        ])
        .await
        .unwrap();
        let out = mux.call_tool(&call("t", "{}")).await.unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["exit_code"], 0);
    }

    #[tokio::test]
    async fn empty_content_yields_empty_string() {
        let mux = Mux::connect(vec![Box::new(FakeClient::with_tool(
            "t",
            ToolContent::default(),
        )) as Box<dyn McpClient>])
        .await
        .unwrap();
        assert_eq!(mux.call_tool(&call("t", "{}")).await.unwrap(), "");
    }

    #[tokio::test]
    async fn empty_arguments_become_empty_object() {
        let mux = Mux::connect(vec![Box::new(FakeClient::with_tool(
            "t",
            ToolContent::text_part("ok"),
        )) as Box<dyn McpClient>])
        .await
        .unwrap();
        assert!(mux.call_tool(&call("t", "")).await.is_ok());
    }

    #[tokio::test]
    async fn malformed_arguments_are_invalid() {
        let mux = Mux::connect(vec![Box::new(FakeClient::with_tool(
            "t",
            ToolContent::text_part("ok"),
        )) as Box<dyn McpClient>])
        .await
        .unwrap();
        let err = mux.call_tool(&call("t", "{not json")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }
}
