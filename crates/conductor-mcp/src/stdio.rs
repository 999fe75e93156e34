// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! MCP client over a stdio subprocess.
//!
//! Speaks JSON-RPC 2.0 line-delimited over the child's stdin/stdout:
//! `initialize` handshake, then `tools/list` and `tools/call` on demand.
//! Notifications from the server are skipped while waiting for a response.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use conductor_model::{Error, ErrorKind, Result, ToolDefinition};

use crate::client::{McpClient, ToolContent};

/// MCP spec revision offered during the handshake (the server negotiates).
const PROTOCOL_VERSION: &str = "2025-06-18";

pub struct StdioClient {
    // The child handle is kept so kill_on_drop reaps the server with us.
    _child: Child,
    io: Mutex<StdioPipes>,
}

impl std::fmt::Debug for StdioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioClient").finish_non_exhaustive()
    }
}

struct StdioPipes {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl StdioClient {
    /// Spawn `command args...` and complete the MCP initialize handshake.
    pub async fn connect(command: &str, args: &[String], env: &[(String, String)]) -> Result<Self> {
        const OP: &str = "mcp.stdio_connect";

        if command.trim().is_empty() {
            return Err(Error::new(OP, ErrorKind::Invalid, "empty MCP server command"));
        }

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::with_source(OP, ErrorKind::Unavailable, "failed to spawn MCP server", e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::new(OP, ErrorKind::Internal, "child stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::new(OP, ErrorKind::Internal, "child stdout unavailable"))?;

        let client = Self {
            _child: child,
            io: Mutex::new(StdioPipes {
                stdin,
                stdout: BufReader::new(stdout),
                next_id: 1,
            }),
        };

        client
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "clientInfo": {"name": "conductor", "version": env!("CARGO_PKG_VERSION")},
                    "capabilities": {},
                }),
            )
            .await
            .map_err(|e| Error::wrap(OP, e))?;
        client.notify("notifications/initialized").await?;

        Ok(client)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        const OP: &str = "mcp.stdio_request";

        let mut io = self.io.lock().await;
        let id = io.next_id;
        io.next_id += 1;

        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        io.write_line(&frame).await?;

        loop {
            let line = io.read_line().await?;
            if line.trim().is_empty() {
                continue;
            }
            let response: JsonRpcResponse = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(err) => {
                    warn!(error = %err, "skipping unparseable MCP frame");
                    continue;
                }
            };
            // Notifications and responses to other requests are not ours.
            match &response.id {
                Some(Value::Number(n)) if n.as_u64() == Some(id) => {}
                _ => continue,
            }
            if let Some(err) = response.error {
                return Err(Error::new(
                    OP,
                    ErrorKind::Internal,
                    format!("MCP error {}: {}", err.code, err.message),
                ));
            }
            return Ok(response.result.unwrap_or(Value::Null));
        }
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let mut io = self.io.lock().await;
        let frame = json!({"jsonrpc": "2.0", "method": method});
        io.write_line(&frame).await
    }
}

impl StdioPipes {
    async fn write_line(&mut self, frame: &Value) -> Result<()> {
        const OP: &str = "mcp.stdio_write";

        let mut bytes = serde_json::to_vec(frame).map_err(|e| Error::internal(OP, e))?;
        bytes.push(b'\n');
        self.stdin
            .write_all(&bytes)
            .await
            .map_err(|e| Error::with_source(OP, ErrorKind::Unavailable, "MCP server stdin closed", e))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| Error::with_source(OP, ErrorKind::Unavailable, "MCP server stdin closed", e))
    }

    async fn read_line(&mut self) -> Result<String> {
        const OP: &str = "mcp.stdio_read";

        let mut line = String::new();
        let n = self
            .stdout
            .read_line(&mut line)
            .await
            .map_err(|e| Error::with_source(OP, ErrorKind::Unavailable, "MCP server stdout closed", e))?;
        if n == 0 {
            return Err(Error::new(OP, ErrorKind::Unavailable, "MCP server exited"));
        }
        Ok(line)
    }
}

#[async_trait]
impl McpClient for StdioClient {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        const OP: &str = "mcp.stdio_list_tools";

        let result = self
            .request("tools/list", json!({}))
            .await
            .map_err(|e| Error::wrap(OP, e))?;

        let mut definitions = Vec::new();
        for tool in result.get("tools").and_then(|t| t.as_array()).unwrap_or(&Vec::new()) {
            let Some(name) = tool.get("name").and_then(|n| n.as_str()) else {
                continue;
            };
            definitions.push(ToolDefinition {
                name: name.to_string(),
                description: tool
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or_default()
                    .to_string(),
                schema: tool.get("inputSchema").cloned().unwrap_or_else(|| json!({})),
            });
        }

        debug!(count = definitions.len(), "discovered MCP tools");
        Ok(definitions)
    }

    async fn call_tool(&self, name: &str, arguments: &Value) -> Result<ToolContent> {
        const OP: &str = "mcp.stdio_call_tool";

        let result = self
            .request("tools/call", json!({"name": name, "arguments": arguments}))
            .await
            .map_err(|e| Error::wrap(OP, e))?;

        let mut content = ToolContent {
            is_error: result
                .get("isError")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            structured: result.get("structuredContent").cloned(),
            text: Vec::new(),
        };
        for part in result.get("content").and_then(|c| c.as_array()).unwrap_or(&Vec::new()) {
            if part.get("type").and_then(|t| t.as_str()) == Some("text") {
                if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                    if !text.is_empty() {
                        content.text.push(text.to_string());
                    }
                }
            }
        }

        Ok(content)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// A tiny MCP server implemented as a bash script: answers initialize,
    /// tools/list, and tools/call with canned JSON keyed off the request id.
    fn fake_server_script() -> &'static str {
        r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2025-06-18"}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"echo","description":"echoes","inputSchema":{"type":"object"}}]}}\n' "$id" ;;
    *'"method":"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"echoed"}]}}\n' "$id" ;;
  esac
done
"#
    }

    async fn connect_fake() -> StdioClient {
        StdioClient::connect("bash", &["-c".into(), fake_server_script().into()], &[])
            .await
            .expect("fake server must connect")
    }

    #[tokio::test]
    async fn handshake_and_tool_discovery() {
        let client = connect_fake().await;
        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");
    }

    #[tokio::test]
    async fn tool_call_returns_text_content() {
        let client = connect_fake().await;
        let content = client.call_tool("echo", &json!({"x": 1})).await.unwrap();
        assert_eq!(content.text, vec!["echoed"]);
        assert!(!content.is_error);
    }

    #[tokio::test]
    async fn empty_command_is_invalid() {
        let err = StdioClient::connect("", &[], &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[tokio::test]
    async fn dead_server_is_unavailable() {
        let script = "read -r _init; printf '{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\\n'; read -r _notified";
        let client = StdioClient::connect("bash", &["-c".into(), script.into()], &[])
            .await
            .unwrap();
        // The fake replied to initialize then exited; the next request fails.
        let err = client.list_tools().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }
}
