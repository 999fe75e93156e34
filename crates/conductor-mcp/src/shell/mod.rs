// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! In-process MCP server exposing a single `shell` tool.
//!
//! Commands run under bash in a sandboxed working directory.  The workdir
//! whitelist is the only isolation boundary; everything else (network,
//! environment) is inherited from the conductor process.

mod exec;
mod workdir;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use conductor_model::{Error, ErrorKind, Result, ToolDefinition};

use crate::client::{McpClient, ToolContent};
pub use workdir::WorkdirResolver;

pub const SHELL_TOOL_NAME: &str = "shell";

const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_secs(180);

/// Structured result of one `shell` invocation, returned to the model as
/// JSON.  Also the envelope shape hooks use for synthetic tool errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellRunResult {
    pub exit_code: i32,
    pub duration_ms: i64,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub effective_dir: String,
    pub command_echo: String,
}

pub struct ShellServer {
    resolver: WorkdirResolver,
    max_timeout: Duration,
}

impl ShellServer {
    /// Build a shell server rooted at `root_dir` (empty ⇒ current directory).
    /// A zero `max_timeout` selects the 3-minute default.
    pub fn new(
        root_dir: &str,
        allowed_workdirs: &[String],
        default_workdir: &str,
        max_timeout: Duration,
    ) -> Result<Self> {
        const OP: &str = "shell.new_server";

        let max_timeout = if max_timeout.is_zero() {
            DEFAULT_MAX_TIMEOUT
        } else {
            max_timeout
        };

        let root: PathBuf = if root_dir.trim().is_empty() {
            std::env::current_dir().map_err(|e| Error::internal(OP, e))?
        } else {
            let p = Path::new(root_dir);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                std::env::current_dir()
                    .map_err(|e| Error::internal(OP, e))?
                    .join(p)
            }
        };

        let resolver = WorkdirResolver::new(&root, allowed_workdirs, default_workdir)
            .map_err(|e| Error::wrap(OP, e))?;

        Ok(Self {
            resolver,
            max_timeout,
        })
    }

    fn tool_definition() -> ToolDefinition {
        ToolDefinition {
            name: SHELL_TOOL_NAME.into(),
            description: "Execute a bash command".into(),
            schema: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Full shell command to execute using bash -c"
                    },
                    "workdir": {
                        "type": "string",
                        "description": "Optional working directory"
                    }
                },
                "required": ["command"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl McpClient for ShellServer {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        Ok(vec![Self::tool_definition()])
    }

    async fn call_tool(&self, name: &str, arguments: &Value) -> Result<ToolContent> {
        const OP: &str = "shell.call_tool";

        if name != SHELL_TOOL_NAME {
            return Err(Error::new(
                OP,
                ErrorKind::NotFound,
                format!("unknown tool: {name}"),
            ));
        }

        let command = match arguments.get("command").and_then(|v| v.as_str()) {
            Some(c) if !c.trim().is_empty() => c.to_string(),
            _ => return Ok(ToolContent::error("'command' argument is required")),
        };
        let requested_workdir = arguments
            .get("workdir")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        // Sandbox violations are data for the model, not loop failures.
        let workdir = match self.resolver.resolve(requested_workdir) {
            Ok(dir) => dir,
            Err(err) => return Ok(ToolContent::error(err.to_string())),
        };

        let started = Instant::now();
        let outcome = exec::run_bash_isolated(&workdir, &command, self.max_timeout).await;
        let duration = started.elapsed();

        let result = ShellRunResult {
            exit_code: outcome.exit_code,
            duration_ms: duration.as_millis() as i64,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            timed_out: outcome.timed_out,
            effective_dir: workdir.display().to_string(),
            command_echo: command,
        };

        let value = serde_json::to_value(&result).map_err(|e| Error::internal(OP, e))?;
        Ok(ToolContent {
            text: Vec::new(),
            structured: Some(value),
            is_error: result.exit_code != 0,
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
