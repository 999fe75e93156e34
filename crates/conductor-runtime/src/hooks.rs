// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Hook child-process execution.
//!
//! A hook receives its JSON payload on stdin and answers with its exit
//! code: 0 observes, 2 vetoes, anything else is a hook failure the loop
//! logs and ignores.  Interpretation of a veto lives in the inference loop;
//! this module only runs the process.

use std::process::Stdio;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use conductor_model::{Error, ErrorKind, Result};
use conductor_store::{Hook, HookEvent};

/// Exit code a hook uses to veto the step it observed.
pub const VETO_EXIT_CODE: i32 = 2;

/// Payload piped to a hook's stdin.
#[derive(Debug, Clone, Serialize)]
pub struct HookPayload {
    pub hook_id: Uuid,
    pub conversation_id: Uuid,
    pub event_type: HookEvent,
    pub agent_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_assistant_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compacted_conversation_id: Option<Uuid>,
}

#[derive(Debug)]
pub struct HookOutcome {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl HookOutcome {
    pub fn vetoed(&self) -> bool {
        self.exit_code == VETO_EXIT_CODE
    }

    /// Trimmed stderr text, with the documented fallback when empty.
    pub fn stderr_text(&self) -> String {
        let text = String::from_utf8_lossy(&self.stderr).trim().to_string();
        if text.is_empty() {
            "hook failed".to_string()
        } else {
            text
        }
    }
}

/// Run one hook program to completion, bounded by the job token.
///
/// Non-zero exit codes are not errors here; they come back in the outcome
/// for the caller to interpret.  `Err` means the process could not be run
/// at all, or the job was canceled while waiting.
pub async fn run_hook(
    token: &CancellationToken,
    hook: &Hook,
    payload: &HookPayload,
) -> Result<HookOutcome> {
    const OP: &str = "hooks.run_hook";

    if hook.command.trim().is_empty() {
        return Err(Error::new(OP, ErrorKind::Invalid, "empty hook command"));
    }

    let stdin_bytes = serde_json::to_vec(payload).map_err(|e| Error::internal(OP, e))?;

    let mut child = Command::new(&hook.command)
        .args(&hook.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            Error::with_source(
                OP,
                ErrorKind::Internal,
                format!("failed to start hook {}", hook.command),
                e,
            )
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // A hook that never reads stdin closes the pipe early; that is fine.
        let _ = stdin.write_all(&stdin_bytes).await;
        let _ = stdin.shutdown().await;
    }

    let wait = child.wait_with_output();
    tokio::pin!(wait);

    let output = tokio::select! {
        output = &mut wait => output.map_err(|e| Error::internal(OP, e))?,
        _ = token.cancelled() => {
            // Dropping the wait future drops the child; kill_on_drop reaps it.
            return Err(Error::new(OP, ErrorKind::Unavailable, "hook canceled"));
        }
    };

    let outcome = HookOutcome {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: output.stdout,
        stderr: output.stderr,
    };

    debug!(
        event = %hook.event_type,
        command = %hook.command,
        exit_code = outcome.exit_code,
        "hook executed"
    );

    Ok(outcome)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write as _;
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn script(dir: &tempfile::TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "#!/bin/bash\n{body}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    fn payload(hook: &Hook) -> HookPayload {
        HookPayload {
            hook_id: hook.id,
            conversation_id: Uuid::now_v7(),
            event_type: hook.event_type,
            agent_name: "coder".into(),
            last_assistant_message: Some("done".into()),
            tool_name: None,
            tool_args: None,
            tool_response: None,
            compacted_conversation_id: None,
        }
    }

    #[tokio::test]
    async fn exit_zero_is_an_observer() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(&dir, "ok.sh", "exit 0");
        let hook = Hook::new(HookEvent::ConversationEnded, "*", cmd, vec![], true).unwrap();
        let out = run_hook(&CancellationToken::new(), &hook, &payload(&hook))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 0);
        assert!(!out.vetoed());
    }

    #[tokio::test]
    async fn exit_two_is_a_veto_with_stderr_text() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(&dir, "veto.sh", "echo 'please continue: X' >&2; exit 2");
        let hook = Hook::new(HookEvent::ConversationEnded, "*", cmd, vec![], true).unwrap();
        let out = run_hook(&CancellationToken::new(), &hook, &payload(&hook))
            .await
            .unwrap();
        assert!(out.vetoed());
        assert_eq!(out.stderr_text(), "please continue: X");
    }

    #[tokio::test]
    async fn empty_stderr_veto_falls_back_to_hook_failed() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(&dir, "silent.sh", "exit 2");
        let hook = Hook::new(HookEvent::PreToolUse, "*", cmd, vec![], true).unwrap();
        let out = run_hook(&CancellationToken::new(), &hook, &payload(&hook))
            .await
            .unwrap();
        assert_eq!(out.stderr_text(), "hook failed");
    }

    #[tokio::test]
    async fn payload_arrives_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(&dir, "cat.sh", "cat");
        let hook = Hook::new(HookEvent::ConversationStarted, "*", cmd, vec![], true).unwrap();
        let p = payload(&hook);
        let out = run_hook(&CancellationToken::new(), &hook, &p).await.unwrap();
        let seen: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
        assert_eq!(seen["event_type"], "conversation_started");
        assert_eq!(seen["agent_name"], "coder");
        assert_eq!(seen["hook_id"], serde_json::json!(hook.id));
    }

    #[tokio::test]
    async fn args_are_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(&dir, "args.sh", "echo \"$1\"");
        let hook = Hook::new(
            HookEvent::PostToolUse,
            "*",
            cmd,
            vec!["first-arg".into()],
            true,
        )
        .unwrap();
        let out = run_hook(&CancellationToken::new(), &hook, &payload(&hook))
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "first-arg");
    }

    #[tokio::test]
    async fn missing_binary_is_an_error_not_a_veto() {
        let hook = Hook::new(
            HookEvent::PreToolUse,
            "*",
            "/definitely/not/a/real/binary",
            vec![],
            true,
        )
        .unwrap();
        let err = run_hook(&CancellationToken::new(), &hook, &payload(&hook))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn cancellation_terminates_the_hook() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(&dir, "slow.sh", "sleep 30");
        let hook = Hook::new(HookEvent::PreToolUse, "*", cmd, vec![], true).unwrap();
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            cancel.cancel();
        });
        let started = std::time::Instant::now();
        let err = run_hook(&token, &hook, &payload(&hook)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[tokio::test]
    async fn tool_payload_fields_serialize_when_present() {
        let hook = Hook::new(HookEvent::PreToolUse, "*", "/bin/cat", vec![], true).unwrap();
        let mut p = payload(&hook);
        p.event_type = HookEvent::PreToolUse;
        p.tool_name = Some("shell".into());
        p.tool_args = Some(r#"{"command":"ls"}"#.into());
        p.tool_response = Some(String::new());
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["tool_name"], "shell");
        assert!(json.get("compacted_conversation_id").is_none());
    }
}
