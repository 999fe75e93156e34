// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::debug;

/// How long a SIGTERM'd process group gets to exit before SIGKILL.
const TERM_GRACE: Duration = Duration::from_millis(300);

/// The result of one shell execution.
#[derive(Debug, Default)]
pub(crate) struct ExecOutcome {
    pub exit_code: i32,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Run `command` under bash in a fresh process group, bounded by `timeout`.
///
/// `--noprofile --norc` gives deterministic behavior independent of the
/// operator's shell config; `pipefail` preserves failure detection across
/// pipelines; `set -e` stops at the first failing statement.  The new
/// process group lets the timeout path signal the entire subtree, so
/// children spawned by the command cannot outlive it.
pub(crate) async fn run_bash_isolated(
    workdir: &Path,
    command: &str,
    timeout: Duration,
) -> ExecOutcome {
    let wrapped = format!("set -e; {command}");

    let mut cmd = Command::new("/bin/bash");
    cmd.args(["--noprofile", "--norc", "-o", "pipefail", "-c", wrapped.as_str()]);
    cmd.current_dir(workdir);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    // When the caller's future is dropped (job canceled), tokio sends SIGKILL
    // to the child before releasing the process handle.
    cmd.kill_on_drop(true);
    // setsid() detaches the child into its own session and process group, so
    // the timeout path can signal the whole subtree with kill(-pgid).
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    debug!(cmd = %command, workdir = %workdir.display(), "executing shell command");

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            return ExecOutcome {
                exit_code: -1,
                timed_out: false,
                stdout: String::new(),
                stderr: format!("failed to start bash: {err}"),
            }
        }
    };

    // Drain both pipes concurrently so a chatty child can never deadlock on
    // a full pipe while we wait for it.
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(read_to_string(stdout_pipe));
    let stderr_task = tokio::spawn(read_to_string(stderr_pipe));

    let (exit_code, timed_out) = tokio::select! {
        status = child.wait() => {
            let code = status.ok().and_then(|s| s.code()).unwrap_or(-1);
            (code, false)
        }
        _ = tokio::time::sleep(timeout) => {
            kill_process_group(&mut child).await;
            (-1, true)
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    ExecOutcome {
        exit_code,
        timed_out,
        stdout,
        stderr,
    }
}

/// SIGTERM the whole process group, give it [`TERM_GRACE`], then SIGKILL.
async fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let pgid = pid as i32;
        unsafe { libc::kill(-pgid, libc::SIGTERM) };
        if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_ok() {
            return;
        }
        unsafe { libc::kill(-pgid, libc::SIGKILL) };
        let _ = child.wait().await;
        return;
    }

    // Non-unix (or no pid): kill just the direct child.
    let _ = child.kill().await;
    let _ = child.wait().await;
}

async fn read_to_string<R>(pipe: Option<R>) -> String
where
    R: AsyncReadExt + Unpin,
{
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
