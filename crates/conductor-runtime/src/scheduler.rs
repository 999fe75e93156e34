// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Named one-shot job executor.
//!
//! Each job runs under a child [`CancellationToken`] derived from the root,
//! so process shutdown is a single cancel.  At most one job per name is in
//! flight; resubmitting a running name is rejected with a benign log so a
//! double-clicked "resume" cannot double-dispatch a conversation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use conductor_model::{Error, ErrorKind, Result};

const DEFAULT_GRACE: Duration = Duration::from_secs(10);

struct RunningJob {
    serial: u64,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    root: CancellationToken,
    grace: Duration,
    serial: AtomicU64,
    running: Arc<Mutex<HashMap<String, RunningJob>>>,
}

impl Scheduler {
    pub fn new(root: CancellationToken) -> Self {
        Self::with_grace(root, DEFAULT_GRACE)
    }

    pub fn with_grace(root: CancellationToken, grace: Duration) -> Self {
        Self {
            root,
            grace,
            serial: AtomicU64::new(0),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedule `job` to run once on a worker task under a child token.
    ///
    /// Rejects when a job with the same name is still in flight or the
    /// scheduler has shut down.  Job panics are caught and logged; they
    /// never take the executor down.
    pub fn run_once<F, Fut>(&self, name: &str, job: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        const OP: &str = "scheduler.run_once";

        if self.root.is_cancelled() {
            return Err(Error::new(OP, ErrorKind::Unavailable, "scheduler is shut down"));
        }

        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.retain(|_, job| !job.handle.is_finished());
        if running.contains_key(name) {
            warn!(job = name, "job already running, not double-scheduling");
            return Err(Error::new(
                OP,
                ErrorKind::Invalid,
                format!("job {name} is already running"),
            ));
        }

        let serial = self.serial.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();
        let future = job(token);
        let map = Arc::clone(&self.running);
        let key = name.to_string();

        let handle = tokio::spawn(async move {
            if let Err(panic) = std::panic::AssertUnwindSafe(future).catch_unwind().await {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                warn!(job = %key, panic = %detail, "job panicked");
            }
            // Deregister only our own entry; a same-named successor may have
            // been scheduled after a reaped handle.
            let mut map = map.lock().unwrap_or_else(|e| e.into_inner());
            if map.get(&key).map(|j| j.serial) == Some(serial) {
                map.remove(&key);
            }
        });

        running.insert(name.to_string(), RunningJob { serial, handle });
        Ok(())
    }

    pub fn is_running(&self, name: &str) -> bool {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.get(name).map_or(false, |j| !j.handle.is_finished())
    }

    /// Wait for the named job to finish (or for it to never have existed).
    pub async fn wait_for(&self, name: &str) {
        while self.is_running(name) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Cancel the root token and wait for every in-flight job, bounded by
    /// the grace period.  Returns regardless once the grace expires.
    pub async fn shutdown(&self) {
        self.root.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
            running.drain().map(|(_, job)| job.handle).collect()
        };
        if handles.is_empty() {
            return;
        }

        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(self.grace, drain).await.is_err() {
            warn!(grace_secs = self.grace.as_secs(), "shutdown grace expired with jobs still running");
        } else {
            info!("scheduler drained");
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
