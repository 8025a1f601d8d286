// src/exec/detached.rs

//! Fire-and-forget task submission.
//!
//! Callers hand over a future and get control back immediately. The future
//! runs on its own Tokio task; if it fails, the failure goes to a hook and
//! nowhere else. Production uses the default hook (a `warn!` log line);
//! tests install their own hook to observe failures.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::{FleetError, Result};

/// Called with the submission label and the error of a failed task.
pub type FailureHook = Arc<dyn Fn(&str, &FleetError) + Send + Sync>;

#[derive(Clone)]
pub struct DetachedRunner {
    on_failure: FailureHook,
}

impl fmt::Debug for DetachedRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetachedRunner").finish_non_exhaustive()
    }
}

impl Default for DetachedRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl DetachedRunner {
    /// Runner whose failures are only logged.
    pub fn new() -> Self {
        Self {
            on_failure: Arc::new(log_failure),
        }
    }

    pub fn with_failure_hook(hook: FailureHook) -> Self {
        Self { on_failure: hook }
    }

    /// Spawn `fut` without waiting for it.
    ///
    /// The returned handle may be dropped; the task keeps running.
    pub fn submit<F>(&self, label: &'static str, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let hook = Arc::clone(&self.on_failure);
        debug!(task = label, "submitting detached task");

        tokio::spawn(async move {
            if let Err(err) = fut.await {
                hook(label, &err);
            }
        })
    }
}

fn log_failure(label: &str, err: &FleetError) {
    warn!(task = label, error = %err, "detached task failed");
}
