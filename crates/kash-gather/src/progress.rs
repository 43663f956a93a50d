// SPDX-License-Identifier: MIT OR Apache-2.0
//! Progress-reporting protocol, decoupled from rendering.
//!
//! Gather calls report task lifecycle events through a [`ProgressTracker`].
//! The default [`LogTracker`] emits one log line per state change; a live-UI
//! tracker can set [`suppress_logs`](ProgressTracker::suppress_logs) so
//! retries aren't double-reported.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// Terminal state of a tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// The task finished successfully.
    Completed,
    /// The task failed.
    Failed,
    /// The task was skipped.
    Skipped,
}

impl TaskState {
    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Receiver of task lifecycle events.
#[async_trait]
pub trait ProgressTracker: Send + Sync {
    /// Register a new task and return its id.
    async fn add(&self, label: &str) -> u64;

    /// Update progress, relabel, or record a transient error message
    /// (e.g. a retry notice).
    async fn update(
        &self,
        task_id: u64,
        progress: Option<f64>,
        label: Option<&str>,
        error_msg: Option<&str>,
    );

    /// Mark a task finished in the given terminal state.
    async fn finish(&self, task_id: u64, state: TaskState, msg: Option<&str>);

    /// When true, gather suppresses its own retry log lines because the
    /// tracker renders them live.
    fn suppress_logs(&self) -> bool {
        false
    }
}

/// Line-oriented default tracker: one log message per state change.
#[derive(Debug, Default)]
pub struct LogTracker {
    next_id: AtomicU64,
}

impl LogTracker {
    /// Create a tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressTracker for LogTracker {
    async fn add(&self, label: &str) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(target: "kash.gather", task = id, label, "task started");
        id
    }

    async fn update(
        &self,
        task_id: u64,
        progress: Option<f64>,
        label: Option<&str>,
        error_msg: Option<&str>,
    ) {
        if let Some(error_msg) = error_msg {
            warn!(target: "kash.gather", task = task_id, error = error_msg, "task retrying");
        } else {
            info!(
                target: "kash.gather",
                task = task_id,
                progress = progress.unwrap_or(0.0),
                label = label.unwrap_or(""),
                "task progress"
            );
        }
    }

    async fn finish(&self, task_id: u64, state: TaskState, msg: Option<&str>) {
        match state {
            TaskState::Failed => {
                warn!(target: "kash.gather", task = task_id, msg = msg.unwrap_or(""), "task failed");
            }
            _ => {
                info!(
                    target: "kash.gather",
                    task = task_id,
                    state = state.as_str(),
                    msg = msg.unwrap_or(""),
                    "task finished"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_tracker_assigns_distinct_ids() {
        let tracker = LogTracker::new();
        let a = tracker.add("one").await;
        let b = tracker.add("two").await;
        assert_ne!(a, b);
        tracker.update(a, Some(0.5), None, None).await;
        tracker.finish(a, TaskState::Completed, None).await;
        tracker.finish(b, TaskState::Failed, Some("boom")).await;
    }

    #[test]
    fn default_trackers_do_not_suppress_logs() {
        let tracker = LogTracker::new();
        assert!(!tracker.suppress_logs());
    }
}
