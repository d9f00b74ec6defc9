//! Diagram Generation Boundary
//!
//! Diagrams are rendered by an external job queue. This module holds the
//! handle the queue returns, the result it eventually resolves to, and the
//! per-session bookkeeping that allows at most one generation in flight.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;

/// The queue's handle for an enqueued diagram job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramTask {
    pub task_id: String,
}

impl DiagramTask {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
        }
    }
}

/// The final outcome reported by the queue for a finished job.
///
/// On the wire this is `{"status": "success", "data": "<url>"}` or
/// `{"status": "error", "data": "<message>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "lowercase")]
pub enum DiagramResult {
    /// The diagram was rendered; carries the artifact URL.
    Success(String),
    /// The job ran but failed; carries the error message.
    Error(String),
}

/// Enqueue/poll/result API of the external diagram job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Submits a new diagram job for the given prompt.
    async fn enqueue(&self, prompt: &str) -> Result<DiagramTask>;

    /// Reports whether the job has finished (successfully or not).
    async fn is_ready(&self, task: &DiagramTask) -> Result<bool>;

    /// Fetches the outcome of a finished job, waiting at most `timeout`.
    async fn result(&self, task: &DiagramTask, timeout: Duration) -> Result<DiagramResult>;
}

/// Tracks the single diagram generation a session may have in flight.
///
/// `task_id` is set exactly when `in_progress` is true; the fields are private
/// so the only way to change them is through [`DiagramState::begin`] and
/// [`DiagramState::reset`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagramState {
    in_progress: bool,
    task_id: Option<String>,
}

/// The session-scoped owner of a [`DiagramState`]. Every read and write goes
/// through this lock, shared by both relay loops and the monitor task.
pub type SharedDiagramState = Arc<Mutex<DiagramState>>;

impl DiagramState {
    /// A state with no generation in flight.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Creates a new shared, idle state for a session.
    pub fn shared() -> SharedDiagramState {
        Arc::new(Mutex::new(Self::idle()))
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    /// Marks `task` as the generation in flight.
    pub fn begin(&mut self, task: &DiagramTask) {
        self.in_progress = true;
        self.task_id = Some(task.task_id.clone());
    }

    /// Returns to idle.
    pub fn reset(&mut self) {
        self.in_progress = false;
        self.task_id = None;
    }
}
