//! Background polling of a single diagram job.

use super::{peers::Peers, protocol::ServerMessage};
use explainer_core::{
    diagram::{DiagramResult, DiagramTask, JobQueue, SharedDiagramState},
    tool_call::{ToolCall, ToolResult},
};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Polling cadence for diagram jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub max_wait: Duration,
    /// How long fetching a finished job's result may take.
    pub result_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(120),
            result_timeout: Duration::from_secs(1),
        }
    }
}

/// How a monitored job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The job produced a diagram at this URL.
    Resolved(String),
    /// The job failed, or its result could not be fetched.
    Failed(String),
    TimedOut,
    /// The session ended first. Nobody was notified.
    Cancelled,
}

/// Watches one diagram job until it finishes, then tells both peers.
pub struct DiagramMonitor {
    pub(crate) peers: Peers,
    pub(crate) jobs: Arc<dyn JobQueue>,
    pub(crate) diagram: SharedDiagramState,
    pub(crate) call: ToolCall,
    pub(crate) task: DiagramTask,
    pub(crate) settings: MonitorSettings,
}

impl DiagramMonitor {
    #[instrument(name = "diagram_monitor", skip_all, fields(task_id = %self.task.task_id, call_id = %self.call.call_id))]
    pub async fn run(self, cancel: CancellationToken) -> MonitorOutcome {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Session ended; abandoning diagram job.");
                return MonitorOutcome::Cancelled;
            }
            outcome = self.poll() => outcome,
        };

        // Free the slot before anyone hears about it, so a follow-up request
        // is not turned away.
        self.diagram.lock().await.reset();

        self.notify(&outcome).await;
        outcome
    }

    /// Checks readiness until the job is ready or `max_wait` has passed.
    /// Time spent inside the queue counts towards the bound.
    async fn poll(&self) -> MonitorOutcome {
        let deadline = Instant::now() + self.settings.max_wait;
        loop {
            match tokio::time::timeout_at(deadline, self.jobs.is_ready(&self.task)).await {
                Ok(Ok(true)) => return self.fetch_result().await,
                Ok(Ok(false)) => {}
                Ok(Err(e)) => warn!(error = %e, "Failed to check diagram job status."),
                Err(_) => {
                    warn!("Diagram job status check was still pending at the deadline.");
                    return MonitorOutcome::TimedOut;
                }
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(waited = ?self.settings.max_wait, "Diagram job did not finish in time.");
                return MonitorOutcome::TimedOut;
            }
            tokio::time::sleep_until((now + self.settings.poll_interval).min(deadline)).await;
        }
    }

    async fn fetch_result(&self) -> MonitorOutcome {
        let timeout = self.settings.result_timeout;
        match tokio::time::timeout(timeout, self.jobs.result(&self.task, timeout)).await {
            Ok(Ok(DiagramResult::Success(url))) => {
                info!(%url, "Diagram ready.");
                MonitorOutcome::Resolved(url)
            }
            Ok(Ok(DiagramResult::Error(data))) => {
                warn!(error = %data, "Diagram job failed.");
                MonitorOutcome::Failed(data)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to fetch diagram result.");
                MonitorOutcome::Failed(e.to_string())
            }
            Err(_) => {
                warn!(?timeout, "Fetching the diagram result took too long.");
                MonitorOutcome::Failed("Timed out fetching the diagram result".to_string())
            }
        }
    }

    async fn notify(&self, outcome: &MonitorOutcome) {
        let (message, result) = match outcome {
            MonitorOutcome::Resolved(url) => (
                ServerMessage::DiagramReady { url: url.clone() },
                ToolResult::ok_with_message("Diagram generation successful."),
            ),
            MonitorOutcome::Failed(error) => (
                ServerMessage::DiagramFailed {
                    error: error.clone(),
                },
                ToolResult::rejected("Diagram generation failed.").with_details(error.clone()),
            ),
            MonitorOutcome::TimedOut => (
                ServerMessage::DiagramFailed {
                    error: "Diagram generation timed out".to_string(),
                },
                ToolResult::rejected("Diagram generation timed out."),
            ),
            MonitorOutcome::Cancelled => return,
        };
        self.peers.notify_client(&message).await;
        self.peers.respond(&self.call, &result).await;
    }
}
