//! Dispatches provider tool calls to their handlers.

use super::{
    monitor::{DiagramMonitor, MonitorSettings},
    peers::Peers,
    protocol::ServerMessage,
};
use explainer_core::{
    diagram::{DiagramTask, JobQueue, SharedDiagramState},
    tool_call::{ToolCall, ToolName, ToolResult},
};
use std::sync::Arc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info, instrument, warn};

/// What the router did with a tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The snippet reached the client.
    Shown,
    /// The snippet could not be delivered to the client.
    ShowFailed,
    /// A diagram job was queued and is being monitored.
    DiagramStarted(DiagramTask),
    /// Another diagram is still in progress.
    DiagramBusy,
    /// The call had no usable `prompt`.
    DiagramInvalid,
    /// The job queue refused the request.
    DiagramFailed(String),
    /// No handler for this tool name.
    Unknown(String),
}

/// Owns the tool handlers of one session and the diagram monitors they spawn.
pub struct ToolCallRouter {
    peers: Peers,
    jobs: Arc<dyn JobQueue>,
    diagram: SharedDiagramState,
    monitors: TaskTracker,
    cancel: CancellationToken,
    settings: MonitorSettings,
}

impl ToolCallRouter {
    pub fn new(
        peers: Peers,
        jobs: Arc<dyn JobQueue>,
        diagram: SharedDiagramState,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            peers,
            jobs,
            diagram,
            monitors: TaskTracker::new(),
            cancel,
            settings: MonitorSettings::default(),
        }
    }

    pub fn with_monitor_settings(mut self, settings: MonitorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The tracker of spawned diagram monitors.
    pub fn monitors(&self) -> &TaskTracker {
        &self.monitors
    }

    /// Handles one call. Every call gets exactly one immediate response; a
    /// started diagram gets a second one from its monitor.
    #[instrument(skip_all, fields(function = %call.name, call_id = %call.call_id))]
    pub async fn route(&self, call: ToolCall) -> RouteOutcome {
        match call.tool() {
            ToolName::ShowOnBoard => self.show_on_board(&call).await,
            ToolName::GenerateDiagram => self.generate_diagram(call).await,
            ToolName::Unknown(name) => {
                warn!("Provider called an unknown function.");
                self.peers
                    .respond(&call, &ToolResult::failed(format!("Unknown function: {name}")))
                    .await;
                RouteOutcome::Unknown(name)
            }
        }
    }

    async fn show_on_board(&self, call: &ToolCall) -> RouteOutcome {
        let shown = self
            .peers
            .try_notify_client(&ServerMessage::FunctionCall {
                function: call.name.clone(),
                args: call.args_json(),
            })
            .await;

        match shown {
            Ok(()) => {
                self.peers.respond(call, &ToolResult::ok()).await;
                RouteOutcome::Shown
            }
            Err(e) => {
                warn!(error = %e, "Could not show snippet on the board.");
                self.peers
                    .respond(
                        call,
                        &ToolResult::rejected(format!("There was an error showing the snippet: {e}")),
                    )
                    .await;
                RouteOutcome::ShowFailed
            }
        }
    }

    async fn generate_diagram(&self, call: ToolCall) -> RouteOutcome {
        let Some(prompt) = call.str_arg("prompt").map(str::to_string) else {
            warn!("generate_diagram called without a prompt.");
            self.peers
                .respond(&call, &ToolResult::failed("Missing required argument: prompt"))
                .await;
            return RouteOutcome::DiagramInvalid;
        };

        // The lock is held across the enqueue so two calls cannot both start a job.
        let mut state = self.diagram.lock().await;
        if state.is_in_progress() {
            drop(state);
            info!("Diagram already in progress; rejecting.");
            self.peers
                .respond(&call, &ToolResult::rejected("Already generating a diagram. Please wait."))
                .await;
            return RouteOutcome::DiagramBusy;
        }

        let task = match self.jobs.enqueue(&prompt).await {
            Ok(task) => task,
            Err(e) => {
                state.reset();
                drop(state);
                error!(error = %e, "Failed to enqueue diagram job.");
                let reason = e.to_string();
                self.peers
                    .respond(&call, &ToolResult::failed(format!("Failed to generate diagram: {reason}")))
                    .await;
                self.peers
                    .notify_client(&ServerMessage::DiagramFailed {
                        error: reason.clone(),
                    })
                    .await;
                return RouteOutcome::DiagramFailed(reason);
            }
        };
        state.begin(&task);
        drop(state);
        info!(task_id = %task.task_id, "Diagram job queued.");

        self.peers.notify_client(&ServerMessage::DiagramInitiated).await;
        self.peers
            .respond(&call, &ToolResult::ok_with_message("Diagram generation has started."))
            .await;

        let monitor = DiagramMonitor {
            peers: self.peers.clone(),
            jobs: self.jobs.clone(),
            diagram: self.diagram.clone(),
            call,
            task: task.clone(),
            settings: self.settings,
        };
        self.monitors.spawn(monitor.run(self.cancel.child_token()));

        RouteOutcome::DiagramStarted(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::{
        delivery::SendError,
        testing::{FakeTransport, fake_peers},
    };
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use explainer_core::diagram::{DiagramResult, DiagramState};
    use mockall::mock;
    use serde_json::{Map, Value, json};
    use std::time::Duration;

    mock! {
        pub Queue {}
        #[async_trait]
        impl JobQueue for Queue {
            async fn enqueue(&self, prompt: &str) -> Result<DiagramTask>;
            async fn is_ready(&self, task: &DiagramTask) -> Result<bool>;
            async fn result(&self, task: &DiagramTask, timeout: Duration) -> Result<DiagramResult>;
        }
    }

    fn call(name: &str, args: Value) -> ToolCall {
        let Value::Object(args) = args else {
            panic!("args must be an object");
        };
        ToolCall::new(name, "call-1", args)
    }

    /// The result objects reported to the provider, in order.
    fn tool_outputs(provider: &FakeTransport) -> Vec<Value> {
        provider
            .sent_json()
            .iter()
            .filter(|frame| frame["type"] == "conversation.item.create")
            .map(|frame| serde_json::from_str(frame["item"]["output"].as_str().unwrap()).unwrap())
            .collect()
    }

    fn router(queue: MockQueue) -> (ToolCallRouter, Arc<FakeTransport>, Arc<FakeTransport>, SharedDiagramState) {
        let (peers, client, provider) = fake_peers();
        let diagram = DiagramState::shared();
        let router = ToolCallRouter::new(peers, Arc::new(queue), diagram.clone(), CancellationToken::new());
        (router, client, provider, diagram)
    }

    #[tokio::test]
    async fn test_show_on_board_forwards_to_client() {
        let (router, client, provider, _) = router(MockQueue::new());

        let outcome = router.route(call("show_on_board", json!({"content": "a^2 + b^2"}))).await;

        assert_eq!(outcome, RouteOutcome::Shown);
        assert_eq!(
            client.sent_json(),
            vec![json!({"type": "FUNCTION_CALL", "function": "show_on_board", "args": "{\"content\":\"a^2 + b^2\"}"})]
        );
        assert_eq!(tool_outputs(&provider), vec![json!({"success": true})]);
    }

    #[tokio::test]
    async fn test_show_on_board_with_client_send_failing() {
        let (router, client, provider, _) = router(MockQueue::new());
        client.fail_next(vec![SendError::Closed("connection reset".into())]);

        let outcome = router.route(call("show_on_board", json!({"content": "x"}))).await;

        assert_eq!(outcome, RouteOutcome::ShowFailed);
        let outputs = tool_outputs(&provider);
        assert_eq!(outputs.len(), 1);
        assert_eq!(
            outputs[0],
            json!({
                "success": false,
                "message": "There was an error showing the snippet: socket closed: connection reset"
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_function() {
        let (router, client, provider, _) = router(MockQueue::new());

        let outcome = router.route(call("launch_rocket", json!({}))).await;

        assert_eq!(outcome, RouteOutcome::Unknown("launch_rocket".into()));
        assert!(client.sent().is_empty());
        assert_eq!(
            tool_outputs(&provider),
            vec![json!({"success": false, "error": "Unknown function: launch_rocket"})]
        );
    }

    #[tokio::test]
    async fn test_generate_diagram_starts_job_and_monitor() {
        let mut queue = MockQueue::new();
        queue
            .expect_enqueue()
            .withf(|prompt| prompt == "a right triangle")
            .times(1)
            .returning(|_| Ok(DiagramTask::new("t-1")));
        queue.expect_is_ready().returning(|_| Ok(true));
        queue
            .expect_result()
            .returning(|_, _| Ok(DiagramResult::Success("https://cdn/t-1.png".into())));
        let (router, client, provider, diagram) = router(queue);

        let outcome = router
            .route(call("generate_diagram", json!({"prompt": "a right triangle"})))
            .await;
        assert_eq!(outcome, RouteOutcome::DiagramStarted(DiagramTask::new("t-1")));

        router.monitors().close();
        router.monitors().wait().await;

        assert_eq!(
            client.sent_types(),
            vec!["DIAGRAM_INITIATED", "DIAGRAM_READY"]
        );
        assert_eq!(
            tool_outputs(&provider),
            vec![
                json!({"success": true, "message": "Diagram generation has started."}),
                json!({"success": true, "message": "Diagram generation successful."}),
            ]
        );
        assert!(!diagram.lock().await.is_in_progress());
    }

    #[tokio::test]
    async fn test_generate_diagram_rejected_while_busy() {
        let mut queue = MockQueue::new();
        queue.expect_enqueue().times(0);
        let (router, client, provider, diagram) = router(queue);
        diagram.lock().await.begin(&DiagramTask::new("running"));

        let outcome = router.route(call("generate_diagram", json!({"prompt": "x"}))).await;

        assert_eq!(outcome, RouteOutcome::DiagramBusy);
        assert!(client.sent().is_empty());
        assert_eq!(
            tool_outputs(&provider),
            vec![json!({"success": false, "message": "Already generating a diagram. Please wait."})]
        );
        assert_eq!(diagram.lock().await.task_id(), Some("running"));
    }

    #[tokio::test]
    async fn test_generate_diagram_enqueue_failure() {
        let mut queue = MockQueue::new();
        queue
            .expect_enqueue()
            .times(1)
            .returning(|_| Err(anyhow!("queue offline")));
        let (router, client, provider, diagram) = router(queue);

        let outcome = router.route(call("generate_diagram", json!({"prompt": "x"}))).await;

        assert_eq!(outcome, RouteOutcome::DiagramFailed("queue offline".into()));
        assert!(!diagram.lock().await.is_in_progress());
        assert_eq!(
            client.sent_json(),
            vec![json!({"type": "DIAGRAM_FAILED", "error": "queue offline"})]
        );
        assert_eq!(
            tool_outputs(&provider),
            vec![json!({"success": false, "error": "Failed to generate diagram: queue offline"})]
        );
    }

    #[tokio::test]
    async fn test_generate_diagram_without_prompt() {
        let mut queue = MockQueue::new();
        queue.expect_enqueue().times(0);
        let (router, _, provider, _) = router(queue);

        let outcome = router.route(ToolCall::new("generate_diagram", "call-1", Map::new())).await;

        assert_eq!(outcome, RouteOutcome::DiagramInvalid);
        assert_eq!(tool_outputs(&provider)[0]["success"], false);
    }
}
