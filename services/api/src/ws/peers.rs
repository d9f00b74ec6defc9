//! The two ends of a bridged session, as seen by the code that talks to both.

use super::{
    delivery::{DeliveryError, RetryPolicy, Transport, deliver_json, send_json},
    protocol::ServerMessage,
    provider::RealtimeAdapter,
};
use explainer_core::tool_call::{ToolCall, ToolResult};
use std::sync::Arc;
use tracing::warn;

/// The client socket, the provider socket and the adapter that speaks the
/// provider's dialect.
#[derive(Clone)]
pub struct Peers {
    pub client: Arc<dyn Transport>,
    pub provider: Arc<dyn Transport>,
    pub adapter: Arc<dyn RealtimeAdapter>,
}

impl Peers {
    pub async fn notify_client(&self, msg: &ServerMessage) -> bool {
        self.notify_client_with(msg, RetryPolicy::default()).await
    }

    /// Delivers `msg` to the client, keeping the reason if it fails.
    pub async fn try_notify_client(&self, msg: &ServerMessage) -> Result<(), DeliveryError> {
        deliver_json(self.client.as_ref(), msg, RetryPolicy::default()).await
    }

    pub async fn notify_client_with(&self, msg: &ServerMessage, policy: RetryPolicy) -> bool {
        send_json(self.client.as_ref(), msg, policy).await
    }

    /// Reports the result of a tool call back to the provider.
    pub async fn respond(&self, call: &ToolCall, result: &ToolResult) -> bool {
        let mut delivered = true;
        for frame in self.adapter.encode_tool_response(call, result) {
            if !send_json(self.provider.as_ref(), &frame, RetryPolicy::default()).await {
                warn!(function = %call.name, call_id = %call.call_id, "Tool response was not delivered.");
                delivered = false;
                break;
            }
        }
        delivered
    }
}
