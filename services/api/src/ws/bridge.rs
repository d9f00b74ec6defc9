//! Relays a voicebot session between the client and the realtime provider.
//!
//! After the provider handshake, two loops run side by side: one forwards
//! client audio to the provider, the other fans provider events out to the
//! client and the tool router. Whichever loop finishes first ends the
//! session; the other is dropped, pending diagram monitors are cancelled and
//! both sockets are closed.

use super::{
    delivery::{RetryPolicy, send_json, send_text},
    monitor::MonitorSettings,
    peers::Peers,
    protocol::{ServerMessage, VoicebotClientMessage},
    tool_router::ToolCallRouter,
    transport::{Incoming, IncomingStream},
};
use explainer_core::{
    diagram::{DiagramState, JobQueue},
    generic_types::InboundEvent,
};
use futures_util::StreamExt;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

const SETUP_ACK_TIMEOUT: Duration = Duration::from_secs(10);
const INTERRUPT_INITIAL_DELAY: Duration = Duration::from_millis(200);

/// Why a bridged session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEnd {
    /// The client sent `exit_voicebot`.
    ClientExited,
    ClientDisconnected,
    ProviderClosed,
    /// The provider never accepted the session setup.
    HandshakeFailed(String),
}

pub struct SessionBridge {
    peers: Peers,
    router: ToolCallRouter,
    cancel: CancellationToken,
}

impl SessionBridge {
    pub fn new(peers: Peers, jobs: Arc<dyn JobQueue>) -> Self {
        let cancel = CancellationToken::new();
        let router = ToolCallRouter::new(peers.clone(), jobs, DiagramState::shared(), cancel.clone());
        Self {
            peers,
            router,
            cancel,
        }
    }

    pub fn with_monitor_settings(mut self, settings: MonitorSettings) -> Self {
        self.router = self.router.with_monitor_settings(settings);
        self
    }

    /// Runs the session to completion and tears it down.
    #[instrument(name = "voicebot_bridge", skip_all)]
    pub async fn run(
        self,
        client_rx: IncomingStream,
        mut provider_rx: IncomingStream,
        instructions: &str,
    ) -> BridgeEnd {
        let end = match self.handshake(&mut provider_rx, instructions).await {
            Ok(()) => {
                info!("Voicebot session started.");
                tokio::select! {
                    end = self.pump_client(client_rx) => end,
                    end = self.pump_provider(provider_rx) => end,
                }
            }
            Err(reason) => {
                error!(%reason, "Provider handshake failed.");
                self.peers
                    .notify_client(&ServerMessage::error("Could not start the voice session."))
                    .await;
                BridgeEnd::HandshakeFailed(reason)
            }
        };

        info!(?end, "Voicebot session ending.");
        self.teardown().await;
        end
    }

    async fn handshake(&self, provider_rx: &mut IncomingStream, instructions: &str) -> Result<(), String> {
        let setup = self.peers.adapter.session_config(instructions);
        if !send_json(self.peers.provider.as_ref(), &setup, RetryPolicy::default()).await {
            return Err("session setup could not be sent".to_string());
        }
        if !self.peers.adapter.expects_setup_ack() {
            return Ok(());
        }

        match tokio::time::timeout(SETUP_ACK_TIMEOUT, provider_rx.next()).await {
            Ok(Some(Ok(Incoming::Text(_) | Incoming::Binary(_)))) => {
                debug!("Provider acknowledged session setup.");
                Ok(())
            }
            Ok(Some(Ok(Incoming::Close))) | Ok(None) => Err("provider closed during setup".to_string()),
            Ok(Some(Err(e))) => Err(e.to_string()),
            Err(_) => Err("timed out waiting for setup acknowledgement".to_string()),
        }
    }

    async fn pump_client(&self, mut client_rx: IncomingStream) -> BridgeEnd {
        while let Some(frame) = client_rx.next().await {
            let text = match frame {
                Ok(Incoming::Text(text)) => text,
                Ok(Incoming::Binary(_)) => {
                    warn!("Ignoring binary frame from client.");
                    continue;
                }
                Ok(Incoming::Close) => break,
                Err(e) => {
                    warn!(error = %e, "Client socket failed.");
                    break;
                }
            };

            match serde_json::from_str::<VoicebotClientMessage>(&text) {
                Ok(VoicebotClientMessage::ExitVoicebot) => return BridgeEnd::ClientExited,
                Ok(VoicebotClientMessage::AudioChunk { chunk }) => {
                    match self.peers.adapter.encode_audio_chunk(&chunk) {
                        Ok(frame) => {
                            send_json(self.peers.provider.as_ref(), &frame, RetryPolicy::default()).await;
                        }
                        Err(e) => warn!(error = %e, "Dropping audio chunk."),
                    }
                }
                Ok(VoicebotClientMessage::Unrecognized) => {
                    debug!(message = %text, "Ignoring unrecognized client message.");
                }
                Err(e) => warn!(error = %e, "Malformed client message."),
            }
        }
        BridgeEnd::ClientDisconnected
    }

    async fn pump_provider(&self, mut provider_rx: IncomingStream) -> BridgeEnd {
        while let Some(frame) = provider_rx.next().await {
            let text = match frame {
                Ok(Incoming::Text(text)) => text,
                Ok(Incoming::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Provider sent a non UTF-8 binary frame.");
                        continue;
                    }
                },
                Ok(Incoming::Close) => break,
                Err(e) => {
                    warn!(error = %e, "Provider socket failed.");
                    break;
                }
            };

            match self.peers.adapter.decode_inbound(&text) {
                Ok(events) => {
                    for event in events {
                        self.dispatch(event).await;
                    }
                }
                Err(e) => warn!(error = %e, "Malformed provider frame."),
            }
        }
        BridgeEnd::ProviderClosed
    }

    async fn dispatch(&self, event: InboundEvent) {
        match event {
            InboundEvent::AudioDelta(delta) => {
                self.peers.notify_client(&ServerMessage::AudioDelta { delta }).await;
            }
            InboundEvent::SpeechStarted => {
                self.peers
                    .notify_client_with(
                        &ServerMessage::InterruptPlayback,
                        RetryPolicy::with_initial_delay(INTERRUPT_INITIAL_DELAY),
                    )
                    .await;
            }
            InboundEvent::ToolCall(call) => {
                let outcome = self.router.route(call).await;
                debug!(?outcome, "Tool call routed.");
            }
            InboundEvent::TurnComplete => {
                self.peers.notify_client(&ServerMessage::TurnComplete).await;
            }
            InboundEvent::Unrecognized(raw) => {
                send_text(self.peers.client.as_ref(), raw, RetryPolicy::default()).await;
            }
        }
    }

    async fn teardown(&self) {
        self.cancel.cancel();
        let monitors = self.router.monitors();
        monitors.close();
        monitors.wait().await;

        self.peers.notify_client(&ServerMessage::voicebot_exit()).await;
        self.peers.provider.close().await;
        self.peers.client.close().await;
        info!("Voicebot session closed.");
    }
}
