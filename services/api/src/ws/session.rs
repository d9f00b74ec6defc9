//! Manages the lesson WebSocket connection lifecycle.

use super::{
    bridge::SessionBridge,
    delivery::{RetryPolicy, Transport, send_json},
    lesson::{LessonDriver, LessonEnd},
    peers::Peers,
    protocol::ServerMessage,
    provider,
    transport::{ClientSocket, IncomingStream, ProviderSocket},
};
use crate::state::AppState;
use axum::{
    extract::{
        Path, State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(concept_id): Path<i64>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, concept_id))
}

/// Main handler for an individual WebSocket connection.
///
/// Loads the requested lesson, serves narration requests and, when asked,
/// hands the socket over to a voicebot bridge. The connection ends with
/// the lesson or with the bridge.
#[instrument(name = "ws_session", skip_all, fields(session_id, concept_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, concept_id: i64) {
    let session_id = Uuid::new_v4();
    let span = tracing::Span::current();
    span.record("session_id", tracing::field::display(session_id));
    span.record("concept_id", concept_id);
    info!("New WebSocket connection.");

    let (client, client_rx) = ClientSocket::split(socket);

    let lesson = match state.lessons.load(concept_id).await {
        Ok(Some(lesson)) => lesson,
        Ok(None) => {
            warn!("Lesson not found.");
            fail(client.as_ref(), format!("Lesson {concept_id} not found")).await;
            return;
        }
        Err(e) => {
            error!("Failed to load lesson: {:?}", e);
            fail(client.as_ref(), "Failed to load the lesson").await;
            return;
        }
    };

    let driver = LessonDriver::new(
        lesson,
        client.clone(),
        state.speech.clone(),
        state.voice_prompt.clone(),
    );
    match driver.run(client_rx).await {
        LessonEnd::ClientLeft => client.close().await,
        LessonEnd::Voicebot {
            instructions,
            client_rx,
        } => run_voicebot(&state, client, client_rx, &instructions).await,
    }
    info!("WebSocket connection closed.");
}

async fn run_voicebot(
    state: &AppState,
    client: Arc<ClientSocket>,
    client_rx: IncomingStream,
    instructions: &str,
) {
    let kind = &state.config.provider;
    let stream = match provider::connect(kind, &state.config).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to connect to realtime provider: {:?}", e);
            send_json(
                client.as_ref(),
                &ServerMessage::error("Could not connect to the voice provider."),
                RetryPolicy::default(),
            )
            .await;
            send_json(client.as_ref(), &ServerMessage::voicebot_exit(), RetryPolicy::default()).await;
            client.close().await;
            return;
        }
    };

    let (provider_socket, provider_rx) = ProviderSocket::split(stream);
    let peers = Peers {
        client,
        provider: provider_socket,
        adapter: provider::adapter_for(kind),
    };
    let end = SessionBridge::new(peers, state.jobs.clone())
        .run(client_rx, provider_rx, instructions)
        .await;
    info!(?end, "Voicebot finished.");
}

async fn fail(client: &dyn Transport, message: impl Into<String>) {
    send_json(client, &ServerMessage::error(message), RetryPolicy::default()).await;
    client.close().await;
}
