//! Wire protocol of the OpenAI Realtime API.

use super::{
    AudioChunkError, GENERATE_DIAGRAM_DESCRIPTION, RealtimeAdapter, SHOW_ON_BOARD_DESCRIPTION,
    frame, hex_to_base64,
};
use crate::{config::Config, ws::transport::ProviderStream};
use anyhow::{Context, Result};
use explainer_core::{
    generic_types::InboundEvent,
    tool_call::{ToolCall, ToolResult},
};
use serde_json::{Map, Value, json};
use tokio_tungstenite::{connect_async, tungstenite::client::IntoClientRequest};
use tracing::warn;

// --- OpenAI Realtime wire types ---
mod openai_realtime_types {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    #[derive(Serialize)]
    #[serde(tag = "type")]
    pub(super) enum ClientEvent<'a> {
        #[serde(rename = "session.update")]
        SessionUpdate { session: Session<'a> },
        #[serde(rename = "input_audio_buffer.append")]
        InputAudioBufferAppend { audio: String },
        #[serde(rename = "conversation.item.create")]
        ConversationItemCreate { item: FunctionCallOutput<'a> },
        #[serde(rename = "response.create")]
        ResponseCreate,
    }

    #[derive(Serialize)]
    pub(super) struct Session<'a> {
        pub modalities: [&'static str; 2],
        pub instructions: &'a str,
        pub voice: &'static str,
        pub input_audio_format: &'static str,
        pub output_audio_format: &'static str,
        pub input_audio_transcription: AudioTranscription,
        pub turn_detection: TurnDetection,
        pub tools: Vec<FunctionTool>,
        pub tool_choice: &'static str,
    }

    #[derive(Serialize)]
    pub(super) struct AudioTranscription {
        pub model: &'static str,
    }

    #[derive(Serialize)]
    pub(super) struct TurnDetection {
        #[serde(rename = "type")]
        pub kind: &'static str,
        pub threshold: f32,
        pub prefix_padding_ms: u32,
        pub silence_duration_ms: u32,
    }

    #[derive(Serialize)]
    pub(super) struct FunctionTool {
        #[serde(rename = "type")]
        pub kind: &'static str,
        pub name: &'static str,
        pub description: &'static str,
        pub parameters: Value,
    }

    #[derive(Serialize)]
    pub(super) struct FunctionCallOutput<'a> {
        #[serde(rename = "type")]
        pub kind: &'static str,
        pub call_id: &'a str,
        /// The result object, JSON encoded as a string.
        pub output: String,
    }

    #[derive(Deserialize, Debug)]
    #[serde(tag = "type")]
    pub(super) enum ServerEvent {
        #[serde(rename = "input_audio_buffer.speech_started")]
        SpeechStarted,
        #[serde(rename = "response.function_call_arguments.done")]
        FunctionCallArgumentsDone {
            #[serde(default)]
            name: String,
            #[serde(default)]
            call_id: String,
            #[serde(default)]
            arguments: String,
        },
        #[serde(other)]
        Other,
    }
}

use openai_realtime_types::{
    AudioTranscription, ClientEvent, FunctionCallOutput, FunctionTool, ServerEvent, Session,
    TurnDetection,
};

/// Adapter for the OpenAI Realtime API.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

impl OpenAiAdapter {
    fn tools() -> Vec<FunctionTool> {
        vec![
            FunctionTool {
                kind: "function",
                name: "show_on_board",
                description: SHOW_ON_BOARD_DESCRIPTION,
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "content": {"type": "string", "description": "What to show on the board."}
                    },
                    "required": ["content"]
                }),
            },
            FunctionTool {
                kind: "function",
                name: "generate_diagram",
                description: GENERATE_DIAGRAM_DESCRIPTION,
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "prompt": {"type": "string", "description": "A precise description of the diagram."}
                    },
                    "required": ["prompt"]
                }),
            },
        ]
    }
}

impl RealtimeAdapter for OpenAiAdapter {
    fn session_config(&self, instructions: &str) -> Value {
        frame(&ClientEvent::SessionUpdate {
            session: Session {
                modalities: ["text", "audio"],
                instructions,
                voice: "alloy",
                input_audio_format: "pcm16",
                output_audio_format: "pcm16",
                input_audio_transcription: AudioTranscription { model: "whisper-1" },
                turn_detection: TurnDetection {
                    kind: "server_vad",
                    threshold: 0.5,
                    prefix_padding_ms: 300,
                    silence_duration_ms: 500,
                },
                tools: Self::tools(),
                tool_choice: "auto",
            },
        })
    }

    fn expects_setup_ack(&self) -> bool {
        false
    }

    fn encode_audio_chunk(&self, hex_chunk: &str) -> Result<Value, AudioChunkError> {
        Ok(frame(&ClientEvent::InputAudioBufferAppend {
            audio: hex_to_base64(hex_chunk)?,
        }))
    }

    fn decode_inbound(&self, text: &str) -> Result<Vec<InboundEvent>, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        let event = match serde_json::from_value::<ServerEvent>(value) {
            Ok(event) => event,
            // No `type`, or a known type with an unexpected shape.
            Err(_) => return Ok(vec![InboundEvent::Unrecognized(text.to_string())]),
        };

        Ok(match event {
            ServerEvent::SpeechStarted => vec![InboundEvent::SpeechStarted],
            ServerEvent::FunctionCallArgumentsDone {
                name,
                call_id,
                arguments,
            } => {
                let args = match serde_json::from_str::<Map<String, Value>>(&arguments) {
                    Ok(args) => args,
                    Err(e) => {
                        warn!(function = %name, error = %e, "Function call arguments are not a JSON object.");
                        Map::new()
                    }
                };
                vec![InboundEvent::ToolCall(ToolCall::new(name, call_id, args))]
            }
            ServerEvent::Other => vec![InboundEvent::Unrecognized(text.to_string())],
        })
    }

    fn encode_tool_response(&self, call: &ToolCall, result: &ToolResult) -> Vec<Value> {
        vec![
            frame(&ClientEvent::ConversationItemCreate {
                item: FunctionCallOutput {
                    kind: "function_call_output",
                    call_id: &call.call_id,
                    output: result.to_value().to_string(),
                },
            }),
            frame(&ClientEvent::ResponseCreate),
        ]
    }
}

/// Connects to the OpenAI Realtime websocket.
pub async fn connect(config: &Config) -> Result<ProviderStream> {
    let api_key = config
        .openai_api_key
        .as_ref()
        .context("OpenAI API key not found")?;

    let mut request = config.openai_ws_url.as_str().into_client_request()?;
    request
        .headers_mut()
        .insert("Authorization", format!("Bearer {}", api_key).parse()?);
    request
        .headers_mut()
        .insert("OpenAI-Beta", "realtime=v1".parse()?);

    let (ws_stream, _) = connect_async(request)
        .await
        .context("Failed to connect to OpenAI Realtime WebSocket")?;
    Ok(ws_stream)
}
