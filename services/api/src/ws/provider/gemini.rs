//! Wire protocol of the Gemini Live (BidiGenerateContent) API.

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
use serde_json::{Value, json};
use tokio_tungstenite::connect_async;

const GEMINI_MODEL: &str = "models/gemini-2.0-flash-live-001";

// --- Local Gemini Realtime Types (for encapsulation) ---
mod gemini_realtime_types {
    use serde::{Deserialize, Serialize};
    use serde_json::{Map, Value};

    #[derive(Serialize)]
    pub(super) enum ClientMessage<'a> {
        #[serde(rename = "setup")]
        Setup(BidiGenerateContentSetup<'a>),
        #[serde(rename = "realtime_input")]
        RealtimeInput(RealtimeInput),
        #[serde(rename = "tool_response")]
        ToolResponse(ToolResponse<'a>),
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct BidiGenerateContentSetup<'a> {
        pub model: &'static str,
        pub generation_config: GenerationConfig,
        pub system_instruction: Content<'a>,
        pub tools: Vec<Tool>,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerationConfig {
        pub response_modalities: Vec<ResponseModality>,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "UPPERCASE")]
    pub(super) enum ResponseModality {
        Audio,
    }
    #[derive(Serialize)]
    pub(super) struct Content<'a> {
        pub parts: Vec<Part<'a>>,
    }
    #[derive(Serialize)]
    pub(super) struct Part<'a> {
        pub text: &'a str,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Tool {
        pub function_declarations: Vec<FunctionDeclaration>,
    }
    #[derive(Serialize)]
    pub(super) struct FunctionDeclaration {
        pub name: &'static str,
        pub description: &'static str,
        pub parameters: Value,
    }
    #[derive(Serialize)]
    pub(super) struct RealtimeInput {
        pub media_chunks: Vec<Blob>,
    }
    #[derive(Serialize)]
    pub(super) struct Blob {
        pub data: String,
        pub mime_type: &'static str,
    }
    #[derive(Serialize)]
    pub(super) struct ToolResponse<'a> {
        pub function_responses: Vec<FunctionResponse<'a>>,
    }
    #[derive(Serialize)]
    pub(super) struct FunctionResponse<'a> {
        pub id: &'a str,
        pub name: &'a str,
        pub response: FunctionResult,
    }
    #[derive(Serialize)]
    pub(super) struct FunctionResult {
        pub result: Value,
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ServerMessage {
        pub server_content: Option<LiveServerContent>,
        pub tool_call: Option<LiveToolCall>,
    }
    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct LiveServerContent {
        pub model_turn: Option<ServerContentTurn>,
        pub turn_complete: Option<bool>,
    }
    #[derive(Deserialize, Debug)]
    pub(super) struct ServerContentTurn {
        #[serde(default)]
        pub parts: Vec<ServerPart>,
    }
    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ServerPart {
        pub inline_data: Option<ServerBlob>,
    }
    #[derive(Deserialize, Debug)]
    pub(super) struct ServerBlob {
        pub data: String,
    }
    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct LiveToolCall {
        #[serde(default)]
        pub function_calls: Vec<LiveFunctionCall>,
    }
    #[derive(Deserialize, Debug)]
    pub(super) struct LiveFunctionCall {
        #[serde(default)]
        pub id: String,
        #[serde(default)]
        pub name: String,
        #[serde(default)]
        pub args: Option<Map<String, Value>>,
    }
}

use gemini_realtime_types::{
    BidiGenerateContentSetup, Blob, ClientMessage, Content, FunctionDeclaration, FunctionResponse,
    FunctionResult, GenerationConfig, Part, RealtimeInput, ResponseModality, ServerMessage, Tool,
    ToolResponse,
};

/// Adapter for the Gemini Live API.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiAdapter;

impl GeminiAdapter {
    fn tools() -> Vec<Tool> {
        vec![Tool {
            function_declarations: vec![
                FunctionDeclaration {
                    name: "show_on_board",
                    description: SHOW_ON_BOARD_DESCRIPTION,
                    parameters: json!({
                        "type": "OBJECT",
                        "properties": {"content": {"type": "STRING"}},
                        "required": ["content"]
                    }),
                },
                FunctionDeclaration {
                    name: "generate_diagram",
                    description: GENERATE_DIAGRAM_DESCRIPTION,
                    parameters: json!({
                        "type": "OBJECT",
                        "properties": {"prompt": {"type": "STRING"}},
                        "required": ["prompt"]
                    }),
                },
            ],
        }]
    }
}

impl RealtimeAdapter for GeminiAdapter {
    fn session_config(&self, instructions: &str) -> Value {
        frame(&ClientMessage::Setup(BidiGenerateContentSetup {
            model: GEMINI_MODEL,
            generation_config: GenerationConfig {
                response_modalities: vec![ResponseModality::Audio],
            },
            system_instruction: Content {
                parts: vec![Part { text: instructions }],
            },
            tools: Self::tools(),
        }))
    }

    fn expects_setup_ack(&self) -> bool {
        true
    }

    fn encode_audio_chunk(&self, hex_chunk: &str) -> Result<Value, AudioChunkError> {
        Ok(frame(&ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![Blob {
                data: hex_to_base64(hex_chunk)?,
                mime_type: "audio/pcm",
            }],
        })))
    }

    fn decode_inbound(&self, text: &str) -> Result<Vec<InboundEvent>, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        let Ok(message) = serde_json::from_value::<ServerMessage>(value) else {
            return Ok(vec![InboundEvent::Unrecognized(text.to_string())]);
        };

        let mut events = Vec::new();
        if let Some(content) = message.server_content {
            let audio = content
                .model_turn
                .into_iter()
                .flat_map(|turn| turn.parts)
                .filter_map(|part| part.inline_data)
                .map(|blob| InboundEvent::AudioDelta(blob.data));
            events.extend(audio);
            if content.turn_complete == Some(true) {
                events.push(InboundEvent::TurnComplete);
            }
        }
        if let Some(tool_call) = message.tool_call {
            events.extend(tool_call.function_calls.into_iter().map(|call| {
                InboundEvent::ToolCall(ToolCall::new(
                    call.name,
                    call.id,
                    call.args.unwrap_or_default(),
                ))
            }));
        }

        if events.is_empty() {
            events.push(InboundEvent::Unrecognized(text.to_string()));
        }
        Ok(events)
    }

    fn encode_tool_response(&self, call: &ToolCall, result: &ToolResult) -> Vec<Value> {
        vec![frame(&ClientMessage::ToolResponse(ToolResponse {
            function_responses: vec![FunctionResponse {
                id: &call.call_id,
                name: &call.name,
                response: FunctionResult {
                    result: result.to_value(),
                },
            }],
        }))]
    }
}

/// Connects to the Gemini Live websocket. The API key travels in the query string.
pub async fn connect(config: &Config) -> Result<ProviderStream> {
    let api_key = config
        .gemini_api_key
        .as_ref()
        .context("Gemini API key not found")?;
    let url = format!("{}?key={}", config.gemini_ws_url, api_key);

    let (ws_stream, _) = connect_async(url)
        .await
        .context("Failed to connect to Gemini Live WebSocket")?;
    Ok(ws_stream)
}
