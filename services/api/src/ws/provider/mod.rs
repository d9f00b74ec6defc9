//! Translates between the bridge and a specific real-time voice provider.
//!
//! Each provider speaks its own JSON dialect for session setup, audio frames
//! and tool calls. A [`RealtimeAdapter`] maps that dialect onto the bridge's
//! provider-independent vocabulary ([`InboundEvent`], [`ToolCall`],
//! [`ToolResult`]); everything else in the websocket layer is provider-agnostic.

pub mod gemini;
pub mod openai;

use super::transport::ProviderStream;
use crate::config::{Config, Provider};
use anyhow::Result;
use base64::Engine;
use explainer_core::{
    generic_types::InboundEvent,
    tool_call::{ToolCall, ToolResult},
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

/// Client audio that could not be turned into a provider frame.
#[derive(Debug, thiserror::Error)]
pub enum AudioChunkError {
    #[error("audio chunk is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// The provider-specific half of a bridged session.
pub trait RealtimeAdapter: Send + Sync {
    /// The setup message carrying the system prompt, sent first on connect.
    fn session_config(&self, instructions: &str) -> Value;

    /// Whether the provider answers the setup message before streaming starts.
    fn expects_setup_ack(&self) -> bool;

    /// Wraps one hex-encoded chunk of client audio for the provider.
    fn encode_audio_chunk(&self, hex_chunk: &str) -> Result<Value, AudioChunkError>;

    /// Classifies one inbound provider frame. Fails only if the frame is not JSON.
    fn decode_inbound(&self, frame: &str) -> Result<Vec<InboundEvent>, serde_json::Error>;

    /// The frames that report `result` for `call` back to the provider.
    fn encode_tool_response(&self, call: &ToolCall, result: &ToolResult) -> Vec<Value>;
}

/// Returns the adapter for the configured provider.
pub fn adapter_for(provider: &Provider) -> Arc<dyn RealtimeAdapter> {
    match provider {
        Provider::OpenAI => Arc::new(openai::OpenAiAdapter),
        Provider::Gemini => Arc::new(gemini::GeminiAdapter),
    }
}

/// Opens the websocket connection to the configured provider.
pub async fn connect(provider: &Provider, config: &Config) -> Result<ProviderStream> {
    let stream = match provider {
        Provider::OpenAI => openai::connect(config).await?,
        Provider::Gemini => gemini::connect(config).await?,
    };
    info!(?provider, "Connected to realtime provider.");
    Ok(stream)
}

/// Hex from the client to base64 for the provider.
pub(crate) fn hex_to_base64(hex_chunk: &str) -> Result<String, AudioChunkError> {
    let raw = hex::decode(hex_chunk.trim())?;
    Ok(base64::engine::general_purpose::STANDARD.encode(raw))
}

/// Encodes a typed wire message as a JSON value.
pub(crate) fn frame<T: Serialize>(message: &T) -> Value {
    serde_json::to_value(message).unwrap_or_else(|e| {
        error!(error = %e, "Failed to encode provider frame.");
        Value::Null
    })
}

pub(crate) const SHOW_ON_BOARD_DESCRIPTION: &str =
    "Show a short snippet (text, formula or code) on the student's board.";
pub(crate) const GENERATE_DIAGRAM_DESCRIPTION: &str =
    "Generate a diagram for the student. Takes a while; the result is shown on the board when ready.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_to_base64() {
        assert_eq!(hex_to_base64("00ff10").unwrap(), "AP8Q");
        assert_eq!(hex_to_base64("").unwrap(), "");
        assert!(matches!(hex_to_base64("zz"), Err(AudioChunkError::InvalidHex(_))));
        assert!(hex_to_base64("abc").is_err());
    }
}
