//! Narration speech through the OpenAI text-to-speech endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use explainer_core::speech::{AudioStream, SpeechSynthesizer};
use futures_util::StreamExt;
use serde::Serialize;
use tracing::debug;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const NARRATION_STYLE: &str = "Speak like you are an O-level Maths instructor. \
    You should try to induce curiosity within the student.";

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    instructions: &'a str,
    response_format: &'static str,
}

/// Streams raw PCM speech for narration text.
pub struct OpenAiSpeech {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    voice: String,
}

impl OpenAiSpeech {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: OPENAI_API_BASE.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str) -> Result<AudioStream> {
        debug!(chars = text.len(), model = %self.model, "Requesting narration speech.");
        let response = self
            .http
            .post(format!("{}/audio/speech", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&SpeechRequest {
                model: &self.model,
                voice: &self.voice,
                input: text,
                instructions: NARRATION_STYLE,
                response_format: "pcm",
            })
            .send()
            .await
            .context("Speech request failed")?
            .error_for_status()
            .context("Speech endpoint returned an error")?;

        Ok(Box::pin(
            response.bytes_stream().map(|chunk| chunk.map_err(anyhow::Error::from)),
        ))
    }
}
