//! The narrated lesson that runs on a client socket before (and around) the
//! voicebot.

use super::{
    delivery::{RetryPolicy, Transport, send_json},
    protocol::{LessonPart, LessonRequest, ServerMessage},
    transport::{Incoming, IncomingStream},
};
use explainer_core::{
    lesson::Lesson,
    prompt::build_voicebot_prompt,
    speech::{NARRATION_CHUNK_SIZE, SpeechSynthesizer, rechunk},
};
use futures_util::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// How the lesson loop ended.
pub enum LessonEnd {
    /// The client closed the socket.
    ClientLeft,
    /// The client asked for the voicebot; the bridge takes over the socket.
    Voicebot {
        instructions: String,
        client_rx: IncomingStream,
    },
}

pub struct LessonDriver {
    lesson: Lesson,
    client: Arc<dyn Transport>,
    speech: Arc<dyn SpeechSynthesizer>,
    voice_template: Arc<String>,
}

impl LessonDriver {
    pub fn new(
        lesson: Lesson,
        client: Arc<dyn Transport>,
        speech: Arc<dyn SpeechSynthesizer>,
        voice_template: Arc<String>,
    ) -> Self {
        Self {
            lesson,
            client,
            speech,
            voice_template,
        }
    }

    /// Sends the lesson metadata, then serves part requests until the client
    /// leaves or starts the voicebot.
    #[instrument(name = "lesson", skip_all, fields(concept_id = self.lesson.concept_id))]
    pub async fn run(self, mut client_rx: IncomingStream) -> LessonEnd {
        self.send(&ServerMessage::metadata(&self.lesson.name, self.lesson.num_steps()))
            .await;

        while let Some(frame) = client_rx.next().await {
            let text = match frame {
                Ok(Incoming::Text(text)) => text,
                Ok(Incoming::Binary(_)) => {
                    debug!("Ignoring binary frame.");
                    continue;
                }
                Ok(Incoming::Close) => break,
                Err(e) => {
                    warn!(error = %e, "Client socket failed.");
                    break;
                }
            };

            let Some(request) = parse_request(&text) else {
                continue;
            };
            if let Some(instructions) = self.handle(request).await {
                return LessonEnd::Voicebot {
                    instructions,
                    client_rx,
                };
            }
        }

        info!("Client left the lesson.");
        LessonEnd::ClientLeft
    }

    /// Serves one request. Returns the voicebot instructions when the client
    /// asked to start it.
    async fn handle(&self, request: LessonRequest) -> Option<String> {
        let lesson = &self.lesson;
        match (request.part, request.index) {
            (LessonPart::Context, _) => self.narrate(&lesson.context, None, None).await,
            (LessonPart::Conclusion, _) => self.narrate(&lesson.conclusion, None, None).await,
            (LessonPart::ExplanationStep, Some(index)) => match lesson.step(index) {
                Some(step) => {
                    let snippets = (!step.snippets.is_empty()).then(|| step.snippets.clone());
                    self.narrate(&step.text, step.figure_url.clone(), snippets).await
                }
                None => self.out_of_range(index).await,
            },
            (LessonPart::Voicebot, Some(index)) => match lesson.steps_through(index) {
                Some(steps) => {
                    let instructions =
                        build_voicebot_prompt(&self.voice_template, &lesson.name, &lesson.context, &steps);
                    self.send(&ServerMessage::voicebot_init()).await;
                    info!(index, "Starting voicebot.");
                    return Some(instructions);
                }
                None => self.out_of_range(index).await,
            },
            (part, None) => {
                warn!(?part, "Request is missing its index.");
                self.send(&ServerMessage::error(format!("{part:?} requires an index"))).await;
            }
        }
        None
    }

    async fn narrate(&self, text: &str, img_url: Option<String>, snippet: Option<Vec<String>>) {
        if !self.send(&ServerMessage::text_full(text, img_url, snippet)).await {
            return;
        }

        let audio = match self.speech.synthesize(text).await {
            Ok(audio) => audio,
            Err(e) => {
                error!(error = %e, "Speech synthesis failed.");
                self.send(&ServerMessage::error("Audio generation failed.")).await;
                return;
            }
        };

        let mut chunks = rechunk(audio, NARRATION_CHUNK_SIZE);
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(pcm) => {
                    if !self.send(&ServerMessage::audio_chunk(&pcm)).await {
                        return;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Speech stream broke off.");
                    break;
                }
            }
        }
        self.send(&ServerMessage::stream_exit()).await;
    }

    async fn out_of_range(&self, index: usize) {
        warn!(index, num_steps = self.lesson.num_steps(), "Step index out of range.");
        self.send(&ServerMessage::error(format!("Step {index} is out of range")))
            .await;
    }

    async fn send(&self, msg: &ServerMessage) -> bool {
        send_json(self.client.as_ref(), msg, RetryPolicy::default()).await
    }
}

fn parse_request(text: &str) -> Option<LessonRequest> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Undecodable client message.");
            return None;
        }
    };
    if value.get("part").is_none() {
        debug!("Ignoring message without a part.");
        return None;
    }
    serde_json::from_value(value)
        .map_err(|e| warn!(error = %e, "Invalid lesson request."))
        .ok()
}
