//! Defines the WebSocket message protocol between the browser client and the API server.

use serde::{Deserialize, Serialize};

/// Messages sent from the client while a voicebot session is running.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoicebotClientMessage {
    /// The user closed the voicebot.
    ExitVoicebot,
    /// A chunk of microphone audio, hex encoded.
    AudioChunk { chunk: String },
    /// Any other `type`; logged and ignored.
    #[serde(other)]
    Unrecognized,
}

/// The part of a lesson the client wants next.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LessonPart {
    Context,
    Conclusion,
    ExplanationStep,
    Voicebot,
}

/// A lesson navigation request: `{"part": "EXPLANATION_STEP", "index": 2}`.
#[derive(Deserialize, Debug, PartialEq)]
pub struct LessonRequest {
    pub part: LessonPart,
    pub index: Option<usize>,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Describes the lesson once the socket is ready.
    Metadata {
        status: &'static str,
        name: String,
        num_steps: usize,
    },
    /// The interactive tutor is starting.
    VoicebotInit {
        status: &'static str,
        message: String,
    },
    /// The interactive tutor has ended.
    VoicebotExit {
        status: &'static str,
        message: String,
    },
    /// The full text of a narrated part, sent before its audio.
    TextFull {
        status: &'static str,
        text: String,
        img_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        snippet: Option<Vec<String>>,
    },
    /// A chunk of narration audio (hex encoded PCM).
    AudioChunk { status: &'static str, data: String },
    /// Narration audio has finished.
    StreamExit { status: &'static str },
    /// A chunk of the provider's spoken audio (base64).
    AudioDelta { delta: String },
    /// The provider asked to show something on the board.
    FunctionCall {
        function: String,
        /// The call arguments as a JSON string.
        args: String,
    },
    /// The user started talking; stop playing audio.
    InterruptPlayback,
    /// The provider finished its turn.
    TurnComplete,
    /// A diagram is being generated.
    DiagramInitiated,
    /// A generated diagram is available.
    DiagramReady { url: String },
    /// Diagram generation failed.
    DiagramFailed { error: String },
    /// Reports an error that ends or disrupts the session.
    Error { status: &'static str, data: String },
}

impl ServerMessage {
    pub fn metadata(name: impl Into<String>, num_steps: usize) -> Self {
        Self::Metadata {
            status: "Connected",
            name: name.into(),
            num_steps,
        }
    }

    pub fn voicebot_init() -> Self {
        Self::VoicebotInit {
            status: "starting",
            message: "Initializing interactive tutor...".to_string(),
        }
    }

    pub fn voicebot_exit() -> Self {
        Self::VoicebotExit {
            status: "ended",
            message: "Voicebot session ended".to_string(),
        }
    }

    pub fn text_full(text: impl Into<String>, img_url: Option<String>, snippet: Option<Vec<String>>) -> Self {
        Self::TextFull {
            status: "connected",
            text: text.into(),
            img_url,
            snippet,
        }
    }

    pub fn audio_chunk(pcm: &[u8]) -> Self {
        Self::AudioChunk {
            status: "connected",
            data: hex::encode(pcm),
        }
    }

    pub fn stream_exit() -> Self {
        Self::StreamExit { status: "connected" }
    }

    pub fn error(data: impl Into<String>) -> Self {
        Self::Error {
            status: "error",
            data: data.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_voicebot_client_messages() {
        assert_eq!(
            serde_json::from_str::<VoicebotClientMessage>(r#"{"type": "exit_voicebot"}"#).unwrap(),
            VoicebotClientMessage::ExitVoicebot
        );
        assert_eq!(
            serde_json::from_str::<VoicebotClientMessage>(r#"{"type": "audio_chunk", "chunk": "00ff"}"#)
                .unwrap(),
            VoicebotClientMessage::AudioChunk {
                chunk: "00ff".into()
            }
        );
        assert_eq!(
            serde_json::from_str::<VoicebotClientMessage>(r#"{"type": "wave"}"#).unwrap(),
            VoicebotClientMessage::Unrecognized
        );
        assert!(serde_json::from_str::<VoicebotClientMessage>(r#"{"type": "audio_chunk"}"#).is_err());
        assert!(serde_json::from_str::<VoicebotClientMessage>("not json").is_err());
    }

    #[test]
    fn test_lesson_request() {
        let req: LessonRequest =
            serde_json::from_str(r#"{"part": "EXPLANATION_STEP", "index": 2}"#).unwrap();
        assert_eq!(req.part, LessonPart::ExplanationStep);
        assert_eq!(req.index, Some(2));

        let req: LessonRequest = serde_json::from_str(r#"{"part": "CONTEXT"}"#).unwrap();
        assert_eq!(req.part, LessonPart::Context);
        assert_eq!(req.index, None);
    }

    #[test]
    fn test_server_message_envelopes() {
        let cases = vec![
            (
                ServerMessage::metadata("Pythagoras", 3),
                json!({"type": "METADATA", "status": "Connected", "name": "Pythagoras", "num_steps": 3}),
            ),
            (
                ServerMessage::audio_chunk(&[0x00, 0xab]),
                json!({"type": "AUDIO_CHUNK", "status": "connected", "data": "00ab"}),
            ),
            (
                ServerMessage::text_full("hi", None, None),
                json!({"type": "TEXT_FULL", "status": "connected", "text": "hi", "img_url": null}),
            ),
            (
                ServerMessage::FunctionCall {
                    function: "show_on_board".into(),
                    args: r#"{"content":"x"}"#.into(),
                },
                json!({"type": "FUNCTION_CALL", "function": "show_on_board", "args": "{\"content\":\"x\"}"}),
            ),
            (ServerMessage::InterruptPlayback, json!({"type": "INTERRUPT_PLAYBACK"})),
            (ServerMessage::DiagramInitiated, json!({"type": "DIAGRAM_INITIATED"})),
            (
                ServerMessage::DiagramReady { url: "u".into() },
                json!({"type": "DIAGRAM_READY", "url": "u"}),
            ),
            (
                ServerMessage::error("boom"),
                json!({"type": "ERROR", "status": "error", "data": "boom"}),
            ),
        ];
        for (message, expected) in cases {
            assert_eq!(serde_json::to_value(&message).unwrap(), expected);
        }
    }
}
