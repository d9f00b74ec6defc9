use crate::tool_call::ToolCall;

/// Generic events that any real-time provider can emit back to the bridge.
///
/// Each provider adapter classifies its own wire traffic into these kinds so
/// the relay loop never has to look at provider-specific field names.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A chunk of spoken audio from the AI (base64 encoded).
    AudioDelta(String),
    /// The user started speaking; the client should stop playback.
    SpeechStarted,
    /// The provider asked for a function to be invoked.
    ToolCall(ToolCall),
    /// The provider finished its turn.
    TurnComplete,
    /// Anything the bridge does not model. Carries the raw frame so it can be
    /// forwarded to the client untouched.
    Unrecognized(String),
}
