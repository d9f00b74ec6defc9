//! WebSocket Session Management
//!
//! This module contains the logic behind the lesson socket. It is structured
//! into submodules:
//!
//! - `protocol`: The JSON envelopes exchanged with the browser client.
//! - `delivery` / `transport`: Retrying sends over the client and provider sockets.
//! - `session`: The connection lifecycle, from lesson load to teardown.
//! - `lesson`: Narration of lesson parts.
//! - `bridge`: The voicebot relay between the client and the realtime provider.
//! - `tool_router` / `monitor`: Provider tool calls and background diagram jobs.
//! - `provider`: Wire dialects of the supported realtime voice APIs (OpenAI, Gemini).

pub mod bridge;
pub mod delivery;
pub mod lesson;
pub mod monitor;
pub mod peers;
pub mod protocol;
pub mod provider;
pub mod session;
pub mod tool_router;
pub mod transport;

#[cfg(test)]
mod testing;

pub use session::ws_handler;
