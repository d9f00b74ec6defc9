//! Explainer Core
//!
//! Provider-independent domain types shared by the explainer services: the
//! diagram job boundary, normalized tool calls, lesson content, narration
//! speech and the versioned voice prompt library.

pub mod diagram;
pub mod generic_types;
pub mod lesson;
pub mod prompt;
pub mod speech;
pub mod tool_call;
