//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the lesson store and service clients.

use crate::config::Config;
use explainer_core::{diagram::JobQueue, lesson::LessonStore, speech::SpeechSynthesizer};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub lessons: Arc<dyn LessonStore>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub jobs: Arc<dyn JobQueue>,
    /// The voice tutor template, before lesson placeholders are filled in.
    pub voice_prompt: Arc<String>,
    pub config: Arc<Config>,
}
