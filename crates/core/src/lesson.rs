//! Lesson Content
//!
//! A lesson is the narrated explanation of one concept: an introductory
//! context, a sequence of explanation steps and a conclusion. Lessons are
//! authored elsewhere; this module only defines their shape and the
//! read-only store the service loads them from.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One narrated step of an explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationStep {
    /// The text spoken for this step.
    pub text: String,
    /// Board snippets shown alongside the step, in display order.
    pub snippets: Vec<String>,
    /// A pre-rendered figure for this step, if there is one.
    pub figure_url: Option<String>,
}

/// The full content of a lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub concept_id: i64,
    pub name: String,
    pub context: String,
    pub conclusion: String,
    pub steps: Vec<ExplanationStep>,
}

impl Lesson {
    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn step(&self, index: usize) -> Option<&ExplanationStep> {
        self.steps.get(index)
    }

    /// The narration of every step up to and including `index`, or `None`
    /// when `index` is past the last step.
    pub fn steps_through(&self, index: usize) -> Option<Vec<&str>> {
        if index >= self.steps.len() {
            return None;
        }
        Some(self.steps[..=index].iter().map(|s| s.text.as_str()).collect())
    }
}

/// Read access to lesson content.
#[async_trait]
pub trait LessonStore: Send + Sync {
    /// Loads a lesson by concept id. Returns `Ok(None)` when it does not exist.
    async fn load(&self, concept_id: i64) -> Result<Option<Lesson>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson() -> Lesson {
        Lesson {
            concept_id: 7,
            name: "Pythagoras".into(),
            context: "Right triangles".into(),
            conclusion: "a^2 + b^2 = c^2".into(),
            steps: vec![
                ExplanationStep {
                    text: "Draw a right triangle.".into(),
                    snippets: vec![],
                    figure_url: None,
                },
                ExplanationStep {
                    text: "Square each side.".into(),
                    snippets: vec!["a^2".into(), "b^2".into()],
                    figure_url: Some("https://cdn/fig_1.png".into()),
                },
            ],
        }
    }

    #[test]
    fn test_steps_through() {
        let lesson = lesson();
        assert_eq!(lesson.steps_through(0), Some(vec!["Draw a right triangle."]));
        assert_eq!(
            lesson.steps_through(1),
            Some(vec!["Draw a right triangle.", "Square each side."])
        );
        assert_eq!(lesson.steps_through(2), None);
    }
}
