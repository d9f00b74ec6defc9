//! Data Access Layer
//!
//! Lesson content lives in PostgreSQL. Queries are checked at runtime, so the
//! crate builds without a live database.

use anyhow::Result;
use async_trait::async_trait;
use explainer_core::lesson::{ExplanationStep, Lesson, LessonStore};
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;
use tracing::{instrument, warn};

#[derive(FromRow)]
struct StepRow {
    step_num: i32,
    tts_text: String,
}

#[derive(FromRow)]
struct SnippetRow {
    step_num: i32,
    snippet_num: i32,
    snippet_text: String,
}

#[derive(FromRow)]
struct FigureRow {
    step_num: i32,
    url: String,
}

/// A `LessonStore` over the `lessons`, `contexts`, `conclusions`, `tts_steps`,
/// `snippets` and `figures` tables.
#[derive(Clone)]
pub struct PgLessonStore {
    pool: PgPool,
}

impl PgLessonStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl LessonStore for PgLessonStore {
    #[instrument(skip(self))]
    async fn load(&self, concept_id: i64) -> Result<Option<Lesson>> {
        let Some((name,)) = sqlx::query_as::<_, (String,)>("SELECT name FROM lessons WHERE id = $1")
            .bind(concept_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let context = sqlx::query_as::<_, (String,)>(
            "SELECT context_text FROM contexts WHERE lesson_id = $1",
        )
        .bind(concept_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|(text,)| text);

        let conclusion = sqlx::query_as::<_, (String,)>(
            "SELECT conclusion_text FROM conclusions WHERE lesson_id = $1",
        )
        .bind(concept_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|(text,)| text);

        let steps = sqlx::query_as::<_, StepRow>(
            "SELECT step_num, tts_text FROM tts_steps WHERE lesson_id = $1 ORDER BY step_num",
        )
        .bind(concept_id)
        .fetch_all(&self.pool)
        .await?;

        let snippets = sqlx::query_as::<_, SnippetRow>(
            "SELECT step_num, snippet_num, snippet_text FROM snippets \
             WHERE lesson_id = $1 ORDER BY step_num, snippet_num",
        )
        .bind(concept_id)
        .fetch_all(&self.pool)
        .await?;

        let figures = sqlx::query_as::<_, FigureRow>(
            "SELECT step_num, url FROM figures WHERE lesson_id = $1",
        )
        .bind(concept_id)
        .fetch_all(&self.pool)
        .await?;

        if context.is_none() || conclusion.is_none() {
            warn!("Lesson is missing its context or conclusion.");
        }

        Ok(Some(assemble(
            concept_id,
            name,
            context.unwrap_or_default(),
            conclusion.unwrap_or_default(),
            steps,
            snippets,
            figures,
        )))
    }
}

/// Joins the per-table rows into a lesson. Steps keep the order of their
/// `step_num`; snippets and figures attach to the step with the same number.
fn assemble(
    concept_id: i64,
    name: String,
    context: String,
    conclusion: String,
    steps: Vec<StepRow>,
    snippets: Vec<SnippetRow>,
    figures: Vec<FigureRow>,
) -> Lesson {
    let mut by_num: BTreeMap<i32, ExplanationStep> = steps
        .into_iter()
        .map(|row| {
            (
                row.step_num,
                ExplanationStep {
                    text: row.tts_text,
                    snippets: Vec::new(),
                    figure_url: None,
                },
            )
        })
        .collect();

    let mut snippets = snippets;
    snippets.sort_by_key(|s| (s.step_num, s.snippet_num));
    for snippet in snippets {
        match by_num.get_mut(&snippet.step_num) {
            Some(step) => step.snippets.push(snippet.snippet_text),
            None => warn!(step_num = snippet.step_num, "Snippet for a step that does not exist."),
        }
    }
    for figure in figures {
        if let Some(step) = by_num.get_mut(&figure.step_num) {
            step.figure_url = Some(figure.url);
        }
    }

    Lesson {
        concept_id,
        name,
        context,
        conclusion,
        steps: by_num.into_values().collect(),
    }
}
