//! Study-material generators: primers, Socratic questions, study plans,
//! and flashcards.
//!
//! Each generator issues one templated prompt to the hosted model and
//! expects a strict JSON shape back. Model output that fails to parse falls
//! back to a documented default instead of aborting the turn:
//!
//! - concept primer: the raw model text is used verbatim;
//! - Socratic question: the raw text is wrapped into a best-effort question;
//! - study plan: a plan with the fixed time budget and no steps;
//! - flashcards: an empty list (callers treat "not 5 cards" as a failure).

use crate::llm_client::LLMClient;
use crate::session::{Flashcard, PlanStep, Session, StudyPlan};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Flashcard generation always yields exactly this many cards.
pub const FLASHCARD_COUNT: usize = 5;

/// Total duration budget a generated study plan targets, in minutes.
pub const STUDY_PLAN_MINUTES: u32 = 60;

pub struct Generators {
    llm: Arc<dyn LLMClient>,
    prompts: HashMap<String, String>,
}

#[derive(Deserialize)]
struct QuestionShape {
    question: String,
}

#[derive(Deserialize)]
struct PlanShape {
    steps: Vec<PlanStep>,
}

#[derive(Deserialize)]
struct CardsShape {
    cards: Vec<Flashcard>,
}

impl Generators {
    /// `prompts` maps template names (`concept_primer`, `socratic_question`,
    /// `study_plan`, `flashcards`) to Markdown templates with `{goal}`,
    /// `{repo}`, `{struggles}`, and `{concept}` placeholders.
    pub fn new(llm: Arc<dyn LLMClient>, prompts: HashMap<String, String>) -> Self {
        Self { llm, prompts }
    }

    fn render_prompt(&self, name: &str, session: &Session, concept: &str) -> Result<String> {
        let template = self
            .prompts
            .get(name)
            .with_context(|| format!("Missing prompt template: '{name}'"))?;
        let struggles = if session.struggles.is_empty() {
            "none recorded yet".to_string()
        } else {
            session.struggles.join(", ")
        };
        Ok(template
            .replace("{repo}", &session.repo.to_string())
            .replace("{goal}", &session.goal)
            .replace("{struggles}", &struggles)
            .replace("{concept}", concept))
    }

    /// Generates a short prose primer for one concept. ParseFailure
    /// fallback: the raw model text.
    pub async fn concept_primer(&self, session: &Session, concept: &str) -> Result<String> {
        let prompt = self.render_prompt("concept_primer", session, concept)?;
        let raw = self
            .llm
            .complete("You write concise primers for programmers.", &prompt)
            .await?;
        Ok(raw.trim().to_string())
    }

    /// Generates one Socratic question probing the learner's understanding.
    /// ParseFailure fallback: the raw text wrapped as a best-effort question.
    pub async fn socratic_question(&self, session: &Session, focus: &str) -> Result<String> {
        let prompt = self.render_prompt("socratic_question", session, focus)?;
        let raw = self
            .llm
            .complete("You are a Socratic tutor. Respond with JSON.", &prompt)
            .await?;

        match parse_json_shape::<QuestionShape>(&raw) {
            Some(shape) if !shape.question.trim().is_empty() => Ok(shape.question),
            _ => {
                warn!("Socratic question output did not parse; wrapping raw text");
                let text = raw.trim().trim_matches('"').to_string();
                if text.contains('?') {
                    Ok(text)
                } else {
                    Ok(format!("{text}. Can you explain that in your own words?"))
                }
            }
        }
    }

    /// Generates a study plan targeting the fixed time budget. ParseFailure
    /// fallback: the budget with an empty step list.
    pub async fn study_plan(&self, session: &Session) -> Result<StudyPlan> {
        let prompt = self.render_prompt("study_plan", session, "")?;
        let raw = self
            .llm
            .complete("You design study plans. Respond with JSON.", &prompt)
            .await?;

        let steps = match parse_json_shape::<PlanShape>(&raw) {
            Some(shape) => shape.steps,
            None => {
                warn!("Study plan output did not parse; falling back to empty plan");
                Vec::new()
            }
        };
        Ok(StudyPlan {
            total_minutes: STUDY_PLAN_MINUTES,
            steps,
        })
    }

    /// Generates exactly [`FLASHCARD_COUNT`] flashcards. ParseFailure, or
    /// any response with fewer than 5 cards, falls back to an empty list;
    /// the result is never a partial set.
    pub async fn flashcards(&self, session: &Session) -> Result<Vec<Flashcard>> {
        let prompt = self.render_prompt("flashcards", session, "")?;
        let raw = self
            .llm
            .complete("You write study flashcards. Respond with JSON.", &prompt)
            .await?;

        let cards = parse_json_shape::<CardsShape>(&raw)
            .map(|shape| shape.cards)
            .or_else(|| parse_json_shape::<Vec<Flashcard>>(&raw));

        match cards {
            Some(mut cards) if cards.len() >= FLASHCARD_COUNT => {
                cards.truncate(FLASHCARD_COUNT);
                Ok(cards)
            }
            other => {
                warn!(
                    cards = other.map(|c| c.len()),
                    "Flashcard output unusable; falling back to empty list"
                );
                Ok(Vec::new())
            }
        }
    }
}

/// Extracts the first JSON object or array embedded in model output and
/// deserializes it, tolerating Markdown code fences and surrounding prose.
pub fn parse_json_shape<T: serde::de::DeserializeOwned>(raw: &str) -> Option<T> {
    let raw = raw.trim();
    if let Ok(value) = serde_json::from_str::<T>(raw) {
        return Some(value);
    }

    let start = raw.find(['{', '['])?;
    let open = raw.as_bytes()[start];
    let close = if open == b'{' { '}' } else { ']' };
    let end = raw.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}
