//! Core domain model for tutoring sessions.
//!
//! These types are shared between the session actor, the turn orchestrator,
//! the WebSocket protocol, and the durable store. They are plain serde
//! structs; all mutation goes through the owning session actor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A reference to a hosted repository, e.g. `tokio-rs/axum`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoRef {
    type Err = String;

    /// Parses an `owner/name` string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_matches('/').split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(format!("expected 'owner/name', got '{s}'")),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// The kind of intermediate work a [`ReasoningStep`] records.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningKind {
    ToolInvoked,
    ToolResult,
    Thinking,
}

/// One observable unit of the orchestrator's intermediate work during a turn.
///
/// Steps for a turn are append-only and ordered by emission time; the
/// gateway forwards them to the client as they occur, before the turn's
/// final message exists.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReasoningStep {
    pub kind: ReasoningKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Tool arguments for `tool_invoked`, a summarized result for
    /// `tool_result`, free text for `thinking`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ReasoningStep {
    pub fn tool_invoked(tool: &str, arguments: serde_json::Value) -> Self {
        Self {
            kind: ReasoningKind::ToolInvoked,
            tool: Some(tool.to_string()),
            timestamp: Utc::now(),
            payload: Some(arguments),
        }
    }

    pub fn tool_result(tool: &str, result: serde_json::Value) -> Self {
        Self {
            kind: ReasoningKind::ToolResult,
            tool: Some(tool.to_string()),
            timestamp: Utc::now(),
            payload: Some(result),
        }
    }

    pub fn thinking(text: &str) -> Self {
        Self {
            kind: ReasoningKind::Thinking,
            tool: None,
            timestamp: Utc::now(),
            payload: Some(serde_json::Value::String(text.to_string())),
        }
    }
}

/// One message in a session's conversation history.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Intermediate steps for assistant messages produced through
    /// tool-augmented turns; empty otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasoning: Vec<ReasoningStep>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            reasoning: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, reasoning: Vec<ReasoningStep>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            reasoning,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HotspotCategory {
    Entrypoint,
    Api,
    Router,
    Config,
    Docs,
}

/// A source file ranked by estimated importance for a first read.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RankedFile {
    pub path: String,
    /// Importance score in `0.0..=1.0`.
    pub score: f32,
    pub language: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Hotspot {
    pub path: String,
    pub category: HotspotCategory,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyTier {
    Beginner,
    Intermediate,
    Advanced,
}

/// A concept the learner should know before reading the repository.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Prerequisite {
    pub concept: String,
    pub description: String,
    pub difficulty: DifficultyTier,
}

/// The cached result of analyzing a repository's structure.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Analysis {
    pub repo: RepoRef,
    /// Files ordered by descending importance score.
    pub files: Vec<RankedFile>,
    pub hotspots: Vec<Hotspot>,
    pub prerequisites: Vec<Prerequisite>,
    pub primer: String,
    pub estimated_read_minutes: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PlanStep {
    pub title: String,
    pub description: String,
    pub minutes: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StudyPlan {
    pub total_minutes: u32,
    pub steps: Vec<PlanStep>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

/// One learner's ongoing tutoring conversation about one repository.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub repo: RepoRef,
    /// The learner's stated goal, e.g. "understand middleware".
    pub goal: String,
    pub messages: Vec<Message>,
    /// Concepts the learner struggled with, insertion-ordered and
    /// deduplicated case-insensitively.
    #[serde(default)]
    pub struggles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Analysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_plan: Option<StudyPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flashcards: Option<Vec<Flashcard>>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(id: Uuid, repo: RepoRef, goal: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            repo,
            goal: goal.into(),
            messages: Vec::new(),
            struggles: Vec::new(),
            analysis: None,
            study_plan: None,
            flashcards: None,
            created_at: now,
            last_activity: now,
        }
    }

    /// Refreshes the last-activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Adds a struggle concept, preserving insertion order. Returns `false`
    /// if an equivalent concept (case-insensitive) is already tracked.
    pub fn add_struggle(&mut self, concept: &str) -> bool {
        let concept = concept.trim();
        if concept.is_empty() {
            return false;
        }
        if self
            .struggles
            .iter()
            .any(|s| s.eq_ignore_ascii_case(concept))
        {
            return false;
        }
        self.struggles.push(concept.to_string());
        true
    }

    /// Merges a partial update into the session and refreshes
    /// `last_activity`. Fields absent from the update are left unchanged.
    pub fn merge(&mut self, update: SessionUpdate) {
        if let Some(goal) = update.goal {
            self.goal = goal;
        }
        if let Some(analysis) = update.analysis {
            self.analysis = Some(analysis);
        }
        if let Some(plan) = update.study_plan {
            self.study_plan = Some(plan);
        }
        if let Some(cards) = update.flashcards {
            self.flashcards = Some(cards);
        }
        self.touch();
    }
}

/// A partial update applied to a session through the actor.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct SessionUpdate {
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub analysis: Option<Analysis>,
    #[serde(default)]
    pub study_plan: Option<StudyPlan>,
    #[serde(default)]
    pub flashcards: Option<Vec<Flashcard>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoRef {
        "octocat/hello-world".parse().unwrap()
    }

    #[test]
    fn repo_ref_parse_and_display() {
        let r = repo();
        assert_eq!(r.owner, "octocat");
        assert_eq!(r.name, "hello-world");
        assert_eq!(r.to_string(), "octocat/hello-world");

        assert!("justowner".parse::<RepoRef>().is_err());
        assert!("/".parse::<RepoRef>().is_err());
        assert!("".parse::<RepoRef>().is_err());
    }

    #[test]
    fn new_session_is_empty() {
        let session = Session::new(Uuid::new_v4(), repo(), "understand middleware");
        assert_eq!(session.goal, "understand middleware");
        assert!(session.messages.is_empty());
        assert!(session.struggles.is_empty());
        assert!(session.analysis.is_none());
        assert_eq!(session.created_at, session.last_activity);
    }

    #[test]
    fn struggles_dedupe_case_insensitively_and_keep_order() {
        let mut session = Session::new(Uuid::new_v4(), repo(), "goal");
        assert!(session.add_struggle("Tower middleware"));
        assert!(session.add_struggle("extractors"));
        assert!(!session.add_struggle("tower middleware"));
        assert!(!session.add_struggle("  "));
        assert_eq!(session.struggles, vec!["Tower middleware", "extractors"]);
    }

    #[test]
    fn merge_applies_fields_independently() {
        let mut session = Session::new(Uuid::new_v4(), repo(), "goal");
        session.merge(SessionUpdate {
            goal: Some("new goal".into()),
            ..Default::default()
        });
        session.merge(SessionUpdate {
            flashcards: Some(vec![Flashcard {
                front: "q".into(),
                back: "a".into(),
            }]),
            ..Default::default()
        });

        assert_eq!(session.goal, "new goal");
        assert_eq!(session.flashcards.as_ref().unwrap().len(), 1);
        assert!(session.analysis.is_none());
        assert!(session.study_plan.is_none());
    }

    #[test]
    fn merge_refreshes_last_activity() {
        let mut session = Session::new(Uuid::new_v4(), repo(), "goal");
        let before = session.last_activity;
        session.merge(SessionUpdate::default());
        assert!(session.last_activity >= before);
    }

    #[test]
    fn message_serialization_skips_empty_reasoning() {
        let msg = Message::user("what is middleware?");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(!json.contains("reasoning"));

        let steps = vec![ReasoningStep::tool_invoked(
            "code_search",
            serde_json::json!({"query": "middleware"}),
        )];
        let msg = Message::assistant("found it", steps);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"tool_invoked\""));
        assert!(json.contains("code_search"));
    }

    #[test]
    fn session_roundtrip() {
        let mut session = Session::new(Uuid::new_v4(), repo(), "goal");
        session.messages.push(Message::user("hi"));
        session.add_struggle("ownership");

        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, session.id);
        assert_eq!(back.repo, session.repo);
        assert_eq!(back.messages.len(), 1);
        assert_eq!(back.struggles, vec!["ownership"]);
    }

    #[test]
    fn reasoning_kind_wire_format() {
        assert_eq!(
            serde_json::to_string(&ReasoningKind::ToolInvoked).unwrap(),
            "\"tool_invoked\""
        );
        assert_eq!(
            serde_json::to_string(&ReasoningKind::ToolResult).unwrap(),
            "\"tool_result\""
        );
    }
}
