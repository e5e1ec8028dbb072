//! The tutor's tool registry.
//!
//! Tools are a closed set, modeled as the [`ToolInvocation`] enum rather
//! than a name-keyed map: dispatch is a match on the variant, so a tool our
//! own code references but does not handle is a compile error. Unknown
//! names can still arrive from the model at runtime; [`ToolInvocation::parse`]
//! rejects those with [`ToolError::UnknownTool`] and the orchestrator feeds
//! the error back as a tool result.

use crate::analysis::RepoAnalyzer;
use crate::generators::Generators;
use crate::search::{CodeSearch, DEFAULT_TOP_K, render_hits};
use crate::session::Session;
use async_openai::types::{ChatCompletionTool, ChatCompletionToolArgs, FunctionObjectArgs};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: '{0}'")]
    UnknownTool(String),
    #[error("Invalid arguments for tool '{tool}': {source}")]
    InvalidArguments {
        tool: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize, JsonSchema, Debug, Default)]
pub struct StructureAnalysisArgs {}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct CodeSearchArgs {
    /// A natural-language or code-fragment query over the repository.
    #[schemars(description = "What to look for, e.g. 'where requests are routed'")]
    pub query: String,
    /// How many matches to return (defaults to 5).
    #[serde(default)]
    #[schemars(description = "Number of matches to return; defaults to 5")]
    pub top_k: Option<u32>,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct ConceptPrimerArgs {
    /// The concept to explain.
    #[schemars(description = "The concept to write a short primer for")]
    pub concept: String,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct SocraticQuestionArgs {
    /// What the question should probe.
    #[schemars(description = "The concept or code area the question should probe")]
    pub focus: String,
}

#[derive(Deserialize, JsonSchema, Debug, Default)]
pub struct StudyPlanArgs {}

#[derive(Deserialize, JsonSchema, Debug, Default)]
pub struct FlashcardsArgs {}

/// One fully-parsed tool call, ready for dispatch.
#[derive(Debug)]
pub enum ToolInvocation {
    StructureAnalysis(StructureAnalysisArgs),
    CodeSearch(CodeSearchArgs),
    ConceptPrimer(ConceptPrimerArgs),
    SocraticQuestion(SocraticQuestionArgs),
    StudyPlan(StudyPlanArgs),
    Flashcards(FlashcardsArgs),
}

impl ToolInvocation {
    pub const fn name(&self) -> &'static str {
        match self {
            ToolInvocation::StructureAnalysis(_) => "structure_analysis",
            ToolInvocation::CodeSearch(_) => "code_search",
            ToolInvocation::ConceptPrimer(_) => "concept_primer",
            ToolInvocation::SocraticQuestion(_) => "socratic_question",
            ToolInvocation::StudyPlan(_) => "study_plan",
            ToolInvocation::Flashcards(_) => "flashcards",
        }
    }

    /// Parses a model-issued tool call into a typed invocation.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolError> {
        // Models occasionally send an empty arguments string for
        // parameterless tools.
        let arguments = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };

        fn args<T: serde::de::DeserializeOwned>(
            tool: &'static str,
            raw: &str,
        ) -> Result<T, ToolError> {
            serde_json::from_str(raw).map_err(|source| ToolError::InvalidArguments { tool, source })
        }

        match name {
            "structure_analysis" => Ok(Self::StructureAnalysis(args("structure_analysis", arguments)?)),
            "code_search" => Ok(Self::CodeSearch(args("code_search", arguments)?)),
            "concept_primer" => Ok(Self::ConceptPrimer(args("concept_primer", arguments)?)),
            "socratic_question" => Ok(Self::SocraticQuestion(args("socratic_question", arguments)?)),
            "study_plan" => Ok(Self::StudyPlan(args("study_plan", arguments)?)),
            "flashcards" => Ok(Self::Flashcards(args("flashcards", arguments)?)),
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    /// The tool definitions advertised to the chat completion API.
    pub fn specs() -> anyhow::Result<Vec<ChatCompletionTool>> {
        fn spec<T: JsonSchema>(name: &str, description: &str) -> anyhow::Result<ChatCompletionTool> {
            Ok(ChatCompletionToolArgs::default()
                .function(
                    FunctionObjectArgs::default()
                        .name(name)
                        .description(description)
                        .parameters(serde_json::to_value(schemars::schema_for!(T))?)
                        .build()?,
                )
                .build()?)
        }

        Ok(vec![
            spec::<StructureAnalysisArgs>(
                "structure_analysis",
                "Get the repository's structure: most important files, hotspots, and a primer.",
            )?,
            spec::<CodeSearchArgs>(
                "code_search",
                "Semantically search the repository's indexed source code.",
            )?,
            spec::<ConceptPrimerArgs>(
                "concept_primer",
                "Write a short primer explaining one concept in the context of this repository.",
            )?,
            spec::<SocraticQuestionArgs>(
                "socratic_question",
                "Produce one Socratic question probing the learner's understanding.",
            )?,
            spec::<StudyPlanArgs>(
                "study_plan",
                "Generate a study plan for the learner's goal with a fixed time budget.",
            )?,
            spec::<FlashcardsArgs>(
                "flashcards",
                "Generate exactly five flashcards covering what the learner has struggled with.",
            )?,
        ])
    }
}

/// Executes tool invocations. Handlers share nothing mutable with each
/// other; every dependency here is a stateless-to-the-caller service.
pub struct Toolbox {
    analyzer: Arc<RepoAnalyzer>,
    search: Arc<CodeSearch>,
    generators: Arc<Generators>,
}

impl Toolbox {
    pub fn new(
        analyzer: Arc<RepoAnalyzer>,
        search: Arc<CodeSearch>,
        generators: Arc<Generators>,
    ) -> Self {
        Self {
            analyzer,
            search,
            generators,
        }
    }

    /// Runs one tool call against the session's repository and returns a
    /// JSON result suitable for re-injection into the model's context.
    pub async fn dispatch(
        &self,
        invocation: ToolInvocation,
        session: &Session,
    ) -> anyhow::Result<serde_json::Value> {
        info!(tool = invocation.name(), session_id = %session.id, "Executing tool");

        match invocation {
            ToolInvocation::StructureAnalysis(_) => {
                // Prefer the analysis cached at session creation; re-crawl
                // only if it is missing.
                let analysis = match &session.analysis {
                    Some(analysis) => analysis.clone(),
                    None => self.analyzer.analyze(&session.repo, &session.goal).await?,
                };
                let top_files: Vec<_> = analysis
                    .files
                    .iter()
                    .take(10)
                    .map(|f| serde_json::json!({ "path": f.path, "language": f.language }))
                    .collect();
                Ok(serde_json::json!({
                    "top_files": top_files,
                    "hotspots": analysis.hotspots,
                    "primer": analysis.primer,
                    "estimated_read_minutes": analysis.estimated_read_minutes,
                }))
            }
            ToolInvocation::CodeSearch(args) => {
                let top_k = args.top_k.map(|k| k as usize).unwrap_or(DEFAULT_TOP_K);
                let hits = self.search.search(&args.query, &session.repo, top_k).await?;
                Ok(render_hits(&args.query, &session.repo, &hits))
            }
            ToolInvocation::ConceptPrimer(args) => {
                let primer = self.generators.concept_primer(session, &args.concept).await?;
                Ok(serde_json::json!({ "concept": args.concept, "primer": primer }))
            }
            ToolInvocation::SocraticQuestion(args) => {
                let question = self.generators.socratic_question(session, &args.focus).await?;
                Ok(serde_json::json!({ "question": question }))
            }
            ToolInvocation::StudyPlan(_) => {
                let plan = self.generators.study_plan(session).await?;
                Ok(serde_json::to_value(plan)?)
            }
            ToolInvocation::Flashcards(_) => {
                let cards = self.generators.flashcards(session).await?;
                Ok(serde_json::json!({ "count": cards.len(), "cards": cards }))
            }
        }
    }
}
