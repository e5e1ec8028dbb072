//! Drives one tool-augmented conversation turn.
//!
//! The orchestrator asks the model to decide between answering and calling
//! a tool, executes tools one at a time (each result becomes context for
//! the next decision), and emits a [`ReasoningStep`] to the caller's sink
//! for every tool invocation and result, synchronously and in emission
//! order, while the turn is still executing. The final assistant message
//! is always produced, even when the hosted model fails.

use crate::llm_client::{LLMAction, LLMClient};
use crate::session::{Message, MessageRole, ReasoningStep, Session};
use crate::tools::{ToolInvocation, Toolbox};
use anyhow::Result;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Upper bound on decide-execute rounds within one turn.
const MAX_TOOL_ROUNDS: usize = 6;

/// Characters kept when summarizing a tool result for a reasoning step.
const STEP_PAYLOAD_CHARS: usize = 600;

/// The reply used when the hosted model call itself fails. The turn still
/// completes and is persisted so the conversation stays usable.
pub const FALLBACK_REPLY: &str =
    "I hit an error while working on that. Could you try asking again?";

/// Receives reasoning steps as they are emitted. Callers forward, buffer,
/// or discard them.
#[async_trait]
pub trait ReasoningSink: Send + Sync {
    async fn emit(&self, step: ReasoningStep);
}

/// A sink that discards every step.
pub struct NullSink;

#[async_trait]
impl ReasoningSink for NullSink {
    async fn emit(&self, _step: ReasoningStep) {}
}

pub struct TurnOrchestrator {
    llm: Arc<dyn LLMClient>,
    toolbox: Arc<Toolbox>,
    system_prompt: String,
}

impl TurnOrchestrator {
    pub fn new(llm: Arc<dyn LLMClient>, toolbox: Arc<Toolbox>, system_prompt: String) -> Self {
        Self {
            llm,
            toolbox,
            system_prompt,
        }
    }

    /// Runs one turn for `user_text` against the session's history.
    ///
    /// Does not mutate the session; the owning actor appends both the user
    /// message and the returned assistant message after the turn finishes.
    pub async fn run_turn(
        &self,
        session: &Session,
        user_text: &str,
        sink: &dyn ReasoningSink,
    ) -> Message {
        let mut steps: Vec<ReasoningStep> = Vec::new();
        let mut messages = match self.build_messages(session, user_text) {
            Ok(messages) => messages,
            Err(e) => {
                error!(session_id = %session.id, error = ?e, "Failed to build turn context");
                return Message::assistant(FALLBACK_REPLY, steps);
            }
        };

        let tools = match ToolInvocation::specs() {
            Ok(tools) => tools,
            Err(e) => {
                error!(error = ?e, "Failed to build tool specs");
                return Message::assistant(FALLBACK_REPLY, steps);
            }
        };

        for round in 0..MAX_TOOL_ROUNDS {
            let action = match self.llm.decide_action(messages.clone(), tools.clone()).await {
                Ok(action) => action,
                Err(e) => {
                    error!(session_id = %session.id, round, error = ?e, "Model call failed mid-turn");
                    return Message::assistant(FALLBACK_REPLY, steps);
                }
            };

            let tool_calls = match action {
                LLMAction::TextResponse(text) => {
                    info!(session_id = %session.id, rounds = round, "Turn finished");
                    return Message::assistant(text, steps);
                }
                LLMAction::ToolCall(calls) => calls,
            };

            // Record the assistant's tool request, then execute each call
            // sequentially; its result is context for the next decision.
            let assistant_msg = ChatCompletionRequestAssistantMessageArgs::default()
                .tool_calls(tool_calls.clone())
                .build();
            match assistant_msg {
                Ok(msg) => messages.push(msg.into()),
                Err(e) => {
                    error!(error = ?e, "Failed to encode tool-call message");
                    return Message::assistant(FALLBACK_REPLY, steps);
                }
            }

            for call in &tool_calls {
                let name = call.function.name.clone();
                let arguments: serde_json::Value =
                    serde_json::from_str(&call.function.arguments)
                        .unwrap_or_else(|_| serde_json::Value::String(call.function.arguments.clone()));

                let invoked = ReasoningStep::tool_invoked(&name, arguments);
                steps.push(invoked.clone());
                sink.emit(invoked).await;

                let result = self.execute(&name, &call.function.arguments, session).await;

                let step_result = ReasoningStep::tool_result(&name, summarize(&result));
                steps.push(step_result.clone());
                sink.emit(step_result).await;

                let tool_msg = ChatCompletionRequestToolMessageArgs::default()
                    .tool_call_id(call.id.clone())
                    .content(result.to_string())
                    .build();
                match tool_msg {
                    Ok(msg) => messages.push(msg.into()),
                    Err(e) => {
                        error!(error = ?e, "Failed to encode tool result message");
                        return Message::assistant(FALLBACK_REPLY, steps);
                    }
                }
            }
        }

        // Round budget exhausted: ask once more with tools withheld so the
        // model must answer in text.
        warn!(session_id = %session.id, "Tool round budget exhausted; forcing final answer");
        match self.llm.decide_action(messages, Vec::new()).await {
            Ok(LLMAction::TextResponse(text)) => Message::assistant(text, steps),
            Ok(LLMAction::ToolCall(_)) | Err(_) => Message::assistant(FALLBACK_REPLY, steps),
        }
    }

    /// Parses and dispatches one tool call. Failures (unknown tools, bad
    /// arguments, a failing handler) become an error-shaped result the
    /// model can react to, not a failed turn.
    async fn execute(
        &self,
        name: &str,
        raw_arguments: &str,
        session: &Session,
    ) -> serde_json::Value {
        let invocation = match ToolInvocation::parse(name, raw_arguments) {
            Ok(invocation) => invocation,
            Err(e) => {
                warn!(tool = name, error = %e, "Rejected tool call");
                return serde_json::json!({ "error": e.to_string() });
            }
        };
        match self.toolbox.dispatch(invocation, session).await {
            Ok(value) => value,
            Err(e) => {
                warn!(tool = name, error = ?e, "Tool execution failed");
                serde_json::json!({ "error": format!("{name} failed: {e}") })
            }
        }
    }

    fn build_messages(
        &self,
        session: &Session,
        user_text: &str,
    ) -> Result<Vec<ChatCompletionRequestMessage>> {
        let struggles = if session.struggles.is_empty() {
            "none recorded yet".to_string()
        } else {
            session.struggles.join(", ")
        };
        let system = format!(
            "{}\n\n# Session Context\n\nRepository: {}\nLearner goal: {}\nStruggle concepts: {}",
            self.system_prompt, session.repo, session.goal, struggles
        );

        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()?
                .into(),
        ];
        for msg in &session.messages {
            match msg.role {
                MessageRole::User => messages.push(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(msg.content.clone())
                        .build()?
                        .into(),
                ),
                MessageRole::Assistant => messages.push(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(msg.content.clone())
                        .build()?
                        .into(),
                ),
            }
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_text.to_string())
                .build()?
                .into(),
        );
        Ok(messages)
    }
}

/// Compacts a tool result for the reasoning-step event stream. The full
/// result still goes back to the model; only the client-facing step is
/// truncated.
fn summarize(value: &serde_json::Value) -> serde_json::Value {
    let rendered = value.to_string();
    if rendered.len() <= STEP_PAYLOAD_CHARS {
        value.clone()
    } else {
        let truncated: String = rendered.chars().take(STEP_PAYLOAD_CHARS).collect();
        serde_json::Value::String(format!("{truncated}…"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::RepoAnalyzer;
    use crate::embedding::Embedder;
    use crate::generators::Generators;
    use crate::llm_client::ToolCall;
    use crate::repo::{RepoClient, RepoFile};
    use crate::search::CodeSearch;
    use crate::session::{ReasoningKind, RepoRef};
    use crate::vector::{ScoredRecord, VectorIndex, VectorMetadata, VectorRecord};
    use async_openai::types::{ChatCompletionTool, ChatCompletionToolType, FunctionCall};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct ScriptedLLM {
        actions: Mutex<VecDeque<Result<LLMAction>>>,
    }

    impl ScriptedLLM {
        fn new(actions: Vec<Result<LLMAction>>) -> Self {
            Self {
                actions: Mutex::new(actions.into()),
            }
        }
    }

    #[async_trait]
    impl LLMClient for ScriptedLLM {
        async fn decide_action(
            &self,
            _messages: Vec<ChatCompletionRequestMessage>,
            _tools: Vec<ChatCompletionTool>,
        ) -> Result<LLMAction> {
            self.actions
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(LLMAction::TextResponse("done".into())))
        }

        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            Ok("a primer".into())
        }
    }

    struct FakeRepo;

    #[async_trait]
    impl RepoClient for FakeRepo {
        async fn list_files(&self, _repo: &RepoRef) -> Result<Vec<RepoFile>> {
            Ok(vec![RepoFile {
                path: "src/main.rs".into(),
                size: 1,
            }])
        }
        async fn fetch_file(&self, _repo: &RepoRef, _path: &str) -> Result<String> {
            Ok("fn main() {}".into())
        }
    }

    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0; 4])
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }
        fn dimensions(&self) -> usize {
            4
        }
    }

    struct OneHitIndex;

    #[async_trait]
    impl VectorIndex for OneHitIndex {
        async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<()> {
            Ok(())
        }
        async fn query(
            &self,
            _vector: Vec<f32>,
            repo: &RepoRef,
            _top_k: usize,
        ) -> Result<Vec<ScoredRecord>> {
            Ok(vec![ScoredRecord {
                id: "abc-0".into(),
                score: 0.91,
                metadata: VectorMetadata {
                    repo: repo.to_string(),
                    path: "src/middleware.rs".into(),
                    language: "Rust".into(),
                    chunk_index: 0,
                    total_chunks: 1,
                    preview: "fn layer() {}".into(),
                },
            }])
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        steps: Mutex<Vec<ReasoningStep>>,
    }

    #[async_trait]
    impl ReasoningSink for RecordingSink {
        async fn emit(&self, step: ReasoningStep) {
            self.steps.lock().unwrap().push(step);
        }
    }

    fn orchestrator(actions: Vec<Result<LLMAction>>) -> TurnOrchestrator {
        let llm: Arc<dyn LLMClient> = Arc::new(ScriptedLLM::new(actions));
        let repo: Arc<dyn RepoClient> = Arc::new(FakeRepo);
        let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder);
        let index: Arc<dyn VectorIndex> = Arc::new(OneHitIndex);
        let prompts = [
            ("concept_primer", "{concept}"),
            ("socratic_question", "{goal}"),
            ("study_plan", "{goal}"),
            ("flashcards", "{goal}"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let toolbox = Toolbox::new(
            Arc::new(RepoAnalyzer::new(repo, llm.clone(), "{files}".into())),
            Arc::new(CodeSearch::new(embedder, index)),
            Arc::new(Generators::new(llm.clone(), prompts)),
        );
        TurnOrchestrator::new(llm, Arc::new(toolbox), "You are a tutor.".into())
    }

    fn tool_call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            r#type: ChatCompletionToolType::Function,
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    fn session() -> Session {
        Session::new(
            Uuid::new_v4(),
            "octocat/hello-world".parse().unwrap(),
            "understand middleware",
        )
    }

    #[tokio::test]
    async fn tool_invoked_precedes_its_result_and_final_message_is_last() {
        let orchestrator = orchestrator(vec![
            Ok(LLMAction::ToolCall(vec![tool_call(
                "code_search",
                r#"{"query": "middleware"}"#,
            )])),
            Ok(LLMAction::TextResponse(
                "What do you think a layer wraps?".into(),
            )),
        ]);
        let sink = RecordingSink::default();

        let reply = orchestrator
            .run_turn(&session(), "what is middleware?", &sink)
            .await;

        let steps = sink.steps.lock().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].kind, ReasoningKind::ToolInvoked);
        assert_eq!(steps[0].tool.as_deref(), Some("code_search"));
        assert_eq!(steps[1].kind, ReasoningKind::ToolResult);
        assert_eq!(steps[1].tool.as_deref(), Some("code_search"));
        assert!(steps[1].timestamp >= steps[0].timestamp);

        assert!(reply.content.contains('?'));
        assert_eq!(reply.reasoning.len(), 2);
        // The final message carries the same steps that were streamed.
        assert!(reply.timestamp >= steps[1].timestamp);
    }

    #[tokio::test]
    async fn model_failure_degrades_to_apologetic_reply() {
        let orchestrator = orchestrator(vec![Err(anyhow::anyhow!("inference backend down"))]);
        let sink = RecordingSink::default();

        let reply = orchestrator.run_turn(&session(), "hello", &sink).await;

        assert_eq!(reply.content, FALLBACK_REPLY);
        assert!(sink.steps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_from_model_is_fed_back_not_fatal() {
        let orchestrator = orchestrator(vec![
            Ok(LLMAction::ToolCall(vec![tool_call("teleport", "{}")])),
            Ok(LLMAction::TextResponse("Let's stick to the code.".into())),
        ]);
        let sink = RecordingSink::default();

        let reply = orchestrator.run_turn(&session(), "hi", &sink).await;

        let steps = sink.steps.lock().unwrap();
        assert_eq!(steps.len(), 2);
        let payload = steps[1].payload.as_ref().unwrap().to_string();
        assert!(payload.contains("Unknown tool"));
        assert_eq!(reply.content, "Let's stick to the code.");
    }

    #[tokio::test]
    async fn round_budget_forces_a_text_answer() {
        // The model asks for the same tool forever.
        let mut actions: Vec<Result<LLMAction>> = (0..MAX_TOOL_ROUNDS)
            .map(|_| {
                Ok(LLMAction::ToolCall(vec![tool_call(
                    "code_search",
                    r#"{"query": "x"}"#,
                )]))
            })
            .collect();
        actions.push(Ok(LLMAction::TextResponse("Final answer.".into())));
        let orchestrator = orchestrator(actions);
        let sink = RecordingSink::default();

        let reply = orchestrator.run_turn(&session(), "hi", &sink).await;

        assert_eq!(reply.content, "Final answer.");
        assert_eq!(sink.steps.lock().unwrap().len(), MAX_TOOL_ROUNDS * 2);
    }

    #[test]
    fn summarize_truncates_large_payloads() {
        let big = serde_json::Value::String("x".repeat(5000));
        let summarized = summarize(&big);
        let text = summarized.as_str().unwrap();
        assert!(text.chars().count() <= STEP_PAYLOAD_CHARS + 1);
        assert!(text.ends_with('…'));
    }
}
