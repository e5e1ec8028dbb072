//! REST request/response payloads.
//!
//! These are the API-boundary shapes only; the session document itself
//! lives in `mentor_core::session` and is returned as-is.

use chrono::{DateTime, Utc};
use mentor_core::session::Message;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema, Debug)]
pub struct AnalyzeRequest {
    /// Repository to analyze, as `owner/name`.
    #[schema(example = "tokio-rs/axum")]
    pub repo: String,
    /// What the learner wants to get out of the repository.
    #[schema(example = "understand middleware")]
    pub goal: String,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct SendMessageRequest {
    #[schema(example = "what is middleware?")]
    pub message: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct SendMessageResponse {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl From<Message> for SendMessageResponse {
    fn from(message: Message) -> Self {
        Self {
            message: message.content,
            timestamp: message.timestamp,
        }
    }
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct IngestRequest {
    /// Repository to ingest, as `owner/name`.
    pub repo: String,
    /// Cursor from the previous invocation; defaults to 0.
    #[serde(default)]
    pub start_index: Option<usize>,
    /// Files per invocation; defaults to the pipeline's batch size.
    #[serde(default)]
    pub batch_size: Option<usize>,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct SearchRequest {
    /// Repository to search, as `owner/name`.
    pub repo: String,
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_request_requires_both_fields() {
        let ok: AnalyzeRequest =
            serde_json::from_str(r#"{"repo": "octocat/hello-world", "goal": "learn"}"#).unwrap();
        assert_eq!(ok.repo, "octocat/hello-world");
        assert_eq!(ok.goal, "learn");

        assert!(serde_json::from_str::<AnalyzeRequest>(r#"{"repo": "a/b"}"#).is_err());
    }

    #[test]
    fn ingest_request_defaults_are_optional() {
        let req: IngestRequest = serde_json::from_str(r#"{"repo": "a/b"}"#).unwrap();
        assert_eq!(req.start_index, None);
        assert_eq!(req.batch_size, None);

        let req: IngestRequest =
            serde_json::from_str(r#"{"repo": "a/b", "start_index": 8, "batch_size": 4}"#).unwrap();
        assert_eq!(req.start_index, Some(8));
        assert_eq!(req.batch_size, Some(4));
    }

    #[test]
    fn send_message_response_from_core_message() {
        let message = Message::assistant("hello", vec![]);
        let response = SendMessageResponse::from(message.clone());
        assert_eq!(response.message, "hello");
        assert_eq!(response.timestamp, message.timestamp);
    }

    #[test]
    fn error_response_serialization() {
        let error = ErrorResponse {
            message: "Session not found".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, r#"{"message":"Session not found"}"#);
    }
}
