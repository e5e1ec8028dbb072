//! Defines the WebSocket message protocol between the browser client and the API server.
//!
//! Ordering contract: for each client event the server emits zero or more
//! `status` / `reasoning_step` / `transcription` events followed by exactly
//! one terminal `text_response` or `error`. `pong` replies to `ping` and
//! sits outside that contract.

use chrono::{DateTime, Utc};
use mentor_core::session::ReasoningStep;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events sent from the client (browser) to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A text utterance for the tutor.
    Text { message: String },
    /// A base64-encoded audio blob to transcribe and process.
    Voice { audio: String },
    /// Client-side heartbeat.
    Ping,
}

/// Events sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Confirms the channel is attached to a session.
    Connected { session_id: Uuid },
    /// Transient progress text while a turn is executing.
    Status { message: String },
    /// One unit of the orchestrator's intermediate work, forwarded live.
    ReasoningStep { step: ReasoningStep },
    /// The transcription of a voice event, sent before the turn runs.
    Transcription { text: String },
    /// The terminal event of a successful turn.
    TextResponse {
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// The terminal event of a failed client message.
    Error { message: String },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_deserialize_from_wire_format() {
        let text: ClientEvent =
            serde_json::from_str(r#"{"type": "text", "message": "hi"}"#).unwrap();
        assert!(matches!(text, ClientEvent::Text { message } if message == "hi"));

        let voice: ClientEvent =
            serde_json::from_str(r#"{"type": "voice", "audio": "AAAA"}"#).unwrap();
        assert!(matches!(voice, ClientEvent::Voice { audio } if audio == "AAAA"));

        let ping: ClientEvent = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert!(matches!(ping, ClientEvent::Ping));
    }

    #[test]
    fn unknown_client_event_kind_is_a_parse_error() {
        let result = serde_json::from_str::<ClientEvent>(r#"{"type": "dance"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn server_events_serialize_with_snake_case_tags() {
        let connected = ServerEvent::Connected {
            session_id: Uuid::nil(),
        };
        let json = serde_json::to_string(&connected).unwrap();
        assert!(json.contains(r#""type":"connected""#));
        assert!(json.contains("session_id"));

        let json = serde_json::to_string(&ServerEvent::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);

        let json = serde_json::to_string(&ServerEvent::TextResponse {
            message: "hello".into(),
            timestamp: Utc::now(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"text_response""#));
    }
}
