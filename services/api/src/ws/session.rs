//! Manages the WebSocket connection lifecycle for one session.
//!
//! A connection is a thin duplex pipe: client events are forwarded into
//! the session actor, and the actor's events (status, reasoning steps,
//! transcriptions, terminal responses) stream back over the same socket.
//! The connection owns no session state; dropping it leaves the session
//! and any in-flight turn untouched.

use crate::actor::{SessionCommand, SessionError};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::protocol::{ClientEvent, ServerEvent};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

/// Main handler for an individual WebSocket connection.
#[instrument(name = "ws_session", skip_all, fields(%session_id))]
async fn handle_socket(socket: WebSocket, session_id: Uuid, state: Arc<AppState>) {
    info!("New WebSocket connection");
    let (mut socket_tx, mut socket_rx) = socket.split();

    // Attach to the session actor; it answers with a `connected` event
    // through this channel, so a missing session fails before the client
    // sees anything else.
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    if let Err(e) = state
        .sessions
        .enqueue(session_id, SessionCommand::Attach { events: events_tx })
        .await
    {
        let message = match e {
            SessionError::NotFound(id) => format!("Session '{id}' not found"),
            other => other.to_string(),
        };
        let _ = send_event(&mut socket_tx, &ServerEvent::Error { message }).await;
        return;
    }

    loop {
        tokio::select! {
            // Events from the session actor, forwarded to the client.
            Some(event) = events_rx.recv() => {
                if send_event(&mut socket_tx, &event).await.is_err() {
                    break;
                }
            },
            // Frames from the client.
            incoming = socket_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if handle_client_event(&text, session_id, &state, &mut socket_tx)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Client closed connection");
                        break;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => {}
                    Some(Err(e)) => {
                        warn!(error = ?e, "WebSocket receive error");
                        break;
                    }
                }
            },
            else => break,
        }
    }

    // The actor drops this connection's sender on its next broadcast; any
    // in-flight turn still completes and persists.
    info!("WebSocket connection closed");
}

/// Dispatches one parsed client event. Unknown or malformed events produce
/// an `error` event without closing the channel.
async fn handle_client_event(
    text: &str,
    session_id: Uuid,
    state: &Arc<AppState>,
    socket_tx: &mut SplitSink<WebSocket, Message>,
) -> Result<()> {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Unrecognized client event");
            return send_event(
                socket_tx,
                &ServerEvent::Error {
                    message: "Unrecognized event".to_string(),
                },
            )
            .await;
        }
    };

    let command = match event {
        ClientEvent::Ping => {
            return send_event(socket_tx, &ServerEvent::Pong).await;
        }
        ClientEvent::Text { message } => SessionCommand::Text {
            text: message,
            reply: None,
        },
        ClientEvent::Voice { audio } => SessionCommand::Voice {
            audio_base64: audio,
        },
    };

    if let Err(e) = state.sessions.enqueue(session_id, command).await {
        warn!(error = %e, "Failed to enqueue client event");
        return send_event(
            socket_tx,
            &ServerEvent::Error {
                message: e.to_string(),
            },
        )
        .await;
    }
    Ok(())
}

/// Serializes and sends one `ServerEvent` to the client.
async fn send_event(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<()> {
    let serialized = serde_json::to_string(event)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
