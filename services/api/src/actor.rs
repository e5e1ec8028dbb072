//! Per-session actors and the manager that routes to them.
//!
//! Each live session is owned by exactly one tokio task holding the
//! `Session` value and a command mailbox. Every operation (state reads,
//! partial updates, text and voice turns, artifact generation) is a
//! message processed strictly sequentially by that task, so read-modify-
//! write sequences are race-free by ownership, not locking. Distinct
//! sessions run fully concurrently. The session outlives any WebSocket
//! connection: connections attach and detach; the actor persists every
//! mutation to the durable store and is torn down only by the idle sweep.

use crate::store::SessionStore;
use crate::ws::protocol::ServerEvent;
use chrono::{Duration, Utc};
use mentor_core::generators::Generators;
use mentor_core::orchestrator::{ReasoningSink, TurnOrchestrator};
use mentor_core::session::{
    Flashcard, Message, ReasoningStep, RepoRef, Session, SessionUpdate, StudyPlan,
};
use mentor_core::struggle::{detect_struggle, extract_candidate_concepts};
use mentor_core::voice::{Transcriber, transcribe_payload};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

/// Sessions idle longer than this are deleted by the sweep.
pub const RETENTION_HOURS: i64 = 24;

/// How often the sweep runs.
const SWEEP_INTERVAL_SECS: u64 = 3600;

/// Command mailbox depth per session.
const MAILBOX_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session '{0}' not found")]
    NotFound(Uuid),
    #[error("Session '{0}' already exists")]
    AlreadyExists(Uuid),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Everything an actor needs besides its own session.
pub struct ActorDeps {
    pub store: Arc<dyn SessionStore>,
    pub orchestrator: Arc<TurnOrchestrator>,
    pub transcriber: Arc<dyn Transcriber>,
    pub generators: Arc<Generators>,
}

pub enum SessionCommand {
    GetState {
        reply: oneshot::Sender<Session>,
    },
    ApplyUpdate {
        update: SessionUpdate,
        reply: oneshot::Sender<Session>,
    },
    /// Registers a gateway connection to receive this session's events.
    Attach {
        events: mpsc::UnboundedSender<ServerEvent>,
    },
    Text {
        text: String,
        /// Present for the non-streaming REST path.
        reply: Option<oneshot::Sender<Message>>,
    },
    Voice {
        audio_base64: String,
    },
    GenerateFlashcards {
        reply: oneshot::Sender<anyhow::Result<Vec<Flashcard>>>,
    },
    GeneratePlan {
        reply: oneshot::Sender<anyhow::Result<StudyPlan>>,
    },
    Shutdown,
}

/// Forwards reasoning steps to the connections attached at turn start.
struct FanoutSink {
    connections: Vec<mpsc::UnboundedSender<ServerEvent>>,
}

#[async_trait::async_trait]
impl ReasoningSink for FanoutSink {
    async fn emit(&self, step: ReasoningStep) {
        for tx in &self.connections {
            let _ = tx.send(ServerEvent::ReasoningStep { step: step.clone() });
        }
    }
}

struct SessionActor {
    session: Session,
    connections: Vec<mpsc::UnboundedSender<ServerEvent>>,
    deps: Arc<ActorDeps>,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::Receiver<SessionCommand>) {
        info!("Session actor started");
        while let Some(command) = rx.recv().await {
            match command {
                SessionCommand::GetState { reply } => {
                    let _ = reply.send(self.session.clone());
                }
                SessionCommand::ApplyUpdate { update, reply } => {
                    self.session.merge(update);
                    self.persist().await;
                    let _ = reply.send(self.session.clone());
                }
                SessionCommand::Attach { events } => {
                    let _ = events.send(ServerEvent::Connected {
                        session_id: self.session.id,
                    });
                    self.connections.push(events);
                }
                SessionCommand::Text { text, reply } => {
                    let message = self.handle_text(&text).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(message);
                    }
                }
                SessionCommand::Voice { audio_base64 } => {
                    self.handle_voice(&audio_base64).await;
                }
                SessionCommand::GenerateFlashcards { reply } => {
                    let result = self.deps.generators.flashcards(&self.session).await;
                    if let Ok(cards) = &result {
                        self.session.flashcards = Some(cards.clone());
                        self.session.touch();
                        self.persist().await;
                    }
                    let _ = reply.send(result);
                }
                SessionCommand::GeneratePlan { reply } => {
                    let result = self.deps.generators.study_plan(&self.session).await;
                    if let Ok(plan) = &result {
                        self.session.study_plan = Some(plan.clone());
                        self.session.touch();
                        self.persist().await;
                    }
                    let _ = reply.send(result);
                }
                SessionCommand::Shutdown => break,
            }
        }
        info!("Session actor stopped");
    }

    /// Runs one text turn: orchestrate, record history and struggles,
    /// persist, then emit the terminal `text_response`.
    async fn handle_text(&mut self, text: &str) -> Message {
        self.broadcast(ServerEvent::Status {
            message: "Thinking...".to_string(),
        });

        let sink = FanoutSink {
            connections: self.connections.clone(),
        };
        let assistant = self
            .deps
            .orchestrator
            .run_turn(&self.session, text, &sink)
            .await;

        self.session.messages.push(Message::user(text));
        if detect_struggle(text) {
            for concept in extract_candidate_concepts(&self.session.messages) {
                if self.session.add_struggle(&concept) {
                    info!(concept, "Tracked struggle concept");
                }
            }
        }
        self.session.messages.push(assistant.clone());
        self.session.touch();
        self.persist().await;

        self.broadcast(ServerEvent::TextResponse {
            message: assistant.content.clone(),
            timestamp: assistant.timestamp,
        });
        assistant
    }

    /// Runs one voice turn. Transcription problems surface as an `error`
    /// event; the turn never continues with empty text.
    async fn handle_voice(&mut self, audio_base64: &str) {
        self.broadcast(ServerEvent::Status {
            message: "Transcribing audio...".to_string(),
        });

        match transcribe_payload(self.deps.transcriber.as_ref(), audio_base64).await {
            Ok(text) => {
                self.broadcast(ServerEvent::Transcription { text: text.clone() });
                self.handle_text(&text).await;
            }
            Err(e) => {
                warn!(error = %e, "Voice turn aborted");
                self.broadcast(ServerEvent::Error {
                    message: e.to_string(),
                });
            }
        }
    }

    fn broadcast(&mut self, event: ServerEvent) {
        self.connections.retain(|tx| tx.send(event.clone()).is_ok());
    }

    async fn persist(&self) {
        if let Err(e) = self.deps.store.save(&self.session).await {
            // The in-memory copy stays authoritative; the next mutation
            // retries the write.
            error!(session_id = %self.session.id, error = ?e, "Failed to persist session");
        }
    }
}

/// Routes operations to per-session actors, spawning or re-hydrating them
/// as needed so that at most one live owner exists per id.
pub struct SessionManager {
    actors: Mutex<HashMap<Uuid, mpsc::Sender<SessionCommand>>>,
    deps: Arc<ActorDeps>,
}

impl SessionManager {
    pub fn new(deps: Arc<ActorDeps>) -> Self {
        Self {
            actors: Mutex::new(HashMap::new()),
            deps,
        }
    }

    fn spawn_actor(&self, session: Session) -> mpsc::Sender<SessionCommand> {
        let (tx, rx) = mpsc::channel(MAILBOX_SIZE);
        let span = tracing::info_span!("session_actor", session_id = %session.id);
        let actor = SessionActor {
            session,
            connections: Vec::new(),
            deps: self.deps.clone(),
        };
        tokio::spawn(actor.run(rx).instrument(span));
        tx
    }

    /// Creates a session, failing with `AlreadyExists` if the id is live
    /// or stored.
    pub async fn init(
        &self,
        id: Uuid,
        repo: RepoRef,
        goal: String,
    ) -> Result<Session, SessionError> {
        let mut actors = self.actors.lock().await;
        if actors.get(&id).is_some_and(|tx| !tx.is_closed()) {
            return Err(SessionError::AlreadyExists(id));
        }
        if self.deps.store.load(id).await?.is_some() {
            return Err(SessionError::AlreadyExists(id));
        }

        let session = Session::new(id, repo, goal);
        self.deps.store.save(&session).await?;
        actors.insert(id, self.spawn_actor(session.clone()));
        Ok(session)
    }

    /// Returns the mailbox for `id`, re-hydrating a stored session into a
    /// fresh actor if no live one exists.
    async fn handle(&self, id: Uuid) -> Result<mpsc::Sender<SessionCommand>, SessionError> {
        let mut actors = self.actors.lock().await;
        if let Some(tx) = actors.get(&id) {
            if !tx.is_closed() {
                return Ok(tx.clone());
            }
        }
        match self.deps.store.load(id).await? {
            Some(session) => {
                info!(session_id = %id, "Re-hydrating session from store");
                let tx = self.spawn_actor(session);
                actors.insert(id, tx.clone());
                Ok(tx)
            }
            None => Err(SessionError::NotFound(id)),
        }
    }

    async fn request<T>(
        &self,
        id: Uuid,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let tx = self.handle(id).await?;
        let (reply, rx) = oneshot::channel();
        tx.send(make(reply))
            .await
            .map_err(|_| SessionError::Internal(anyhow::anyhow!("session actor is gone")))?;
        rx.await
            .map_err(|_| SessionError::Internal(anyhow::anyhow!("session actor dropped reply")))
    }

    pub async fn get_state(&self, id: Uuid) -> Result<Session, SessionError> {
        self.request(id, |reply| SessionCommand::GetState { reply })
            .await
    }

    pub async fn apply_update(
        &self,
        id: Uuid,
        update: SessionUpdate,
    ) -> Result<Session, SessionError> {
        self.request(id, |reply| SessionCommand::ApplyUpdate { update, reply })
            .await
    }

    /// Runs a text turn and waits for the assistant's reply (REST path).
    pub async fn send_text(&self, id: Uuid, text: String) -> Result<Message, SessionError> {
        self.request(id, |reply| SessionCommand::Text {
            text,
            reply: Some(reply),
        })
        .await
    }

    /// Enqueues a turn without waiting for the reply (realtime path; the
    /// result arrives over attached connections).
    pub async fn enqueue(&self, id: Uuid, command: SessionCommand) -> Result<(), SessionError> {
        let tx = self.handle(id).await?;
        tx.send(command)
            .await
            .map_err(|_| SessionError::Internal(anyhow::anyhow!("session actor is gone")))
    }

    pub async fn generate_flashcards(&self, id: Uuid) -> Result<Vec<Flashcard>, SessionError> {
        self.request(id, |reply| SessionCommand::GenerateFlashcards { reply })
            .await?
            .map_err(SessionError::Internal)
    }

    pub async fn generate_plan(&self, id: Uuid) -> Result<StudyPlan, SessionError> {
        self.request(id, |reply| SessionCommand::GeneratePlan { reply })
            .await?
            .map_err(SessionError::Internal)
    }

    /// Shuts down and deletes every session idle beyond the retention
    /// window.
    pub async fn sweep(&self) {
        let ids: Vec<Uuid> = self.actors.lock().await.keys().copied().collect();
        let cutoff = Utc::now() - Duration::hours(RETENTION_HOURS);

        for id in ids {
            let state = match self.get_state(id).await {
                Ok(state) => state,
                Err(_) => continue,
            };
            if state.last_activity >= cutoff {
                continue;
            }

            info!(session_id = %id, "Sweeping idle session");
            let mut actors = self.actors.lock().await;
            if let Some(tx) = actors.remove(&id) {
                let _ = tx.send(SessionCommand::Shutdown).await;
            }
            drop(actors);
            if let Err(e) = self.deps.store.delete(id).await {
                error!(session_id = %id, error = ?e, "Failed to delete swept session");
            }
        }
    }

    /// Spawns the periodic sweep task.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                manager.sweep().await;
            }
        })
    }
}
