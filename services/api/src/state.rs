//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the session manager and pipeline services.

use crate::actor::SessionManager;
use crate::config::Config;
use mentor_core::{analysis::RepoAnalyzer, ingest::IngestionPipeline, search::CodeSearch};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub analyzer: Arc<RepoAnalyzer>,
    pub pipeline: Arc<IngestionPipeline>,
    pub search: Arc<CodeSearch>,
    pub config: Arc<Config>,
}
