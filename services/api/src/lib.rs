//! Mentor API Library Crate
//!
//! This library contains all the core logic for the tutoring web service:
//! configuration, the durable session store, the per-session actors and
//! their manager, REST handlers, routing, and the realtime WebSocket
//! gateway. The `bin/api.rs` binary is a thin wrapper around this library.

pub mod actor;
pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod store;
pub mod ws;
