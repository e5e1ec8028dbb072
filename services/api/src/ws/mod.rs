//! Realtime gateway for tutoring sessions.
//!
//! - `protocol`: the JSON event format between browser and server.
//! - `session`: the per-connection socket loop, multiplexing client events
//!   into the session actor and actor events back out.

pub mod protocol;
pub mod session;

pub use session::ws_handler;
