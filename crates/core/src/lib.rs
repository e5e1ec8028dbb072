//! Core library for the repository tutor.
//!
//! Everything here is transport-agnostic: the domain model, the hosted
//! model/embedding/transcription clients, the closed tool registry, the
//! turn orchestrator, and the ingestion/search pipelines over the vector
//! index. The web service in `services/api` owns sessions (one actor per
//! session id) and wires these pieces to a realtime channel.

pub mod analysis;
pub mod chunker;
pub mod embedding;
pub mod generators;
pub mod ingest;
pub mod llm_client;
pub mod orchestrator;
pub mod repo;
pub mod search;
pub mod session;
pub mod struggle;
pub mod tools;
pub mod vector;
pub mod voice;
