//! Records and client for the hosted vector index.
//!
//! The index is an external service supporting batched upsert and filtered
//! nearest-neighbor queries. Record ids are short and deterministic so that
//! re-ingesting a repository overwrites instead of duplicating.

use crate::session::RepoRef;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Maximum characters kept in a record's content preview.
pub const PREVIEW_CHARS: usize = 200;

/// Metadata stored alongside each embedding vector.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VectorMetadata {
    /// Repository the chunk came from, as `owner/name`.
    pub repo: String,
    pub path: String,
    pub language: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Short excerpt of the chunk body, never the full file.
    pub preview: String,
}

/// One embedded chunk, ready for upsert.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// A query match returned by the index.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScoredRecord {
    pub id: String,
    pub score: f32,
    pub metadata: VectorMetadata,
}

/// Derives the stable id for a chunk of a repository file.
///
/// The raw path is hashed rather than embedded because index keys have a
/// length limit; 16 hex chars of SHA-256 plus the chunk index keeps ids
/// short while staying deterministic for (repo, path, chunk).
pub fn record_id(repo: &RepoRef, path: &str, chunk_index: u32) -> String {
    let digest = Sha256::digest(format!("{repo}:{path}").as_bytes());
    format!("{}-{chunk_index}", &hex::encode(digest)[..16])
}

/// Truncates chunk text to a preview, respecting char boundaries.
pub fn preview_of(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserts or overwrites the given records in one batched write.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Returns the `top_k` nearest neighbors of `vector`, restricted to
    /// records belonging to `repo`, best match first.
    async fn query(&self, vector: Vec<f32>, repo: &RepoRef, top_k: usize)
    -> Result<Vec<ScoredRecord>>;
}

/// A `VectorIndex` speaking a JSON upsert/query HTTP API.
pub struct HttpVectorIndex {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    records: &'a [VectorRecord],
}

#[derive(Serialize)]
struct QueryRequest {
    vector: Vec<f32>,
    #[serde(rename = "topK")]
    top_k: usize,
    filter: QueryFilter,
}

#[derive(Serialize)]
struct QueryFilter {
    repo: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    matches: Vec<ScoredRecord>,
}

impl HttpVectorIndex {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let url = format!("{}/vectors/upsert", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&UpsertRequest { records: &records })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("vector upsert failed ({status}): {body}"));
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: Vec<f32>,
        repo: &RepoRef,
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let url = format!("{}/vectors/query", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&QueryRequest {
                vector,
                top_k,
                filter: QueryFilter {
                    repo: repo.to_string(),
                },
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("vector query failed ({status}): {body}"));
        }

        let result: QueryResponse = response.json().await.context("decoding query response")?;
        Ok(result.matches)
    }
}
