//! Semantic code search over the vector index.

use crate::embedding::Embedder;
use crate::session::RepoRef;
use crate::vector::VectorIndex;
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

pub const DEFAULT_TOP_K: usize = 5;

/// One search match. Carries a short preview (never the full file) so
/// tool results stay small enough to re-inject into the model's context.
#[derive(Serialize, Debug, Clone)]
pub struct SearchHit {
    pub file_path: String,
    pub language: String,
    pub score: f32,
    pub preview: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
}

pub struct CodeSearch {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl CodeSearch {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Embeds `query` with the ingestion-time embedder and returns the
    /// nearest chunks for `repo`, best first.
    pub async fn search(
        &self,
        query: &str,
        repo: &RepoRef,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let vector = self.embedder.embed(query).await?;
        let matches = self.index.query(vector, repo, top_k).await?;
        Ok(matches
            .into_iter()
            .map(|m| SearchHit {
                file_path: m.metadata.path,
                language: m.metadata.language,
                score: m.score,
                preview: m.metadata.preview,
                chunk_index: m.metadata.chunk_index,
                total_chunks: m.metadata.total_chunks,
            })
            .collect())
    }
}

/// Renders hits as a tool result. An empty set becomes a descriptive
/// message the orchestrator can relay to the model as-is.
pub fn render_hits(query: &str, repo: &RepoRef, hits: &[SearchHit]) -> serde_json::Value {
    if hits.is_empty() {
        serde_json::Value::String(format!(
            "No indexed code in {repo} matched '{query}'. The repository may still be ingesting."
        ))
    } else {
        serde_json::json!({ "query": query, "results": hits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(path: &str) -> SearchHit {
        SearchHit {
            file_path: path.into(),
            language: "Rust".into(),
            score: 0.9,
            preview: "fn main() {}".into(),
            chunk_index: 0,
            total_chunks: 1,
        }
    }

    #[test]
    fn empty_results_render_as_not_found_text() {
        let repo: RepoRef = "octocat/hello-world".parse().unwrap();
        let rendered = render_hits("middleware", &repo, &[]);
        let text = rendered.as_str().expect("empty result should be a string");
        assert!(text.contains("No indexed code"));
        assert!(text.contains("middleware"));
    }

    #[test]
    fn hits_render_as_structured_results() {
        let repo: RepoRef = "octocat/hello-world".parse().unwrap();
        let rendered = render_hits("main", &repo, &[hit("src/main.rs")]);
        assert_eq!(rendered["results"][0]["file_path"], "src/main.rs");
        assert_eq!(rendered["query"], "main");
    }
}
