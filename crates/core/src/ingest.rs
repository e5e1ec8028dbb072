//! Resumable ingestion pipeline: repository text into the vector index.
//!
//! A single invocation may only issue a bounded number of outbound calls,
//! so the pipeline processes one slice of the repository's file list per
//! call and hands back a cursor. Callers repeat with `next_index` until
//! `has_more` is false. Because record ids are deterministic (see
//! [`crate::vector::record_id`]), overlapping or repeated invocations are
//! safe to retry.

use crate::chunker::{MAX_CHUNK_CHARS, chunk_lines};
use crate::embedding::Embedder;
use crate::repo::RepoClient;
use crate::session::RepoRef;
use crate::vector::{VectorIndex, VectorMetadata, VectorRecord, preview_of, record_id};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Number of files handled per invocation when the caller does not choose.
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// Extensions considered text-like source material worth embedding.
const TEXT_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "py", "go", "java", "kt", "rb", "c", "h", "cpp", "hpp", "cs",
    "swift", "scala", "php", "sh", "sql", "html", "css", "scss", "vue", "svelte", "md", "toml",
    "yaml", "yml", "json",
];

/// Maps a file path to a display language name for metadata.
pub fn language_of(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or_default() {
        "rs" => "Rust",
        "ts" | "tsx" => "TypeScript",
        "js" | "jsx" => "JavaScript",
        "py" => "Python",
        "go" => "Go",
        "java" => "Java",
        "kt" => "Kotlin",
        "rb" => "Ruby",
        "c" | "h" => "C",
        "cpp" | "hpp" => "C++",
        "cs" => "C#",
        "swift" => "Swift",
        "scala" => "Scala",
        "php" => "PHP",
        "sh" => "Shell",
        "sql" => "SQL",
        "html" => "HTML",
        "css" | "scss" => "CSS",
        "vue" => "Vue",
        "svelte" => "Svelte",
        "md" => "Markdown",
        "toml" | "yaml" | "yml" | "json" => "Config",
        _ => "Text",
    }
}

/// True if the path's extension is on the ingestion allow-list.
pub fn is_text_file(path: &str) -> bool {
    path.rsplit('.')
        .next()
        .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext))
}

/// The outcome of one ingestion invocation.
#[derive(Serialize, Debug, Clone)]
pub struct IngestReport {
    pub files_processed: usize,
    pub files_failed: usize,
    pub chunks_embedded: usize,
    /// True iff files remain beyond this invocation's slice.
    pub has_more: bool,
    /// The cursor to pass as `start_index` on the next invocation.
    pub next_index: usize,
}

pub struct IngestionPipeline {
    repo_client: Arc<dyn RepoClient>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl IngestionPipeline {
    pub fn new(
        repo_client: Arc<dyn RepoClient>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            repo_client,
            embedder,
            index,
        }
    }

    /// Ingests the slice `[start_index, start_index + batch_size)` of the
    /// repository's filtered, path-sorted source file list.
    ///
    /// A file whose fetch or embedding fails is counted in `files_failed`
    /// and skipped; it is not retried and does not stall the cursor.
    pub async fn ingest(
        &self,
        repo: &RepoRef,
        start_index: usize,
        batch_size: usize,
    ) -> Result<IngestReport> {
        let mut files: Vec<String> = self
            .repo_client
            .list_files(repo)
            .await?
            .into_iter()
            .filter(|f| is_text_file(&f.path))
            .map(|f| f.path)
            .collect();
        files.sort();

        let total = files.len();
        let end = (start_index + batch_size).min(total);
        let slice = files.get(start_index..end).unwrap_or_default();

        let mut report = IngestReport {
            files_processed: 0,
            files_failed: 0,
            chunks_embedded: 0,
            has_more: end < total,
            // Never moves backwards, even for a cursor already past the end.
            next_index: end.max(start_index),
        };

        for path in slice {
            match self.ingest_file(repo, path).await {
                Ok(chunks) => {
                    report.files_processed += 1;
                    report.chunks_embedded += chunks;
                }
                Err(e) => {
                    warn!(%repo, path, error = ?e, "Skipping file after ingestion failure");
                    report.files_failed += 1;
                }
            }
        }

        info!(
            %repo,
            start_index,
            processed = report.files_processed,
            failed = report.files_failed,
            chunks = report.chunks_embedded,
            has_more = report.has_more,
            "Ingestion batch finished"
        );
        Ok(report)
    }

    /// Chunks, embeds, and upserts one file. Returns the chunk count.
    async fn ingest_file(&self, repo: &RepoRef, path: &str) -> Result<usize> {
        let content = self.repo_client.fetch_file(repo, path).await?;
        let chunks = chunk_lines(&content, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Ok(0);
        }

        let vectors = self.embedder.embed_batch(&chunks).await?;
        let total_chunks = chunks.len() as u32;
        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (chunk, values))| VectorRecord {
                id: record_id(repo, path, i as u32),
                values,
                metadata: VectorMetadata {
                    repo: repo.to_string(),
                    path: path.to_string(),
                    language: language_of(path).to_string(),
                    chunk_index: i as u32,
                    total_chunks,
                    preview: preview_of(chunk),
                },
            })
            .collect();

        let count = records.len();
        self.index.upsert(records).await?;
        Ok(count)
    }
}
