//! Client for the repository-hosting REST API.
//!
//! The tutor only needs two operations against the host: the recursive file
//! listing and raw file content. Both are modeled behind [`RepoClient`] so
//! tests and the ingestion pipeline can run against an in-memory fake.

use crate::session::RepoRef;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;

/// One entry from a repository's recursive file listing.
#[derive(Debug, Clone)]
pub struct RepoFile {
    pub path: String,
    pub size: u64,
}

#[async_trait]
pub trait RepoClient: Send + Sync {
    /// Lists every file (not directory) in the repository, recursively.
    async fn list_files(&self, repo: &RepoRef) -> Result<Vec<RepoFile>>;

    /// Fetches the raw text content of one file.
    async fn fetch_file(&self, repo: &RepoRef, path: &str) -> Result<String>;
}

/// A `RepoClient` backed by the GitHub REST API.
///
/// Uses the recursive git tree endpoint for listings and the raw content
/// host for file bodies. An optional token raises the rate limit and grants
/// access to private repositories.
pub struct GitHubClient {
    http: reqwest::Client,
    token: Option<String>,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: u64,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
        }
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .get(url)
            .header("User-Agent", "mentor")
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }
}

#[async_trait]
impl RepoClient for GitHubClient {
    async fn list_files(&self, repo: &RepoRef) -> Result<Vec<RepoFile>> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/git/trees/HEAD?recursive=1",
            repo.owner, repo.name
        );
        let response = self.request(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("GitHub tree request for {repo} failed ({status}): {body}"));
        }

        let tree: TreeResponse = response
            .json()
            .await
            .with_context(|| format!("decoding tree listing for {repo}"))?;
        if tree.truncated {
            tracing::warn!(%repo, "GitHub tree listing was truncated; ingestion will cover the returned subset");
        }

        Ok(tree
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob")
            .map(|e| RepoFile {
                path: e.path,
                size: e.size,
            })
            .collect())
    }

    async fn fetch_file(&self, repo: &RepoRef, path: &str) -> Result<String> {
        let url = format!(
            "https://raw.githubusercontent.com/{}/{}/HEAD/{}",
            repo.owner, repo.name, path
        );
        let response = self.request(&url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "raw content request for {repo}:{path} failed ({})",
                response.status()
            ));
        }
        response
            .text()
            .await
            .with_context(|| format!("reading content of {repo}:{path}"))
    }
}
