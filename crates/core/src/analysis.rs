//! Repository structure analysis.
//!
//! Produces the [`Analysis`] document cached on a session: a ranked file
//! list, category hotspots, and an LLM-written primer with prerequisite
//! concepts. The ranking is a deliberately small path heuristic; the tutor
//! only needs a plausible reading order, not a precise one.

use crate::ingest::{is_text_file, language_of};
use crate::llm_client::LLMClient;
use crate::repo::RepoClient;
use crate::session::{
    Analysis, Hotspot, HotspotCategory, Prerequisite, RankedFile, RepoRef,
};
use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

/// Ranked files kept per analysis.
const MAX_RANKED_FILES: usize = 40;

pub struct RepoAnalyzer {
    repo_client: Arc<dyn RepoClient>,
    llm: Arc<dyn LLMClient>,
    primer_template: String,
}

#[derive(Deserialize)]
struct PrimerShape {
    primer: String,
    #[serde(default)]
    prerequisites: Vec<Prerequisite>,
}

impl RepoAnalyzer {
    /// `primer_template` is a prompt with `{repo}`, `{goal}`, and `{files}`
    /// placeholders.
    pub fn new(
        repo_client: Arc<dyn RepoClient>,
        llm: Arc<dyn LLMClient>,
        primer_template: String,
    ) -> Self {
        Self {
            repo_client,
            llm,
            primer_template,
        }
    }

    pub async fn analyze(&self, repo: &RepoRef, goal: &str) -> Result<Analysis> {
        let listing = self.repo_client.list_files(repo).await?;

        let mut files: Vec<RankedFile> = listing
            .iter()
            .filter(|f| is_text_file(&f.path))
            .map(|f| RankedFile {
                path: f.path.clone(),
                score: importance_score(&f.path),
                language: language_of(&f.path).to_string(),
            })
            .collect();
        files.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.path.cmp(&b.path)));
        files.truncate(MAX_RANKED_FILES);

        let hotspots = find_hotspots(&files);
        let estimated_read_minutes = (files.len() as u32 * 2).clamp(10, 240);

        let (primer, prerequisites) = self.generate_primer(repo, goal, &files).await;

        Ok(Analysis {
            repo: repo.clone(),
            files,
            hotspots,
            prerequisites,
            primer,
            estimated_read_minutes,
        })
    }

    async fn generate_primer(
        &self,
        repo: &RepoRef,
        goal: &str,
        files: &[RankedFile],
    ) -> (String, Vec<Prerequisite>) {
        let file_list = files
            .iter()
            .take(20)
            .map(|f| f.path.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = self
            .primer_template
            .replace("{repo}", &repo.to_string())
            .replace("{goal}", goal)
            .replace("{files}", &file_list);

        let raw = match self
            .llm
            .complete("You orient programmers in unfamiliar codebases. Respond with JSON.", &prompt)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(%repo, error = ?e, "Primer generation failed; analysis continues without one");
                return (String::new(), Vec::new());
            }
        };

        match crate::generators::parse_json_shape::<PrimerShape>(&raw) {
            Some(shape) => (shape.primer, shape.prerequisites),
            None => {
                warn!(%repo, "Primer output did not parse; using raw text");
                (raw.trim().to_string(), Vec::new())
            }
        }
    }
}

/// Scores a path's importance for a first read, in `0.0..=1.0`.
fn importance_score(path: &str) -> f32 {
    let lowered = path.to_lowercase();
    let stem = lowered
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .split('.')
        .next()
        .unwrap_or_default();

    let mut score: f32 = 0.3;
    if matches!(stem, "main" | "lib" | "index" | "app" | "server" | "mod") {
        score += 0.4;
    }
    if lowered.starts_with("src/") || lowered.contains("/src/") {
        score += 0.15;
    }
    if stem == "readme" {
        score += 0.3;
    }
    // Deeply nested files are rarely the place to start.
    let depth = lowered.matches('/').count();
    score -= 0.05 * depth.saturating_sub(1) as f32;

    score.clamp(0.0, 1.0)
}

/// Picks the best-ranked representative file per hotspot category.
fn find_hotspots(files: &[RankedFile]) -> Vec<Hotspot> {
    let categories = [
        HotspotCategory::Entrypoint,
        HotspotCategory::Api,
        HotspotCategory::Router,
        HotspotCategory::Config,
        HotspotCategory::Docs,
    ];

    categories
        .into_iter()
        .filter_map(|category| {
            files
                .iter()
                .find(|f| matches_category(&f.path, category))
                .map(|f| Hotspot {
                    path: f.path.clone(),
                    category,
                })
        })
        .collect()
}

fn matches_category(path: &str, category: HotspotCategory) -> bool {
    let lowered = path.to_lowercase();
    let stem = lowered
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .split('.')
        .next()
        .unwrap_or_default();

    match category {
        HotspotCategory::Entrypoint => matches!(stem, "main" | "index" | "app"),
        HotspotCategory::Api => lowered.contains("api") || lowered.contains("handler"),
        HotspotCategory::Router => lowered.contains("rout"),
        HotspotCategory::Config => {
            stem == "config" || lowered.ends_with(".toml") || lowered.ends_with(".yaml")
        }
        HotspotCategory::Docs => stem == "readme" || lowered.starts_with("docs/"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::LLMAction;
    use crate::repo::RepoFile;
    use async_openai::types::{ChatCompletionRequestMessage, ChatCompletionTool};
    use async_trait::async_trait;

    struct FakeRepo(Vec<&'static str>);

    #[async_trait]
    impl RepoClient for FakeRepo {
        async fn list_files(&self, _repo: &RepoRef) -> Result<Vec<RepoFile>> {
            Ok(self
                .0
                .iter()
                .map(|p| RepoFile {
                    path: p.to_string(),
                    size: 1,
                })
                .collect())
        }

        async fn fetch_file(&self, _repo: &RepoRef, _path: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    struct CannedLLM(String);

    #[async_trait]
    impl LLMClient for CannedLLM {
        async fn decide_action(
            &self,
            _messages: Vec<ChatCompletionRequestMessage>,
            _tools: Vec<ChatCompletionTool>,
        ) -> Result<LLMAction> {
            Ok(LLMAction::TextResponse(self.0.clone()))
        }

        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    fn analyzer(files: Vec<&'static str>, llm_reply: &str) -> RepoAnalyzer {
        RepoAnalyzer::new(
            Arc::new(FakeRepo(files)),
            Arc::new(CannedLLM(llm_reply.to_string())),
            "{repo} {goal} {files}".to_string(),
        )
    }

    fn repo() -> RepoRef {
        "octocat/hello-world".parse().unwrap()
    }

    #[tokio::test]
    async fn entrypoints_outrank_nested_utilities() {
        let analyzer = analyzer(
            vec!["src/main.rs", "src/util/deep/nested/helpers.rs", "logo.png"],
            "{}",
        );
        let analysis = analyzer.analyze(&repo(), "learn").await.unwrap();

        assert_eq!(analysis.files[0].path, "src/main.rs");
        assert!(analysis.files[0].score > analysis.files[1].score);
        // Binary assets never appear.
        assert!(analysis.files.iter().all(|f| f.path != "logo.png"));
        assert!(analysis.files.iter().all(|f| (0.0..=1.0).contains(&f.score)));
    }

    #[tokio::test]
    async fn hotspots_cover_matching_categories() {
        let analyzer = analyzer(
            vec![
                "src/main.rs",
                "src/router.rs",
                "src/handlers.rs",
                "Cargo.toml",
                "README.md",
            ],
            "{}",
        );
        let analysis = analyzer.analyze(&repo(), "learn").await.unwrap();

        let category_of = |path: &str| {
            analysis
                .hotspots
                .iter()
                .find(|h| h.path == path)
                .map(|h| h.category)
        };
        assert_eq!(category_of("src/main.rs"), Some(HotspotCategory::Entrypoint));
        assert_eq!(category_of("src/router.rs"), Some(HotspotCategory::Router));
        assert_eq!(category_of("src/handlers.rs"), Some(HotspotCategory::Api));
        assert_eq!(category_of("Cargo.toml"), Some(HotspotCategory::Config));
        assert_eq!(category_of("README.md"), Some(HotspotCategory::Docs));
    }

    #[tokio::test]
    async fn primer_json_is_parsed() {
        let reply = r#"{"primer": "Start at main.", "prerequisites": [
            {"concept": "async", "description": "futures and await", "difficulty": "intermediate"}
        ]}"#;
        let analyzer = analyzer(vec!["src/main.rs"], reply);
        let analysis = analyzer.analyze(&repo(), "learn").await.unwrap();

        assert_eq!(analysis.primer, "Start at main.");
        assert_eq!(analysis.prerequisites.len(), 1);
        assert_eq!(analysis.prerequisites[0].concept, "async");
    }

    #[tokio::test]
    async fn unparseable_primer_falls_back_to_raw_text() {
        let analyzer = analyzer(vec!["src/main.rs"], "just some prose");
        let analysis = analyzer.analyze(&repo(), "learn").await.unwrap();
        assert_eq!(analysis.primer, "just some prose");
        assert!(analysis.prerequisites.is_empty());
    }
}
