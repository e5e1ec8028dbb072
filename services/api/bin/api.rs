//! Main Entrypoint for the Mentor API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the database connection pool and running migrations.
//! 3. Initializing shared services (LLM, embedder, transcriber, vector index).
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use mentor_api::{
    actor::{ActorDeps, SessionManager},
    config::Config,
    router::create_router,
    state::AppState,
    store::PgSessionStore,
};
use mentor_core::{
    analysis::RepoAnalyzer,
    embedding::{Embedder, OpenAIEmbedder},
    generators::Generators,
    ingest::IngestionPipeline,
    llm_client::{LLMClient, OpenAICompatibleClient},
    orchestrator::TurnOrchestrator,
    repo::{GitHubClient, RepoClient},
    search::CodeSearch,
    tools::Toolbox,
    vector::{HttpVectorIndex, VectorIndex},
    voice::{OpenAITranscriber, Transcriber},
};
use sqlx::PgPool;
use std::{collections::HashMap, fs, net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// A helper function to load prompts from a directory.
fn load_prompts(prompts_path: &std::path::Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in std::fs::read_dir(prompts_path)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Database ---
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let store = Arc::new(PgSessionStore::new(pool));
    store.run_migrations().await?;
    info!("Database connection established and migrations are up-to-date.");

    // --- 4. Initialize Shared Services ---
    let prompts = load_prompts(&config.prompts_path)?;
    let system_prompt = prompts
        .get("system_prompt")
        .context("system_prompt.md not found in prompts directory")?
        .clone();
    let repo_primer_prompt = prompts
        .get("repo_primer")
        .context("repo_primer.md not found in prompts directory")?
        .clone();

    let mut openai_config = OpenAIConfig::new().with_api_key(&config.openai_api_key);
    if let Some(base) = &config.openai_api_base {
        openai_config = openai_config.with_api_base(base);
    }

    let llm: Arc<dyn LLMClient> = Arc::new(OpenAICompatibleClient::new(
        openai_config.clone(),
        config.chat_model.clone(),
    ));
    let embedder: Arc<dyn Embedder> = Arc::new(OpenAIEmbedder::new(
        openai_config.clone(),
        config.embedding_model.clone(),
        config.embedding_dimensions,
    ));
    let transcriber: Arc<dyn Transcriber> = Arc::new(OpenAITranscriber::new(
        openai_config,
        config.transcription_model.clone(),
    ));
    let repo_client: Arc<dyn RepoClient> = Arc::new(GitHubClient::new(config.github_token.clone()));
    let index: Arc<dyn VectorIndex> = Arc::new(HttpVectorIndex::new(
        config.vector_index_url.clone(),
        config.vector_index_api_key.clone(),
    ));

    let generators = Arc::new(Generators::new(llm.clone(), prompts));
    let analyzer = Arc::new(RepoAnalyzer::new(
        repo_client.clone(),
        llm.clone(),
        repo_primer_prompt,
    ));
    let search = Arc::new(CodeSearch::new(embedder.clone(), index.clone()));
    let pipeline = Arc::new(IngestionPipeline::new(repo_client, embedder, index));

    let toolbox = Arc::new(Toolbox::new(
        analyzer.clone(),
        search.clone(),
        generators.clone(),
    ));
    let orchestrator = Arc::new(TurnOrchestrator::new(llm, toolbox, system_prompt));

    let sessions = Arc::new(SessionManager::new(Arc::new(ActorDeps {
        store,
        orchestrator,
        transcriber,
        generators,
    })));
    let _sweeper = sessions.spawn_sweeper();

    let app_state = Arc::new(AppState {
        sessions,
        analyzer,
        pipeline,
        search,
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        model = %config.chat_model,
        embedding_model = %config.embedding_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
