//! Main Entrypoint for the Explainer API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the database connection pool and running migrations.
//! 3. Initializing shared services (speech, diagram queue, voice prompt).
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use explainer_api::{
    config::Config, db::PgLessonStore, jobs::HttpJobQueue, router::create_router,
    speech::OpenAiSpeech, state::AppState,
};
use explainer_core::prompt::{PromptLibrary, VOICE_AGENT_PROMPT_FILE};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
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
    let lessons = Arc::new(PgLessonStore::new(pool));
    lessons.run_migrations().await?;
    info!("Database connection established and migrations are up-to-date.");

    // --- 4. Initialize Shared Services ---
    let prompts = PromptLibrary::load(config.prompts_path.join(VOICE_AGENT_PROMPT_FILE))
        .with_context(|| format!("{} not found in prompts directory", VOICE_AGENT_PROMPT_FILE))?;
    let voice_prompt = Arc::new(prompts.system_prompt(None)?.to_string());
    info!(version = prompts.latest_version(), "Voice prompt loaded.");

    let openai_api_key = config
        .openai_api_key
        .clone()
        .context("OPENAI_API_KEY is required for narration speech")?;
    let speech = Arc::new(OpenAiSpeech::new(
        openai_api_key,
        config.tts_model.clone(),
        config.tts_voice.clone(),
    ));
    let jobs = Arc::new(
        HttpJobQueue::new(config.job_queue_url.clone()).with_request_timeout(config.job_queue_timeout),
    );

    let app_state = Arc::new(AppState {
        lessons,
        speech,
        jobs,
        voice_prompt,
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
        provider = ?config.provider,
        tts_model = %config.tts_model,
        job_queue = %config.job_queue_url,
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
