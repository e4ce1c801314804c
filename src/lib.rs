// lib.rs - Main library file that exports all modules
pub mod config;
pub mod gemini_client;
pub mod handlers;
pub mod identity_client;
pub mod jobs;
pub mod media;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod tts_client;
pub mod types;
pub mod utils;

pub use config::AppConfig;
pub use pipeline::{DeckToVideoPipeline, PipelineError, PipelineServices};
pub use types::*;

use std::sync::Arc;

/// Shared state handed to every handler through `Extension<Arc<AppState>>`.
pub struct AppState {
    pub config: AppConfig,
    /// Present when both the text and the speech service are configured.
    pub pipeline: Option<Arc<DeckToVideoPipeline>>,
    pub quiz: Option<services::QuizService>,
    pub tutor: Option<services::TutorService>,
    pub identity: identity_client::IdentityClient,
    pub runs: jobs::SharedRunRegistry,
}

/// All HTTP routes, without the outer layers (logging, CORS, state).
pub fn api_router(config: &AppConfig) -> axum::Router {
    let upload_limit_bytes = config.upload_limit_bytes();
    axum::Router::new()
        .merge(handlers::auth::auth_routes())
        .merge(handlers::gemini::gemini_routes(upload_limit_bytes))
        .merge(handlers::runs::run_routes(upload_limit_bytes))
        .merge(handlers::status::status_routes())
}
