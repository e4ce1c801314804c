// src/handlers/status.rs
use crate::utils::check_ffmpeg_available;
use crate::AppState;
use axum::{extract::Extension, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn status_routes() -> Router {
    Router::new().route("/api/status", get(api_status))
}

fn configured(flag: bool) -> &'static str {
    if flag {
        "configured"
    } else {
        "not_configured"
    }
}

async fn api_status(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let ffmpeg_status = match check_ffmpeg_available().await {
        Ok(()) => "available",
        Err(e) => {
            tracing::warn!("ffmpeg check failed: {}", e);
            "unavailable"
        }
    };
    let config = &state.config;

    Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "gemini_ai": configured(state.tutor.is_some()),
            "text_to_speech": configured(config.tts_api_key.is_some()),
            "identity_sign_in": configured(state.identity.can_sign_in()),
            "identity_verification": configured(state.identity.can_verify()),
            "ffmpeg": ffmpeg_status
        },
        "features": {
            "video_generation": state.pipeline.is_some(),
            "quiz_generation": state.quiz.is_some(),
            "tutor_chat": state.tutor.is_some(),
            "authentication_required": config.require_auth,
            "slide_concurrency": config.slide_concurrency,
            "upload_limit_mb": config.upload_limit_mb
        },
        "runs": {
            "tracked": state.runs.len().await,
            "retention_hours": config.run_retention_hours
        },
        "endpoints": {
            "status": "/api/status",
            "video": "/api/gemini/generate-video",
            "quiz": "/api/gemini/generate-quiz",
            "chat": "/api/gemini/chat",
            "runs": "/api/runs",
            "auth": "/api/auth/*"
        }
    }))
}
