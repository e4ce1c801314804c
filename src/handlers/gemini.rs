// src/handlers/gemini.rs
//! `/api/gemini/*`: synchronous video generation, quiz and tutor chat.

use super::runs::{caller_id, error_json, pipeline_error_response, pipeline_or_unavailable, video_attachment};
use super::upload::read_deck;
use crate::identity_client::IdentityClaims;
use crate::jobs::video_job::DeckVideoJob;
use crate::middleware::auth::auth_middleware;
use crate::models::chat::{ChatRequest, ChatResponse};
use crate::models::quiz::QuizResponse;
use crate::services::ServiceError;
use crate::AppState;
use axum::{
    extract::{multipart::Multipart, DefaultBodyLimit, Extension},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use std::sync::Arc;

pub fn gemini_routes(upload_limit_bytes: usize) -> Router {
    Router::new()
        .route("/api/gemini/generate-video", post(generate_video))
        .route("/api/gemini/generate-quiz", post(generate_quiz))
        .route("/api/gemini/chat", post(chat))
        .route_layer(axum::middleware::from_fn(auth_middleware))
        .layer(DefaultBodyLimit::max(upload_limit_bytes))
}

pub(crate) fn service_error_status(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::UnsupportedFileType | ServiceError::EmptyMessage => StatusCode::BAD_REQUEST,
        ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
        ServiceError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn service_error_response(err: ServiceError) -> Response {
    let status = service_error_status(&err);
    if status.is_server_error() {
        tracing::error!("Text service request failed: {}", err);
    }
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

fn text_service_unavailable() -> Response {
    error_json(
        StatusCode::SERVICE_UNAVAILABLE,
        "Text generation is not configured (GEMINI_API_KEY is required)",
    )
}

/// POST /api/gemini/generate-video - Run the whole pipeline and answer with the video
async fn generate_video(
    Extension(state): Extension<Arc<AppState>>,
    claims: Option<Extension<IdentityClaims>>,
    multipart: Multipart,
) -> Response {
    let pipeline = match pipeline_or_unavailable(&state) {
        Ok(pipeline) => pipeline,
        Err(response) => return response,
    };
    let deck = match read_deck(multipart).await {
        Ok(deck) => deck,
        Err(rejection) => return rejection.into_response(),
    };

    let job = match DeckVideoJob::prepare(
        &state.config.work_dir,
        caller_id(&claims),
        &deck.file_name,
        &deck.bytes,
        pipeline,
        state.runs.clone(),
    )
    .await
    {
        Ok(job) => job,
        Err(e) => return pipeline_error_response(&e, None),
    };

    if let Err(e) = job.execute().await {
        return pipeline_error_response(&e, Some(job.run_id()));
    }

    match job.registry().take_download(job.run_id()).await {
        Ok(path) => video_attachment(&path).await,
        Err(e) => {
            tracing::error!(run_id = %job.run_id(), "Finished run could not be downloaded: {}", e);
            error_json(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /api/gemini/generate-quiz - Multiple-choice quiz from an uploaded deck
async fn generate_quiz(Extension(state): Extension<Arc<AppState>>, multipart: Multipart) -> Response {
    let Some(quiz_service) = state.quiz.as_ref() else {
        return text_service_unavailable();
    };
    let deck = match read_deck(multipart).await {
        Ok(deck) => deck,
        Err(rejection) => return rejection.into_response(),
    };

    match quiz_service.generate(&deck.file_name, &deck.bytes).await {
        Ok(quiz) => Json(QuizResponse {
            quiz: quiz.raw,
            questions: quiz.questions,
        })
        .into_response(),
        Err(e) => service_error_response(e),
    }
}

/// POST /api/gemini/chat - Single-turn tutor reply
async fn chat(Extension(state): Extension<Arc<AppState>>, Json(request): Json<ChatRequest>) -> Response {
    let Some(tutor) = state.tutor.as_ref() else {
        return text_service_unavailable();
    };

    match tutor.reply(&request.message).await {
        Ok(response) => Json(ChatResponse { response }).into_response(),
        Err(e) => service_error_response(e),
    }
}
