// src/handlers/runs.rs
//! Deck-to-video runs: start in background, poll, download once.

use super::upload::read_deck;
use crate::identity_client::IdentityClaims;
use crate::jobs::video_job::{spawn_deck_video_run, DeckVideoJob};
use crate::jobs::{RunError, RunRecord};
use crate::middleware::auth::auth_middleware;
use crate::models::auth::ErrorResponse;
use crate::models::runs::{RunCreatedResponse, RunErrorResponse, RunStatusResponse};
use crate::pipeline::{DeckToVideoPipeline, PipelineError};
use crate::AppState;
use axum::{
    body::Body,
    extract::{multipart::Multipart, DefaultBodyLimit, Extension, Path},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

pub const VIDEO_DOWNLOAD_NAME: &str = "slideshow.mp4";

pub fn run_routes(upload_limit_bytes: usize) -> Router {
    Router::new()
        .route("/api/runs", post(create_run).get(list_runs))
        .route("/api/runs/:run_id", get(get_run_status))
        .route("/api/runs/:run_id/video", get(download_run_video))
        .route_layer(axum::middleware::from_fn(auth_middleware))
        .layer(DefaultBodyLimit::max(upload_limit_bytes))
}

pub(crate) fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            success: false,
            message: message.into(),
        }),
    )
        .into_response()
}

/// 415 for unsupported decks, 502 when the text or speech service failed,
/// 500 for everything else.
pub(crate) fn pipeline_error_status(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::UnsupportedFormat { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        e if e.is_upstream() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn pipeline_error_response(err: &PipelineError, run_id: Option<&str>) -> Response {
    (
        pipeline_error_status(err),
        Json(RunErrorResponse {
            error: err.to_string(),
            stage: err.stage().to_string(),
            run_id: run_id.map(str::to_string),
        }),
    )
        .into_response()
}

pub(crate) fn run_error_status(err: &RunError) -> StatusCode {
    match err {
        RunError::NotFound(_) => StatusCode::NOT_FOUND,
        RunError::NotReady { .. } => StatusCode::CONFLICT,
        RunError::AlreadyDownloaded(_) => StatusCode::GONE,
        RunError::IllegalTransition { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn pipeline_or_unavailable(state: &AppState) -> Result<Arc<DeckToVideoPipeline>, Response> {
    state.pipeline.clone().ok_or_else(|| {
        error_json(
            StatusCode::SERVICE_UNAVAILABLE,
            "Video generation is not configured (GEMINI_API_KEY and TTS_API_KEY are required)",
        )
    })
}

pub(crate) fn caller_id(claims: &Option<Extension<IdentityClaims>>) -> Option<String> {
    claims.as_ref().map(|Extension(c)| c.sub.clone())
}

/// Anonymous runs are reachable by id; owned runs only by their owner.
fn visible_to(record: &RunRecord, caller: Option<&str>) -> bool {
    record.owner.is_none() || record.owner.as_deref() == caller
}

/// Stream a finished video as a `slideshow.mp4` attachment.
pub(crate) async fn video_attachment(path: &std::path::Path) -> Response {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::error!("Failed to open video for download: {}", e);
            return error_json(StatusCode::INTERNAL_SERVER_ERROR, "Video file is no longer available");
        }
    };
    let size = file.metadata().await.map(|m| m.len()).ok();

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", VIDEO_DOWNLOAD_NAME),
        )
        .header(header::CACHE_CONTROL, "no-store");
    if let Some(size) = size {
        builder = builder.header(header::CONTENT_LENGTH, size);
    }

    builder
        .body(Body::from_stream(ReaderStream::new(file)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// POST /api/runs - Upload a deck and start a background run
async fn create_run(
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

    let run_id = spawn_deck_video_run(job);
    let response = RunCreatedResponse {
        status_url: format!("/api/runs/{}", run_id),
        video_url: format!("/api/runs/{}/video", run_id),
        run_id,
    };
    (StatusCode::ACCEPTED, Json(response)).into_response()
}

/// GET /api/runs - Runs started by the caller, newest first
async fn list_runs(
    Extension(state): Extension<Arc<AppState>>,
    claims: Option<Extension<IdentityClaims>>,
) -> Response {
    let caller = caller_id(&claims);
    let runs: Vec<RunStatusResponse> = state
        .runs
        .runs_for_owner(caller.as_deref())
        .await
        .into_iter()
        .map(RunStatusResponse::from)
        .collect();
    Json(runs).into_response()
}

/// GET /api/runs/:run_id - Current state of one run
async fn get_run_status(
    Path(run_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
    claims: Option<Extension<IdentityClaims>>,
) -> Response {
    match state.runs.get(&run_id).await {
        Some(record) if visible_to(&record, caller_id(&claims).as_deref()) => {
            Json(RunStatusResponse::from(record)).into_response()
        }
        _ => error_json(StatusCode::NOT_FOUND, "Run not found"),
    }
}

/// GET /api/runs/:run_id/video - One-time download of the finished video
async fn download_run_video(
    Path(run_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
    claims: Option<Extension<IdentityClaims>>,
) -> Response {
    match state.runs.get(&run_id).await {
        Some(record) if visible_to(&record, caller_id(&claims).as_deref()) => {}
        _ => return error_json(StatusCode::NOT_FOUND, "Run not found"),
    }

    match state.runs.take_download(&run_id).await {
        Ok(path) => video_attachment(&path).await,
        Err(e) => error_json(run_error_status(&e), e.to_string()),
    }
}
