// src/handlers/upload.rs
//! Multipart deck upload shared by the video, run and quiz endpoints.

use crate::models::auth::ErrorResponse;
use axum::{body::Bytes, extract::multipart::Multipart, http::StatusCode, response::Json};

pub const DECK_FIELD: &str = "file";

pub struct UploadedDeck {
    pub file_name: String,
    pub bytes: Bytes,
}

pub type UploadRejection = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> UploadRejection {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            success: false,
            message: message.into(),
        }),
    )
}

/// Read the single deck carried in the `file` field. Other fields are ignored.
pub async fn read_deck(mut multipart: Multipart) -> Result<UploadedDeck, UploadRejection> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to parse multipart field: {}", e);
        bad_request(format!("Malformed upload: {}", e))
    })? {
        if field.name() != Some(DECK_FIELD) {
            tracing::debug!("Skipping multipart field: {:?}", field.name());
            continue;
        }

        let file_name = match field.file_name() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => return Err(bad_request("Uploaded file has no name")),
        };

        let bytes = field.bytes().await.map_err(|e| {
            tracing::error!("Failed to read upload '{}': {}", file_name, e);
            bad_request(format!("Failed to read upload: {}", e))
        })?;

        if bytes.is_empty() {
            return Err(bad_request("Uploaded file is empty"));
        }

        tracing::info!(file = %file_name, size_bytes = bytes.len(), "Deck received");
        return Ok(UploadedDeck { file_name, bytes });
    }

    Err(bad_request("No file uploaded"))
}
