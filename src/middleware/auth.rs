use crate::identity_client::IdentityClaims;
use crate::models::auth::ErrorResponse;
use crate::AppState;
use axum::{
    extract::{Extension, Request},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;

fn unauthorized(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            success: false,
            message: message.to_string(),
        }),
    )
}

/// Pull the token out of `Authorization: Bearer <token>`.
/// `Ok(None)` when the header is absent, `Err` when it is malformed.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<Option<&str>, &'static str> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| "Invalid Authorization header format")?;
    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(Some(token.trim())),
        _ => Err("Invalid Authorization header format. Expected 'Bearer <token>'"),
    }
}

/// Verifies the identity provider ID token and stores its claims in the
/// request extensions. With `REQUIRE_AUTH` off, requests without a token pass
/// through anonymously; a token that is present must still be valid.
pub async fn auth_middleware(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, impl IntoResponse> {
    let token = match extract_bearer_token(&headers) {
        Ok(Some(token)) => token,
        Ok(None) if !state.config.require_auth => return Ok(next.run(request).await),
        Ok(None) => return Err(unauthorized("Missing Authorization header")),
        Err(message) => return Err(unauthorized(message)),
    };

    if !state.identity.can_verify() {
        tracing::error!("Bearer token received but FIREBASE_PROJECT_ID is not set");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                success: false,
                message: "Authentication is not configured".to_string(),
            }),
        ));
    }

    let claims = match state.identity.verify_id_token(token).await {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!("ID token verification failed: {}", e);
            return Err(unauthorized("Invalid or expired token"));
        }
    };

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

// Extension trait to easily extract claims from request extensions
pub trait ClaimsExtractor {
    fn claims(&self) -> Option<&IdentityClaims>;
}

impl ClaimsExtractor for Request {
    fn claims(&self) -> Option<&IdentityClaims> {
        self.extensions().get::<IdentityClaims>()
    }
}
