use crate::identity_client::IdentitySession;
use crate::middleware::auth::extract_bearer_token;
use crate::models::auth::{AuthResponse, CredentialsRequest, ErrorResponse, VerifyResponse};
use crate::types::BoxError;
use crate::AppState;
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

type AuthResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

pub fn auth_routes() -> Router {
    Router::new()
        .route("/api/auth/signup", post(sign_up))
        .route("/api/auth/signin", post(sign_in))
        .route("/api/auth/verify", get(verify_token))
}

fn auth_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            success: false,
            message: message.into(),
        }),
    )
}

fn validate_credentials(payload: &CredentialsRequest) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(auth_error(StatusCode::BAD_REQUEST, "Email and password are required"));
    }
    if !payload.email.contains('@') {
        return Err(auth_error(StatusCode::BAD_REQUEST, "Invalid email address"));
    }
    Ok(())
}

fn session_response(session: IdentitySession) -> Json<AuthResponse> {
    Json(AuthResponse {
        success: true,
        token: session.id_token,
        refresh_token: session.refresh_token,
        user_id: session.local_id,
        email: session.email,
        expires_in: session.expires_in,
    })
}

fn provider_failure(action: &str, status: StatusCode, e: BoxError) -> (StatusCode, Json<ErrorResponse>) {
    tracing::warn!("{} rejected by identity provider: {}", action, e);
    auth_error(status, e.to_string())
}

async fn sign_up(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CredentialsRequest>,
) -> AuthResult<AuthResponse> {
    validate_credentials(&payload)?;
    if !state.identity.can_sign_in() {
        return Err(auth_error(StatusCode::SERVICE_UNAVAILABLE, "Sign-up is not configured"));
    }

    let session = state
        .identity
        .sign_up(payload.email.trim(), &payload.password)
        .await
        .map_err(|e| provider_failure("Sign-up", StatusCode::BAD_REQUEST, e))?;

    tracing::info!(user_id = %session.local_id, "User signed up");
    Ok(session_response(session))
}

async fn sign_in(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CredentialsRequest>,
) -> AuthResult<AuthResponse> {
    validate_credentials(&payload)?;
    if !state.identity.can_sign_in() {
        return Err(auth_error(StatusCode::SERVICE_UNAVAILABLE, "Sign-in is not configured"));
    }

    let session = state
        .identity
        .sign_in(payload.email.trim(), &payload.password)
        .await
        .map_err(|e| provider_failure("Sign-in", StatusCode::UNAUTHORIZED, e))?;

    tracing::info!(user_id = %session.local_id, "User signed in");
    Ok(session_response(session))
}

async fn verify_token(headers: HeaderMap, Extension(state): Extension<Arc<AppState>>) -> AuthResult<VerifyResponse> {
    let token = match extract_bearer_token(&headers) {
        Ok(Some(token)) => token,
        Ok(None) => return Err(auth_error(StatusCode::UNAUTHORIZED, "Missing Authorization header")),
        Err(message) => return Err(auth_error(StatusCode::UNAUTHORIZED, message)),
    };
    if !state.identity.can_verify() {
        return Err(auth_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Token verification is not configured",
        ));
    }

    let claims = state.identity.verify_id_token(token).await.map_err(|e| {
        tracing::warn!("ID token verification failed: {}", e);
        auth_error(StatusCode::UNAUTHORIZED, "Invalid or expired token")
    })?;

    Ok(Json(VerifyResponse {
        success: true,
        user_id: claims.sub,
        email: claims.email,
        email_verified: claims.email_verified.unwrap_or(false),
        expires_at: claims.exp,
    }))
}
