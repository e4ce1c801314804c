// Managed identity provider client (Firebase Authentication)
// Supports: email/password sign-up and sign-in via Identity Toolkit REST,
// ID token verification against the provider's published signing keys.

use crate::gemini_client::API_KEY_HEADER;
use crate::types::BoxError;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const KEY_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
pub struct IdentityClient {
    client: Client,
    api_key: Option<String>,
    project_id: Option<String>,
    base_url: String,
    jwks_url: String,
    keys: Arc<RwLock<Option<CachedKeys>>>,
}

struct CachedKeys {
    set: JwkSet,
    fetched_at: Instant,
}

#[derive(Serialize, Debug)]
struct PasswordAuthRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(rename = "returnSecureToken")]
    return_secure_token: bool,
}

/// Session returned by sign-up and sign-in.
#[derive(Deserialize, Debug, Clone)]
pub struct IdentitySession {
    #[serde(rename = "idToken")]
    pub id_token: String,
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: String,
    #[serde(rename = "localId")]
    pub local_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "expiresIn", default)]
    pub expires_in: String,
}

#[derive(Deserialize, Debug)]
struct ProviderErrorBody {
    error: ProviderError,
}

#[derive(Deserialize, Debug)]
struct ProviderError {
    #[serde(default)]
    message: String,
}

/// Claims carried by a verified ID token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    pub exp: usize,
    pub iat: usize,
}

impl IdentityClient {
    pub fn new(api_key: Option<String>, project_id: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            project_id,
            base_url: IDENTITY_TOOLKIT_URL.to_string(),
            jwks_url: SECURE_TOKEN_JWKS_URL.to_string(),
            keys: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn can_sign_in(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn can_verify(&self) -> bool {
        self.project_id.is_some()
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<IdentitySession, BoxError> {
        self.password_request("accounts:signUp", email, password).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<IdentitySession, BoxError> {
        self.password_request("accounts:signInWithPassword", email, password)
            .await
    }

    async fn password_request(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<IdentitySession, BoxError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or("Identity provider API key is not configured")?;
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(&PasswordAuthRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProviderErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(format!("Identity provider error ({}): {}", status, message).into());
        }

        Ok(response
            .json::<IdentitySession>()
            .await
            .map_err(reqwest::Error::without_url)?)
    }

    /// Verify an ID token's signature, expiry, audience and issuer.
    pub async fn verify_id_token(&self, token: &str) -> Result<IdentityClaims, BoxError> {
        let project_id = self
            .project_id
            .as_deref()
            .ok_or("Identity provider project id is not configured")?;

        let header = decode_header(token)?;
        let kid = header.kid.ok_or("ID token has no key id")?;
        let key = self.decoding_key(&kid).await?;

        let token_data = decode::<IdentityClaims>(token, &key, &id_token_validation(project_id))?;
        Ok(token_data.claims)
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, BoxError> {
        {
            let cache = self.keys.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < KEY_CACHE_TTL {
                    if let Some(jwk) = cached.set.find(kid) {
                        return Ok(DecodingKey::from_jwk(jwk)?);
                    }
                }
            }
        }

        // Unknown kid or stale cache: the provider rotates keys, refetch once.
        let set: JwkSet = self
            .client
            .get(&self.jwks_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        tracing::debug!("Fetched {} identity provider signing keys", set.keys.len());

        let key = set
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()?
            .ok_or_else(|| format!("No signing key matches kid '{}'", kid))?;

        *self.keys.write().await = Some(CachedKeys {
            set,
            fetched_at: Instant::now(),
        });

        Ok(key)
    }
}

pub fn id_token_validation(project_id: &str) -> Validation {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[project_id]);
    validation.set_issuer(&[format!("https://securetoken.google.com/{}", project_id)]);
    validation.set_required_spec_claims(&["exp", "iat", "sub", "aud", "iss"]);
    validation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_pins_project() {
        let validation = id_token_validation("learndeckify");
        assert_eq!(validation.algorithms, vec![Algorithm::RS256]);
        assert!(validation
            .aud
            .as_ref()
            .map(|aud| aud.contains("learndeckify"))
            .unwrap_or(false));
        assert!(validation
            .iss
            .as_ref()
            .map(|iss| iss.contains("https://securetoken.google.com/learndeckify"))
            .unwrap_or(false));
    }

    #[tokio::test]
    async fn test_unconfigured_client_refuses() {
        let client = IdentityClient::new(None, None);
        assert!(!client.can_sign_in());
        assert!(!client.can_verify());
        assert!(client.sign_in("a@b.c", "secret").await.is_err());
        assert!(client.verify_id_token("not.a.token").await.is_err());
    }

    #[tokio::test]
    async fn test_sign_in_error_does_not_reveal_api_key() {
        let client = IdentityClient::new(Some("WEB-KEY-42".to_string()), None).with_base_url("http://127.0.0.1:1");

        let err = client.sign_in("a@b.c", "secret").await.unwrap_err();

        assert!(!err.to_string().contains("WEB-KEY-42"), "{}", err);
    }

    #[test]
    fn test_session_deserializes_provider_payload() {
        let json = r#"{
            "kind": "identitytoolkit#SignupNewUserResponse",
            "idToken": "id-token",
            "email": "a@b.c",
            "refreshToken": "refresh",
            "expiresIn": "3600",
            "localId": "uid-1"
        }"#;
        let session: IdentitySession = serde_json::from_str(json).unwrap();
        assert_eq!(session.local_id, "uid-1");
        assert_eq!(session.expires_in, "3600");
    }
}
