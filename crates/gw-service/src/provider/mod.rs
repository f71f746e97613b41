//! Identity provider client.
//!
//! The provider is an external service that validates opaque bearer tokens
//! and returns the subject they belong to. The gateway never inspects token
//! contents itself; it only relays the verdict.
//!
//! The trait seam exists so the admission pipeline can be exercised against
//! stub providers in tests.

use async_trait::async_trait;
use common::types::SubjectId;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Outcome of a successful token verification.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenVerification {
    /// Subject the token was issued to.
    pub subject: SubjectId,

    /// Raw claims attached to the token.
    #[serde(default)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

/// Provider verification failures.
///
/// The three token failure kinds are distinct so callers can log and count
/// them separately; all of them render as the same 401 on the wire.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("token is malformed or invalid")]
    InvalidToken,

    #[error("token has expired")]
    TokenExpired,

    #[error("token has been revoked")]
    TokenRevoked,

    /// Transport failure, timeout, or unexpected provider response. Identity
    /// cannot be established, so this is fail-closed for the caller.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Verifies opaque bearer tokens against the external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<TokenVerification, ProviderError>;
}

/// Error body returned by the provider on verification failure.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: String,
}

/// HTTP implementation of [`IdentityProvider`].
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIdentityProvider {
    /// Build a client for the provider at `base_url` with a bounded
    /// per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Unavailable` if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("client construction failed: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn verify_token(&self, token: &str) -> Result<TokenVerification, ProviderError> {
        let url = format!("{}/v1/tokens/verify", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|e| {
                warn!(target: "gw.provider", error = %e, "Identity provider request failed");
                ProviderError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            return response.json::<TokenVerification>().await.map_err(|e| {
                warn!(target: "gw.provider", error = %e, "Identity provider returned an undecodable body");
                ProviderError::Unavailable(format!("undecodable provider response: {e}"))
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::BAD_REQUEST
        {
            // The provider reports which way verification failed in the body.
            let kind = response
                .json::<ProviderErrorBody>()
                .await
                .map(|body| body.error)
                .unwrap_or_default();

            return Err(match kind.as_str() {
                "token_expired" => ProviderError::TokenExpired,
                "token_revoked" => ProviderError::TokenRevoked,
                _ => ProviderError::InvalidToken,
            });
        }

        Err(ProviderError::Unavailable(format!(
            "unexpected provider status {status}"
        )))
    }
}
