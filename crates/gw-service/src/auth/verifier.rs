//! Identity verification with caching.
//!
//! `IdentityVerifier` turns a raw bearer token into an
//! [`AuthenticatedIdentity`]:
//!
//! 1. Cache lookup under a key derived from the token (SHA-256). A fresh
//!    entry short-circuits the provider and directory entirely.
//! 2. Provider verification, distinguishing invalid / expired / revoked.
//! 3. Directory lookup by the verified subject; an absent record is a
//!    distinct failure from a provider error.
//! 4. Inactive accounts are rejected after the lookup (status lives on the
//!    directory record, not the token).
//! 5. The identity is cached with a TTL, and the token key is added to a
//!    per-subject index set so invalidation can enumerate and delete every
//!    entry exactly.
//! 6. The uncached success path stamps a last-seen timestamp on the
//!    directory record from a spawned task; it never blocks or fails the
//!    request.
//!
//! Cache failures anywhere in this flow degrade to the uncached path; the
//! verifier stays correct with the shared cache down, only slower.

use chrono::Utc;
use common::types::SubjectId;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::cache::CacheClient;
use crate::directory::UserDirectory;
use crate::models::{AccountStatus, AuthenticatedIdentity, CachedIdentityEntry};
use crate::observability::metrics::record_auth_outcome;
use crate::provider::{IdentityProvider, ProviderError};

/// Authentication failures, ordered from token problems to account problems.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token is malformed or invalid")]
    InvalidToken,

    #[error("token has expired")]
    TokenExpired,

    #[error("token has been revoked")]
    TokenRevoked,

    /// Token verified, but the subject has no directory record.
    #[error("subject has no user record")]
    UserNotFound,

    /// Token verified and record found, but the account is deactivated.
    #[error("account is inactive")]
    AccountInactive,

    /// Provider or directory failure; identity cannot be established.
    #[error("identity upstream unavailable: {0}")]
    Upstream(String),
}

impl From<ProviderError> for AuthError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::InvalidToken => AuthError::InvalidToken,
            ProviderError::TokenExpired => AuthError::TokenExpired,
            ProviderError::TokenRevoked => AuthError::TokenRevoked,
            ProviderError::Unavailable(detail) => AuthError::Upstream(detail),
        }
    }
}

/// Verifies bearer tokens and caches the resulting identities.
pub struct IdentityVerifier {
    provider: Arc<dyn IdentityProvider>,
    directory: Arc<dyn UserDirectory>,
    cache: CacheClient,
    cache_ttl_seconds: u64,
}

impl IdentityVerifier {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        directory: Arc<dyn UserDirectory>,
        cache: CacheClient,
        cache_ttl_seconds: u64,
    ) -> Self {
        Self {
            provider,
            directory,
            cache,
            cache_ttl_seconds,
        }
    }

    /// Cache key for a raw token. The token itself never appears in the
    /// cache or in logs; only its digest does.
    fn token_cache_key(token: &str) -> String {
        let digest = Sha256::digest(token.as_bytes());
        format!("auth:token:{}", hex::encode(digest))
    }

    /// Per-subject index of token cache keys, for exact invalidation.
    fn subject_index_key(subject: &SubjectId) -> String {
        format!("auth:subject:{subject}:keys")
    }

    /// Authenticate a raw bearer token.
    #[instrument(skip_all, name = "gw.auth.authenticate")]
    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedIdentity, AuthError> {
        let cache_key = Self::token_cache_key(token);

        if let Some(entry) = self.cache.get_json::<CachedIdentityEntry>(&cache_key).await {
            if entry.is_current() {
                record_auth_outcome("cache_hit");
                return Ok(entry.identity);
            }
            // Entry written by an older schema; fall through to re-verify.
            debug!(
                target: "gw.auth.verifier",
                schema_version = entry.schema_version,
                "Discarding cached identity with stale schema"
            );
        }

        let verification = self.provider.verify_token(token).await.map_err(|e| {
            record_auth_outcome("provider_rejected");
            AuthError::from(e)
        })?;

        let record = self
            .directory
            .get_user(&verification.subject)
            .await
            .map_err(|e| {
                record_auth_outcome("directory_unavailable");
                AuthError::Upstream(e.to_string())
            })?
            .ok_or_else(|| {
                record_auth_outcome("user_not_found");
                AuthError::UserNotFound
            })?;

        if record.status == AccountStatus::Inactive {
            record_auth_outcome("account_inactive");
            return Err(AuthError::AccountInactive);
        }

        let identity = AuthenticatedIdentity::from_record(&record, verification.claims);

        // Caching is an optimization; failures inside are already swallowed
        // by the cache client.
        self.store(&cache_key, &identity).await;
        self.spawn_last_seen_update(identity.subject.clone());

        record_auth_outcome("verified");
        Ok(identity)
    }

    /// Write the identity entry and maintain the per-subject key index.
    async fn store(&self, cache_key: &str, identity: &AuthenticatedIdentity) {
        let entry = CachedIdentityEntry::new(identity.clone(), Utc::now().timestamp());
        if !self
            .cache
            .set_json(cache_key, &entry, Some(self.cache_ttl_seconds))
            .await
        {
            return;
        }

        let index_key = Self::subject_index_key(&identity.subject);
        self.cache.add_to_set(&index_key, cache_key).await;
        // Keep the index alive as long as the newest entry it tracks.
        self.cache.expire(&index_key, self.cache_ttl_seconds).await;
    }

    /// Record a last-seen timestamp without blocking the response.
    fn spawn_last_seen_update(&self, subject: SubjectId) {
        let directory = Arc::clone(&self.directory);
        tokio::spawn(async move {
            let mut patch = serde_json::Map::new();
            patch.insert(
                "lastSeenAt".to_string(),
                serde_json::json!(Utc::now().to_rfc3339()),
            );

            if let Err(e) = directory.update_user(&subject, &patch).await {
                warn!(
                    target: "gw.auth.verifier",
                    subject = %subject,
                    error = %e,
                    "Last-seen update failed"
                );
            }
        });
    }

    /// Delete every cached identity entry for a subject.
    ///
    /// Called on logout and after any profile mutation (write-through
    /// invalidation: entries are removed, not refreshed). Returns the number
    /// of entries removed; best-effort when the cache is degraded.
    #[instrument(skip_all, name = "gw.auth.invalidate", fields(subject = %subject))]
    pub async fn invalidate_subject(&self, subject: &SubjectId) -> usize {
        let index_key = Self::subject_index_key(subject);
        let keys = self.cache.set_members(&index_key).await;

        let mut removed = 0;
        for key in &keys {
            if self.cache.delete(key).await {
                removed += 1;
            }
        }
        self.cache.delete(&index_key).await;

        debug!(
            target: "gw.auth.verifier",
            subject = %subject,
            removed,
            "Invalidated cached identities"
        );
        removed
    }
}
