//! User directory client.
//!
//! The directory is an external document store keyed by subject id. The
//! gateway reads profile records during authentication, creates them at
//! registration, and applies partial updates (including the asynchronous
//! last-seen stamp). "Record does not exist" is a valid outcome, distinct
//! from a transport failure.

use async_trait::async_trait;
use common::types::SubjectId;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::models::UserRecord;

/// Directory access failures.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Transport failure or timeout.
    #[error("user directory unavailable: {0}")]
    Unavailable(String),

    /// The directory answered with an unexpected status or body.
    #[error("user directory request failed: {0}")]
    Request(String),
}

/// Key-value access to user profile records.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetch a record. `Ok(None)` means the subject has no account.
    async fn get_user(&self, subject: &SubjectId) -> Result<Option<UserRecord>, DirectoryError>;

    /// Create a record. Fails if the directory rejects the write.
    async fn create_user(&self, record: &UserRecord) -> Result<(), DirectoryError>;

    /// Apply a partial update and return the updated record, or `Ok(None)`
    /// if the subject has no account.
    async fn update_user(
        &self,
        subject: &SubjectId,
        patch: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Option<UserRecord>, DirectoryError>;

    /// List all records.
    async fn list_users(&self) -> Result<Vec<UserRecord>, DirectoryError>;
}

/// Directory responses wrap records under a `user` / `users` field.
#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: UserRecord,
}

#[derive(Debug, Deserialize)]
struct UserListEnvelope {
    #[serde(default)]
    users: Vec<UserRecord>,
}

/// HTTP implementation of [`UserDirectory`].
pub struct HttpUserDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUserDirectory {
    /// Build a client for the directory at `base_url` with a bounded
    /// per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Unavailable` if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::Unavailable(format!("client construction failed: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn user_url(&self, subject: &SubjectId) -> String {
        format!("{}/v1/users/{}", self.base_url, subject)
    }

    fn transport_err(e: reqwest::Error) -> DirectoryError {
        warn!(target: "gw.directory", error = %e, "User directory request failed");
        DirectoryError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn get_user(&self, subject: &SubjectId) -> Result<Option<UserRecord>, DirectoryError> {
        let response = self
            .client
            .get(self.user_url(subject))
            .send()
            .await
            .map_err(Self::transport_err)?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<UserEnvelope>()
                .await
                .map(|envelope| Some(envelope.user))
                .map_err(|e| DirectoryError::Request(format!("undecodable record: {e}"))),
            status => Err(DirectoryError::Request(format!(
                "unexpected directory status {status}"
            ))),
        }
    }

    async fn create_user(&self, record: &UserRecord) -> Result<(), DirectoryError> {
        let response = self
            .client
            .put(self.user_url(&record.subject))
            .json(record)
            .send()
            .await
            .map_err(Self::transport_err)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(DirectoryError::Request(format!(
                "record create rejected with status {}",
                response.status()
            )))
        }
    }

    async fn update_user(
        &self,
        subject: &SubjectId,
        patch: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Option<UserRecord>, DirectoryError> {
        let response = self
            .client
            .patch(self.user_url(subject))
            .json(patch)
            .send()
            .await
            .map_err(Self::transport_err)?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<UserEnvelope>()
                .await
                .map(|envelope| Some(envelope.user))
                .map_err(|e| DirectoryError::Request(format!("undecodable record: {e}"))),
            status => Err(DirectoryError::Request(format!(
                "record update rejected with status {status}"
            ))),
        }
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        let response = self
            .client
            .get(format!("{}/v1/users", self.base_url))
            .send()
            .await
            .map_err(Self::transport_err)?;

        if response.status().is_success() {
            response
                .json::<UserListEnvelope>()
                .await
                .map(|envelope| envelope.users)
                .map_err(|e| DirectoryError::Request(format!("undecodable listing: {e}")))
        } else {
            Err(DirectoryError::Request(format!(
                "listing rejected with status {}",
                response.status()
            )))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::models::{AccountStatus, Role, RolePermissions};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record_json() -> serde_json::Value {
        serde_json::json!({
            "subject": "u1",
            "email": "u1@example.com",
            "displayName": "User One",
            "role": "manager",
            "status": "active"
        })
    }

    async fn directory_for(server: &MockServer) -> HttpUserDirectory {
        HttpUserDirectory::new(server.uri(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_get_user_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/users/u1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "user": record_json() })),
            )
            .mount(&server)
            .await;

        let directory = directory_for(&server).await;
        let record = directory
            .get_user(&SubjectId::from("u1"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(record.subject.as_str(), "u1");
        assert_eq!(record.role, Role::Manager);
        assert_eq!(record.status, AccountStatus::Active);
        assert_eq!(record.permissions, RolePermissions::default());
    }

    #[tokio::test]
    async fn test_get_user_absent_is_ok_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/users/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let directory = directory_for(&server).await;
        let record = directory.get_user(&SubjectId::from("ghost")).await.unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_update_user_returns_updated_record() {
        let server = MockServer::start().await;
        let mut updated = record_json();
        updated["displayName"] = serde_json::json!("Renamed");
        Mock::given(method("PATCH"))
            .and(path("/v1/users/u1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "user": updated })),
            )
            .mount(&server)
            .await;

        let directory = directory_for(&server).await;
        let mut patch = serde_json::Map::new();
        patch.insert("displayName".to_string(), serde_json::json!("Renamed"));

        let record = directory
            .update_user(&SubjectId::from("u1"), &patch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.display_name, "Renamed");
    }

    #[tokio::test]
    async fn test_server_error_is_distinct_from_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/users/u1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let directory = directory_for(&server).await;
        let err = directory.get_user(&SubjectId::from("u1")).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Request(_)));
    }
}
