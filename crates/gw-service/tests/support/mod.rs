//! Shared harness for admission pipeline integration tests.
//!
//! Builds the real router over stub collaborators: a counting token
//! provider, an in-memory user directory, and the manual-clock cache
//! backend. No network or external services are involved.

#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)] // Each test binary uses a subset of the harness.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use common::types::SubjectId;
use http_body_util::BodyExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use gw_service::auth::IdentityVerifier;
use gw_service::cache::{CacheClient, MemoryCache};
use gw_service::config::Config;
use gw_service::directory::{DirectoryError, UserDirectory};
use gw_service::models::{AccountStatus, Role, RolePermissions, UserRecord};
use gw_service::provider::{IdentityProvider, ProviderError, TokenVerification};
use gw_service::ratelimit::FixedWindowLimiter;
use gw_service::routes::{build_routes, AppState};

/// Stub identity provider with a fixed token table and a call counter.
pub struct StubProvider {
    tokens: Mutex<HashMap<String, Result<String, &'static str>>>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Map `token` to a successfully verified `subject`.
    pub fn add_token(&self, token: &str, subject: &str) {
        self.tokens
            .lock()
            .unwrap()
            .insert(token.to_string(), Ok(subject.to_string()));
    }

    /// Map `token` to a verification failure kind
    /// (`"invalid"`, `"expired"`, `"revoked"`, `"unavailable"`).
    pub fn add_failure(&self, token: &str, kind: &'static str) {
        self.tokens
            .lock()
            .unwrap()
            .insert(token.to_string(), Err(kind));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    async fn verify_token(&self, token: &str) -> Result<TokenVerification, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.tokens.lock().unwrap().get(token) {
            Some(Ok(subject)) => Ok(TokenVerification {
                subject: SubjectId::from(subject.as_str()),
                claims: serde_json::Map::new(),
            }),
            Some(Err("expired")) => Err(ProviderError::TokenExpired),
            Some(Err("revoked")) => Err(ProviderError::TokenRevoked),
            Some(Err("unavailable")) => Err(ProviderError::Unavailable("stub outage".to_string())),
            _ => Err(ProviderError::InvalidToken),
        }
    }
}

/// Stub user directory over an in-memory record map.
pub struct StubDirectory {
    records: Mutex<HashMap<String, UserRecord>>,
    reads: AtomicUsize,
}

impl StubDirectory {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn add_user(&self, subject: &str, role: Role, status: AccountStatus) {
        let record = UserRecord {
            subject: SubjectId::from(subject),
            email: format!("{subject}@example.com"),
            display_name: subject.to_string(),
            role,
            status,
            avatar: None,
            department: None,
            location: None,
            manager_id: None,
            permissions: RolePermissions::default(),
            created_at: None,
            updated_at: None,
            last_seen_at: None,
        };
        self.records
            .lock()
            .unwrap()
            .insert(subject.to_string(), record);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn record(&self, subject: &str) -> Option<UserRecord> {
        self.records.lock().unwrap().get(subject).cloned()
    }
}

#[async_trait]
impl UserDirectory for StubDirectory {
    async fn get_user(&self, subject: &SubjectId) -> Result<Option<UserRecord>, DirectoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.lock().unwrap().get(subject.as_str()).cloned())
    }

    async fn create_user(&self, record: &UserRecord) -> Result<(), DirectoryError> {
        self.records
            .lock()
            .unwrap()
            .insert(record.subject.as_str().to_string(), record.clone());
        Ok(())
    }

    async fn update_user(
        &self,
        subject: &SubjectId,
        patch: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Option<UserRecord>, DirectoryError> {
        let mut records = self.records.lock().unwrap();
        let Some(record) = records.get(subject.as_str()) else {
            return Ok(None);
        };

        // Apply the patch through the record's JSON form, mirroring a
        // document store's partial update.
        let mut doc = serde_json::to_value(record).unwrap();
        if let Some(object) = doc.as_object_mut() {
            for (key, value) in patch {
                object.insert(key.clone(), value.clone());
            }
        }
        let updated: UserRecord = serde_json::from_value(doc).unwrap();
        records.insert(subject.as_str().to_string(), updated.clone());
        Ok(Some(updated))
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }
}

/// Everything a test needs to drive the gateway.
pub struct TestGateway {
    pub app: Router,
    pub provider: Arc<StubProvider>,
    pub directory: Arc<StubDirectory>,
    pub cache: Arc<MemoryCache>,
}

impl TestGateway {
    /// Gateway with the default configuration.
    pub fn new() -> Self {
        Self::with_vars(HashMap::new())
    }

    /// Gateway with extra configuration variables layered over the
    /// required set.
    pub fn with_vars(extra: HashMap<String, String>) -> Self {
        let mut vars = HashMap::from([
            (
                "REDIS_URL".to_string(),
                "redis://localhost:6379".to_string(),
            ),
            (
                "IDENTITY_PROVIDER_URL".to_string(),
                "http://provider.test".to_string(),
            ),
            (
                "USER_DIRECTORY_URL".to_string(),
                "http://directory.test".to_string(),
            ),
        ]);
        vars.extend(extra);
        let config = Config::from_vars(&vars).expect("test config should load");

        let provider = Arc::new(StubProvider::new());
        let directory = Arc::new(StubDirectory::new());
        let cache_backend = Arc::new(MemoryCache::new());
        let cache = CacheClient::new(cache_backend.clone(), Duration::from_millis(300));

        let verifier = Arc::new(IdentityVerifier::new(
            provider.clone(),
            directory.clone(),
            cache.clone(),
            config.identity_cache_ttl_seconds,
        ));
        let limiter = Arc::new(FixedWindowLimiter::new(
            cache.clone(),
            config.route_limit_table(),
        ));
        let route_roles = config.route_role_table();

        let state = Arc::new(AppState {
            config,
            cache,
            verifier,
            limiter,
            route_roles,
            provider: provider.clone(),
            directory: directory.clone(),
        });

        Self {
            app: build_routes(state, None),
            provider,
            directory,
            cache: cache_backend,
        }
    }

    /// Issue a request against the router.
    pub async fn request(&self, req: Request<Body>) -> Response<Body> {
        self.app
            .clone()
            .oneshot(req)
            .await
            .expect("router should not fail")
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.request(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.request(
            builder
                .body(Body::from(serde_json::to_vec(body).unwrap()))
                .unwrap(),
        )
        .await
    }

    pub async fn patch_json(
        &self,
        path: &str,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("PATCH")
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.request(
            builder
                .body(Body::from(serde_json::to_vec(body).unwrap()))
                .unwrap(),
        )
        .await
    }
}

/// Decode a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}
