//! Shared cache access.
//!
//! The gateway talks to the shared cache through [`CacheClient`], a typed
//! layer over a [`CacheBackend`] trait object. Two backends exist:
//!
//! - [`RedisCache`] - the production backend over a multiplexed Redis
//!   connection, shared by all gateway instances.
//! - [`MemoryCache`] - a process-local backend with a manually advanceable
//!   clock, used by tests and as a degraded fallback when Redis cannot be
//!   reached at startup.
//!
//! # Fail-soft contract
//!
//! The cache is an optimization, never a correctness dependency. Every
//! backend error or timeout is logged, counted, and degraded to a miss or
//! no-op; callers of [`CacheClient`] never observe a cache failure. Each
//! backend call is bounded by a short timeout so a hung cache cannot stall
//! the request path.

mod memory;
mod redis;

pub use memory::MemoryCache;
pub use redis::RedisCache;

use crate::observability::metrics::record_cache_operation;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors surfaced by cache backends.
///
/// These never escape [`CacheClient`]; they exist so backends can report
/// failures for logging and metrics.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache operation timed out")]
    Timeout,
}

/// Raw key-value operations against the shared cache.
///
/// `incr` must be a single atomic operation on the backend; the rate limiter
/// relies on it to avoid caller-side read-modify-write races.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>)
        -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, CacheError>;

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool, CacheError>;

    async fn sadd(&self, key: &str, member: &str) -> Result<(), CacheError>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>, CacheError>;
}

/// Typed, fail-soft cache client.
///
/// Cheaply cloneable; the backend is shared behind an `Arc`.
#[derive(Clone)]
pub struct CacheClient {
    backend: Arc<dyn CacheBackend>,
    op_timeout: Duration,
}

impl CacheClient {
    /// Wrap a backend with the given per-operation timeout.
    pub fn new(backend: Arc<dyn CacheBackend>, op_timeout: Duration) -> Self {
        Self {
            backend,
            op_timeout,
        }
    }

    /// Run a backend call under the operation timeout.
    async fn bounded<T, F>(&self, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout),
        }
    }

    /// Read and decode a JSON value. Backend failures, timeouts, and
    /// undecodable payloads all degrade to `None`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.bounded(self.backend.get(key)).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    record_cache_operation("get", "hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(
                        target: "gw.cache",
                        key = %key,
                        error = %e,
                        "Cached value is undecodable, treating as miss"
                    );
                    record_cache_operation("get", "error");
                    None
                }
            },
            Ok(None) => {
                record_cache_operation("get", "miss");
                None
            }
            Err(e) => {
                warn!(target: "gw.cache", key = %key, error = %e, "Cache read failed");
                record_cache_operation("get", "error");
                None
            }
        }
    }

    /// Encode and write a JSON value with an optional TTL. Returns whether
    /// the write happened; failures are logged and swallowed.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: Option<u64>) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(target: "gw.cache", key = %key, error = %e, "Cache value serialization failed");
                record_cache_operation("set", "error");
                return false;
            }
        };

        match self.bounded(self.backend.set(key, &raw, ttl_seconds)).await {
            Ok(()) => {
                record_cache_operation("set", "ok");
                true
            }
            Err(e) => {
                warn!(target: "gw.cache", key = %key, error = %e, "Cache write failed");
                record_cache_operation("set", "error");
                false
            }
        }
    }

    /// Delete a key. Returns whether the key existed; failures degrade to
    /// `false`.
    pub async fn delete(&self, key: &str) -> bool {
        match self.bounded(self.backend.delete(key)).await {
            Ok(existed) => {
                record_cache_operation("delete", "ok");
                existed
            }
            Err(e) => {
                warn!(target: "gw.cache", key = %key, error = %e, "Cache delete failed");
                record_cache_operation("delete", "error");
                false
            }
        }
    }

    /// Check key existence; failures degrade to `false`.
    pub async fn exists(&self, key: &str) -> bool {
        match self.bounded(self.backend.exists(key)).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(target: "gw.cache", key = %key, error = %e, "Cache exists check failed");
                record_cache_operation("exists", "error");
                false
            }
        }
    }

    /// Atomically increment a counter, returning the post-increment value.
    ///
    /// Returns `None` when the cache is unavailable; the rate limiter treats
    /// that as its fail-open signal.
    pub async fn increment(&self, key: &str, delta: i64) -> Option<i64> {
        match self.bounded(self.backend.incr(key, delta)).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(target: "gw.cache", key = %key, error = %e, "Cache increment failed");
                record_cache_operation("incr", "error");
                None
            }
        }
    }

    /// Set a TTL on an existing key; failures degrade to `false`.
    pub async fn expire(&self, key: &str, ttl_seconds: u64) -> bool {
        match self.bounded(self.backend.expire(key, ttl_seconds)).await {
            Ok(applied) => applied,
            Err(e) => {
                warn!(target: "gw.cache", key = %key, error = %e, "Cache expire failed");
                record_cache_operation("expire", "error");
                false
            }
        }
    }

    /// Add a member to a set; failures degrade to `false`.
    pub async fn add_to_set(&self, key: &str, member: &str) -> bool {
        match self.bounded(self.backend.sadd(key, member)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(target: "gw.cache", key = %key, error = %e, "Cache set-add failed");
                record_cache_operation("sadd", "error");
                false
            }
        }
    }

    /// Enumerate a set; failures degrade to an empty list.
    pub async fn set_members(&self, key: &str) -> Vec<String> {
        match self.bounded(self.backend.smembers(key)).await {
            Ok(members) => members,
            Err(e) => {
                warn!(target: "gw.cache", key = %key, error = %e, "Cache set-members failed");
                record_cache_operation("smembers", "error");
                Vec::new()
            }
        }
    }
}
