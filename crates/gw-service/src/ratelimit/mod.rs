//! Fixed-window distributed rate limiting.
//!
//! Counters live in the shared cache under keys that embed the window start
//! (`ratelimit:<client>:<bucket>:<window_start>`), so a counter is never
//! reused across windows and self-expires via TTL; there is no reset logic.
//!
//! The check consumes by atomically incrementing the counter and comparing
//! the post-increment value against the limit, so concurrent requests from
//! the same client cannot all observe a below-limit count and overshoot.
//! A denied request still bumps the counter; only the admission decision
//! matters and the key dies with the window.
//!
//! Known imprecision, by construction of fixed windows: a client can burst
//! up to 2x the limit across a window boundary (limit at the end of one
//! window plus limit at the start of the next). This is accepted for the
//! simplicity of the scheme, not a defect.
//!
//! Fail-open: if the shared cache is unreachable the request is admitted
//! with a full quota reported, preferring availability over strict
//! enforcement while the dependency is down.

use chrono::Utc;
use std::net::IpAddr;
use tracing::{debug, warn};

use crate::cache::CacheClient;
use crate::models::AuthenticatedIdentity;
use crate::observability::metrics::record_rate_limit_decision;

/// Quota applied to a route bucket: `requests` per `window_seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteQuota {
    pub requests: u32,
    pub window_seconds: u64,
}

/// Static mapping from route-path prefix to quota, with a process-wide
/// default. Exact path match wins, then the longest matching prefix.
#[derive(Debug, Clone)]
pub struct RouteLimitTable {
    entries: Vec<(String, RouteQuota)>,
    default: RouteQuota,
}

impl RouteLimitTable {
    pub fn new(default: RouteQuota, entries: Vec<(String, RouteQuota)>) -> Self {
        Self { entries, default }
    }

    /// Resolve the quota for a request path.
    ///
    /// Returns the matched table prefix (used as the counter's bucket label)
    /// and the quota; unmatched paths fall back to `("default", default)`.
    pub fn resolve(&self, path: &str) -> (&str, RouteQuota) {
        if let Some((prefix, quota)) = self.entries.iter().find(|(prefix, _)| prefix == path) {
            return (prefix.as_str(), *quota);
        }

        self.entries
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or(("default", self.default), |(prefix, quota)| {
                (prefix.as_str(), *quota)
            })
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Admitted; header values for the outgoing response.
    Allowed {
        limit: u32,
        remaining: u32,
        reset: i64,
    },

    /// Denied; `retry_after` is the number of seconds until the window rolls.
    Denied {
        limit: u32,
        retry_after: u64,
        reset: i64,
    },
}

/// Derive the rate-limit client key for a request.
///
/// Precedence: authenticated identity, then the first entry of the
/// forwarded-for chain, then the direct peer address.
pub fn client_key(
    identity: Option<&AuthenticatedIdentity>,
    forwarded_for: Option<&str>,
    peer: Option<IpAddr>,
) -> String {
    if let Some(identity) = identity {
        return format!("user:{}", identity.subject);
    }

    let ip = forwarded_for
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.to_string()));

    match ip {
        Some(ip) => format!("ip:{ip}"),
        None => "ip:unknown".to_string(),
    }
}

/// Fixed-window rate limiter over the shared cache.
pub struct FixedWindowLimiter {
    cache: CacheClient,
    table: RouteLimitTable,
}

impl FixedWindowLimiter {
    pub fn new(cache: CacheClient, table: RouteLimitTable) -> Self {
        Self { cache, table }
    }

    /// Check the quota for `client` on `path` and consume one request.
    pub async fn check_and_consume(&self, client: &str, path: &str) -> Decision {
        self.check_and_consume_at(client, path, Utc::now().timestamp())
            .await
    }

    /// Clock-explicit variant of [`Self::check_and_consume`].
    pub async fn check_and_consume_at(&self, client: &str, path: &str, now: i64) -> Decision {
        let (bucket, quota) = self.table.resolve(path);
        let window = quota.window_seconds as i64;
        let window_start = now - now.rem_euclid(window.max(1));
        let reset = window_start + window;

        let key = format!("ratelimit:{client}:{bucket}:{window_start}");

        let count = match self.cache.increment(&key, 1).await {
            Some(count) => count,
            None => {
                // Cache unreachable: admit and report an untouched quota.
                warn!(
                    target: "gw.ratelimit",
                    client = %client,
                    "Shared cache unavailable, admitting without quota enforcement"
                );
                record_rate_limit_decision("fail_open");
                return Decision::Allowed {
                    limit: quota.requests,
                    remaining: quota.requests,
                    reset,
                };
            }
        };

        if count == 1 {
            // First request of the window: arm the self-expiry.
            self.cache.expire(&key, quota.window_seconds).await;
        }

        if count > i64::from(quota.requests) {
            let retry_after = (reset - now).max(1) as u64;
            debug!(
                target: "gw.ratelimit",
                client = %client,
                bucket = %bucket,
                count,
                limit = quota.requests,
                "Request denied by quota"
            );
            record_rate_limit_decision("denied");
            return Decision::Denied {
                limit: quota.requests,
                retry_after,
                reset,
            };
        }

        record_rate_limit_decision("allowed");
        Decision::Allowed {
            limit: quota.requests,
            remaining: quota.requests.saturating_sub(count as u32),
            reset,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::cache::{CacheBackend, CacheError, MemoryCache};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    const DEFAULT: RouteQuota = RouteQuota {
        requests: 5,
        window_seconds: 60,
    };

    fn limiter_with(backend: Arc<dyn CacheBackend>, entries: Vec<(String, RouteQuota)>) -> FixedWindowLimiter {
        FixedWindowLimiter::new(
            CacheClient::new(backend, Duration::from_millis(300)),
            RouteLimitTable::new(DEFAULT, entries),
        )
    }

    #[test]
    fn test_table_resolution_order() {
        let table = RouteLimitTable::new(
            DEFAULT,
            vec![
                (
                    "/api/v1/auth".to_string(),
                    RouteQuota {
                        requests: 10,
                        window_seconds: 300,
                    },
                ),
                (
                    "/api/v1/auth/refresh".to_string(),
                    RouteQuota {
                        requests: 3,
                        window_seconds: 300,
                    },
                ),
            ],
        );

        // Exact match beats prefix
        let (bucket, quota) = table.resolve("/api/v1/auth/refresh");
        assert_eq!(bucket, "/api/v1/auth/refresh");
        assert_eq!(quota.requests, 3);

        // Longest prefix wins
        let (bucket, quota) = table.resolve("/api/v1/auth/logout");
        assert_eq!(bucket, "/api/v1/auth");
        assert_eq!(quota.requests, 10);

        // Fallback to the default
        let (bucket, quota) = table.resolve("/api/v1/users");
        assert_eq!(bucket, "default");
        assert_eq!(quota, DEFAULT);
    }

    #[test]
    fn test_client_key_precedence() {
        let identity = AuthenticatedIdentity {
            subject: common::types::SubjectId::from("u1"),
            role: crate::models::Role::Bde,
            status: crate::models::AccountStatus::Active,
            email: "u1@example.com".to_string(),
            display_name: "U1".to_string(),
            claims: serde_json::Map::new(),
        };
        let peer: IpAddr = "10.0.0.9".parse().unwrap();

        // Identity wins over everything
        assert_eq!(
            client_key(Some(&identity), Some("203.0.113.7, 10.0.0.1"), Some(peer)),
            "user:u1"
        );

        // First forwarded-for entry wins over the peer
        assert_eq!(
            client_key(None, Some("203.0.113.7, 10.0.0.1"), Some(peer)),
            "ip:203.0.113.7"
        );

        // Peer address as the last resort
        assert_eq!(client_key(None, None, Some(peer)), "ip:10.0.0.9");

        // Empty forwarded-for falls through to the peer
        assert_eq!(client_key(None, Some("  "), Some(peer)), "ip:10.0.0.9");

        assert_eq!(client_key(None, None, None), "ip:unknown");
    }

    #[tokio::test]
    async fn test_limit_requests_admitted_then_denied() {
        let limiter = limiter_with(Arc::new(MemoryCache::new()), Vec::new());
        let now = 1_000_000;

        for i in 0..5 {
            match limiter.check_and_consume_at("user:u1", "/api/v1/users", now).await {
                Decision::Allowed { remaining, limit, .. } => {
                    assert_eq!(limit, 5);
                    assert_eq!(remaining, 4 - i);
                }
                Decision::Denied { .. } => panic!("request {i} should be admitted"),
            }
        }

        match limiter.check_and_consume_at("user:u1", "/api/v1/users", now).await {
            Decision::Denied {
                limit,
                retry_after,
                reset,
            } => {
                assert_eq!(limit, 5);
                assert!(retry_after > 0);
                assert_eq!(reset, 1_000_020); // window of 60s starting at 999_960
            }
            Decision::Allowed { .. } => panic!("sixth request should be denied"),
        }
    }

    #[tokio::test]
    async fn test_window_boundary_resets_the_counter() {
        let backend = Arc::new(MemoryCache::new());
        let limiter = limiter_with(backend, Vec::new());

        // Fill the window ending at t=60
        for _ in 0..5 {
            limiter.check_and_consume_at("user:u1", "/x", 30).await;
        }
        assert!(matches!(
            limiter.check_and_consume_at("user:u1", "/x", 59).await,
            Decision::Denied { .. }
        ));

        // The next window uses a fresh key
        assert!(matches!(
            limiter.check_and_consume_at("user:u1", "/x", 60).await,
            Decision::Allowed { .. }
        ));
    }

    #[tokio::test]
    async fn test_clients_are_counted_independently() {
        let limiter = limiter_with(Arc::new(MemoryCache::new()), Vec::new());
        for _ in 0..5 {
            limiter.check_and_consume_at("user:u1", "/x", 10).await;
        }

        assert!(matches!(
            limiter.check_and_consume_at("user:u1", "/x", 10).await,
            Decision::Denied { .. }
        ));
        assert!(matches!(
            limiter.check_and_consume_at("user:u2", "/x", 10).await,
            Decision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check_and_consume_at("ip:10.0.0.1", "/x", 10).await,
            Decision::Allowed { .. }
        ));
    }

    #[tokio::test]
    async fn test_route_buckets_are_counted_independently() {
        let limiter = limiter_with(
            Arc::new(MemoryCache::new()),
            vec![(
                "/api/v1/auth/refresh".to_string(),
                RouteQuota {
                    requests: 2,
                    window_seconds: 300,
                },
            )],
        );

        limiter.check_and_consume_at("user:u1", "/api/v1/auth/refresh", 10).await;
        limiter.check_and_consume_at("user:u1", "/api/v1/auth/refresh", 10).await;
        assert!(matches!(
            limiter.check_and_consume_at("user:u1", "/api/v1/auth/refresh", 10).await,
            Decision::Denied { .. }
        ));

        // The default bucket for the same client is untouched
        assert!(matches!(
            limiter.check_and_consume_at("user:u1", "/api/v1/users", 10).await,
            Decision::Allowed { .. }
        ));
    }

    #[tokio::test]
    async fn test_cache_outage_fails_open() {
        struct DownCache;

        #[async_trait]
        impl CacheBackend for DownCache {
            async fn get(&self, _k: &str) -> Result<Option<String>, CacheError> {
                Err(CacheError::Backend("down".to_string()))
            }
            async fn set(&self, _k: &str, _v: &str, _t: Option<u64>) -> Result<(), CacheError> {
                Err(CacheError::Backend("down".to_string()))
            }
            async fn delete(&self, _k: &str) -> Result<bool, CacheError> {
                Err(CacheError::Backend("down".to_string()))
            }
            async fn exists(&self, _k: &str) -> Result<bool, CacheError> {
                Err(CacheError::Backend("down".to_string()))
            }
            async fn incr(&self, _k: &str, _d: i64) -> Result<i64, CacheError> {
                Err(CacheError::Backend("down".to_string()))
            }
            async fn expire(&self, _k: &str, _t: u64) -> Result<bool, CacheError> {
                Err(CacheError::Backend("down".to_string()))
            }
            async fn sadd(&self, _k: &str, _m: &str) -> Result<(), CacheError> {
                Err(CacheError::Backend("down".to_string()))
            }
            async fn smembers(&self, _k: &str) -> Result<Vec<String>, CacheError> {
                Err(CacheError::Backend("down".to_string()))
            }
        }

        let limiter = limiter_with(Arc::new(DownCache), Vec::new());
        for _ in 0..20 {
            assert!(matches!(
                limiter.check_and_consume_at("user:u1", "/x", 10).await,
                Decision::Allowed { .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_admit_exactly_the_limit() {
        let limiter = Arc::new(limiter_with(Arc::new(MemoryCache::new()), Vec::new()));
        let now = 500;

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.check_and_consume_at("user:u1", "/x", now).await
                })
            })
            .collect();

        let mut admitted = 0;
        let mut denied = 0;
        for task in tasks {
            match task.await.unwrap() {
                Decision::Allowed { .. } => admitted += 1,
                Decision::Denied { .. } => denied += 1,
            }
        }

        // The increment is atomic, so exactly `limit` requests are admitted.
        assert_eq!(admitted, 5);
        assert_eq!(denied, 15);
    }

    #[tokio::test]
    async fn test_first_request_arms_window_expiry() {
        let backend = Arc::new(MemoryCache::new());
        let limiter = limiter_with(backend.clone(), Vec::new());

        limiter.check_and_consume_at("user:u1", "/x", 0).await;
        assert!(backend.exists("ratelimit:user:u1:default:0").await.unwrap());

        // After the window size elapses the counter key is gone.
        backend.advance(61);
        assert!(!backend.exists("ratelimit:user:u1:default:0").await.unwrap());
    }
}
