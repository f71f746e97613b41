//! In-process cache backend.
//!
//! Used by tests (the clock is advanced manually, so TTL behavior is
//! deterministic) and as a degraded fallback when Redis is unreachable at
//! startup. Counters lose the cross-instance property in this mode: each
//! process rate-limits and caches independently.

use super::{CacheBackend, CacheError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

#[derive(Clone)]
enum Stored {
    Scalar(String),
    Set(HashSet<String>),
}

struct Entry {
    value: Stored,
    expires_at: Option<i64>,
}

/// Process-local [`CacheBackend`].
///
/// [`MemoryCache::new`] starts a manual clock at zero, advanced explicitly
/// with [`MemoryCache::advance`]; tests drive TTL behavior deterministically
/// with it. [`MemoryCache::system_clock`] reads wall time instead and is
/// what the degraded startup fallback uses.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    manual_now: Option<AtomicI64>,
}

impl MemoryCache {
    /// Backend with a manual clock starting at zero.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            manual_now: Some(AtomicI64::new(0)),
        }
    }

    /// Backend that follows wall time, for cache-less production fallback.
    pub fn system_clock() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            manual_now: None,
        }
    }

    /// Current clock value in seconds.
    pub fn now(&self) -> i64 {
        match &self.manual_now {
            Some(now) => now.load(Ordering::SeqCst),
            None => std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs() as i64)
                .unwrap_or(0),
        }
    }

    /// Advance the manual clock; entries whose TTL has elapsed become
    /// misses. No-op for a system-clock backend.
    pub fn advance(&self, seconds: i64) {
        if let Some(now) = &self.manual_now {
            now.fetch_add(seconds, Ordering::SeqCst);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // A poisoned lock only means another test thread panicked mid-write;
        // the map itself is still usable.
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn is_expired(entry: &Entry, now: i64) -> bool {
        entry.expires_at.is_some_and(|at| at <= now)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = self.now();
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|entry| Self::is_expired(entry, now)) {
            entries.remove(key);
            return Ok(None);
        }

        match entries.get(key) {
            Some(entry) => match &entry.value {
                Stored::Scalar(value) => Ok(Some(value.clone())),
                Stored::Set(_) => Ok(None),
            },
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: Option<u64>,
    ) -> Result<(), CacheError> {
        let now = self.now();
        let mut entries = self.lock();
        entries.insert(
            key.to_string(),
            Entry {
                value: Stored::Scalar(value.to_string()),
                expires_at: ttl_seconds.map(|ttl| now + ttl as i64),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = self.now();
        let mut entries = self.lock();
        match entries.remove(key) {
            Some(entry) => Ok(!Self::is_expired(&entry, now)),
            None => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let now = self.now();
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|entry| Self::is_expired(entry, now)) {
            entries.remove(key);
            return Ok(false);
        }
        Ok(entries.contains_key(key))
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        let now = self.now();
        let mut entries = self.lock();

        let current = match entries.get(key) {
            Some(entry) if Self::is_expired(entry, now) => None,
            Some(entry) => match &entry.value {
                Stored::Scalar(value) => Some((value.parse::<i64>().unwrap_or(0), entry.expires_at)),
                Stored::Set(_) => {
                    return Err(CacheError::Backend(
                        "INCR on a set-valued key".to_string(),
                    ))
                }
            },
            None => None,
        };

        let (previous, expires_at) = current.unwrap_or((0, None));
        let next = previous + delta;
        entries.insert(
            key.to_string(),
            Entry {
                value: Stored::Scalar(next.to_string()),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool, CacheError> {
        let now = self.now();
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(entry) if !Self::is_expired(entry, now) => {
                entry.expires_at = Some(now + ttl_seconds as i64);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), CacheError> {
        let now = self.now();
        let mut entries = self.lock();

        let live = entries
            .get(key)
            .is_some_and(|entry| !Self::is_expired(entry, now));
        if live {
            if let Some(entry) = entries.get_mut(key) {
                return match &mut entry.value {
                    Stored::Set(members) => {
                        members.insert(member.to_string());
                        Ok(())
                    }
                    Stored::Scalar(_) => Err(CacheError::Backend(
                        "SADD on a scalar-valued key".to_string(),
                    )),
                };
            }
        }

        let mut members = HashSet::new();
        members.insert(member.to_string());
        entries.insert(
            key.to_string(),
            Entry {
                value: Stored::Set(members),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let now = self.now();
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|entry| Self::is_expired(entry, now)) {
            entries.remove(key);
            return Ok(Vec::new());
        }

        match entries.get(key) {
            Some(entry) => match &entry.value {
                Stored::Set(members) => Ok(members.iter().cloned().collect()),
                Stored::Scalar(_) => Ok(Vec::new()),
            },
            None => Ok(Vec::new()),
        }
    }
}
