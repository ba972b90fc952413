//! In-memory analysis cache with wall-clock expiry.
//!
//! One cache lives inside each [`crate::analysis::AnalysisService`]. Entries
//! are written whole and never mutated; a recomputation overwrites. Two
//! concurrent misses on the same key both call the model and the last write
//! wins, which is acceptable because equal keys mean equivalent results.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::models::AnalysisResult;

/// Shortest TTL the cache honours, in minutes.
pub const MIN_TTL_MINUTES: u32 = 5;

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: AnalysisResult,
    expires_at: DateTime<Utc>,
}

/// Fingerprint-keyed store of analysis results.
pub struct AnalysisCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl AnalysisCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Look up a live entry. Expired entries are treated as absent but left
    /// in place until [`purge_expired`](Self::purge_expired) or an overwrite.
    pub fn get(&self, key: &str) -> Option<AnalysisResult> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key)?;
        if entry.expires_at > now {
            Some(entry.result.clone())
        } else {
            debug!(key, "analysis cache entry expired");
            None
        }
    }

    /// Store a result for `max(ttl_minutes, 5)` minutes from now.
    pub fn insert(&self, key: String, result: AnalysisResult, ttl_minutes: u32) {
        let ttl = Duration::minutes(i64::from(ttl_minutes.max(MIN_TTL_MINUTES)));
        let expires_at = self.clock.now() + ttl;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, CacheEntry { result, expires_at });
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
