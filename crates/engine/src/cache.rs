//! Short-lived memoization for read-path queries.
//!
//! Every read query ends in rate-limited explorer calls. Caching the computed result
//! for a few tens of seconds lets bursts of identical queries share one upstream
//! round-trip. An expired entry stays in place until a refresh for its key
//! succeeds, so it can keep answering while the upstream is failing.
//!
//! There is no request coalescing. Concurrent misses on one key each run their own
//! computation and the last writer wins.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

/// Lifetime class of a cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryClass {
    /// Event and transaction listings.
    List,
    /// Aggregate statistics.
    Stats,
}

impl QueryClass {
    pub fn ttl(&self) -> Duration {
        match self {
            QueryClass::List => Duration::from_secs(60),
            QueryClass::Stats => Duration::from_secs(30),
        }
    }
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

/// Process-wide query cache. Construct one and share it behind an `Arc`.
#[derive(Default)]
pub struct QueryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, or run `compute` and cache its result for `ttl`.
    ///
    /// A hit hands back the same `Arc` that was stored. When `compute` fails and the
    /// key holds an expired value, that stale value is returned instead of the error
    /// and stays cached for the next attempt.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Arc<T>, E>
    where
        T: Send + Sync + 'static,
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let stale = match self.lookup::<T>(key) {
            Lookup::Fresh(value) => {
                tracing::debug!(key, "Query cache hit");
                return Ok(value);
            }
            Lookup::Expired(value) => Some(value),
            Lookup::Missing => None,
        };

        match compute().await {
            Ok(value) => {
                let value = Arc::new(value);
                self.store(key, value.clone(), ttl);
                Ok(value)
            }
            Err(e) => match stale {
                Some(value) => {
                    tracing::warn!(key, error = %e, "Refresh failed, serving stale cached value");
                    Ok(value)
                }
                None => Err(e),
            },
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup<T: Send + Sync + 'static>(&self, key: &str) -> Lookup<T> {
        let entries = self.lock();
        let Some(entry) = entries.get(key) else {
            return Lookup::Missing;
        };

        match entry.value.clone().downcast::<T>() {
            Ok(value) if Instant::now() < entry.expires_at => Lookup::Fresh(value),
            Ok(value) => Lookup::Expired(value),
            Err(_) => Lookup::Missing,
        }
    }

    fn store<T: Send + Sync + 'static>(&self, key: &str, value: Arc<T>, ttl: Duration) {
        self.lock().insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

enum Lookup<T> {
    Fresh(Arc<T>),
    Expired(Arc<T>),
    Missing,
}
