//! External metadata service seam.
//!
//! A provider is a pure function of its query parameters: same query, same
//! ordered record list, no side effects. That purity is what makes the
//! caching wrapper safe.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use zapp_cache::BoundedCache;

use crate::error::Result;

/// One record from the external metadata service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    pub external_id: i64,
    pub title: String,
    pub year: Option<i64>,
}

/// Client for the external metadata service.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn search_movies(&self, query: &str) -> Result<Vec<MetadataRecord>>;
    async fn search_series(&self, query: &str) -> Result<Vec<MetadataRecord>>;
}

/// Memoizes provider responses in a bounded LRU+TTL cache so repeated
/// searches inside one session do not hit the network again.
///
/// The cache lock is never held across an await: a miss releases it, runs
/// the inner call, then re-locks to store the response. Two concurrent
/// misses for the same query both hit the provider; last write wins, and
/// since the provider is pure both writes carry the same value.
pub struct CachedProvider<P> {
    inner: P,
    movies: Mutex<BoundedCache<String, Vec<MetadataRecord>>>,
    series: Mutex<BoundedCache<String, Vec<MetadataRecord>>>,
}

impl<P: MetadataProvider> CachedProvider<P> {
    pub fn new(inner: P, capacity: usize, ttl: Option<Duration>) -> Self {
        let build = || {
            let cache = BoundedCache::new(capacity);
            match ttl {
                Some(ttl) => cache.with_ttl(ttl),
                None => cache,
            }
        };
        Self {
            inner,
            movies: Mutex::new(build()),
            series: Mutex::new(build()),
        }
    }

    fn cached(cache: &Mutex<BoundedCache<String, Vec<MetadataRecord>>>, query: &str) -> Option<Vec<MetadataRecord>> {
        let mut guard = match cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get(&query.to_string()).cloned()
    }

    fn store(cache: &Mutex<BoundedCache<String, Vec<MetadataRecord>>>, query: &str, records: &[MetadataRecord]) {
        let mut guard = match cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.set(query.to_string(), records.to_vec());
    }
}

#[async_trait]
impl<P: MetadataProvider> MetadataProvider for CachedProvider<P> {
    async fn search_movies(&self, query: &str) -> Result<Vec<MetadataRecord>> {
        if let Some(hit) = Self::cached(&self.movies, query) {
            return Ok(hit);
        }
        let records = self.inner.search_movies(query).await?;
        Self::store(&self.movies, query, &records);
        Ok(records)
    }

    async fn search_series(&self, query: &str) -> Result<Vec<MetadataRecord>> {
        if let Some(hit) = Self::cached(&self.series, query) {
            return Ok(hit);
        }
        let records = self.inner.search_series(query).await?;
        Self::store(&self.series, query, &records);
        Ok(records)
    }
}
