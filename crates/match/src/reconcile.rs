//! Match-and-cache reconciliation.
//!
//! Given records from the metadata service, find the corresponding local
//! catalog rows. Rows already tagged with an external id are resolved by
//! one indexed lookup per batch (chunked). The rest fall back to a title
//! and year comparison; a successful slow-path match writes the external
//! id back onto the row, so the next batch resolves it on the fast path.
//!
//! Misses are not errors. A record the catalog does not carry is dropped
//! silently, and a failure while matching one record is logged and treated
//! as a miss rather than aborting the batch. Genuine misses are remembered
//! in a bounded cache so re-reconciling the same records does not repeat
//! the title comparison; the TTL bounds how long a catalog refresh can go
//! unnoticed. Concurrent reconciliations over overlapping records are
//! safe; conflicting tag writes resolve last-write-wins.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use exn::ResultExt;
use tracing::{instrument, warn};
use zapp_cache::BoundedCache;
use zapp_store::{Movie, Repository, SeriesEntry};

use crate::error::{ErrorKind, Result};
use crate::provider::MetadataRecord;

const MISS_CACHE_CAPACITY: usize = 1024;
const MISS_CACHE_TTL: Duration = Duration::from_secs(300);

type MissCache = Mutex<BoundedCache<i64, ()>>;

/// How a record was resolved to its local row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchBasis {
    /// The row already carried the external id.
    Tag,
    /// Matched by title (and year when present); the id was written back.
    TitleYear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieMatch {
    pub external_id: i64,
    pub movie: Movie,
    pub basis: MatchBasis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesMatch {
    pub external_id: i64,
    pub series: SeriesEntry,
    pub basis: MatchBasis,
}

/// Reconciles metadata records against the local catalog.
pub struct Reconciler {
    repo: Repository,
    movie_misses: MissCache,
    series_misses: MissCache,
    slow_path_lookups: AtomicU64,
}

impl Reconciler {
    pub fn new(repo: Repository) -> Self {
        let misses = || Mutex::new(BoundedCache::new(MISS_CACHE_CAPACITY).with_ttl(MISS_CACHE_TTL));
        Self {
            repo,
            movie_misses: misses(),
            series_misses: misses(),
            slow_path_lookups: AtomicU64::new(0),
        }
    }

    fn is_known_miss(cache: &MissCache, external_id: i64) -> bool {
        let mut guard = match cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.has(&external_id)
    }

    fn remember_miss(cache: &MissCache, external_id: i64) {
        let mut guard = match cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.set(external_id, ());
    }

    /// Title-comparison lookups performed so far. A warm catalog should
    /// keep this flat between identical batches.
    pub fn slow_path_lookups(&self) -> u64 {
        self.slow_path_lookups.load(Ordering::Relaxed)
    }

    /// Resolve movie records. Output order does not mirror the input;
    /// unmatched records are absent.
    #[instrument(level = "debug", skip_all, fields(records = records.len()))]
    pub async fn reconcile_movies(&self, records: &[MetadataRecord]) -> Result<Vec<MovieMatch>> {
        let ids: Vec<i64> = records.iter().map(|r| r.external_id).collect();
        let tagged: HashMap<i64, Movie> = self
            .repo
            .movies_by_external_ids(&ids)
            .await
            .or_raise(|| ErrorKind::Store)?
            .into_iter()
            .filter_map(|movie| movie.external_id.map(|id| (id, movie)))
            .collect();

        let mut matches = Vec::with_capacity(records.len());
        for record in records {
            if let Some(movie) = tagged.get(&record.external_id) {
                matches.push(MovieMatch {
                    external_id: record.external_id,
                    movie: movie.clone(),
                    basis: MatchBasis::Tag,
                });
                continue;
            }
            if let Some(found) = self.match_movie_slow(record).await {
                matches.push(found);
            }
        }
        Ok(matches)
    }

    async fn match_movie_slow(&self, record: &MetadataRecord) -> Option<MovieMatch> {
        if Self::is_known_miss(&self.movie_misses, record.external_id) {
            return None;
        }
        self.slow_path_lookups.fetch_add(1, Ordering::Relaxed);
        let found = match self.repo.find_movie_by_title_year(&record.title, record.year).await {
            Ok(found) => found,
            Err(err) => {
                warn!(external_id = record.external_id, error = %err, "movie lookup failed, treating as miss");
                return None;
            }
        };
        let Some(mut movie) = found else {
            // A clean "not in the catalog"; transient failures above are
            // never remembered.
            Self::remember_miss(&self.movie_misses, record.external_id);
            return None;
        };
        if let Err(err) = self.repo.tag_movie(&movie.id, record.external_id).await {
            warn!(external_id = record.external_id, error = %err, "tag write failed, treating as miss");
            return None;
        }
        movie.external_id = Some(record.external_id);
        Some(MovieMatch {
            external_id: record.external_id,
            movie,
            basis: MatchBasis::TitleYear,
        })
    }

    /// Series counterpart of [`reconcile_movies`](Self::reconcile_movies).
    #[instrument(level = "debug", skip_all, fields(records = records.len()))]
    pub async fn reconcile_series(&self, records: &[MetadataRecord]) -> Result<Vec<SeriesMatch>> {
        let ids: Vec<i64> = records.iter().map(|r| r.external_id).collect();
        let tagged: HashMap<i64, SeriesEntry> = self
            .repo
            .series_by_external_ids(&ids)
            .await
            .or_raise(|| ErrorKind::Store)?
            .into_iter()
            .filter_map(|series| series.external_id.map(|id| (id, series)))
            .collect();

        let mut matches = Vec::with_capacity(records.len());
        for record in records {
            if let Some(series) = tagged.get(&record.external_id) {
                matches.push(SeriesMatch {
                    external_id: record.external_id,
                    series: series.clone(),
                    basis: MatchBasis::Tag,
                });
                continue;
            }
            if let Some(found) = self.match_series_slow(record).await {
                matches.push(found);
            }
        }
        Ok(matches)
    }

    async fn match_series_slow(&self, record: &MetadataRecord) -> Option<SeriesMatch> {
        if Self::is_known_miss(&self.series_misses, record.external_id) {
            return None;
        }
        self.slow_path_lookups.fetch_add(1, Ordering::Relaxed);
        let found = match self.repo.find_series_by_title_year(&record.title, record.year).await {
            Ok(found) => found,
            Err(err) => {
                warn!(external_id = record.external_id, error = %err, "series lookup failed, treating as miss");
                return None;
            }
        };
        let Some(mut series) = found else {
            Self::remember_miss(&self.series_misses, record.external_id);
            return None;
        };
        if let Err(err) = self.repo.tag_series(&series.id, record.external_id).await {
            warn!(external_id = record.external_id, error = %err, "tag write failed, treating as miss");
            return None;
        }
        series.external_id = Some(record.external_id);
        Some(SeriesMatch {
            external_id: record.external_id,
            series,
            basis: MatchBasis::TitleYear,
        })
    }
}
