//! Bulk catalog ingestion.
//!
//! Provider refreshes arrive as whole snapshots. Each bulk operation runs
//! inside a single transaction so a refresh either lands completely or not
//! at all. Upserts preserve user state (enabled flags, favorites, explicit
//! ordering) via COALESCE against the existing row: the provider payload
//! carries `None` for fields the user owns.

use std::time::Instant;

use exn::ResultExt;
use serde::Deserialize;
use sqlx::{Sqlite, Transaction};
use time::UtcDateTime;
use tracing::instrument;

use crate::Repository;
use crate::error::{ErrorKind, Result};
use crate::models::to_json_list;

/// Outcome of one bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkResult {
    pub upserted: usize,
    pub deleted: usize,
    pub duration_ms: u64,
}

/// One channel row from a provider refresh. `enabled` and `is_favorite`
/// are `None` unless the caller deliberately wants to overwrite user state.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelUpsert {
    pub stream_id: String,
    pub source_id: String,
    #[serde(default)]
    pub category_ids: Vec<String>,
    pub name: String,
    #[serde(default)]
    pub channel_num: Option<i64>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub is_favorite: Option<bool>,
    #[serde(default)]
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryUpsert {
    pub category_id: String,
    pub source_id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub display_order: Option<i64>,
    #[serde(default)]
    pub filter_words: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceUpsert {
    pub source_id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub display_order: Option<i64>,
}

/// One video-on-demand movie from a provider refresh. The external-id tag
/// columns are deliberately absent: a refresh never touches them.
#[derive(Debug, Clone, Deserialize)]
pub struct MovieUpsert {
    pub stream_id: String,
    pub source_id: String,
    #[serde(default)]
    pub category_ids: Vec<String>,
    pub name: String,
    #[serde(default)]
    pub year: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesUpsert {
    pub series_id: String,
    pub source_id: String,
    #[serde(default)]
    pub category_ids: Vec<String>,
    pub name: String,
    #[serde(default)]
    pub year: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgramUpsert {
    pub id: String,
    pub stream_id: String,
    pub source_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_ts: i64,
    pub end_ts: i64,
}

impl Repository {
    #[instrument(level = "debug", skip_all, fields(rows = channels.len()))]
    pub async fn bulk_upsert_channels(&self, channels: Vec<ChannelUpsert>) -> Result<BulkResult> {
        let started = Instant::now();
        let upserted = channels.len();
        let mut tx = self.pool().begin().await.or_raise(|| ErrorKind::Database)?;
        for channel in channels {
            sqlx::query(include_str!("../queries/upsert_channel.sql"))
                .bind(channel.stream_id)
                .bind(channel.source_id)
                .bind(to_json_list(&channel.category_ids))
                .bind(channel.name)
                .bind(channel.channel_num)
                .bind(channel.enabled.map(i64::from))
                .bind(channel.is_favorite.map(i64::from))
                .bind(channel.logo_url)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(BulkResult { upserted, deleted: 0, duration_ms: started.elapsed().as_millis() as u64 })
    }

    #[instrument(level = "debug", skip_all, fields(rows = categories.len()))]
    pub async fn bulk_upsert_categories(&self, categories: Vec<CategoryUpsert>) -> Result<BulkResult> {
        let started = Instant::now();
        let upserted = categories.len();
        let mut tx = self.pool().begin().await.or_raise(|| ErrorKind::Database)?;
        for category in categories {
            sqlx::query(include_str!("../queries/upsert_category.sql"))
                .bind(category.category_id)
                .bind(category.source_id)
                .bind(category.name)
                .bind(category.enabled.map(i64::from))
                .bind(category.display_order)
                .bind(to_json_list(&category.filter_words))
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(BulkResult { upserted, deleted: 0, duration_ms: started.elapsed().as_millis() as u64 })
    }

    #[instrument(level = "debug", skip_all, fields(rows = sources.len()))]
    pub async fn bulk_upsert_sources(&self, sources: Vec<SourceUpsert>) -> Result<BulkResult> {
        let started = Instant::now();
        let upserted = sources.len();
        let mut tx = self.pool().begin().await.or_raise(|| ErrorKind::Database)?;
        for source in sources {
            sqlx::query(include_str!("../queries/upsert_source.sql"))
                .bind(source.source_id)
                .bind(source.name)
                .bind(source.enabled.map(i64::from))
                .bind(source.display_order)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(BulkResult { upserted, deleted: 0, duration_ms: started.elapsed().as_millis() as u64 })
    }

    /// Refresh the movie catalog. Existing external-id tags survive the
    /// upsert untouched.
    #[instrument(level = "debug", skip_all, fields(rows = movies.len()))]
    pub async fn bulk_upsert_movies(&self, movies: Vec<MovieUpsert>) -> Result<BulkResult> {
        let started = Instant::now();
        let upserted = movies.len();
        let mut tx = self.pool().begin().await.or_raise(|| ErrorKind::Database)?;
        for movie in movies {
            sqlx::query(include_str!("../queries/upsert_movie.sql"))
                .bind(movie.stream_id)
                .bind(movie.source_id)
                .bind(to_json_list(&movie.category_ids))
                .bind(movie.name)
                .bind(movie.year)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(BulkResult { upserted, deleted: 0, duration_ms: started.elapsed().as_millis() as u64 })
    }

    #[instrument(level = "debug", skip_all, fields(rows = series.len()))]
    pub async fn bulk_upsert_series(&self, series: Vec<SeriesUpsert>) -> Result<BulkResult> {
        let started = Instant::now();
        let upserted = series.len();
        let mut tx = self.pool().begin().await.or_raise(|| ErrorKind::Database)?;
        for entry in series {
            sqlx::query(include_str!("../queries/upsert_series.sql"))
                .bind(entry.series_id)
                .bind(entry.source_id)
                .bind(to_json_list(&entry.category_ids))
                .bind(entry.name)
                .bind(entry.year)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(BulkResult { upserted, deleted: 0, duration_ms: started.elapsed().as_millis() as u64 })
    }

    /// Replace the whole guide of one source: delete its existing entries,
    /// then insert the new snapshot. Entries whose end never passes their
    /// start are dropped up front.
    #[instrument(level = "debug", skip_all, fields(source_id, rows = programs.len()))]
    pub async fn bulk_replace_programs(&self, source_id: &str, programs: Vec<ProgramUpsert>) -> Result<BulkResult> {
        let started = Instant::now();
        let mut tx = self.pool().begin().await.or_raise(|| ErrorKind::Database)?;
        let deleted = sqlx::query(include_str!("../queries/delete_programs_for_source.sql"))
            .bind(source_id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?
            .rows_affected() as usize;
        let mut upserted = 0;
        for program in programs {
            if program.end_ts <= program.start_ts {
                continue;
            }
            upserted += sqlx::query(include_str!("../queries/insert_program.sql"))
                .bind(program.id)
                .bind(program.stream_id)
                .bind(program.source_id)
                .bind(program.title)
                .bind(program.description)
                .bind(program.start_ts)
                .bind(program.end_ts)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?
                .rows_affected() as usize;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(BulkResult { upserted, deleted, duration_ms: started.elapsed().as_millis() as u64 })
    }

    /// Rewrite the display order of one source's categories from an
    /// explicit id list. An unknown id aborts and rolls the whole reorder
    /// back, leaving the previous order intact.
    #[instrument(level = "debug", skip(self, ordered_ids), fields(source_id, rows = ordered_ids.len()))]
    pub async fn reorder_categories(&self, source_id: &str, ordered_ids: &[String]) -> Result<()> {
        let mut tx = self.pool().begin().await.or_raise(|| ErrorKind::Database)?;
        for (position, category_id) in ordered_ids.iter().enumerate() {
            Self::reorder_row(
                &mut tx,
                sqlx::query(include_str!("../queries/reorder_category.sql"))
                    .bind(category_id)
                    .bind(source_id)
                    .bind(position as i64),
            )
            .await?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Source counterpart of [`reorder_categories`](Self::reorder_categories).
    #[instrument(level = "debug", skip_all, fields(rows = ordered_ids.len()))]
    pub async fn reorder_sources(&self, ordered_ids: &[String]) -> Result<()> {
        let mut tx = self.pool().begin().await.or_raise(|| ErrorKind::Database)?;
        for (position, source_id) in ordered_ids.iter().enumerate() {
            Self::reorder_row(
                &mut tx,
                sqlx::query(include_str!("../queries/reorder_source.sql"))
                    .bind(source_id)
                    .bind(position as i64),
            )
            .await?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn reorder_row<'q>(
        tx: &mut Transaction<'_, Sqlite>,
        query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> Result<()> {
        let affected = query.execute(&mut **tx).await.or_raise(|| ErrorKind::Database)?.rows_affected();
        if affected == 0 {
            // Dropping the transaction rolls everything back.
            exn::bail!(ErrorKind::Constraint);
        }
        Ok(())
    }

    /// Stamp missing tag timestamps after a schema upgrade. Rows tagged
    /// before the timestamp column existed get the current time.
    pub async fn backfill_tag_timestamps(&self) -> Result<u64> {
        let now = UtcDateTime::now().unix_timestamp();
        let mut total = 0;
        for table in ["movies", "series"] {
            let sql =
                format!("UPDATE {table} SET external_id_tagged_at = ?1 WHERE external_id IS NOT NULL AND external_id_tagged_at IS NULL");
            total += sqlx::query(&sql)
                .bind(now)
                .execute(self.pool())
                .await
                .or_raise(|| ErrorKind::Database)?
                .rows_affected();
        }
        Ok(total)
    }
}
