//! Catalog repository.
//!
//! All reads against the store go through here. Listing queries enforce the
//! visibility rule at the SQL level: a channel is returned only if its
//! owning source is enabled and the channel itself is not individually
//! disabled. Queries over caller-supplied id lists are chunked through
//! [`crate::sql`] so no statement ever exceeds the bound-parameter ceiling.

use std::collections::HashSet;

use exn::ResultExt;
use sqlx::SqlitePool;
use time::UtcDateTime;

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{
    Category, CategoryRow, Channel, ChannelRow, CustomGroup, CustomGroupRow, Movie, MovieRow, Program, ProgramRow,
    SeriesEntry, SeriesRow, Source, SourceRow,
};
use crate::sql::{Bind, SelectBuilder, bind_all, chunked};

const CHANNEL_COLUMNS: &str = "c.stream_id, c.source_id, c.category_ids, c.name, c.channel_num, \
     c.enabled, c.is_favorite, c.favorite_position, c.logo_url";
const VISIBLE_CHANNELS: &str = "channels c JOIN sources s ON s.source_id = c.source_id";

/// Sort order the store can apply for paged listings. In-memory sorts (for
/// example after filter-word scrubbing) are the query layer's business; a
/// paged query needs a stable order on the SQL side so pages don't shear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSort {
    /// Case-insensitive by display name.
    Alphabetical,
    /// Ascending provider number; unnumbered channels sort last, broken by
    /// name among themselves.
    ProviderNumber,
}

impl PageSort {
    fn order_clause(self) -> &'static str {
        match self {
            Self::Alphabetical => "c.name COLLATE NOCASE, c.stream_id",
            Self::ProviderNumber => "c.channel_num IS NULL, c.channel_num, c.name COLLATE NOCASE, c.stream_id",
        }
    }
}

/// The filter signature of a paged channel listing. Two signatures that
/// compare equal page over the same result set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelPageFilter {
    pub category_id: Option<String>,
    pub search: Option<String>,
    pub sort: Option<PageSort>,
}

/// Repository over the shared catalog database.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Sources
    // =========================================================================

    /// All sources in display order (explicit order first, name fallback).
    pub async fn list_sources(&self) -> Result<Vec<Source>> {
        let rows: Vec<SourceRow> = sqlx::query_as(include_str!("../queries/list_sources.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(rows.into_iter().map(Source::from).collect())
    }

    /// Ids of sources not disabled by the user.
    pub async fn enabled_source_ids(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(include_str!("../queries/enabled_source_ids.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    pub async fn set_source_enabled(&self, source_id: &str, enabled: bool) -> Result<()> {
        sqlx::query(include_str!("../queries/set_source_enabled.sql"))
            .bind(source_id)
            .bind(enabled as i64)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Categories
    // =========================================================================

    /// Categories of one source in display order. `include_disabled`
    /// controls whether user-disabled categories appear.
    pub async fn list_categories_for_source(&self, source_id: &str, include_disabled: bool) -> Result<Vec<Category>> {
        let rows: Vec<CategoryRow> = sqlx::query_as(include_str!("../queries/list_categories_for_source.sql"))
            .bind(source_id)
            .bind(include_disabled as i64)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn get_category(&self, category_id: &str) -> Result<Option<Category>> {
        let row: Option<CategoryRow> = sqlx::query_as(include_str!("../queries/get_category.sql"))
            .bind(category_id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(TryInto::try_into).transpose()
    }

    /// Enabled categories of enabled sources, across all sources, in
    /// display order.
    pub async fn enabled_categories(&self) -> Result<Vec<Category>> {
        let rows: Vec<CategoryRow> = sqlx::query_as(include_str!("../queries/enabled_categories.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn set_category_enabled(&self, category_id: &str, enabled: bool) -> Result<()> {
        sqlx::query(include_str!("../queries/set_category_enabled.sql"))
            .bind(category_id)
            .bind(enabled as i64)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Channel listings
    // =========================================================================

    /// Every channel whose source is enabled and that is not individually
    /// disabled (the source-only visibility path).
    pub async fn visible_channels(&self) -> Result<Vec<Channel>> {
        let rows: Vec<ChannelRow> = sqlx::query_as(include_str!("../queries/channels_visible.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Visible channels whose membership list contains `category_id`.
    pub async fn channels_in_category(&self, category_id: &str) -> Result<Vec<Channel>> {
        let rows: Vec<ChannelRow> = sqlx::query_as(include_str!("../queries/channels_in_category.sql"))
            .bind(category_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Visible channels flagged favorite, unordered; the query layer owns
    /// the position-then-requested-sort ordering.
    pub async fn favorite_channels(&self) -> Result<Vec<Channel>> {
        let rows: Vec<ChannelRow> = sqlx::query_as(include_str!("../queries/favorite_channels.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Visible channels in the recency list, most recent first. Entries
    /// whose channel no longer exists drop out via the join.
    pub async fn recently_viewed_channels(&self) -> Result<Vec<Channel>> {
        let rows: Vec<ChannelRow> = sqlx::query_as(include_str!("../queries/recently_viewed_channels.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Visible member channels of a custom group, explicit position first.
    pub async fn custom_group_channels(&self, group_id: &str) -> Result<Vec<Channel>> {
        let rows: Vec<ChannelRow> = sqlx::query_as(include_str!("../queries/custom_group_channels.sql"))
            .bind(group_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn custom_group_exists(&self, group_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/custom_group_exists.sql"))
            .bind(group_id)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(count > 0)
    }

    pub async fn list_custom_groups(&self) -> Result<Vec<CustomGroup>> {
        let rows: Vec<CustomGroupRow> = sqlx::query_as(include_str!("../queries/list_custom_groups.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(rows.into_iter().map(CustomGroup::from).collect())
    }

    /// Visible member counts per custom group, one aggregated query.
    pub async fn custom_group_member_counts(&self) -> Result<Vec<(String, i64)>> {
        sqlx::query_as(include_str!("../queries/custom_group_member_counts.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Create a group, or rename and reorder an existing one.
    pub async fn upsert_custom_group(&self, group_id: &str, name: &str, display_order: Option<i64>) -> Result<()> {
        sqlx::query(include_str!("../queries/upsert_custom_group.sql"))
            .bind(group_id)
            .bind(name)
            .bind(display_order)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Delete a group together with its membership rows.
    pub async fn delete_custom_group(&self, group_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/delete_custom_group_members.sql"))
            .bind(group_id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/delete_custom_group.sql"))
            .bind(group_id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub async fn add_group_member(&self, group_id: &str, stream_id: &str, position: Option<i64>) -> Result<()> {
        sqlx::query(include_str!("../queries/upsert_group_member.sql"))
            .bind(group_id)
            .bind(stream_id)
            .bind(position)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub async fn remove_group_member(&self, group_id: &str, stream_id: &str) -> Result<()> {
        sqlx::query(include_str!("../queries/remove_group_member.sql"))
            .bind(group_id)
            .bind(stream_id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Visible channel count per category id, computed in one aggregated
    /// query over the expanded membership column rather than per category.
    pub async fn channel_count_by_category(&self) -> Result<Vec<(String, i64)>> {
        sqlx::query_as(include_str!("../queries/channel_count_by_category.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    pub async fn count_visible_channels(&self) -> Result<i64> {
        sqlx::query_scalar(include_str!("../queries/count_visible_channels.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    pub async fn count_favorite_channels(&self) -> Result<i64> {
        sqlx::query_scalar(include_str!("../queries/count_favorite_channels.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    pub async fn count_recently_viewed(&self) -> Result<i64> {
        sqlx::query_scalar(include_str!("../queries/count_recently_viewed.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Visible channels matching an arbitrary id list.
    ///
    /// The list is split into ceiling-sized chunks, one statement per chunk,
    /// and the partial results are unioned in memory without duplicates.
    /// Chunking is transparent: the result equals what a single unchunked
    /// query would return.
    pub async fn channels_by_ids(&self, ids: &[String]) -> Result<Vec<Channel>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for chunk in chunked(ids) {
            let builder = SelectBuilder::new(CHANNEL_COLUMNS, VISIBLE_CHANNELS)
                .predicate("s.enabled = ?", [Bind::Int(1)])
                .predicate("c.enabled = ?", [Bind::Int(1)])
                .in_list("c.stream_id", chunk);
            let sql = builder.build();
            let query = bind_all(sqlx::query_as::<_, ChannelRow>(&sql), builder.binds());
            let rows = query.fetch_all(&self.pool).await.or_raise(|| ErrorKind::Database)?;
            for row in rows {
                let channel: Channel = row.try_into()?;
                if seen.insert(channel.id.clone()) {
                    out.push(channel);
                }
            }
        }
        Ok(out)
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Name search over visible channels that belong to at least one
    /// enabled category. The restriction is applied before text matching;
    /// the result is capped at `cap` rows.
    pub async fn search_channels(&self, text: &str, cap: i64) -> Result<Vec<Channel>> {
        let rows: Vec<ChannelRow> = sqlx::query_as(include_str!("../queries/search_channels.sql"))
            .bind(like_pattern(text))
            .bind(cap)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Title search over guide entries of visible channels, restricted to
    /// programs that have not yet ended.
    pub async fn search_programs(&self, text: &str, now: UtcDateTime, cap: i64) -> Result<Vec<Program>> {
        let rows: Vec<ProgramRow> = sqlx::query_as(include_str!("../queries/search_programs.sql"))
            .bind(like_pattern(text))
            .bind(now.unix_timestamp())
            .bind(cap)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    // =========================================================================
    // Paged listings
    // =========================================================================

    fn page_builder(filter: &ChannelPageFilter) -> SelectBuilder {
        let mut builder = SelectBuilder::new(CHANNEL_COLUMNS, VISIBLE_CHANNELS)
            .predicate("s.enabled = ?", [Bind::Int(1)])
            .predicate("c.enabled = ?", [Bind::Int(1)]);
        if let Some(category_id) = &filter.category_id {
            builder = builder.predicate(
                "EXISTS (SELECT 1 FROM json_each(COALESCE(c.category_ids, '[]')) je WHERE je.value = ?)",
                [Bind::Text(category_id.clone())],
            );
        }
        if let Some(search) = &filter.search {
            builder = builder.predicate("c.name LIKE ? ESCAPE '\\'", [Bind::Text(like_pattern(search))]);
        }
        builder.order_by(filter.sort.unwrap_or(PageSort::Alphabetical).order_clause())
    }

    /// Matching row count for a page filter.
    pub async fn count_channels_page(&self, filter: &ChannelPageFilter) -> Result<i64> {
        let builder = Self::page_builder(filter);
        let sql = builder.build_count();
        let query = bind_all(sqlx::query_as::<_, (i64,)>(&sql), builder.count_binds());
        let (count,) = query.fetch_one(&self.pool).await.or_raise(|| ErrorKind::Database)?;
        Ok(count)
    }

    /// One page of channels under a page filter, in the filter's sort order.
    pub async fn channels_page(&self, filter: &ChannelPageFilter, limit: i64, offset: i64) -> Result<Vec<Channel>> {
        let builder = Self::page_builder(filter).limit_offset(limit, offset);
        let sql = builder.build();
        let query = bind_all(sqlx::query_as::<_, ChannelRow>(&sql), builder.binds());
        let rows = query.fetch_all(&self.pool).await.or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    // =========================================================================
    // Favorites and recency
    // =========================================================================

    /// Flip the favorite flag. Clearing it also clears any explicit
    /// favorite position.
    pub async fn set_favorite(&self, stream_id: &str, favorite: bool) -> Result<()> {
        sqlx::query(include_str!("../queries/set_favorite.sql"))
            .bind(stream_id)
            .bind(favorite as i64)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub async fn set_favorite_position(&self, stream_id: &str, position: Option<i64>) -> Result<()> {
        sqlx::query(include_str!("../queries/set_favorite_position.sql"))
            .bind(stream_id)
            .bind(position)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Record a viewing at `viewed_at` and trim the recency list down to
    /// `keep` entries, atomically.
    pub async fn record_view(&self, stream_id: &str, viewed_at: UtcDateTime, keep: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/record_view.sql"))
            .bind(stream_id)
            .bind(viewed_at.unix_timestamp())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/trim_recently_viewed.sql"))
            .bind(keep)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Metadata reconciliation support
    // =========================================================================

    /// Movies already tagged with one of the given external ids (the
    /// reconciler's indexed fast path). Chunked like every id-list query.
    pub async fn movies_by_external_ids(&self, external_ids: &[i64]) -> Result<Vec<Movie>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for chunk in chunked(external_ids) {
            let builder = SelectBuilder::new(
                "stream_id, source_id, category_ids, name, year, external_id, external_id_tagged_at",
                "movies",
            )
            .in_list_ints("external_id", chunk);
            let sql = builder.build();
            let query = bind_all(sqlx::query_as::<_, MovieRow>(&sql), builder.binds());
            let rows = query.fetch_all(&self.pool).await.or_raise(|| ErrorKind::Database)?;
            for row in rows {
                let movie: Movie = row.try_into()?;
                if seen.insert(movie.id.clone()) {
                    out.push(movie);
                }
            }
        }
        Ok(out)
    }

    /// Case-insensitive title match, optionally narrowed by year.
    pub async fn find_movie_by_title_year(&self, title: &str, year: Option<i64>) -> Result<Option<Movie>> {
        let row: Option<MovieRow> = sqlx::query_as(include_str!("../queries/find_movie_by_title_year.sql"))
            .bind(title)
            .bind(year)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(TryInto::try_into).transpose()
    }

    /// Persist an external id onto a movie row (write-through; the durable
    /// artifact of a slow-path match). Last write wins on conflict.
    pub async fn tag_movie(&self, stream_id: &str, external_id: i64) -> Result<()> {
        sqlx::query(include_str!("../queries/tag_movie.sql"))
            .bind(stream_id)
            .bind(external_id)
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Series counterpart of [`movies_by_external_ids`](Self::movies_by_external_ids).
    pub async fn series_by_external_ids(&self, external_ids: &[i64]) -> Result<Vec<SeriesEntry>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for chunk in chunked(external_ids) {
            let builder = SelectBuilder::new(
                "series_id, source_id, category_ids, name, year, external_id, external_id_tagged_at",
                "series",
            )
            .in_list_ints("external_id", chunk);
            let sql = builder.build();
            let query = bind_all(sqlx::query_as::<_, SeriesRow>(&sql), builder.binds());
            let rows = query.fetch_all(&self.pool).await.or_raise(|| ErrorKind::Database)?;
            for row in rows {
                let entry: SeriesEntry = row.try_into()?;
                if seen.insert(entry.id.clone()) {
                    out.push(entry);
                }
            }
        }
        Ok(out)
    }

    pub async fn find_series_by_title_year(&self, title: &str, year: Option<i64>) -> Result<Option<SeriesEntry>> {
        let row: Option<SeriesRow> = sqlx::query_as(include_str!("../queries/find_series_by_title_year.sql"))
            .bind(title)
            .bind(year)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn tag_series(&self, series_id: &str, external_id: i64) -> Result<()> {
        sqlx::query(include_str!("../queries/tag_series.sql"))
            .bind(series_id)
            .bind(external_id)
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}

/// `LIKE` pattern for a substring search, escaping the wildcard characters
/// in the user's text.
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::{CategoryUpsert, ChannelUpsert, ProgramUpsert, SourceUpsert};

    async fn repo() -> Repository {
        let db = Database::connect_in_memory().await.unwrap();
        Repository::from(&db)
    }

    fn source(id: &str, enabled: bool) -> SourceUpsert {
        SourceUpsert {
            source_id: id.to_string(),
            name: id.to_uppercase(),
            enabled: Some(enabled),
            display_order: None,
        }
    }

    fn channel(id: &str, source: &str, categories: &[&str], name: &str) -> ChannelUpsert {
        ChannelUpsert {
            stream_id: id.to_string(),
            source_id: source.to_string(),
            category_ids: categories.iter().map(ToString::to_string).collect(),
            name: name.to_string(),
            channel_num: None,
            enabled: None,
            is_favorite: None,
            logo_url: None,
        }
    }

    fn category(id: &str, source: &str, name: &str) -> CategoryUpsert {
        CategoryUpsert {
            category_id: id.to_string(),
            source_id: source.to_string(),
            name: name.to_string(),
            enabled: None,
            display_order: None,
            filter_words: Vec::new(),
        }
    }

    async fn seed_small(repo: &Repository) {
        repo.bulk_upsert_sources(vec![source("a", true), source("b", true), source("c", false)])
            .await
            .unwrap();
        repo.bulk_upsert_categories(vec![
            category("news", "a", "News"),
            category("sport", "a", "Sport"),
            category("kids", "b", "Kids"),
        ])
        .await
        .unwrap();
        repo.bulk_upsert_channels(vec![
            channel("ch1", "a", &["news"], "Alpha News"),
            channel("ch2", "a", &["sport"], "Beta Sport"),
            channel("ch3", "b", &["kids"], "Gamma Kids"),
            channel("ch4", "c", &["news"], "Hidden (disabled source)"),
        ])
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_visible_channels_exclude_disabled_sources() {
        let repo = repo().await;
        seed_small(&repo).await;
        let channels = repo.visible_channels().await.unwrap();
        let ids: Vec<&str> = channels.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(channels.len(), 3);
        assert!(!ids.contains(&"ch4"));
    }

    #[tokio::test]
    async fn test_individually_disabled_channel_is_hidden() {
        let repo = repo().await;
        seed_small(&repo).await;
        let mut off = channel("ch1", "a", &["news"], "Alpha News");
        off.enabled = Some(false);
        repo.bulk_upsert_channels(vec![off]).await.unwrap();
        let channels = repo.visible_channels().await.unwrap();
        assert!(channels.iter().all(|c| c.id != "ch1"));
        assert!(repo.channels_in_category("news").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_channels_in_category_uses_membership_expansion() {
        let repo = repo().await;
        seed_small(&repo).await;
        // Multi-membership: ch2 also joins "news".
        repo.bulk_upsert_channels(vec![channel("ch2", "a", &["sport", "news"], "Beta Sport")])
            .await
            .unwrap();
        let news = repo.channels_in_category("news").await.unwrap();
        let ids: Vec<&str> = news.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"ch1") && ids.contains(&"ch2"));
    }

    #[tokio::test]
    async fn test_channels_by_ids_chunking_is_transparent() {
        let repo = repo().await;
        repo.bulk_upsert_sources(vec![source("a", true), source("b", true)]).await.unwrap();
        let channels: Vec<ChannelUpsert> = (0..1500)
            .map(|i| {
                let src = if i % 2 == 0 { "a" } else { "b" };
                channel(&format!("ch{i:04}"), src, &[], &format!("Channel {i:04}"))
            })
            .collect();
        repo.bulk_upsert_channels(channels).await.unwrap();

        let ids: Vec<String> = (0..1500).map(|i| format!("ch{i:04}")).collect();
        let fetched = repo.channels_by_ids(&ids).await.unwrap();
        // Union across 3 chunks: no duplicates, no missing rows.
        assert_eq!(fetched.len(), 1500);
        let distinct: HashSet<&str> = fetched.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(distinct.len(), 1500);

        // Transparency against the unchunked reference (all visible rows).
        let reference = repo.visible_channels().await.unwrap();
        assert_eq!(reference.len(), fetched.len());
    }

    #[tokio::test]
    async fn test_channels_by_ids_small_and_exact_ceiling() {
        let repo = repo().await;
        repo.bulk_upsert_sources(vec![source("a", true)]).await.unwrap();
        let channels: Vec<ChannelUpsert> =
            (0..500).map(|i| channel(&format!("c{i}"), "a", &[], &format!("C {i}"))).collect();
        repo.bulk_upsert_channels(channels).await.unwrap();

        let ten: Vec<String> = (0..10).map(|i| format!("c{i}")).collect();
        assert_eq!(repo.channels_by_ids(&ten).await.unwrap().len(), 10);
        let all: Vec<String> = (0..500).map(|i| format!("c{i}")).collect();
        assert_eq!(repo.channels_by_ids(&all).await.unwrap().len(), 500);
        assert!(repo.channels_by_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_count_by_category_sums_to_visible_total() {
        let repo = repo().await;
        seed_small(&repo).await;
        // ch4 belongs to a disabled source so it must not count.
        let by_category = repo.channel_count_by_category().await.unwrap();
        let sum: i64 = by_category.iter().map(|(_, n)| n).sum();
        assert_eq!(sum, repo.count_visible_channels().await.unwrap());
    }

    #[tokio::test]
    async fn test_search_is_pre_restricted_and_escaped() {
        let repo = repo().await;
        seed_small(&repo).await;
        // "Hidden" lives on a disabled source, must not match.
        assert!(repo.search_channels("Hidden", 50).await.unwrap().is_empty());
        let hits = repo.search_channels("alpha", 50).await.unwrap();
        assert_eq!(hits.len(), 1);
        // Wildcards in user text are literals.
        assert!(repo.search_channels("%", 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_skips_channels_with_no_enabled_category() {
        let repo = repo().await;
        seed_small(&repo).await;
        repo.set_category_enabled("news", false).await.unwrap();
        assert!(repo.search_channels("Alpha", 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_program_search_restricts_to_future_end() {
        let repo = repo().await;
        seed_small(&repo).await;
        let now = UtcDateTime::now().unix_timestamp();
        repo.bulk_replace_programs(
            "a",
            vec![
                ProgramUpsert {
                    id: "p1".into(),
                    stream_id: "ch1".into(),
                    source_id: "a".into(),
                    title: "Morning Show".into(),
                    description: None,
                    start_ts: now - 7200,
                    end_ts: now - 3600,
                },
                ProgramUpsert {
                    id: "p2".into(),
                    stream_id: "ch1".into(),
                    source_id: "a".into(),
                    title: "Evening Show".into(),
                    description: None,
                    start_ts: now + 3600,
                    end_ts: now + 7200,
                },
            ],
        )
        .await
        .unwrap();
        let hits = repo.search_programs("show", UtcDateTime::now(), 50).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "p2");
    }

    #[tokio::test]
    async fn test_program_search_skips_channels_with_no_enabled_category() {
        let repo = repo().await;
        seed_small(&repo).await;
        let now = UtcDateTime::now().unix_timestamp();
        repo.bulk_replace_programs(
            "a",
            vec![
                ProgramUpsert {
                    id: "p1".into(),
                    stream_id: "ch1".into(),
                    source_id: "a".into(),
                    title: "News Hour".into(),
                    description: None,
                    start_ts: now,
                    end_ts: now + 3600,
                },
                ProgramUpsert {
                    id: "p2".into(),
                    stream_id: "ch2".into(),
                    source_id: "a".into(),
                    title: "Match Hour".into(),
                    description: None,
                    start_ts: now,
                    end_ts: now + 3600,
                },
            ],
        )
        .await
        .unwrap();

        // ch1's only category goes dark; its programs must vanish from
        // search just like the channel itself does.
        repo.set_category_enabled("news", false).await.unwrap();
        assert!(repo.search_programs("news hour", UtcDateTime::now(), 50).await.unwrap().is_empty());
        let hits = repo.search_programs("hour", UtcDateTime::now(), 50).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "p2");
    }

    #[tokio::test]
    async fn test_record_view_trims_and_orders() {
        let repo = repo().await;
        seed_small(&repo).await;
        let at = |ts| UtcDateTime::from_unix_timestamp(ts).unwrap();
        repo.record_view("ch1", at(100), 2).await.unwrap();
        repo.record_view("ch2", at(200), 2).await.unwrap();
        repo.record_view("ch3", at(300), 2).await.unwrap();
        assert_eq!(repo.count_recently_viewed().await.unwrap(), 2);
        let recent = repo.recently_viewed_channels().await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["ch3", "ch2"]);
    }

    #[tokio::test]
    async fn test_favorites_flag_and_position() {
        let repo = repo().await;
        seed_small(&repo).await;
        repo.set_favorite("ch1", true).await.unwrap();
        repo.set_favorite_position("ch1", Some(1)).await.unwrap();
        let favorites = repo.favorite_channels().await.unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].favorite_position, Some(1));
        // Unfavoriting clears the explicit position.
        repo.set_favorite("ch1", false).await.unwrap();
        assert!(repo.favorite_channels().await.unwrap().is_empty());
        repo.set_favorite("ch1", true).await.unwrap();
        assert_eq!(repo.favorite_channels().await.unwrap()[0].favorite_position, None);
    }

    #[tokio::test]
    async fn test_channels_page_matches_unpaged_query() {
        let repo = repo().await;
        repo.bulk_upsert_sources(vec![source("a", true)]).await.unwrap();
        let channels: Vec<ChannelUpsert> =
            (0..7).map(|i| channel(&format!("c{i}"), "a", &[], &format!("Name {i}"))).collect();
        repo.bulk_upsert_channels(channels).await.unwrap();

        let filter = ChannelPageFilter { sort: Some(PageSort::Alphabetical), ..Default::default() };
        let total = repo.count_channels_page(&filter).await.unwrap();
        assert_eq!(total, 7);
        let mut paged = Vec::new();
        let page = 3;
        let mut offset = 0;
        while offset < total {
            let batch = repo.channels_page(&filter, page, offset).await.unwrap();
            offset += batch.len() as i64;
            paged.extend(batch);
        }
        let unpaged = repo.channels_page(&filter, total.max(1), 0).await.unwrap();
        assert_eq!(paged, unpaged);
    }

    #[tokio::test]
    async fn test_provider_number_sort_puts_unnumbered_last() {
        let repo = repo().await;
        repo.bulk_upsert_sources(vec![source("a", true)]).await.unwrap();
        let mut c1 = channel("c1", "a", &[], "Zeta");
        c1.channel_num = Some(5);
        let mut c2 = channel("c2", "a", &[], "Alpha");
        c2.channel_num = None;
        let mut c3 = channel("c3", "a", &[], "Midway");
        c3.channel_num = Some(1);
        repo.bulk_upsert_channels(vec![c1, c2, c3]).await.unwrap();

        let filter = ChannelPageFilter { sort: Some(PageSort::ProviderNumber), ..Default::default() };
        let page = repo.channels_page(&filter, 10, 0).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c3", "c1", "c2"]);
    }

    fn movie(id: &str, name: &str, year: Option<i64>) -> crate::bulk::MovieUpsert {
        crate::bulk::MovieUpsert {
            stream_id: id.to_string(),
            source_id: "a".to_string(),
            category_ids: Vec::new(),
            name: name.to_string(),
            year,
        }
    }

    #[tokio::test]
    async fn test_tag_movie_enables_fast_path() {
        let repo = repo().await;
        repo.bulk_upsert_sources(vec![source("a", true)]).await.unwrap();
        repo.bulk_upsert_movies(vec![movie("m1", "Heat", Some(1995))]).await.unwrap();
        assert!(repo.movies_by_external_ids(&[949]).await.unwrap().is_empty());

        let found = repo.find_movie_by_title_year("heat", Some(1995)).await.unwrap();
        assert_eq!(found.as_ref().map(|m| m.id.as_str()), Some("m1"));
        repo.tag_movie("m1", 949).await.unwrap();

        let tagged = repo.movies_by_external_ids(&[949]).await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].external_id, Some(949));
        assert!(tagged[0].external_id_tagged_at.is_some());
    }

    #[tokio::test]
    async fn test_find_movie_year_mismatch_is_none() {
        let repo = repo().await;
        repo.bulk_upsert_sources(vec![source("a", true)]).await.unwrap();
        repo.bulk_upsert_movies(vec![movie("m1", "Heat", Some(1995))]).await.unwrap();
        assert!(repo.find_movie_by_title_year("Heat", Some(2024)).await.unwrap().is_none());
        // No year narrows to title only.
        assert!(repo.find_movie_by_title_year("Heat", None).await.unwrap().is_some());
    }
}
