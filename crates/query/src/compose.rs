//! View composition.
//!
//! The composer turns a selector into the finished item set for a view:
//! resolve the candidate channels, scrub provider boilerplate out of the
//! display names, then sort. Scrubbing happens before sorting so a name
//! like `"HD Alpha"` sorts under A, not H. Visibility (enabled source,
//! enabled channel) is enforced by the repository's queries; the composer
//! never re-derives it.

use std::collections::HashMap;

use exn::ResultExt;
use time::UtcDateTime;
use tracing::instrument;
use zapp_store::{Category, Channel, Program, Repository, Source};

use crate::error::{ErrorKind, Result};
use crate::filter::NameScrubber;
use crate::selector::{self, ChannelSelector};

pub const DEFAULT_SEARCH_CAP: i64 = 100;
pub const DEFAULT_RECENT_KEEP: i64 = 30;

/// Requested ordering for a channel view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelSort {
    /// Case-insensitive by (scrubbed) display name.
    #[default]
    Alphabetical,
    /// Ascending provider number; unnumbered channels sort after numbered
    /// ones, alphabetically among themselves.
    ProviderNumber,
}

impl From<ChannelSort> for zapp_store::PageSort {
    fn from(sort: ChannelSort) -> Self {
        match sort {
            ChannelSort::Alphabetical => Self::Alphabetical,
            ChannelSort::ProviderNumber => Self::ProviderNumber,
        }
    }
}

/// One enabled source with its enabled categories and visible channel
/// counts, for the source to category navigation pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceGroup {
    pub source: Source,
    pub categories: Vec<CategoryCount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: Category,
    pub count: i64,
}

/// A synthetic, non-persisted grouping shown alongside real categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualCategory {
    pub id: String,
    pub name: String,
    pub count: i64,
}

/// Composes finished view snapshots from the catalog store.
#[derive(Debug, Clone)]
pub struct Composer {
    repo: Repository,
    search_cap: i64,
    recent_keep: i64,
}

impl Composer {
    pub fn new(repo: Repository) -> Self {
        Self::with_limits(repo, DEFAULT_SEARCH_CAP, DEFAULT_RECENT_KEEP)
    }

    pub fn with_limits(repo: Repository, search_cap: i64, recent_keep: i64) -> Self {
        Self { repo, search_cap, recent_keep }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// The channel set for one view, scrubbed and sorted.
    #[instrument(level = "debug", skip(self))]
    pub async fn channels(&self, selector: &ChannelSelector, sort: ChannelSort) -> Result<Vec<Channel>> {
        match selector {
            ChannelSelector::All => {
                let mut channels = self.repo.visible_channels().await.or_raise(|| ErrorKind::Store)?;
                self.scrub_with_category_words(&mut channels).await?;
                sort_channels(&mut channels, sort);
                Ok(channels)
            }
            ChannelSelector::Category(id) => self.category_channels(id, sort).await,
            ChannelSelector::Favorites => {
                let mut channels = self.repo.favorite_channels().await.or_raise(|| ErrorKind::Store)?;
                self.scrub_with_category_words(&mut channels).await?;
                Ok(order_favorites(channels, sort))
            }
            ChannelSelector::RecentlyViewed => {
                // Recency dictates the order; the requested sort is ignored.
                let mut channels = self.repo.recently_viewed_channels().await.or_raise(|| ErrorKind::Store)?;
                self.scrub_with_category_words(&mut channels).await?;
                Ok(channels)
            }
            ChannelSelector::Watchlist => self.group_channels(selector::WATCHLIST).await,
            ChannelSelector::CustomGroup(id) => self.group_channels(id).await,
        }
    }

    /// An explicit category id. Falls back to custom-group membership when
    /// the id names no real category, so a group id pasted into a category
    /// slot still resolves instead of reading as an empty category.
    async fn category_channels(&self, id: &str, sort: ChannelSort) -> Result<Vec<Channel>> {
        match self.repo.get_category(id).await.or_raise(|| ErrorKind::Store)? {
            Some(category) if !category.enabled => Ok(Vec::new()),
            Some(category) => {
                let mut channels = self.repo.channels_in_category(id).await.or_raise(|| ErrorKind::Store)?;
                let scrubber = NameScrubber::compile(category.filter_words.iter().map(String::as_str))?;
                scrub_all(&scrubber, &mut channels);
                sort_channels(&mut channels, sort);
                Ok(channels)
            }
            None if self.repo.custom_group_exists(id).await.or_raise(|| ErrorKind::Store)? => {
                self.group_channels(id).await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Group membership keeps its stored order: explicit position first,
    /// name fallback for unpositioned members.
    async fn group_channels(&self, group_id: &str) -> Result<Vec<Channel>> {
        let mut channels = self.repo.custom_group_channels(group_id).await.or_raise(|| ErrorKind::Store)?;
        self.scrub_with_category_words(&mut channels).await?;
        Ok(channels)
    }

    /// Cross-category views scrub each channel with the words of its own
    /// enabled categories only; a word configured for one category never
    /// rewrites names outside it. Scrubbers are compiled once per distinct
    /// category combination, not per channel.
    async fn scrub_with_category_words(&self, channels: &mut [Channel]) -> Result<()> {
        if channels.is_empty() {
            return Ok(());
        }
        let categories = self.repo.enabled_categories().await.or_raise(|| ErrorKind::Store)?;
        let words_by_category: HashMap<&str, &[String]> = categories
            .iter()
            .filter(|c| !c.filter_words.is_empty())
            .map(|c| (c.id.as_str(), c.filter_words.as_slice()))
            .collect();
        if words_by_category.is_empty() {
            return Ok(());
        }
        let mut scrubbers: HashMap<Vec<String>, NameScrubber> = HashMap::new();
        for channel in channels.iter_mut() {
            let mut key: Vec<String> = channel
                .category_ids
                .iter()
                .filter(|id| words_by_category.contains_key(id.as_str()))
                .cloned()
                .collect();
            if key.is_empty() {
                continue;
            }
            key.sort_unstable();
            key.dedup();
            if !scrubbers.contains_key(&key) {
                let scrubber = NameScrubber::compile(
                    key.iter()
                        .flat_map(|id| words_by_category[id.as_str()].iter().map(String::as_str)),
                )?;
                scrubbers.insert(key.clone(), scrubber);
            }
            channel.name = scrubbers[&key].scrub(&channel.name);
        }
        Ok(())
    }

    /// Enabled sources with their enabled categories and visible channel
    /// counts. Counts come from one aggregated query over the membership
    /// expansion, not from counting each category separately.
    #[instrument(level = "debug", skip(self))]
    pub async fn category_groups(&self) -> Result<Vec<SourceGroup>> {
        let counts: HashMap<String, i64> = self
            .repo
            .channel_count_by_category()
            .await
            .or_raise(|| ErrorKind::Store)?
            .into_iter()
            .collect();
        let mut groups = Vec::new();
        for source in self.repo.list_sources().await.or_raise(|| ErrorKind::Store)? {
            if !source.enabled {
                continue;
            }
            let categories = self
                .repo
                .list_categories_for_source(&source.id, false)
                .await
                .or_raise(|| ErrorKind::Store)?
                .into_iter()
                .map(|category| {
                    let count = counts.get(&category.id).copied().unwrap_or(0);
                    CategoryCount { category, count }
                })
                .collect();
            groups.push(SourceGroup { source, categories });
        }
        Ok(groups)
    }

    /// The virtual categories worth showing right now. Favorites and
    /// recently-viewed appear only when non-empty; custom groups always
    /// appear since the user created them deliberately.
    #[instrument(level = "debug", skip(self))]
    pub async fn virtual_categories(&self) -> Result<Vec<VirtualCategory>> {
        let mut virtuals = Vec::new();
        let favorites = self.repo.count_favorite_channels().await.or_raise(|| ErrorKind::Store)?;
        if favorites > 0 {
            virtuals.push(VirtualCategory {
                id: selector::FAVORITES.to_string(),
                name: "Favorites".to_string(),
                count: favorites,
            });
        }
        let recent = self.repo.count_recently_viewed().await.or_raise(|| ErrorKind::Store)?;
        if recent > 0 {
            virtuals.push(VirtualCategory {
                id: selector::RECENTLY_VIEWED.to_string(),
                name: "Recently Viewed".to_string(),
                count: recent,
            });
        }
        let member_counts: HashMap<String, i64> = self
            .repo
            .custom_group_member_counts()
            .await
            .or_raise(|| ErrorKind::Store)?
            .into_iter()
            .collect();
        for group in self.repo.list_custom_groups().await.or_raise(|| ErrorKind::Store)? {
            let count = member_counts.get(&group.id).copied().unwrap_or(0);
            virtuals.push(VirtualCategory { id: group.id, name: group.name, count });
        }
        Ok(virtuals)
    }

    /// Capped name search, pre-restricted to visible channels with at
    /// least one enabled category.
    pub async fn search_channels(&self, text: &str) -> Result<Vec<Channel>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.repo.search_channels(text, self.search_cap).await.or_raise(|| ErrorKind::Store)
    }

    /// Capped guide search over programs that have not yet ended.
    pub async fn search_programs(&self, text: &str) -> Result<Vec<Program>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.repo
            .search_programs(text, UtcDateTime::now(), self.search_cap)
            .await
            .or_raise(|| ErrorKind::Store)
    }

    /// Record a viewing, keeping the recency list at its bound.
    pub async fn record_view(&self, stream_id: &str) -> Result<()> {
        self.repo
            .record_view(stream_id, UtcDateTime::now(), self.recent_keep)
            .await
            .or_raise(|| ErrorKind::Store)
    }
}

fn scrub_all(scrubber: &NameScrubber, channels: &mut [Channel]) {
    if scrubber.is_empty() {
        return;
    }
    for channel in channels {
        channel.name = scrubber.scrub(&channel.name);
    }
}

fn sort_channels(channels: &mut [Channel], sort: ChannelSort) {
    match sort {
        ChannelSort::Alphabetical => {
            channels.sort_by_cached_key(|c| (c.name.to_lowercase(), c.id.clone()));
        }
        ChannelSort::ProviderNumber => {
            channels.sort_by_cached_key(|c| (c.number.is_none(), c.number, c.name.to_lowercase(), c.id.clone()));
        }
    }
}

/// Favorites order: explicit positions first (ascending), everything else
/// in the requested sort.
fn order_favorites(channels: Vec<Channel>, sort: ChannelSort) -> Vec<Channel> {
    let (mut positioned, mut rest): (Vec<Channel>, Vec<Channel>) =
        channels.into_iter().partition(|c| c.favorite_position.is_some());
    positioned.sort_by_key(|c| c.favorite_position);
    sort_channels(&mut rest, sort);
    positioned.extend(rest);
    positioned
}
