//! Windowed pagination over the channel table.
//!
//! The window is an explicit state struct mutated only through whole-state
//! transitions: `reset` empties it, a fresh load replaces it atomically,
//! `load_more` appends one page. There is no partial in-place mutation, so
//! a failed fetch leaves the previous window intact.

use exn::ResultExt;
use tracing::instrument;
use zapp_store::{Channel, ChannelPageFilter, Repository};

use crate::error::{ErrorKind, Result};

pub const DEFAULT_PAGE_SIZE: i64 = 100;

/// The currently loaded window of one paged view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowState {
    pub items: Vec<Channel>,
    pub total: i64,
    pub offset: i64,
    pub signature: ChannelPageFilter,
}

impl WindowState {
    pub fn has_more(&self) -> bool {
        self.offset < self.total
    }
}

/// Pages one filtered channel listing out of the store.
#[derive(Debug)]
pub struct Pager {
    repo: Repository,
    page_size: i64,
    state: WindowState,
    in_flight: bool,
}

impl Pager {
    pub fn new(repo: Repository) -> Self {
        Self::with_page_size(repo, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(repo: Repository, page_size: i64) -> Self {
        Self {
            repo,
            page_size: page_size.max(1),
            state: WindowState::default(),
            in_flight: false,
        }
    }

    pub fn state(&self) -> &WindowState {
        &self.state
    }

    /// Empty the window. The signature is kept so a subsequent
    /// [`load_more`](Self::load_more) refills page one.
    pub fn reset(&mut self) {
        self.state.items = Vec::new();
        self.state.total = 0;
        self.state.offset = 0;
    }

    /// Load page one under `signature`, replacing the window atomically.
    /// A signature change implies a reset first, so stale items from the
    /// previous filter can never survive into the new window.
    #[instrument(level = "debug", skip(self, signature))]
    pub async fn load(&mut self, signature: ChannelPageFilter) -> Result<&WindowState> {
        if self.in_flight {
            return Ok(&self.state);
        }
        if signature != self.state.signature {
            self.reset();
            self.state.signature = signature;
        }
        self.in_flight = true;
        let result = self.fetch_first_page().await;
        self.in_flight = false;
        match result {
            Ok((total, items)) => {
                self.state.total = total;
                self.state.offset = items.len() as i64;
                self.state.items = items;
                Ok(&self.state)
            }
            Err(err) => Err(err),
        }
    }

    /// Fetch the next page at the current offset and append it. A no-op
    /// when a load is in flight or the window is already complete; returns
    /// whether anything was appended.
    #[instrument(level = "debug", skip(self))]
    pub async fn load_more(&mut self) -> Result<bool> {
        if self.in_flight || !self.state.has_more() {
            return Ok(false);
        }
        self.in_flight = true;
        let result = self
            .repo
            .channels_page(&self.state.signature, self.page_size, self.state.offset)
            .await
            .or_raise(|| ErrorKind::Store);
        self.in_flight = false;
        let page = result?;
        if page.is_empty() {
            // The store shrank underneath us; clamp rather than spin.
            self.state.offset = self.state.total;
            return Ok(false);
        }
        self.append_page(page);
        Ok(true)
    }

    async fn fetch_first_page(&self) -> Result<(i64, Vec<Channel>)> {
        let total = self
            .repo
            .count_channels_page(&self.state.signature)
            .await
            .or_raise(|| ErrorKind::Store)?;
        let items = self
            .repo
            .channels_page(&self.state.signature, self.page_size, 0)
            .await
            .or_raise(|| ErrorKind::Store)?;
        Ok((total, items))
    }

    /// Append one fetched page, skipping rows already present so a
    /// concurrent external insert cannot duplicate an item in the window.
    fn append_page(&mut self, page: Vec<Channel>) {
        // The offset advances by what the store served, not by what
        // survived deduplication, so the next fetch does not re-read rows.
        self.state.offset += page.len() as i64;
        let known: std::collections::HashSet<String> = self.state.items.iter().map(|c| c.id.clone()).collect();
        self.state.items.extend(page.into_iter().filter(|c| !known.contains(&c.id)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use zapp_store::{ChannelUpsert, Database, PageSort, SourceUpsert};

    const PAGE: i64 = 5;

    async fn pager_with(total: usize) -> Pager {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        repo.bulk_upsert_sources(vec![SourceUpsert {
            source_id: "a".into(),
            name: "A".into(),
            enabled: None,
            display_order: None,
        }])
        .await
        .unwrap();
        let channels: Vec<ChannelUpsert> = (0..total)
            .map(|i| ChannelUpsert {
                stream_id: format!("c{i:03}"),
                source_id: "a".into(),
                category_ids: Vec::new(),
                name: format!("Channel {i:03}"),
                channel_num: None,
                enabled: None,
                is_favorite: None,
                logo_url: None,
            })
            .collect();
        repo.bulk_upsert_channels(channels).await.unwrap();
        Pager::with_page_size(repo, PAGE)
    }

    fn signature() -> ChannelPageFilter {
        ChannelPageFilter {
            sort: Some(PageSort::Alphabetical),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(0)]
    #[case(PAGE as usize - 1)]
    #[case(PAGE as usize)]
    #[case(PAGE as usize + 1)]
    #[case(3 * PAGE as usize)]
    #[tokio::test]
    async fn test_all_pages_concatenate_to_unpaged_result(#[case] total: usize) {
        let mut pager = pager_with(total).await;
        pager.load(signature()).await.unwrap();
        assert_eq!(pager.state().total, total as i64);
        while pager.load_more().await.unwrap() {}

        let reference = pager.repo.channels_page(&signature(), (total as i64).max(1), 0).await.unwrap();
        assert_eq!(pager.state().items, reference);
        assert!(!pager.state().has_more());
    }

    #[tokio::test]
    async fn test_load_more_is_noop_when_complete() {
        let mut pager = pager_with(3).await;
        pager.load(signature()).await.unwrap();
        assert!(!pager.state().has_more());
        assert!(!pager.load_more().await.unwrap());
        assert_eq!(pager.state().items.len(), 3);
    }

    #[tokio::test]
    async fn test_signature_change_resets_window() {
        let mut pager = pager_with(12).await;
        pager.load(signature()).await.unwrap();
        while pager.load_more().await.unwrap() {}
        assert_eq!(pager.state().items.len(), 12);

        let narrowed = ChannelPageFilter {
            search: Some("Channel 00".into()),
            sort: Some(PageSort::Alphabetical),
            ..Default::default()
        };
        let state = pager.load(narrowed.clone()).await.unwrap();
        // Old items are gone, not merged.
        assert_eq!(state.total, 10);
        assert_eq!(state.offset, state.items.len() as i64);
        assert!(state.items.iter().all(|c| c.name.starts_with("Channel 00")));
        assert_eq!(pager.state().signature, narrowed);
    }

    #[tokio::test]
    async fn test_append_skips_duplicates_after_external_insert() {
        let mut pager = pager_with(PAGE as usize * 2).await;
        pager.load(signature()).await.unwrap();

        // An external writer prepends a row between pages; the second page
        // now re-serves one already-loaded item.
        pager
            .repo
            .bulk_upsert_channels(vec![ChannelUpsert {
                stream_id: "a-front".into(),
                source_id: "a".into(),
                category_ids: Vec::new(),
                name: "AAA First".into(),
                channel_num: None,
                enabled: None,
                is_favorite: None,
                logo_url: None,
            }])
            .await
            .unwrap();

        pager.load_more().await.unwrap();
        let ids: Vec<&str> = pager.state().items.iter().map(|c| c.id.as_str()).collect();
        let distinct: std::collections::HashSet<&&str> = ids.iter().collect();
        assert_eq!(distinct.len(), ids.len());
    }

    #[tokio::test]
    async fn test_reset_empties_window() {
        let mut pager = pager_with(7).await;
        pager.load(signature()).await.unwrap();
        pager.reset();
        assert_eq!(pager.state(), &WindowState {
            signature: signature(),
            ..Default::default()
        });
    }
}
