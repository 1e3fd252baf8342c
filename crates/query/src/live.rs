//! Live view subscriptions.
//!
//! Binds the composer to the change bus: a view re-runs its query after
//! store mutations (debounced) and immediately when it is retargeted at a
//! different selector or sort. The receiver holds `None` until the first
//! snapshot lands.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use zapp_reactive::{ChangeBus, LiveQuery};
use zapp_store::Channel;

use crate::compose::{ChannelSort, Composer, SourceGroup, VirtualCategory};
use crate::selector::ChannelSelector;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

fn channel_deps(selector: &ChannelSelector, sort: ChannelSort) -> Vec<String> {
    vec![selector.dep_key(), format!("sort:{sort:?}")]
}

/// A live channel view that can be re-pointed at another selector without
/// tearing the subscription down. The query reads its target from a shared
/// cell at the start of every run, so a retarget mid-run is picked up by
/// the immediate re-run that the dependency change triggers, and the stale
/// run's result is discarded.
pub struct ChannelView {
    target: Arc<Mutex<(ChannelSelector, ChannelSort)>>,
    handle: LiveQuery<Vec<Channel>>,
}

impl ChannelView {
    pub fn spawn(
        bus: &ChangeBus,
        composer: Composer,
        selector: ChannelSelector,
        sort: ChannelSort,
        debounce: Duration,
    ) -> Self {
        let deps = channel_deps(&selector, sort);
        let target = Arc::new(Mutex::new((selector, sort)));
        let query_target = Arc::clone(&target);
        let handle = LiveQuery::spawn(bus, deps, debounce, move || {
            let composer = composer.clone();
            let (selector, sort) = match query_target.lock() {
                Ok(guard) => guard.clone(),
                // A poisoned cell still holds a valid target.
                Err(poisoned) => poisoned.into_inner().clone(),
            };
            async move { composer.channels(&selector, sort).await }
        });
        Self { target, handle }
    }

    /// Observe delivered snapshots. `None` means the first result is still
    /// pending.
    pub fn subscribe(&self) -> watch::Receiver<Option<Vec<Channel>>> {
        self.handle.subscribe()
    }

    pub fn latest(&self) -> Option<Vec<Channel>> {
        self.handle.latest()
    }

    /// Point the view at a different selector or sort. Changing the target
    /// cancels any pending debounce and starts a fresh run immediately.
    pub fn retarget(&self, selector: ChannelSelector, sort: ChannelSort) -> zapp_reactive::error::Result<()> {
        let deps = channel_deps(&selector, sort);
        match self.target.lock() {
            Ok(mut guard) => *guard = (selector, sort),
            Err(poisoned) => *poisoned.into_inner() = (selector, sort),
        }
        self.handle.set_deps(deps)
    }
}

/// Observe the source to category navigation tree.
pub fn observe_category_groups(bus: &ChangeBus, composer: Composer, debounce: Duration) -> LiveQuery<Vec<SourceGroup>> {
    LiveQuery::spawn(bus, vec!["category-groups".to_string()], debounce, move || {
        let composer = composer.clone();
        async move { composer.category_groups().await }
    })
}

/// Observe the virtual category list (favorites, recency, custom groups).
pub fn observe_virtual_categories(
    bus: &ChangeBus,
    composer: Composer,
    debounce: Duration,
) -> LiveQuery<Vec<VirtualCategory>> {
    LiveQuery::spawn(bus, vec!["virtual-categories".to_string()], debounce, move || {
        let composer = composer.clone();
        async move { composer.virtual_categories().await }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zapp_reactive::ChangeEvent;
    use zapp_store::{ChannelUpsert, Database, Repository, SourceUpsert};

    fn ch(id: &str, name: &str) -> ChannelUpsert {
        ChannelUpsert {
            stream_id: id.into(),
            source_id: "a".into(),
            category_ids: Vec::new(),
            name: name.into(),
            channel_num: None,
            enabled: None,
            is_favorite: None,
            logo_url: None,
        }
    }

    async fn composer() -> Composer {
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
        repo.bulk_upsert_channels(vec![ch("c1", "Only")]).await.unwrap();
        Composer::new(repo)
    }

    fn repo(composer: &Composer) -> Repository {
        composer.repository().clone()
    }

    // Real time, not a paused clock: the pool does its work on OS threads
    // the paused runtime cannot see, so its acquire timeout would fire the
    // moment the executor idles. A short window keeps the tests quick.
    const TEST_DEBOUNCE: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_snapshot_refreshes_after_store_change() {
        let composer = composer().await;
        let bus = ChangeBus::new();
        let view = ChannelView::spawn(
            &bus,
            composer.clone(),
            ChannelSelector::All,
            ChannelSort::Alphabetical,
            TEST_DEBOUNCE,
        );
        let mut rx = view.subscribe();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_deref().unwrap().len(), 1);

        repo(&composer).bulk_upsert_channels(vec![ch("c2", "Second")]).await.unwrap();
        bus.publish(&ChangeEvent::new());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_deref().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_retarget_switches_view_without_remount() {
        let composer = composer().await;
        let bus = ChangeBus::new();
        let view = ChannelView::spawn(
            &bus,
            composer.clone(),
            ChannelSelector::All,
            ChannelSort::Alphabetical,
            TEST_DEBOUNCE,
        );
        let mut rx = view.subscribe();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_deref().unwrap().len(), 1);

        // No favorites yet: the retargeted view is empty, immediately,
        // with no debounce wait.
        view.retarget(ChannelSelector::Favorites, ChannelSort::Alphabetical).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_deref().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_virtual_categories_pick_up_new_favorite() {
        let composer = composer().await;
        let bus = ChangeBus::new();
        let handle = observe_virtual_categories(&bus, composer.clone(), TEST_DEBOUNCE);
        let mut rx = handle.subscribe();
        rx.changed().await.unwrap();
        assert!(rx.borrow().as_deref().unwrap().is_empty());

        repo(&composer).set_favorite("c1", true).await.unwrap();
        bus.publish(&ChangeEvent::new());
        rx.changed().await.unwrap();
        let snapshot = rx.borrow();
        let virtuals = snapshot.as_deref().unwrap();
        assert_eq!(virtuals.len(), 1);
        assert_eq!(virtuals[0].count, 1);
    }
}
