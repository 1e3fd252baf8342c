//! Debounced live-query subscriptions.
//!
//! A [`LiveQuery`] binds an async query function and a dependency-key list
//! to a consumer. The query re-runs immediately when the dependency keys
//! change by value, and after a quiet period when the [`ChangeBus`] signals
//! that the store changed. Every run captures a monotonically increasing
//! run version; a run whose version is no longer current when it completes
//! is discarded without delivery, which is what prevents a slow old run from
//! overwriting the result of a newer one.
//!
//! State machine per subscription:
//!
//! ```text
//! Idle -> PendingDebounce -> Running -> { Idle | discarded }
//! any state -> Cancelled on unmount (terminal)
//! ```

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};

use crate::bus::{ChangeBus, Subscription};
use crate::error::{ErrorKind, Result};

enum Msg<T> {
    /// The change bus signalled a store mutation.
    Notified,
    /// The consumer replaced the dependency keys.
    SetDeps(Vec<String>),
    /// A spawned run finished. `None` means the query failed (already
    /// logged); the previous snapshot is retained either way on failure.
    Done(u64, Option<T>),
    /// The handle was dropped.
    Unmount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    PendingDebounce,
    Running,
    Cancelled,
}

/// Handle to a live subscription. Dropping it cancels the subscription:
/// the debounce timer stops and any still-outstanding run is discarded by
/// the run-version check.
pub struct LiveQuery<T> {
    tx: mpsc::UnboundedSender<Msg<T>>,
    rx: watch::Receiver<Option<T>>,
    // Keeps the bus listener registered for as long as the handle lives.
    _bus_subscription: Subscription,
}

impl<T> LiveQuery<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Bind `query` to the bus and start the first run immediately.
    ///
    /// The receiver side holds `None` until the first result is delivered
    /// (the "loading" state); after that it always holds the last good
    /// snapshot. Query failures are logged at `warn` and never surface to
    /// the consumer.
    pub fn spawn<Q, Fut, E>(bus: &ChangeBus, deps: Vec<String>, debounce: Duration, query: Q) -> Self
    where
        Q: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let (tx, control_rx) = mpsc::unbounded_channel();
        let (watch_tx, watch_rx) = watch::channel(None);

        let bus_subscription = {
            let tx = tx.clone();
            bus.subscribe(move |_event| {
                // The control task may already be gone; late signals are fine.
                let _ = tx.send(Msg::Notified);
            })
        };

        tokio::spawn(control_loop(control_rx, tx.clone(), watch_tx, deps, debounce, Arc::new(query)));

        Self {
            tx,
            rx: watch_rx,
            _bus_subscription: bus_subscription,
        }
    }

    /// Observe delivered snapshots. `None` means the first result is still
    /// pending.
    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.rx.clone()
    }

    /// The last delivered snapshot, if any.
    pub fn latest(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Replace the dependency keys. If they differ by value from the
    /// current set, any pending debounce is cancelled and a new run starts
    /// immediately.
    pub fn set_deps(&self, deps: Vec<String>) -> Result<()> {
        if self.tx.send(Msg::SetDeps(deps)).is_err() {
            exn::bail!(ErrorKind::Cancelled);
        }
        Ok(())
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        let _ = self.tx.send(Msg::Unmount);
    }
}

async fn control_loop<T, Q, Fut, E>(
    mut control_rx: mpsc::UnboundedReceiver<Msg<T>>,
    tx: mpsc::UnboundedSender<Msg<T>>,
    watch_tx: watch::Sender<Option<T>>,
    mut deps: Vec<String>,
    debounce: Duration,
    query: Arc<Q>,
) where
    T: Clone + Send + Sync + 'static,
    Q: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut state;
    let mut version: u64 = 0;
    let mut deadline: Option<Instant> = None;

    // Mount counts as a dependency change: run immediately.
    version += 1;
    start_run(&query, &tx, version);
    state = RunState::Running;

    loop {
        tokio::select! {
            msg = control_rx.recv() => match msg {
                None | Some(Msg::Unmount) => {
                    state = RunState::Cancelled;
                    break;
                }
                Some(Msg::Notified) => {
                    // Trailing-edge debounce: every signal pushes the window
                    // out; only the last one in a burst triggers a run.
                    deadline = Some(Instant::now() + debounce);
                    if state != RunState::Running {
                        state = RunState::PendingDebounce;
                    }
                }
                Some(Msg::SetDeps(new_deps)) => {
                    if new_deps != deps {
                        deps = new_deps;
                        deadline = None;
                        version += 1;
                        start_run(&query, &tx, version);
                        state = RunState::Running;
                    }
                }
                Some(Msg::Done(run_version, outcome)) => {
                    if run_version != version {
                        // A newer run superseded this one while it was in
                        // flight. Drop the result without delivery.
                        tracing::debug!(run_version, current = version, "discarding stale live query result");
                        continue;
                    }
                    if let Some(value) = outcome {
                        let _ = watch_tx.send(Some(value));
                    }
                    state = if deadline.is_some() { RunState::PendingDebounce } else { RunState::Idle };
                }
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                version += 1;
                start_run(&query, &tx, version);
                state = RunState::Running;
            }
        }
    }
    debug_assert_eq!(state, RunState::Cancelled);
}

fn start_run<T, Q, Fut, E>(query: &Arc<Q>, tx: &mpsc::UnboundedSender<Msg<T>>, version: u64)
where
    T: Send + 'static,
    Q: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let query = Arc::clone(query);
    let tx = tx.clone();
    tokio::spawn(async move {
        let outcome = match query().await {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(%error, "live query failed, keeping previous result");
                None
            }
        };
        // Control task gone means the subscription unmounted mid-run.
        let _ = tx.send(Msg::Done(version, outcome));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ChangeEvent;
    use std::convert::Infallible;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DEBOUNCE: Duration = Duration::from_millis(50);

    async fn settle() {
        // Let spawned runs and control messages drain.
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_result_is_delivered_after_mount() {
        let bus = ChangeBus::new();
        let live = LiveQuery::spawn(&bus, vec!["k".into()], DEBOUNCE, || async {
            Ok::<_, Infallible>(42)
        });
        settle().await;
        assert_eq!(live.latest(), Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifications_coalesce_into_one_run() {
        let bus = ChangeBus::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let live = {
            let runs = Arc::clone(&runs);
            LiveQuery::spawn(&bus, vec!["k".into()], DEBOUNCE, move || {
                let runs = Arc::clone(&runs);
                async move { Ok::<_, Infallible>(runs.fetch_add(1, Ordering::SeqCst) + 1) }
            })
        };
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // A burst of notifications inside the window triggers one re-run.
        bus.publish(&ChangeEvent::new());
        bus.publish(&ChangeEvent::new());
        bus.publish(&ChangeEvent::new());
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1, "run must wait for the quiet period");
        tokio::time::advance(DEBOUNCE + Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(live.latest(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dep_change_supersedes_outstanding_run() {
        let bus = ChangeBus::new();
        // The value each run returns is keyed off this shared cell, and the
        // first run is made artificially slow so the second overtakes it.
        let current = Arc::new(Mutex::new(("k1", Duration::from_millis(200))));
        let live = {
            let current = Arc::clone(&current);
            LiveQuery::spawn(&bus, vec!["k1".into()], DEBOUNCE, move || {
                let (key, delay) = *current.lock().unwrap();
                async move {
                    tokio::time::sleep(delay).await;
                    Ok::<_, Infallible>(key)
                }
            })
        };
        settle().await;
        assert_eq!(live.latest(), None, "slow first run still outstanding");

        *current.lock().unwrap() = ("k2", Duration::from_millis(10));
        live.set_deps(vec!["k2".into()]).unwrap();
        settle().await;
        tokio::time::advance(Duration::from_millis(20)).await;
        settle().await;
        assert_eq!(live.latest(), Some("k2"));

        // When the slow k1 run finally resolves, its result must be dropped.
        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;
        assert_eq!(live.latest(), Some("k2"), "stale k1 result must never be delivered");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_deps_do_not_rerun() {
        let bus = ChangeBus::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let live = {
            let runs = Arc::clone(&runs);
            LiveQuery::spawn(&bus, vec!["same".into()], DEBOUNCE, move || {
                let runs = Arc::clone(&runs);
                async move { Ok::<_, Infallible>(runs.fetch_add(1, Ordering::SeqCst)) }
            })
        };
        settle().await;
        live.set_deps(vec!["same".into()]).unwrap();
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_retains_previous_snapshot() {
        let bus = ChangeBus::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let live = {
            let runs = Arc::clone(&runs);
            LiveQuery::spawn(&bus, vec!["k".into()], DEBOUNCE, move || {
                let attempt = runs.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 { Ok("good") } else { Err("store unavailable") }
                }
            })
        };
        settle().await;
        assert_eq!(live.latest(), Some("good"));

        bus.publish(&ChangeEvent::new());
        // The control task must arm the deadline before the clock moves.
        settle().await;
        tokio::time::advance(DEBOUNCE + Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(live.latest(), Some("good"), "failure must not clear the last good snapshot");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_cancels_pending_debounce() {
        let bus = ChangeBus::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let live = {
            let runs = Arc::clone(&runs);
            LiveQuery::spawn(&bus, vec!["k".into()], DEBOUNCE, move || {
                let runs = Arc::clone(&runs);
                async move { Ok::<_, Infallible>(runs.fetch_add(1, Ordering::SeqCst)) }
            })
        };
        settle().await;
        bus.publish(&ChangeEvent::new());
        drop(live);
        settle().await;
        tokio::time::advance(DEBOUNCE * 2).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1, "no run after unmount");
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_deps_after_unmount_reports_cancelled() {
        let bus = ChangeBus::new();
        let live = LiveQuery::spawn(&bus, vec![], DEBOUNCE, || async { Ok::<_, Infallible>(()) });
        settle().await;
        // Drive the control loop to exit while keeping the handle alive.
        let _ = live.tx.send(Msg::Unmount);
        settle().await;
        // The control channel is closed once the loop exits, but the send
        // only fails when the receiver is dropped; force that by waiting.
        settle().await;
        assert!(live.set_deps(vec!["x".into()]).is_err());
    }
}
