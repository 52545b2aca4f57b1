//! Per-screen elapsed-time recomputation.
//!
//! A poller keeps the latest session it has seen (hydrated from storage,
//! then kept current by a store subscription) and recomputes
//! [`FastingProgress`] from the wall clock whenever it is polled. Nothing is
//! accumulated between polls, so a suspended process catches up on its first
//! poll after resuming.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::session::{FastingProgress, FastingSession};
use super::store::{FastingStore, Subscription};
use crate::error::Result;

#[derive(Default)]
struct ViewState {
    session: Option<FastingSession>,
    /// Set once a live update has arrived; hydration must not overwrite it.
    live: bool,
}

/// The latest session as seen through a store subscription.
pub(crate) struct SessionView {
    state: Arc<Mutex<ViewState>>,
    _subscription: Subscription,
}

impl SessionView {
    /// Subscribe first, then hydrate, so an update racing the initial read
    /// is never lost.
    pub(crate) fn mount(store: &FastingStore) -> Result<Self> {
        let state = Arc::new(Mutex::new(ViewState::default()));
        let subscription = {
            let state = Arc::clone(&state);
            store.subscribe(move |session| {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                state.session = session.copied();
                state.live = true;
            })
        };

        let hydrated = store.get_snapshot()?;
        {
            let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
            if !guard.live {
                guard.session = hydrated;
            }
        }

        Ok(Self {
            state,
            _subscription: subscription,
        })
    }

    pub(crate) fn current(&self) -> Option<FastingSession> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).session
    }
}

pub struct ElapsedPoller {
    store: Arc<FastingStore>,
    view: SessionView,
}

impl ElapsedPoller {
    /// Hydrate from storage and start listening for starts and ends.
    pub fn mount(store: Arc<FastingStore>) -> Result<Self> {
        let view = SessionView::mount(&store)?;
        Ok(Self { store, view })
    }

    pub fn session(&self) -> Option<FastingSession> {
        self.view.current()
    }

    pub fn poll_at(&self, now: DateTime<Utc>) -> FastingProgress {
        FastingProgress::for_session(self.view.current().as_ref(), now)
    }

    pub fn poll(&self) -> FastingProgress {
        self.poll_at(self.store.clock().now())
    }

    /// Recompute every `interval` on the tokio runtime and hand each result
    /// to `on_tick`. The first tick fires immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(self, interval: Duration, mut on_tick: F) -> PollerHandle
    where
        F: FnMut(FastingProgress) + Send + 'static,
    {
        PollerHandle::new(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                on_tick(self.poll());
            }
        }))
    }
}

/// A running tick task. Dropping it stops the task and releases its
/// store subscription.
#[derive(Debug)]
pub struct PollerHandle {
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    pub fn stop(mut self) {
        self.abort();
    }

    /// Wait for the task to end on its own.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fasting::store::{KEY_LABEL, KEY_STARTED_AT};
    use crate::fasting::FastingLabel;
    use crate::storage::{KeyValueStore, MemoryStore};
    use chrono::TimeZone;

    fn setup() -> (Arc<FastingStore>, Arc<ManualClock>, Arc<MemoryStore>) {
        let kv = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 2, 14, 18, 30, 0).unwrap(),
        ));
        let store = Arc::new(FastingStore::new(kv.clone(), clock.clone()));
        (store, clock, kv)
    }

    #[test]
    fn idle_poller_reports_zero() {
        let (store, _, _) = setup();
        let poller = ElapsedPoller::mount(store).unwrap();
        assert_eq!(poller.poll(), FastingProgress::idle());
    }

    #[test]
    fn hydrates_from_existing_session() {
        let (store, clock, _) = setup();
        store.start_fast(FastingLabel::EighteenSix).unwrap();
        clock.advance(chrono::Duration::hours(2));

        let poller = ElapsedPoller::mount(store).unwrap();
        let p = poller.poll();
        assert!(p.active);
        assert_eq!(p.elapsed_secs, 2 * 3600);
        assert_eq!(p.duration_secs, 18 * 3600);
    }

    #[test]
    fn follows_live_updates() {
        let (store, clock, _) = setup();
        let poller = ElapsedPoller::mount(store.clone()).unwrap();

        store.start_fast(FastingLabel::SixteenEight).unwrap();
        clock.advance(chrono::Duration::minutes(30));
        assert_eq!(poller.poll().elapsed_secs, 1800);

        store.end_fast().unwrap();
        assert_eq!(poller.poll(), FastingProgress::idle());
    }

    #[test]
    fn catches_up_after_suspension() {
        let (store, clock, _) = setup();
        let poller = ElapsedPoller::mount(store.clone()).unwrap();
        store.start_fast(FastingLabel::SixteenEight).unwrap();

        // No polls for ten hours, as if the device slept.
        clock.advance(chrono::Duration::hours(10));
        let p = poller.poll();
        assert_eq!(p.elapsed_secs, 10 * 3600);
        assert_eq!(p.remaining_secs, 6 * 3600);
    }

    #[test]
    fn hydration_ignores_corrupt_storage() {
        let (store, _, kv) = setup();
        kv.set(KEY_LABEL, "5:2").unwrap();
        kv.set(KEY_STARTED_AT, "2026-02-14T10:00:00Z").unwrap();
        let poller = ElapsedPoller::mount(store).unwrap();
        assert!(!poller.poll().active);
    }

    #[test]
    fn unmounting_releases_subscription() {
        let (store, _, _) = setup();
        let poller = ElapsedPoller::mount(store.clone()).unwrap();
        assert_eq!(store.subscriber_count(), 1);
        drop(poller);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_poller_ticks_until_stopped() {
        let (store, _, _) = setup();
        store.start_fast(FastingLabel::TwelveTwelve).unwrap();
        let poller = ElapsedPoller::mount(store.clone()).unwrap();

        let ticks = Arc::new(Mutex::new(Vec::new()));
        let handle = {
            let ticks = ticks.clone();
            poller.spawn(Duration::from_secs(1), move |p| {
                ticks.lock().unwrap().push(p.active)
            })
        };

        tokio::time::sleep(Duration::from_millis(3500)).await;
        handle.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let seen = ticks.lock().unwrap().clone();
        assert_eq!(seen, vec![true, true, true, true]);
        assert_eq!(store.subscriber_count(), 0);
    }
}
