//! The one place where a finished fast is detected and acted on.
//!
//! Built once at the application root, independent of whichever screens are
//! polling. Completion runs at most once per session: the
//! `Watching -> Completing` transition is a compare-and-set on the session
//! key, and a key that has reached `Completing` is never completed again.
//!
//! ```text
//!            session seen             elapsed >= target
//!   Idle ───────────────► Watching ───────────────────► Completing
//!    ▲                       │                              │
//!    │    fast ended         │               side effects   │
//!    └───────────────────────┘                     done     ▼
//!    └────────────────── store cleared ─────────────── Completed
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;

use super::poller::{PollerHandle, SessionView};
use super::reminder::FastReminder;
use super::session::{FastingSession, SessionKey};
use super::store::FastingStore;
use crate::backend::{ActivityLog, ActivityRecord, AppendOutcome, AuthProvider};
use crate::error::Result;
use crate::events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverPhase {
    Idle,
    Watching(SessionKey),
    Completing(SessionKey),
    Completed(SessionKey),
}

/// What happened to the history row for a completed fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutcome {
    Inserted,
    /// Another instance already logged this fast.
    Duplicate,
    /// Nobody was signed in.
    SkippedSignedOut,
    /// The insert failed; the row is lost.
    Failed,
}

pub struct CompletionObserver {
    store: Arc<FastingStore>,
    auth: Arc<dyn AuthProvider>,
    log: Arc<dyn ActivityLog>,
    reminder: Arc<FastReminder>,
    view: SessionView,
    phase: Mutex<ObserverPhase>,
}

impl CompletionObserver {
    pub fn mount(
        store: Arc<FastingStore>,
        auth: Arc<dyn AuthProvider>,
        log: Arc<dyn ActivityLog>,
        reminder: Arc<FastReminder>,
    ) -> Result<Self> {
        let view = SessionView::mount(&store)?;
        Ok(Self {
            store,
            auth,
            log,
            reminder,
            view,
            phase: Mutex::new(ObserverPhase::Idle),
        })
    }

    pub fn phase(&self) -> ObserverPhase {
        *self.lock_phase()
    }

    pub fn observe(&self) -> Result<Option<Event>> {
        self.observe_at(self.store.clock().now())
    }

    /// Check the current session against its target and complete it if it
    /// has just been reached.
    ///
    /// Returns the completion event exactly once per session.
    pub fn observe_at(&self, now: DateTime<Utc>) -> Result<Option<Event>> {
        let session = {
            let mut phase = self.lock_phase();
            let Some(session) = self.view.current() else {
                *phase = ObserverPhase::Idle;
                return Ok(None);
            };
            let key = session.key();

            match *phase {
                ObserverPhase::Completing(k) | ObserverPhase::Completed(k) if k == key => {
                    return Ok(None);
                }
                _ => {}
            }

            if !session.is_completed_at(now) {
                *phase = ObserverPhase::Watching(key);
                return Ok(None);
            }

            *phase = ObserverPhase::Completing(key);
            session
        };

        let result = self.complete(&session, now);
        *self.lock_phase() = ObserverPhase::Completed(session.key());
        result.map(Some)
    }

    fn complete(&self, session: &FastingSession, now: DateTime<Utc>) -> Result<Event> {
        let ended_at = session.ends_at();

        let user = match self.auth.current_user() {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "auth lookup failed; treating as signed out");
                None
            }
        };

        let logged = match user {
            None => {
                tracing::info!(label = %session.label, "no signed-in user; skipping fast history");
                LogOutcome::SkippedSignedOut
            }
            Some(user) => {
                let record = ActivityRecord::completed_fast(user, session);
                match self.log.append(&record) {
                    Ok(AppendOutcome::Inserted) => LogOutcome::Inserted,
                    Ok(AppendOutcome::Duplicate) => {
                        tracing::info!(label = %session.label, "fast already logged elsewhere");
                        LogOutcome::Duplicate
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            label = %session.label,
                            "failed to log completed fast"
                        );
                        LogOutcome::Failed
                    }
                }
            }
        };

        self.reminder.cancel();
        self.store.end_fast()?;

        tracing::info!(
            label = %session.label,
            started_at = %session.start_iso(),
            logged = ?logged,
            "fast complete"
        );

        Ok(Event::FastCompleted {
            label: session.label,
            started_at: session.started_at,
            ended_at,
            duration_secs: session.target_secs(),
            logged,
            at: now,
        })
    }

    /// Observe every `interval` and hand each completion to `on_complete`.
    ///
    /// Errors from a completion attempt are logged; the session is not
    /// retried.
    pub fn spawn<F>(self: Arc<Self>, interval: Duration, mut on_complete: F) -> PollerHandle
    where
        F: FnMut(Event) + Send + 'static,
    {
        PollerHandle::new(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match self.observe() {
                    Ok(Some(event)) => on_complete(event),
                    Ok(None) => {}
                    Err(e) => tracing::error!(error = %e, "fast completion failed"),
                }
            }
        }))
    }

    fn lock_phase(&self) -> MutexGuard<'_, ObserverPhase> {
        self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ConfiguredAccount, UserId};
    use crate::clock::ManualClock;
    use crate::fasting::FastingLabel;
    use crate::storage::{Database, MemoryStore};
    use chrono::TimeZone;

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<FastingStore>,
        db: Arc<Database>,
        reminder: Arc<FastReminder>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 7, 4, 20, 0, 0).unwrap(),
        ));
        let kv = Arc::new(MemoryStore::new());
        let db = Arc::new(Database::open_memory().unwrap());
        let store = Arc::new(FastingStore::new(kv.clone(), clock.clone()));
        let reminder = Arc::new(FastReminder::new(db.clone(), kv));
        Fixture {
            clock,
            store,
            db,
            reminder,
        }
    }

    fn observer(f: &Fixture, user: Option<&str>) -> CompletionObserver {
        CompletionObserver::mount(
            f.store.clone(),
            Arc::new(ConfiguredAccount::new(user.map(String::from))),
            f.db.clone(),
            f.reminder.clone(),
        )
        .unwrap()
    }

    #[test]
    fn idle_until_a_fast_starts() {
        let f = fixture();
        let obs = observer(&f, Some("u1"));
        assert!(obs.observe().unwrap().is_none());
        assert_eq!(obs.phase(), ObserverPhase::Idle);
    }

    #[test]
    fn watches_then_completes_once() {
        let f = fixture();
        let obs = observer(&f, Some("u1"));
        let session = f.store.start_fast(FastingLabel::SixteenEight).unwrap();

        f.clock.advance(chrono::Duration::hours(16) - chrono::Duration::seconds(1));
        assert!(obs.observe().unwrap().is_none());
        assert_eq!(obs.phase(), ObserverPhase::Watching(session.key()));

        f.clock.advance(chrono::Duration::seconds(1));
        let event = obs.observe().unwrap().expect("completion event");
        match event {
            Event::FastCompleted {
                duration_secs,
                ended_at,
                logged,
                ..
            } => {
                assert_eq!(duration_secs, 57_600);
                assert_eq!(ended_at, session.ends_at());
                assert_eq!(logged, LogOutcome::Inserted);
            }
            other => panic!("unexpected event {other:?}"),
        }

        assert!(obs.observe().unwrap().is_none());
        assert!(f.store.get_snapshot().unwrap().is_none());
        assert_eq!(f.db.recent(&UserId("u1".into()), 10).unwrap().len(), 1);
        assert_eq!(obs.phase(), ObserverPhase::Idle);
    }

    #[test]
    fn late_observation_still_logs_canonical_end() {
        let f = fixture();
        let obs = observer(&f, Some("u1"));
        let session = f.store.start_fast(FastingLabel::TwelveTwelve).unwrap();

        f.clock.advance(chrono::Duration::hours(15));
        obs.observe().unwrap().expect("completion event");

        let rows = f.db.recent(&UserId("u1".into()), 10).unwrap();
        assert_eq!(rows[0].segments[0].end, session.ends_at());
        assert_eq!(rows[0].segments[0].duration_secs, 12 * 3600);
    }

    #[test]
    fn signed_out_completion_still_clears_and_cancels() {
        let f = fixture();
        let obs = observer(&f, None);
        let session = f.store.start_fast(FastingLabel::SixteenEight).unwrap();
        f.reminder.schedule_for(&session).unwrap();

        f.clock.advance(chrono::Duration::hours(16));
        let event = obs.observe().unwrap().unwrap();
        assert!(matches!(
            event,
            Event::FastCompleted {
                logged: LogOutcome::SkippedSignedOut,
                ..
            }
        ));
        assert!(f.store.get_snapshot().unwrap().is_none());
        assert!(f.db.pending_notifications().unwrap().is_empty());
        assert!(f.reminder.retained_id().is_none());
    }

    #[test]
    fn a_new_fast_after_completion_is_watched_again() {
        let f = fixture();
        let obs = observer(&f, Some("u1"));
        f.store.start_fast(FastingLabel::TwelveTwelve).unwrap();
        f.clock.advance(chrono::Duration::hours(12));
        assert!(obs.observe().unwrap().is_some());

        f.clock.advance(chrono::Duration::hours(1));
        let second = f.store.start_fast(FastingLabel::TwelveTwelve).unwrap();
        assert!(obs.observe().unwrap().is_none());
        assert_eq!(obs.phase(), ObserverPhase::Watching(second.key()));

        f.clock.advance(chrono::Duration::hours(12));
        assert!(obs.observe().unwrap().is_some());
        assert_eq!(f.db.recent(&UserId("u1".into()), 10).unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_observer_completes_once_and_unmounts() {
        let f = fixture();
        let obs = Arc::new(observer(&f, Some("u1")));
        f.store.start_fast(FastingLabel::TwelveTwelve).unwrap();
        assert_eq!(f.store.subscriber_count(), 1);

        let events = Arc::new(Mutex::new(Vec::new()));
        let handle = {
            let events = events.clone();
            obs.clone().spawn(Duration::from_secs(1), move |event| {
                events.lock().unwrap().push(event)
            })
        };

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(events.lock().unwrap().is_empty());

        f.clock.advance(chrono::Duration::hours(12));
        tokio::time::sleep(Duration::from_secs(3)).await;

        {
            let events = events.lock().unwrap();
            assert_eq!(events.len(), 1);
            assert!(matches!(
                events[0],
                Event::FastCompleted {
                    logged: LogOutcome::Inserted,
                    ..
                }
            ));
        }
        assert!(f.store.get_snapshot().unwrap().is_none());
        assert_eq!(f.db.recent(&UserId("u1".into()), 10).unwrap().len(), 1);

        handle.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(obs);
        assert_eq!(f.store.subscriber_count(), 0);
    }
}
