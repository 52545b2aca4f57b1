//! Application-root wiring for the fasting subsystem.
//!
//! Built once at startup. Owns the store, the reminder and the single
//! completion observer, and hands out pollers for anything that renders
//! the timer.

use std::sync::Arc;

use super::completion::CompletionObserver;
use super::poller::ElapsedPoller;
use super::protocol::FastingLabel;
use super::reminder::FastReminder;
use super::session::FastingProgress;
use super::store::FastingStore;
use crate::backend::{ActivityLog, AuthProvider, ConfiguredAccount};
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, ValidationError};
use crate::events::Event;
use crate::notifications::NotificationScheduler;
use crate::storage::{Config, Database, KeyValueStore};

/// The seams a `FastingService` is built from.
pub struct ServiceDeps {
    pub storage: Arc<dyn KeyValueStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub log: Arc<dyn ActivityLog>,
    pub notifications: Arc<dyn NotificationScheduler>,
    pub clock: Arc<dyn Clock>,
}

pub struct FastingService {
    store: Arc<FastingStore>,
    reminder: Arc<FastReminder>,
    observer: Arc<CompletionObserver>,
}

impl FastingService {
    pub fn new(deps: ServiceDeps) -> Result<Self> {
        let reminder = FastReminder::new(deps.notifications, Arc::clone(&deps.storage));
        Self::with_reminder(deps.storage, deps.auth, deps.log, deps.clock, reminder)
    }

    /// Wire everything to the local SQLite database and the configured account.
    pub fn open(config: &Config) -> Result<Self> {
        let db = Arc::new(Database::open()?);
        Self::open_with(config, db, Arc::new(SystemClock))
    }

    pub fn open_with(config: &Config, db: Arc<Database>, clock: Arc<dyn Clock>) -> Result<Self> {
        let reminder = FastReminder::new(db.clone(), db.clone())
            .with_enabled(config.notifications.enabled)
            .with_title(config.notifications.title.clone());
        let auth = Arc::new(ConfiguredAccount::new(config.account.user_id.clone()));
        Self::with_reminder(db.clone(), auth, db, clock, reminder)
    }

    fn with_reminder(
        storage: Arc<dyn KeyValueStore>,
        auth: Arc<dyn AuthProvider>,
        log: Arc<dyn ActivityLog>,
        clock: Arc<dyn Clock>,
        reminder: FastReminder,
    ) -> Result<Self> {
        let store = Arc::new(FastingStore::new(storage, clock));
        let reminder = Arc::new(reminder);
        let observer = Arc::new(CompletionObserver::mount(
            Arc::clone(&store),
            auth,
            log,
            Arc::clone(&reminder),
        )?);
        Ok(Self {
            store,
            reminder,
            observer,
        })
    }

    pub fn store(&self) -> &Arc<FastingStore> {
        &self.store
    }

    pub fn reminder(&self) -> &Arc<FastReminder> {
        &self.reminder
    }

    pub fn observer(&self) -> &Arc<CompletionObserver> {
        &self.observer
    }

    /// A poller for one screen. Drop it to unmount.
    pub fn poller(&self) -> Result<ElapsedPoller> {
        ElapsedPoller::mount(Arc::clone(&self.store))
    }

    /// Start a fast and schedule its reminder.
    ///
    /// Refuses while another fast is active, since its reminder would be
    /// orphaned.
    pub fn start_fast(&self, label: FastingLabel) -> Result<Event> {
        if let Some(active) = self.store.get_snapshot()? {
            return Err(ValidationError::FastAlreadyActive {
                label: active.label.to_string(),
                started_at: active.started_at,
            }
            .into());
        }

        // A reminder left behind by a session that was cleared without going
        // through us would otherwise fire for nothing.
        self.reminder.cancel();

        let session = self.store.start_fast(label)?;
        let notification_id = self.reminder.schedule_for(&session);

        Ok(Event::FastStarted {
            label,
            started_at: session.started_at,
            ends_at: session.ends_at(),
            duration_secs: session.target_secs(),
            notification_id,
            at: session.started_at,
        })
    }

    /// End the active fast early. Nothing is logged.
    ///
    /// A fast that has already reached its target is completed instead and
    /// the `FastCompleted` event is returned. Returns `None` when no fast is
    /// active.
    pub fn end_fast(&self) -> Result<Option<Event>> {
        if let Some(completed) = self.observer.observe()? {
            return Ok(Some(completed));
        }
        let Some(session) = self.store.get_snapshot()? else {
            return Ok(None);
        };
        let now = self.store.clock().now();

        let reminder_cancelled = self.reminder.cancel();
        self.store.end_fast()?;

        Ok(Some(Event::FastEnded {
            label: session.label,
            started_at: session.started_at,
            elapsed_secs: session.elapsed_secs_at(now),
            reminder_cancelled,
            at: now,
        }))
    }

    /// Current progress straight from storage.
    pub fn status(&self) -> Result<FastingProgress> {
        let now = self.store.clock().now();
        Ok(FastingProgress::for_session(
            self.store.get_snapshot()?.as_ref(),
            now,
        ))
    }

    pub fn snapshot_event(&self) -> Result<Event> {
        Ok(Event::StateSnapshot {
            progress: self.status()?,
            at: self.store.clock().now(),
        })
    }

    /// Run one completion check.
    pub fn check_completion(&self) -> Result<Option<Event>> {
        self.observer.observe()
    }
}
