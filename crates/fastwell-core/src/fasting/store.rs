//! Single source of truth for "is a fast active, and since when".
//!
//! The store persists the active session in two device storage keys and
//! fans every change out to in-process subscribers. It is built once at
//! startup and shared as `Arc<FastingStore>`; there is no global registry.
//!
//! ```text
//! start_fast ──► persist label + start ──► notify(Some(session))
//! end_fast   ──► remove both keys      ──► notify(None)
//! ```

use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, SubsecRound, Utc};

use super::protocol::FastingLabel;
use super::session::FastingSession;
use crate::clock::Clock;
use crate::error::Result;
use crate::storage::KeyValueStore;

pub const KEY_STARTED_AT: &str = "fasting.started_at";
pub const KEY_LABEL: &str = "fasting.label";

type Listener = Arc<dyn Fn(Option<&FastingSession>) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

pub struct FastingStore {
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    registry: Arc<Mutex<Registry>>,
}

impl FastingStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    /// Record a new fast starting now and tell every subscriber.
    ///
    /// Does not check for an existing fast; the slot is simply overwritten.
    /// The start instant is truncated to the millisecond precision it is
    /// stored with, so subscribers and later snapshots agree on the key.
    pub fn start_fast(&self, label: FastingLabel) -> Result<FastingSession> {
        let session = FastingSession::new(label, self.clock.now().trunc_subsecs(3));
        let start_iso = session.start_iso();
        self.storage
            .set_many(&[(KEY_LABEL, label.as_str()), (KEY_STARTED_AT, start_iso.as_str())])?;

        tracing::info!(label = %label, started_at = %start_iso, "fast started");
        self.notify(Some(&session));
        Ok(session)
    }

    /// Clear the active fast and tell every subscriber.
    pub fn end_fast(&self) -> Result<()> {
        self.storage.remove_many(&[KEY_STARTED_AT, KEY_LABEL])?;
        tracing::info!("fast cleared");
        self.notify(None);
        Ok(())
    }

    /// Read the persisted session.
    ///
    /// Missing keys, an unknown label or an unparsable start instant all read
    /// as "no active fast".
    pub fn get_snapshot(&self) -> Result<Option<FastingSession>> {
        let label = self.storage.get(KEY_LABEL)?;
        let started_at = self.storage.get(KEY_STARTED_AT)?;

        let (Some(label), Some(started_at)) = (label, started_at) else {
            return Ok(None);
        };

        let Some(parsed_label) = FastingLabel::parse(&label) else {
            tracing::warn!(label = %label, "ignoring stored fast with unknown label");
            return Ok(None);
        };

        match DateTime::parse_from_rfc3339(&started_at) {
            Ok(start) => Ok(Some(FastingSession::new(
                parsed_label,
                start.with_timezone(&Utc),
            ))),
            Err(e) => {
                tracing::warn!(
                    started_at = %started_at,
                    error = %e,
                    "ignoring stored fast with bad start time"
                );
                Ok(None)
            }
        }
    }

    /// Register a listener for every start/end.
    ///
    /// Delivery is synchronous and in subscription order. Dropping the
    /// returned guard unsubscribes.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(Option<&FastingSession>) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .listeners
            .len()
    }

    fn notify(&self, session: Option<&FastingSession>) {
        // Snapshot so listeners can subscribe or unsubscribe while being called.
        let listeners: Vec<Listener> = self
            .registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            listener(session);
        }
    }
}

/// Handle returned by [`FastingStore::subscribe`].
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn store() -> (FastingStore, Arc<MemoryStore>) {
        let kv = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 5, 19, 0, 0).unwrap(),
        ));
        (FastingStore::new(kv.clone(), clock), kv)
    }

    #[test]
    fn start_then_snapshot_round_trips() {
        let (store, _) = store();
        let session = store.start_fast(FastingLabel::SixteenEight).unwrap();
        let snap = store.get_snapshot().unwrap().unwrap();
        assert_eq!(snap, session);
        assert_eq!(snap.start_iso(), "2026-01-05T19:00:00.000Z");
    }

    #[test]
    fn sub_millisecond_start_round_trips_with_system_clock() {
        let store = FastingStore::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock));
        let announced = Arc::new(Mutex::new(None));
        let _sub = {
            let announced = announced.clone();
            store.subscribe(move |s| *announced.lock().unwrap() = s.map(FastingSession::key))
        };

        let session = store.start_fast(FastingLabel::TwelveTwelve).unwrap();
        let snap = store.get_snapshot().unwrap().unwrap();
        assert_eq!(snap.key(), session.key());
        assert_eq!(*announced.lock().unwrap(), Some(snap.key()));
        assert_eq!(session.started_at.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn start_instant_is_truncated_to_millis() {
        let kv = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 5, 19, 0, 0).unwrap()
                + chrono::Duration::nanoseconds(123_456_789),
        ));
        let store = FastingStore::new(kv.clone(), clock);
        let session = store.start_fast(FastingLabel::SixteenEight).unwrap();
        assert_eq!(session.start_iso(), "2026-01-05T19:00:00.123Z");
        assert_eq!(store.get_snapshot().unwrap(), Some(session));
    }

    #[test]
    fn end_clears_both_keys() {
        let (store, kv) = store();
        store.start_fast(FastingLabel::Omad).unwrap();
        store.end_fast().unwrap();
        assert!(store.get_snapshot().unwrap().is_none());
        assert!(kv.get(KEY_LABEL).unwrap().is_none());
        assert!(kv.get(KEY_STARTED_AT).unwrap().is_none());
    }

    #[test]
    fn unknown_label_reads_as_idle() {
        let (store, kv) = store();
        kv.set(KEY_LABEL, "warrior").unwrap();
        kv.set(KEY_STARTED_AT, "2026-01-05T19:00:00.000Z").unwrap();
        assert!(store.get_snapshot().unwrap().is_none());
    }

    #[test]
    fn half_written_or_garbled_state_reads_as_idle() {
        let (store, kv) = store();
        kv.set(KEY_LABEL, "16:8").unwrap();
        assert!(store.get_snapshot().unwrap().is_none());
        kv.set(KEY_STARTED_AT, "yesterday evening").unwrap();
        assert!(store.get_snapshot().unwrap().is_none());
    }

    #[test]
    fn subscribers_notified_in_order() {
        let (store, _) = store();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = {
            let seen = seen.clone();
            store.subscribe(move |s| seen.lock().unwrap().push(("first", s.is_some())))
        };
        let s2 = {
            let seen = seen.clone();
            store.subscribe(move |s| seen.lock().unwrap().push(("second", s.is_some())))
        };

        store.start_fast(FastingLabel::EighteenSix).unwrap();
        store.end_fast().unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("first", true),
                ("second", true),
                ("first", false),
                ("second", false)
            ]
        );
        drop((s1, s2));
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let (store, _) = store();
        let hits = Arc::new(Mutex::new(0));
        let sub = {
            let hits = hits.clone();
            store.subscribe(move |_| *hits.lock().unwrap() += 1)
        };
        assert_eq!(store.subscriber_count(), 1);

        store.start_fast(FastingLabel::SixteenEight).unwrap();
        sub.unsubscribe();
        assert_eq!(store.subscriber_count(), 0);

        store.end_fast().unwrap();
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn subscription_outliving_store_is_harmless() {
        let (store, _) = store();
        let sub = store.subscribe(|_| {});
        drop(store);
        drop(sub);
    }
}
