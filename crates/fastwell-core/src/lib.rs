//! # Fastwell Core Library
//!
//! This library provides the fasting timer behind the Fastwell app. Front
//! ends (the CLI here, mobile screens elsewhere) are thin layers over the
//! same core.
//!
//! ## Architecture
//!
//! - **Fasting State Store**: one persisted session slot with in-process
//!   subscribers
//! - **Elapsed-Time Poller**: progress recomputed from the wall clock, never
//!   from accumulated ticks
//! - **Completion Observer**: detects the end of a fast once and logs it,
//!   cancels its reminder and clears the slot
//! - **Reminder**: a local notification at the fast-end instant
//! - **Storage**: SQLite for device storage, history and the notification
//!   outbox; TOML for configuration
//!
//! ## Key Components
//!
//! - [`FastingService`]: application-root wiring
//! - [`FastingStore`]: session persistence and pub/sub
//! - [`CompletionObserver`]: completion state machine
//! - [`Database`]: local persistence
//! - [`Config`]: application configuration

pub mod backend;
pub mod clock;
pub mod error;
pub mod events;
pub mod fasting;
pub mod notifications;
pub mod storage;

pub use backend::{ActivityLog, ActivityRecord, AuthProvider, ConfiguredAccount, UserId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, Result};
pub use events::Event;
pub use fasting::{
    CompletionObserver, ElapsedPoller, FastReminder, FastingLabel, FastingProgress,
    FastingService, FastingSession, FastingStore,
};
pub use notifications::{NotificationId, NotificationScheduler};
pub use storage::{Config, Database, KeyValueStore, MemoryStore};
