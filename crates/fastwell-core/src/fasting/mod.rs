//! The fasting timer subsystem.
//!
//! - [`FastingStore`]: the persisted single-slot session plus subscribers
//! - [`ElapsedPoller`]: wall-clock derived progress for each screen
//! - [`CompletionObserver`]: the one-shot completion side effects
//! - [`FastReminder`]: the fast-end local notification
//! - [`FastingService`]: wiring, built once at startup

mod completion;
mod poller;
mod protocol;
mod reminder;
mod service;
mod session;
pub mod store;

pub use completion::{CompletionObserver, LogOutcome, ObserverPhase};
pub use poller::{ElapsedPoller, PollerHandle};
pub use protocol::FastingLabel;
pub use reminder::{FastReminder, KEY_NOTIFICATION_ID};
pub use service::{FastingService, ServiceDeps};
pub use session::{format_hms, FastingProgress, FastingSession, SessionKey};
pub use store::{FastingStore, Subscription};
