use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fasting::{FastingLabel, FastingProgress, LogOutcome};
use crate::notifications::NotificationId;

/// Every state change in the fasting subsystem produces an Event.
/// Front ends render them; `FastCompleted` is the one-shot confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    FastStarted {
        label: FastingLabel,
        started_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        duration_secs: u64,
        /// `None` when the reminder could not be scheduled.
        notification_id: Option<NotificationId>,
        at: DateTime<Utc>,
    },
    /// Ended by the user before the target; nothing is logged.
    FastEnded {
        label: FastingLabel,
        started_at: DateTime<Utc>,
        elapsed_secs: u64,
        reminder_cancelled: bool,
        at: DateTime<Utc>,
    },
    FastCompleted {
        label: FastingLabel,
        started_at: DateTime<Utc>,
        /// Canonical end: start plus the protocol duration.
        ended_at: DateTime<Utc>,
        duration_secs: u64,
        logged: LogOutcome,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        #[serde(flatten)]
        progress: FastingProgress,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Short human-readable line for terminals and toasts.
    pub fn summary(&self) -> String {
        match self {
            Event::FastStarted { label, ends_at, .. } => {
                format!(
                    "Started a {label} fast; it ends at {}",
                    ends_at.format("%Y-%m-%d %H:%M UTC")
                )
            }
            Event::FastEnded {
                label, elapsed_secs, ..
            } => format!(
                "Ended the {label} fast after {}",
                crate::fasting::format_hms(*elapsed_secs)
            ),
            Event::FastCompleted { label, .. } => {
                format!("Fast complete! You finished your {label} fast.")
            }
            Event::StateSnapshot { progress, .. } => match progress.label {
                Some(label) if progress.active => format!(
                    "{label}: {} elapsed, {} remaining ({:.0}%)",
                    crate::fasting::format_hms(progress.elapsed_secs),
                    crate::fasting::format_hms(progress.remaining_secs),
                    progress.pct * 100.0
                ),
                _ => "No active fast".to_string(),
            },
        }
    }
}
