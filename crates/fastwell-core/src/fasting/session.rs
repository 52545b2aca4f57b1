//! The active fasting session and the values derived from it.
//!
//! Only `label` and `started_at` are ever persisted. Elapsed, remaining and
//! progress are recomputed from a wall-clock reading each time they are
//! needed.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::protocol::FastingLabel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastingSession {
    pub label: FastingLabel,
    pub started_at: DateTime<Utc>,
}

/// Identity of a session. Two sessions with the same label and start
/// instant are the same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub label: FastingLabel,
    pub started_at: DateTime<Utc>,
}

impl FastingSession {
    pub fn new(label: FastingLabel, started_at: DateTime<Utc>) -> Self {
        Self { label, started_at }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey {
            label: self.label,
            started_at: self.started_at,
        }
    }

    pub fn target_secs(&self) -> u64 {
        self.label.duration_secs()
    }

    /// Canonical end of the fast: start plus the protocol duration.
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.started_at + self.label.duration()
    }

    /// ISO-8601 start instant, as written to device storage.
    pub fn start_iso(&self) -> String {
        self.started_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Seconds since the start. A start instant in the future (clock skew
    /// between devices) reads as zero.
    pub fn elapsed_secs_at(&self, now: DateTime<Utc>) -> u64 {
        (now - self.started_at).num_seconds().max(0) as u64
    }

    pub fn is_completed_at(&self, now: DateTime<Utc>) -> bool {
        self.elapsed_secs_at(now) >= self.target_secs()
    }

    pub fn progress_at(&self, now: DateTime<Utc>) -> FastingProgress {
        let elapsed = self.elapsed_secs_at(now);
        let duration = self.target_secs();
        FastingProgress {
            active: true,
            completed: elapsed >= duration,
            label: Some(self.label),
            started_at: Some(self.start_iso()),
            elapsed_secs: elapsed,
            remaining_secs: duration.saturating_sub(elapsed),
            duration_secs: duration,
            pct: progress_fraction(elapsed, duration),
        }
    }
}

/// What a screen renders for the fasting timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastingProgress {
    pub active: bool,
    pub completed: bool,
    pub label: Option<FastingLabel>,
    pub started_at: Option<String>,
    pub elapsed_secs: u64,
    pub remaining_secs: u64,
    pub duration_secs: u64,
    /// 0.0 .. 1.0
    pub pct: f64,
}

impl FastingProgress {
    pub fn idle() -> Self {
        Self {
            active: false,
            completed: false,
            label: None,
            started_at: None,
            elapsed_secs: 0,
            remaining_secs: 0,
            duration_secs: 0,
            pct: 0.0,
        }
    }

    pub fn for_session(session: Option<&FastingSession>, now: DateTime<Utc>) -> Self {
        session
            .map(|s| s.progress_at(now))
            .unwrap_or_else(Self::idle)
    }
}

fn progress_fraction(elapsed: u64, duration: u64) -> f64 {
    if duration == 0 {
        return 0.0;
    }
    (elapsed as f64 / duration as f64).clamp(0.0, 1.0)
}

/// Formats seconds as `HH:MM:SS`.
pub fn format_hms(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
