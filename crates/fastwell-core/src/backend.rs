//! Backend seams: the signed-in user and the activity history table.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::BackendError;
use crate::fasting::{FastingLabel, FastingSession};

/// Activity type tag for completed fasts.
pub const FASTING_ACTIVITY: &str = "fasting";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only "who is signed in" lookup. Sign-in happens elsewhere.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Result<Option<UserId>, BackendError>;
}

/// One completed segment of a logged activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastSegment {
    pub label: FastingLabel,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_secs: u64,
    pub completed: bool,
}

/// A history row in the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub user_id: UserId,
    pub activity_type: String,
    pub log_date: NaiveDate,
    pub note: String,
    pub segments: Vec<FastSegment>,
    /// Stable per (user, label, start) so two instances completing the
    /// same fast produce one row.
    pub idempotency_key: String,
}

impl ActivityRecord {
    /// Builds the record for a fast that ran to its full target.
    ///
    /// The end instant is `start + target`, not the moment completion was
    /// noticed.
    pub fn completed_fast(user_id: UserId, session: &FastingSession) -> Self {
        let hours = session.label.duration_hours();
        Self {
            idempotency_key: idempotency_key(&user_id, session),
            user_id,
            activity_type: FASTING_ACTIVITY.to_string(),
            log_date: session.started_at.date_naive(),
            note: format!("Completed a {} fast ({} hours).", session.label, hours),
            segments: vec![FastSegment {
                label: session.label,
                start: session.started_at,
                end: session.ends_at(),
                duration_secs: session.target_secs(),
                completed: true,
            }],
        }
    }
}

fn idempotency_key(user_id: &UserId, session: &FastingSession) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.0.as_bytes());
    hasher.update(b"|");
    hasher.update(session.label.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(
        session
            .started_at
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .as_bytes(),
    );
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppendOutcome {
    Inserted,
    /// A row with the same idempotency key already exists.
    Duplicate,
}

/// Totals across a user's completed fasts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FastingStats {
    pub total_fasts: u64,
    pub total_fasting_secs: u64,
    pub longest_fast_secs: u64,
    pub last_completed_at: Option<DateTime<Utc>>,
}

/// The backend history table.
pub trait ActivityLog: Send + Sync {
    fn append(&self, record: &ActivityRecord) -> Result<AppendOutcome, BackendError>;

    /// Most recent first.
    fn recent(&self, user_id: &UserId, limit: usize) -> Result<Vec<ActivityRecord>, BackendError>;

    fn stats(&self, user_id: &UserId) -> Result<FastingStats, BackendError>;
}

/// Auth backed by the `account.user_id` config value.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredAccount {
    user_id: Option<UserId>,
}

impl ConfiguredAccount {
    pub fn new(user_id: Option<String>) -> Self {
        Self {
            user_id: user_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .map(UserId),
        }
    }

    pub fn signed_out() -> Self {
        Self { user_id: None }
    }
}

impl AuthProvider for ConfiguredAccount {
    fn current_user(&self) -> Result<Option<UserId>, BackendError> {
        Ok(self.user_id.clone())
    }
}
