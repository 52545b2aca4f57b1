//! Local notification service seam.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NotificationError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub String);

impl NotificationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub fire_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
}

/// A notification that has been scheduled and not cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledNotification {
    pub id: NotificationId,
    pub fire_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
}

pub trait NotificationScheduler: Send + Sync {
    /// Schedule one notification at `request.fire_at`.
    fn schedule(&self, request: &NotificationRequest) -> Result<NotificationId, NotificationError>;

    /// Cancel by identifier. Unknown or already-cancelled ids are not errors.
    fn cancel(&self, id: &NotificationId) -> Result<(), NotificationError>;
}
