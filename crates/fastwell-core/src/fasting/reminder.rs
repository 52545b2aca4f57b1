//! The fast-end reminder: one local notification per session.
//!
//! Scheduling is advisory. A denied permission or a failing notification
//! service never blocks starting or finishing a fast.

use std::sync::Arc;

use super::session::FastingSession;
use crate::notifications::{NotificationId, NotificationRequest, NotificationScheduler};
use crate::storage::KeyValueStore;

pub const KEY_NOTIFICATION_ID: &str = "fasting.notification_id";

pub struct FastReminder {
    scheduler: Arc<dyn NotificationScheduler>,
    storage: Arc<dyn KeyValueStore>,
    enabled: bool,
    title: String,
}

impl FastReminder {
    pub fn new(
        scheduler: Arc<dyn NotificationScheduler>,
        storage: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            scheduler,
            storage,
            enabled: true,
            title: "Fast complete".into(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn request_for(&self, session: &FastingSession) -> NotificationRequest {
        NotificationRequest {
            fire_at: session.ends_at(),
            title: self.title.clone(),
            body: format!("Your {} fast is complete. Nice work!", session.label),
        }
    }

    /// Schedule the reminder for `session.ends_at()` and retain its id.
    ///
    /// Returns `None` when reminders are disabled or scheduling failed.
    pub fn schedule_for(&self, session: &FastingSession) -> Option<NotificationId> {
        if !self.enabled {
            tracing::debug!("fast reminders disabled; not scheduling");
            return None;
        }

        let request = self.request_for(session);
        let id = match self.scheduler.schedule(&request) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    label = %session.label,
                    "could not schedule fast reminder"
                );
                return None;
            }
        };

        if let Err(e) = self.storage.set(KEY_NOTIFICATION_ID, &id.0) {
            tracing::warn!(error = %e, notification_id = %id, "could not retain reminder id");
        }
        tracing::debug!(
            notification_id = %id,
            fire_at = %request.fire_at,
            "fast reminder scheduled"
        );
        Some(id)
    }

    pub fn retained_id(&self) -> Option<NotificationId> {
        match self.storage.get(KEY_NOTIFICATION_ID) {
            Ok(id) => id.filter(|id| !id.is_empty()).map(NotificationId),
            Err(e) => {
                tracing::debug!(error = %e, "could not read retained reminder id");
                None
            }
        }
    }

    /// Cancel the retained reminder, if any, and forget its id.
    ///
    /// Returns whether a cancel request was sent. Missing ids and service
    /// errors are tolerated.
    pub fn cancel(&self) -> bool {
        let Some(id) = self.retained_id() else {
            return false;
        };

        if let Err(e) = self.storage.remove(KEY_NOTIFICATION_ID) {
            tracing::debug!(error = %e, "could not clear retained reminder id");
        }
        if let Err(e) = self.scheduler.cancel(&id) {
            tracing::debug!(error = %e, notification_id = %id, "reminder cancel failed");
        }
        true
    }
}
