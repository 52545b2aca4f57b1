//! SQLite-backed local storage.
//!
//! One database file serves three roles:
//! - device key-value storage for the active fast
//! - the activity history table
//! - the local notification outbox

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{data_dir, migrations, KeyValueStore};
use crate::backend::{ActivityLog, ActivityRecord, AppendOutcome, FastSegment, FastingStats, UserId};
use crate::error::{BackendError, CoreError, DatabaseError, NotificationError, StorageError};
use crate::notifications::{
    NotificationId, NotificationRequest, NotificationScheduler, ScheduledNotification,
};

/// SQLite database for fastwell state.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `<data_dir>/fastwell.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("fastwell.db");
        Self::open_at(&path)
    }

    /// Open (or create) the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, CoreError> {
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn
            .lock()
            .map_err(|_| DatabaseError::QueryFailed("connection lock poisoned".into()))
    }

    /// Notifications that are scheduled and not cancelled, soonest first.
    pub fn pending_notifications(&self) -> Result<Vec<ScheduledNotification>, DatabaseError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, fire_at, title, body
             FROM notifications
             WHERE cancelled_at IS NULL
             ORDER BY fire_at ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut pending = Vec::new();
        for row in rows {
            let (id, fire_at, title, body) = row?;
            pending.push(ScheduledNotification {
                id: NotificationId(id),
                fire_at: parse_instant(&fire_at)?,
                title,
                body,
            });
        }
        Ok(pending)
    }
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::QueryFailed(format!("bad timestamp '{raw}': {e}")))
}

// ── Key-value storage ────────────────────────────────────────────────

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let read_err = |message: String| StorageError::Read {
            key: key.to_string(),
            message,
        };
        let conn = self.conn().map_err(|e| read_err(e.to_string()))?;
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get::<_, String>(0)
        })
        .optional()
        .map_err(|e| read_err(e.to_string()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.set_many(&[(key, value)])
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.remove_many(&[key])
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let first_key = entries.first().map(|(k, _)| *k).unwrap_or_default();
        let write_err = |message: String| StorageError::Write {
            key: first_key.to_string(),
            message,
        };
        let conn = self.conn().map_err(|e| write_err(e.to_string()))?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| write_err(e.to_string()))?;
        for (key, value) in entries {
            tx.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| write_err(e.to_string()))?;
        }
        tx.commit().map_err(|e| write_err(e.to_string()))
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        let first_key = keys.first().copied().unwrap_or_default();
        let write_err = |message: String| StorageError::Write {
            key: first_key.to_string(),
            message,
        };
        let conn = self.conn().map_err(|e| write_err(e.to_string()))?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| write_err(e.to_string()))?;
        for key in keys {
            tx.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .map_err(|e| write_err(e.to_string()))?;
        }
        tx.commit().map_err(|e| write_err(e.to_string()))
    }
}

// ── Activity history ─────────────────────────────────────────────────

impl ActivityLog for Database {
    fn append(&self, record: &ActivityRecord) -> Result<AppendOutcome, BackendError> {
        let segments = serde_json::to_string(&record.segments)
            .map_err(|e| BackendError::InsertFailed(e.to_string()))?;
        let conn = self
            .conn()
            .map_err(|e| BackendError::InsertFailed(e.to_string()))?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO activity_log
                    (user_id, activity_type, log_date, note, segments, idempotency_key, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.user_id.0,
                    record.activity_type,
                    record.log_date.format("%Y-%m-%d").to_string(),
                    record.note,
                    segments,
                    record.idempotency_key,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| BackendError::InsertFailed(e.to_string()))?;

        Ok(if inserted == 0 {
            AppendOutcome::Duplicate
        } else {
            AppendOutcome::Inserted
        })
    }

    fn recent(&self, user_id: &UserId, limit: usize) -> Result<Vec<ActivityRecord>, BackendError> {
        let query_err = |e: rusqlite::Error| BackendError::QueryFailed(e.to_string());
        let conn = self
            .conn()
            .map_err(|e| BackendError::QueryFailed(e.to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT user_id, activity_type, log_date, note, segments, idempotency_key
                 FROM activity_log
                 WHERE user_id = ?1
                 ORDER BY log_date DESC, id DESC
                 LIMIT ?2",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![user_id.0, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(query_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (user, activity_type, log_date, note, segments, idempotency_key) =
                row.map_err(query_err)?;
            let log_date = NaiveDate::parse_from_str(&log_date, "%Y-%m-%d")
                .map_err(|e| BackendError::QueryFailed(format!("bad log_date '{log_date}': {e}")))?;
            let segments: Vec<FastSegment> = serde_json::from_str(&segments)
                .map_err(|e| BackendError::QueryFailed(e.to_string()))?;
            records.push(ActivityRecord {
                user_id: UserId(user),
                activity_type,
                log_date,
                note,
                segments,
                idempotency_key,
            });
        }
        Ok(records)
    }

    fn stats(&self, user_id: &UserId) -> Result<FastingStats, BackendError> {
        let records = self.recent(user_id, usize::MAX >> 1)?;
        let mut stats = FastingStats::default();
        for segment in records.iter().flat_map(|r| r.segments.iter()) {
            if !segment.completed {
                continue;
            }
            stats.total_fasts += 1;
            stats.total_fasting_secs += segment.duration_secs;
            stats.longest_fast_secs = stats.longest_fast_secs.max(segment.duration_secs);
            if stats.last_completed_at.map_or(true, |last| segment.end > last) {
                stats.last_completed_at = Some(segment.end);
            }
        }
        Ok(stats)
    }
}

// ── Notification outbox ──────────────────────────────────────────────

impl NotificationScheduler for Database {
    fn schedule(&self, request: &NotificationRequest) -> Result<NotificationId, NotificationError> {
        let id = NotificationId::generate();
        let conn = self
            .conn()
            .map_err(|e| NotificationError::ScheduleFailed(e.to_string()))?;
        conn.execute(
            "INSERT INTO notifications (id, fire_at, title, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.0,
                request.fire_at.to_rfc3339(),
                request.title,
                request.body,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| NotificationError::ScheduleFailed(e.to_string()))?;
        Ok(id)
    }

    fn cancel(&self, id: &NotificationId) -> Result<(), NotificationError> {
        let cancel_err = |message: String| NotificationError::CancelFailed {
            id: id.0.clone(),
            message,
        };
        let conn = self.conn().map_err(|e| cancel_err(e.to_string()))?;
        conn.execute(
            "UPDATE notifications SET cancelled_at = ?2
             WHERE id = ?1 AND cancelled_at IS NULL",
            params![id.0, Utc::now().to_rfc3339()],
        )
        .map_err(|e| cancel_err(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fasting::{FastingLabel, FastingSession};
    use chrono::{Duration, TimeZone};

    fn session(hour: u32) -> FastingSession {
        FastingSession::new(
            FastingLabel::SixteenEight,
            Utc.with_ymd_and_hms(2026, 4, 2, hour, 0, 0).unwrap(),
        )
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.get("test").unwrap().is_none());
        db.set("test", "hello").unwrap();
        assert_eq!(db.get("test").unwrap().unwrap(), "hello");
        db.remove("test").unwrap();
        assert!(db.get("test").unwrap().is_none());
        db.remove("test").unwrap();
    }

    #[test]
    fn append_and_query_history() {
        let db = Database::open_memory().unwrap();
        let user = UserId("user-1".into());
        let record = ActivityRecord::completed_fast(user.clone(), &session(8));

        assert_eq!(db.append(&record).unwrap(), AppendOutcome::Inserted);
        let recent = db.recent(&user, 10).unwrap();
        assert_eq!(recent, vec![record]);
        assert!(db.recent(&UserId("other".into()), 10).unwrap().is_empty());
    }

    #[test]
    fn duplicate_completion_is_ignored() {
        let db = Database::open_memory().unwrap();
        let user = UserId("user-1".into());
        let record = ActivityRecord::completed_fast(user.clone(), &session(8));

        assert_eq!(db.append(&record).unwrap(), AppendOutcome::Inserted);
        assert_eq!(db.append(&record).unwrap(), AppendOutcome::Duplicate);
        assert_eq!(db.recent(&user, 10).unwrap().len(), 1);
    }

    #[test]
    fn stats_sum_completed_segments() {
        let db = Database::open_memory().unwrap();
        let user = UserId("user-1".into());
        db.append(&ActivityRecord::completed_fast(user.clone(), &session(6)))
            .unwrap();
        let omad = FastingSession::new(FastingLabel::Omad, session(7).started_at);
        db.append(&ActivityRecord::completed_fast(user.clone(), &omad))
            .unwrap();

        let stats = db.stats(&user).unwrap();
        assert_eq!(stats.total_fasts, 2);
        assert_eq!(stats.total_fasting_secs, (16 + 23) * 3600);
        assert_eq!(stats.longest_fast_secs, 23 * 3600);
        assert_eq!(stats.last_completed_at, Some(omad.ends_at()));
    }

    #[test]
    fn schedule_and_cancel_notification() {
        let db = Database::open_memory().unwrap();
        let fire_at = Utc::now() + Duration::hours(16);
        let id = db
            .schedule(&NotificationRequest {
                fire_at,
                title: "Fast complete".into(),
                body: "Your 16:8 fast is complete.".into(),
            })
            .unwrap();

        let pending = db.pending_notifications().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);

        db.cancel(&id).unwrap();
        assert!(db.pending_notifications().unwrap().is_empty());
        // Double cancellation and unknown ids are tolerated.
        db.cancel(&id).unwrap();
        db.cancel(&NotificationId("missing".into())).unwrap();
    }

    #[test]
    fn open_at_persists_across_handles() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fastwell.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.set("fasting.label", "18:6").unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.get("fasting.label").unwrap().as_deref(), Some("18:6"));
    }
}
