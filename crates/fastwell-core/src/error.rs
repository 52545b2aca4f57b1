//! Core error types for fastwell-core.
//!
//! Each service seam has its own error enum so implementations can report
//! failures precisely; `CoreError` wraps them for callers that do not care
//! which seam failed.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for fastwell-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Device key-value storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Local notification service errors
    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    /// Backend (auth / activity log) errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key-value storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read '{key}': {message}")]
    Read { key: String, message: String },

    #[error("Failed to write '{key}': {message}")]
    Write { key: String, message: String },

    /// The underlying store can no longer be used (poisoned lock, closed handle).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Local notification service errors.
#[derive(Error, Debug)]
pub enum NotificationError {
    /// The user has not granted notification permission.
    #[error("Notification permission denied")]
    PermissionDenied,

    #[error("Failed to schedule notification: {0}")]
    ScheduleFailed(String),

    #[error("Failed to cancel notification {id}: {message}")]
    CancelFailed { id: String, message: String },
}

/// Backend auth / activity log errors.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Activity log insert failed: {0}")]
    InsertFailed(String),

    #[error("Activity log query failed: {0}")]
    QueryFailed(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Unknown fasting protocol label
    #[error("Unknown fasting protocol '{0}'")]
    UnknownLabel(String),

    /// A fast is already running; only one slot exists.
    #[error("A {label} fast is already active (started {started_at})")]
    FastAlreadyActive {
        label: String,
        started_at: chrono::DateTime<chrono::Utc>,
    },
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
