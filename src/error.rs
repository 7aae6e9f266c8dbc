use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, warn};

/// Errors surfaced by the history store, blob store and startup paths.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Clipboard entry not found: {0}")]
    NotFound(i64),

    #[error("Clipboard unavailable: {0}")]
    Clipboard(String),

    #[error("Could not create data directory '{}': {source}", path.display())]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl HistoryError {
    /// True for failures caused by another writer holding the database lock
    /// after the busy window ran out. The operation may succeed if repeated later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            Self::Pool(_) => true,
            _ => false,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(id) => format!("No clipboard entry with id {}", id),
            err if err.is_transient() => {
                "The history database is busy, please try again".to_string()
            }
            Self::DataDir { path, .. } => {
                format!("Could not create data directory {}", path.display())
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HistoryError>;

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and the caller carries on without the value.
///
/// # Examples
///
/// ```ignore
/// use cliptrail::error::ResultExt;
///
/// // Count eviction failed, keep going with age eviction
/// let evicted = store.delete_oldest(max).warn_on_err().unwrap_or(0);
/// ```
pub trait ResultExt<T> {
    /// Log error with caller location and return None. Use for recoverable failures.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}
