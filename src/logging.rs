//! Structured JSONL logging to a file and human-readable stderr output.
//!
//! - **JSONL to file** (`<data_dir>/logs/cliptrail.jsonl`) - one JSON object per line
//! - **Compact to stderr** - for whoever is watching the terminal
//!
//! # Usage
//!
//! ```rust,ignore
//! // MUST keep the guard alive for the duration of the program
//! let _guard = cliptrail::logging::init(&data_dir.join("logs"));
//!
//! tracing::info!(entry_id = 42, "Stored clipboard entry");
//! ```

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

pub const LOG_FILE_NAME: &str = "cliptrail.jsonl";

/// Guard that must be kept alive for the duration of the program.
/// Dropping this guard will flush and close the log file.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
    log_path: Option<PathBuf>,
}

impl LoggingGuard {
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }
}

/// Compact layer for stderr
fn stderr_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .compact()
}

/// Initialize the dual-output logging system.
///
/// If the log file cannot be opened, logging continues on stderr only.
pub fn init(log_dir: &Path) -> LoggingGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file = fs::create_dir_all(log_dir).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(LOG_FILE_NAME))
    });

    match file {
        Ok(file) => {
            let log_path = log_dir.join(LOG_FILE_NAME);
            let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file);

            let json_layer = fmt::layer()
                .json()
                .with_writer(non_blocking_file)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_target(true)
                .with_level(true)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false)
                .with_span_events(FmtSpan::NONE);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .with(stderr_layer())
                .init();

            tracing::info!(
                event_type = "app_lifecycle",
                action = "started",
                log_path = %log_path.display(),
                "Logging initialized"
            );

            LoggingGuard {
                _file_guard: Some(file_guard),
                log_path: Some(log_path),
            }
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer())
                .init();

            tracing::warn!(
                error = %e,
                log_dir = %log_dir.display(),
                "Failed to open log file, logging to stderr only"
            );

            LoggingGuard {
                _file_guard: None,
                log_path: None,
            }
        }
    }
}

/// Truncate a string for log output, respecting char boundaries.
pub fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_len).collect();
    format!("{}...({} chars)", truncated, s.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string_unchanged() {
        assert_eq!(truncate_for_log("hello", 10), "hello");
    }

    // Installs the global subscriber; keep this the only test that calls init.
    #[test]
    fn test_init_writes_jsonl_file() {
        let dir = tempfile::tempdir().unwrap();
        let guard = init(dir.path());
        let log_path = guard.log_path().unwrap().to_path_buf();
        assert_eq!(log_path, dir.path().join(LOG_FILE_NAME));

        tracing::info!(entry_id = 7, "Stored clipboard entry");
        drop(guard);

        let contents = fs::read_to_string(&log_path).unwrap();
        let line = contents
            .lines()
            .find(|l| l.contains("Stored clipboard entry"))
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(json["fields"]["entry_id"], 7);
        assert_eq!(json["level"], "INFO");
    }

    #[test]
    fn test_truncate_for_log_multibyte() {
        let s = "שלום עולם";
        let out = truncate_for_log(s, 4);
        assert!(out.starts_with("שלום..."));
        assert!(out.ends_with("(9 chars)"));
    }
}
