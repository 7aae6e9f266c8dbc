//! Clipboard History Module
//!
//! Captures every clipboard change into a SQLite history and recalls entries
//! back onto the clipboard.
//!
//! ## Features
//! - File list, rich text, plain text, URL and image capture
//! - Full-text search over text, preview and source window title
//! - Consecutive-duplicate suppression and per-app blacklist
//! - Count and age retention that never touches pinned entries
//! - Images stored as PNG files outside the database
//!
//! ## Module Structure
//! - `types`: Core types (ContentType, NewEntry, ClipboardEntry)
//! - `text`: Fingerprints, previews, markup stripping, URL detection
//! - `html_envelope`: Rich-text clipboard envelope build/parse
//! - `extractor`: Format priority and classification
//! - `image`: Pixel conversions and PNG/DIB encoding
//! - `blob_store`: Image files under the data dir
//! - `database`: SQLite store with FTS5 index
//! - `change_detection`: OS clipboard change counters
//! - `clipboard`: System clipboard reads and writes
//! - `source_app`: Foreground app/window lookup
//! - `monitor`: Capture pipeline and monitor thread
//! - `retention`: Periodic cleanup
//! - `recall`: Service used by the presentation layer

mod blob_store;
mod change_detection;
mod clipboard;
mod database;
mod extractor;
mod html_envelope;
mod image;
mod monitor;
mod recall;
mod retention;
mod source_app;
mod text;
mod types;

// Types
pub use types::{CapturedImage, ClipboardEntry, ContentType, NewEntry, SourceInfo};

// Utilities
pub use html_envelope::{build_envelope, extract_fragment};
pub use text::{compute_hash, is_url, strip_html, truncate};

// Extraction
pub use extractor::{extract, ClipboardFormats};

// Storage
pub use blob_store::BlobStore;
pub use database::{HistoryStore, SearchQuery, DB_FILE_NAME};

// Clipboard access
pub use clipboard::{write_entry, ClipboardBackend, SystemClipboard};
pub use source_app::{ForegroundResolver, SourceResolver};

// Monitor/Retention
pub use change_detection::ChangeDetector;
pub use monitor::{
    CaptureMonitor, CaptureOutcome, CapturePipeline, HotkeySetup, MonitorControl, POLL_INTERVAL,
};
pub use retention::{run_cycle, CleanupReport, RetentionManager};

// Recall
pub use recall::{History, HistoryStats};
