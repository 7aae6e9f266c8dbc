//! cliptrail - clipboard history capture and recall
//!
//! Watches the system clipboard, records every copy into a searchable SQLite
//! history and puts past entries back on the clipboard on request.

pub mod clipboard_history;
pub mod config;
pub mod error;
pub mod hotkeys;
pub mod logging;
