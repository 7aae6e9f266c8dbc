//! Clipboard change detection
//!
//! Platform change counters let the monitor poll cheaply without reading
//! clipboard payloads: `NSPasteboard.changeCount` on macOS and
//! `GetClipboardSequenceNumber` on Windows. Other platforms return `None` and
//! the backend falls back to a content signature.

#[cfg(target_os = "macos")]
use objc::sel;
#[cfg(target_os = "macos")]
use objc::sel_impl;

use tracing::trace;

/// Current OS clipboard change counter.
#[cfg(target_os = "macos")]
pub fn os_change_count() -> Option<u64> {
    use cocoa::appkit::NSPasteboard;
    use cocoa::base::nil;
    use objc::runtime::Object;

    // SAFETY: generalPasteboard and changeCount are plain AppKit getters.
    unsafe {
        let pasteboard: *mut Object = NSPasteboard::generalPasteboard(nil);
        if pasteboard.is_null() {
            return None;
        }
        // changeCount is an NSInteger (i64 on 64-bit)
        let change_count: i64 = objc::msg_send![pasteboard, changeCount];
        Some(change_count as u64)
    }
}

#[cfg(windows)]
pub fn os_change_count() -> Option<u64> {
    clipboard_win::raw::seq_num().map(|n| u64::from(n.get()))
}

#[cfg(not(any(target_os = "macos", windows)))]
pub fn os_change_count() -> Option<u64> {
    None
}

/// Turns a stream of change tokens into change notifications.
///
/// The first token observed is a baseline: whatever was on the clipboard
/// before monitoring started is not a new copy.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last_token: Option<u64>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self { last_token: None }
    }

    /// Record `token` and report whether it differs from the previous one.
    pub fn observe(&mut self, token: u64) -> bool {
        let changed = matches!(self.last_token, Some(last) if last != token);
        if changed {
            trace!(old = ?self.last_token, new = token, "Clipboard change detected");
        }
        self.last_token = Some(token);
        changed
    }

    #[cfg(test)]
    pub fn last_token(&self) -> Option<u64> {
        self.last_token
    }
}
