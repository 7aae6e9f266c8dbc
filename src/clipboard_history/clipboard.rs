//! System clipboard access
//!
//! [`SystemClipboard`] reads snapshots for the extractor and writes stored
//! entries back. On Windows the raw "HTML Format" envelope, file drops and the
//! raw bitmap go through `clipboard-win`; everything else uses `arboard`.

use std::hash::{Hash, Hasher};
#[cfg(windows)]
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::blob_store::BlobStore;
use super::change_detection::os_change_count;
use super::extractor::ClipboardFormats;
use super::image::from_arboard;
#[cfg(not(windows))]
use super::image::to_arboard;
use super::types::{CapturedImage, ClipboardEntry, ContentType};
use crate::error::{HistoryError, Result};

/// Everything the capture loop and paste-back need from a clipboard.
pub trait ClipboardBackend: ClipboardFormats {
    /// Token that changes whenever the clipboard content changes.
    fn change_token(&mut self) -> Option<u64>;
    fn write_text(&mut self, text: &str) -> Result<()>;
    /// Rich text plus its plain-text shadow copy.
    fn write_html(&mut self, fragment: &str, plain_text: &str) -> Result<()>;
    fn write_image(&mut self, image: &CapturedImage) -> Result<()>;
}

fn clipboard_err(e: impl std::fmt::Display) -> HistoryError {
    HistoryError::Clipboard(e.to_string())
}

/// Lazily registered id of the "HTML Format" clipboard format.
#[cfg(windows)]
fn html_format_id() -> Option<u32> {
    static HTML_FORMAT: OnceLock<Option<u32>> = OnceLock::new();
    *HTML_FORMAT.get_or_init(|| {
        let id = clipboard_win::raw::register_format("HTML Format").map(|id| id.get());
        debug!(?id, "Registered HTML clipboard format");
        id
    })
}

pub struct SystemClipboard {
    clipboard: arboard::Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self> {
        let clipboard = arboard::Clipboard::new().map_err(clipboard_err)?;
        Ok(Self { clipboard })
    }

    /// Fallback token where the OS has no change counter: a hash over the
    /// cheap text formats, or over the pixels when there is no text.
    fn content_signature(&mut self) -> Option<u64> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        let text = self.clipboard.get_text().ok();
        let html = self.clipboard.get().html().ok();
        let files = self.clipboard.get().file_list().ok();
        if text.is_none() && html.is_none() && files.is_none() {
            let image = self.clipboard.get_image().ok()?;
            image.width.hash(&mut hasher);
            image.bytes.hash(&mut hasher);
        } else {
            text.hash(&mut hasher);
            html.hash(&mut hasher);
            files.hash(&mut hasher);
        }
        Some(hasher.finish())
    }
}

impl ClipboardFormats for SystemClipboard {
    #[cfg(windows)]
    fn file_list(&mut self) -> Option<Vec<String>> {
        use clipboard_win::{formats, get_clipboard};
        let files: Vec<String> = get_clipboard(formats::FileList).ok()?;
        Some(files)
    }

    #[cfg(not(windows))]
    fn file_list(&mut self) -> Option<Vec<String>> {
        let paths = self.clipboard.get().file_list().ok()?;
        Some(
            paths
                .into_iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
        )
    }

    #[cfg(windows)]
    fn html(&mut self) -> Option<Vec<u8>> {
        use clipboard_win::{formats, get_clipboard};
        let id = html_format_id()?;
        let raw: Vec<u8> = get_clipboard(formats::RawData(id)).ok()?;
        Some(raw)
    }

    /// Other platforms expose the markup without an envelope; the extractor
    /// handles that as a header-less buffer.
    #[cfg(not(windows))]
    fn html(&mut self) -> Option<Vec<u8>> {
        self.clipboard.get().html().ok().map(String::into_bytes)
    }

    fn unicode_text(&mut self) -> Option<String> {
        self.clipboard.get_text().ok()
    }

    fn image(&mut self) -> Option<CapturedImage> {
        match self.clipboard.get_image() {
            Ok(data) => from_arboard(data),
            Err(arboard::Error::ContentNotAvailable) => None,
            Err(e) => {
                debug!(error = %e, "Clipboard image unreadable");
                None
            }
        }
    }
}

impl ClipboardBackend for SystemClipboard {
    fn change_token(&mut self) -> Option<u64> {
        os_change_count().or_else(|| self.content_signature())
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        self.clipboard.set_text(text).map_err(clipboard_err)
    }

    #[cfg(windows)]
    fn write_html(&mut self, fragment: &str, plain_text: &str) -> Result<()> {
        use super::html_envelope::build_envelope;
        use clipboard_win::{raw, Clipboard};
        use winapi::um::winuser::CF_UNICODETEXT;

        let id = html_format_id().ok_or_else(|| clipboard_err("HTML format not registered"))?;
        let envelope = build_envelope(fragment);
        let utf16: Vec<u8> = plain_text
            .encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(u16::to_le_bytes)
            .collect();

        let _open = Clipboard::new_attempts(10).map_err(clipboard_err)?;
        raw::empty().map_err(clipboard_err)?;
        raw::set_without_clear(id, envelope.as_bytes()).map_err(clipboard_err)?;
        if !plain_text.is_empty() {
            raw::set_without_clear(CF_UNICODETEXT, &utf16).map_err(clipboard_err)?;
        }
        Ok(())
    }

    #[cfg(not(windows))]
    fn write_html(&mut self, fragment: &str, plain_text: &str) -> Result<()> {
        let alt = (!plain_text.is_empty()).then_some(plain_text);
        self.clipboard
            .set_html(fragment, alt)
            .map_err(clipboard_err)
    }

    #[cfg(windows)]
    fn write_image(&mut self, image: &CapturedImage) -> Result<()> {
        use super::image::encode_dib;
        use clipboard_win::{formats, set_clipboard};
        use winapi::um::winuser::CF_DIB;

        let dib = encode_dib(image)?;
        set_clipboard(formats::RawData(CF_DIB), &dib).map_err(clipboard_err)
    }

    #[cfg(not(windows))]
    fn write_image(&mut self, image: &CapturedImage) -> Result<()> {
        self.clipboard
            .set_image(to_arboard(image))
            .map_err(clipboard_err)
    }
}

/// Put a stored entry back on the clipboard in its richest form.
pub fn write_entry(
    backend: &mut dyn ClipboardBackend,
    entry: &ClipboardEntry,
    blobs: &BlobStore,
) -> Result<()> {
    match entry.content_type {
        ContentType::Text | ContentType::Url | ContentType::FilePath => {
            backend.write_text(entry.content_text.as_deref().unwrap_or_default())
        }
        ContentType::Html => {
            let plain = entry.content_text.as_deref().unwrap_or_default();
            match entry.content_html.as_deref() {
                Some(fragment) => backend.write_html(fragment, plain),
                None => backend.write_text(plain),
            }
        }
        ContentType::Image => {
            let path = entry
                .image_path
                .as_deref()
                .ok_or_else(|| clipboard_err(format!("entry {} has no image path", entry.id)))?;
            let image = blobs.load(path).ok_or_else(|| {
                warn!(id = entry.id, path, "Image blob missing for paste");
                clipboard_err(format!("image blob {path} is missing"))
            })?;
            backend.write_image(&image)
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory clipboard shared between a test and the code under test.

    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Written {
        Text(String),
        Html { fragment: String, plain: String },
        Image(CapturedImage),
    }

    #[derive(Debug, Default)]
    pub struct FakeState {
        pub token: u64,
        pub files: Option<Vec<String>>,
        pub html: Option<Vec<u8>>,
        pub text: Option<String>,
        pub image: Option<CapturedImage>,
        pub written: Vec<Written>,
    }

    impl FakeState {
        /// Replace the content with plain text and bump the change token.
        pub fn copy_text(&mut self, text: &str) {
            self.files = None;
            self.html = None;
            self.image = None;
            self.text = Some(text.to_string());
            self.token += 1;
        }
    }

    #[derive(Debug, Clone, Default)]
    pub struct FakeClipboard {
        pub state: Arc<Mutex<FakeState>>,
    }

    impl ClipboardFormats for FakeClipboard {
        fn file_list(&mut self) -> Option<Vec<String>> {
            self.state.lock().files.clone()
        }
        fn html(&mut self) -> Option<Vec<u8>> {
            self.state.lock().html.clone()
        }
        fn unicode_text(&mut self) -> Option<String> {
            self.state.lock().text.clone()
        }
        fn image(&mut self) -> Option<CapturedImage> {
            self.state.lock().image.clone()
        }
    }

    impl ClipboardBackend for FakeClipboard {
        fn change_token(&mut self) -> Option<u64> {
            Some(self.state.lock().token)
        }
        fn write_text(&mut self, text: &str) -> Result<()> {
            let mut state = self.state.lock();
            state.written.push(Written::Text(text.to_string()));
            state.copy_text(text);
            Ok(())
        }
        fn write_html(&mut self, fragment: &str, plain_text: &str) -> Result<()> {
            let mut state = self.state.lock();
            state.written.push(Written::Html {
                fragment: fragment.to_string(),
                plain: plain_text.to_string(),
            });
            state.token += 1;
            Ok(())
        }
        fn write_image(&mut self, image: &CapturedImage) -> Result<()> {
            let mut state = self.state.lock();
            state.written.push(Written::Image(image.clone()));
            state.token += 1;
            Ok(())
        }
    }
}
