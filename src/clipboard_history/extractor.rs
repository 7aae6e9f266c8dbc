//! Content extraction and classification
//!
//! Turns one clipboard snapshot into at most one [`NewEntry`]. Formats are
//! tried in priority order and the first one that yields content wins:
//! file list, rich text, plain text, image.

use tracing::debug;

use super::html_envelope::extract_fragment;
use super::text::{is_url, strip_html};
use super::types::{CapturedImage, ContentType, NewEntry};

/// A single clipboard snapshot with one lazy reader per format.
///
/// Every reader returns `None` when the format is absent, the clipboard is
/// locked, or the payload cannot be decoded.
pub trait ClipboardFormats {
    fn file_list(&mut self) -> Option<Vec<String>>;
    /// Raw rich-text envelope bytes.
    fn html(&mut self) -> Option<Vec<u8>>;
    fn unicode_text(&mut self) -> Option<String>;
    fn image(&mut self) -> Option<CapturedImage>;
}

/// Read the snapshot in priority order and classify the first match.
pub fn extract<F: ClipboardFormats + ?Sized>(formats: &mut F) -> Option<NewEntry> {
    if let Some(entry) = formats.file_list().and_then(|paths| from_file_list(&paths)) {
        return Some(entry);
    }

    if let Some(raw) = formats.html() {
        if let Some(entry) = from_html(&raw, formats) {
            return Some(entry);
        }
    }

    if let Some(entry) = formats.unicode_text().and_then(from_text) {
        return Some(entry);
    }

    formats.image().map(NewEntry::image)
}

fn from_file_list(paths: &[String]) -> Option<NewEntry> {
    if paths.is_empty() {
        return None;
    }
    Some(NewEntry::file_list(paths))
}

/// Plain text: whitespace-only content is not an entry.
pub fn from_text(text: String) -> Option<NewEntry> {
    if text.trim().is_empty() {
        return None;
    }
    let content_type = if is_url(&text) {
        ContentType::Url
    } else {
        ContentType::Text
    };
    Some(NewEntry::text(text, content_type))
}

fn from_html<F: ClipboardFormats + ?Sized>(raw: &[u8], formats: &mut F) -> Option<NewEntry> {
    let envelope = String::from_utf8_lossy(raw);
    let envelope = envelope.trim_end_matches('\0');
    if envelope.is_empty() {
        return None;
    }

    let fragment = extract_fragment(envelope.as_bytes()).filter(|f| !f.is_empty());
    let stripped = match &fragment {
        Some(fragment) => strip_html(fragment),
        None => {
            debug!("Rich-text envelope has no usable fragment offsets, stripping whole buffer");
            strip_html(envelope)
        }
    };

    // The plain-text shadow copy is usually more faithful than stripped markup.
    let plain_text = formats
        .unicode_text()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(stripped);

    let html = fragment.unwrap_or_else(|| envelope.to_string());
    Some(NewEntry::html(envelope, html, plain_text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard_history::html_envelope::build_envelope;
    use crate::clipboard_history::text::compute_hash;

    /// In-memory snapshot that records which readers were called.
    #[derive(Default)]
    struct FakeSnapshot {
        files: Option<Vec<String>>,
        html: Option<Vec<u8>>,
        text: Option<String>,
        image: Option<CapturedImage>,
        reads: Vec<&'static str>,
    }

    impl ClipboardFormats for FakeSnapshot {
        fn file_list(&mut self) -> Option<Vec<String>> {
            self.reads.push("files");
            self.files.clone()
        }
        fn html(&mut self) -> Option<Vec<u8>> {
            self.reads.push("html");
            self.html.clone()
        }
        fn unicode_text(&mut self) -> Option<String> {
            self.reads.push("text");
            self.text.clone()
        }
        fn image(&mut self) -> Option<CapturedImage> {
            self.reads.push("image");
            self.image.clone()
        }
    }

    #[test]
    fn test_file_list_beats_text() {
        let mut snap = FakeSnapshot {
            files: Some(vec!["C:\\docs\\a.txt".into(), "C:\\docs\\b.txt".into()]),
            text: Some("C:\\docs\\a.txt".into()),
            ..Default::default()
        };
        let entry = extract(&mut snap).unwrap();
        assert_eq!(entry.content_type(), ContentType::FilePath);
        assert_eq!(entry.content_text(), Some("C:\\docs\\a.txt\nC:\\docs\\b.txt"));
        assert_eq!(snap.reads, vec!["files"]);
    }

    #[test]
    fn test_empty_file_list_falls_through() {
        let mut snap = FakeSnapshot {
            files: Some(vec![]),
            text: Some("hello".into()),
            ..Default::default()
        };
        let entry = extract(&mut snap).unwrap();
        assert_eq!(entry.content_type(), ContentType::Text);
    }

    #[test]
    fn test_html_prefers_shadow_text() {
        let envelope = build_envelope("<b>Hello</b> <i>there</i>");
        let mut snap = FakeSnapshot {
            html: Some(envelope.clone().into_bytes()),
            text: Some("Hello there!".into()),
            ..Default::default()
        };
        let entry = extract(&mut snap).unwrap();
        assert_eq!(entry.content_type(), ContentType::Html);
        assert_eq!(entry.content_html(), Some("<b>Hello</b> <i>there</i>"));
        assert_eq!(entry.content_text(), Some("Hello there!"));
        assert_eq!(entry.content_hash(), compute_hash(envelope.as_bytes()));
        assert_eq!(entry.content_size(), envelope.len() as u64);
    }

    #[test]
    fn test_html_without_shadow_uses_stripped_fragment() {
        let envelope = build_envelope("<p>Tom &amp; Jerry</p>");
        let mut snap = FakeSnapshot {
            html: Some(envelope.into_bytes()),
            ..Default::default()
        };
        let entry = extract(&mut snap).unwrap();
        assert_eq!(entry.content_text(), Some("Tom & Jerry"));
        assert_eq!(entry.content_preview(), "Tom & Jerry");
    }

    #[test]
    fn test_malformed_envelope_strips_whole_buffer() {
        let mut snap = FakeSnapshot {
            html: Some(b"<div>No <b>header</b></div>".to_vec()),
            ..Default::default()
        };
        let entry = extract(&mut snap).unwrap();
        assert_eq!(entry.content_type(), ContentType::Html);
        assert_eq!(entry.content_text(), Some("No header"));
        assert_eq!(entry.content_html(), Some("<div>No <b>header</b></div>"));
    }

    #[test]
    fn test_url_classification() {
        let mut snap = FakeSnapshot {
            text: Some("  https://example.com/a?b=c \n".into()),
            ..Default::default()
        };
        let entry = extract(&mut snap).unwrap();
        assert_eq!(entry.content_type(), ContentType::Url);
        assert_eq!(entry.content_text(), Some("  https://example.com/a?b=c \n"));
    }

    #[test]
    fn test_whitespace_text_is_not_an_entry() {
        let mut snap = FakeSnapshot {
            text: Some(" \r\n\t ".into()),
            ..Default::default()
        };
        assert!(extract(&mut snap).is_none());
        assert_eq!(snap.reads, vec!["files", "html", "text", "image"]);
    }

    #[test]
    fn test_image_is_last_resort() {
        let image = CapturedImage::new(1, 1, vec![255, 0, 0, 255]).unwrap();
        let mut snap = FakeSnapshot {
            image: Some(image),
            ..Default::default()
        };
        let entry = extract(&mut snap).unwrap();
        assert_eq!(entry.content_type(), ContentType::Image);
        assert!(entry.image.is_some());
    }

    #[test]
    fn test_empty_snapshot() {
        let mut snap = FakeSnapshot::default();
        assert!(extract(&mut snap).is_none());
    }
}
