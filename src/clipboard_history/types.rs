//! Core clipboard history types

use serde::{Deserialize, Serialize};
use std::fmt;

use super::text::{compute_hash, truncate};

/// Classification of a captured clipboard payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Html,
    Image,
    FilePath,
    Url,
}

impl ContentType {
    pub const ALL: [ContentType; 5] = [
        ContentType::Text,
        ContentType::Html,
        ContentType::Image,
        ContentType::FilePath,
        ContentType::Url,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Html => "html",
            ContentType::Image => "image",
            ContentType::FilePath => "file_path",
            ContentType::Url => "url",
        }
    }

    /// Parse the stored column value. Unknown values read back as `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ContentType::Text),
            "html" => Some(ContentType::Html),
            "image" => Some(ContentType::Image),
            "file_path" => Some(ContentType::FilePath),
            "url" => Some(ContentType::Url),
            _ => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded raster image as it came off the clipboard: tightly packed RGBA8.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

impl CapturedImage {
    /// Returns `None` if the buffer length does not match `width * height * 4`.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        if width == 0 || height == 0 || rgba.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            rgba,
        })
    }
}

/// Best-effort provenance of a capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceInfo {
    pub app: Option<String>,
    pub window: Option<String>,
}

/// A capture that has not been persisted yet.
///
/// Only constructible through the per-type constructors, which populate
/// exactly the fields relevant to the content type.
#[derive(Debug, Clone)]
pub struct NewEntry {
    content_type: ContentType,
    content_text: Option<String>,
    content_html: Option<String>,
    content_preview: String,
    image_width: Option<u32>,
    image_height: Option<u32>,
    content_hash: String,
    content_size: u64,
    pub image_path: Option<String>,
    pub source_app: Option<String>,
    pub source_window: Option<String>,
    pub created_at: i64,
    /// Decoded pixels, held until the blob store writes them out.
    pub image: Option<CapturedImage>,
}

impl NewEntry {
    fn base(content_type: ContentType, content_hash: String, content_size: u64) -> Self {
        Self {
            content_type,
            content_text: None,
            content_html: None,
            content_preview: String::new(),
            image_width: None,
            image_height: None,
            content_hash,
            content_size,
            image_path: None,
            source_app: None,
            source_window: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            image: None,
        }
    }

    /// Plain text or URL content. The hash covers the stored text.
    pub fn text(text: String, content_type: ContentType) -> Self {
        debug_assert!(matches!(content_type, ContentType::Text | ContentType::Url));
        let mut entry = Self::base(content_type, compute_hash(text.as_bytes()), text.len() as u64);
        entry.content_preview = truncate(&text);
        entry.content_text = Some(text);
        entry
    }

    /// File drop, paths joined with newlines.
    pub fn file_list<S: AsRef<str>>(paths: &[S]) -> Self {
        let joined = paths
            .iter()
            .map(|p| p.as_ref())
            .collect::<Vec<_>>()
            .join("\n");
        let mut entry = Self::base(
            ContentType::FilePath,
            compute_hash(joined.as_bytes()),
            joined.len() as u64,
        );
        entry.content_preview = truncate(&joined);
        entry.content_text = Some(joined);
        entry
    }

    /// Rich text. `envelope` is the full clipboard payload the hash and size
    /// are computed over; `fragment` is the markup stored for paste-back.
    pub fn html(envelope: &str, fragment: String, plain_text: String) -> Self {
        let mut entry = Self::base(
            ContentType::Html,
            compute_hash(envelope.as_bytes()),
            envelope.len() as u64,
        );
        entry.content_preview = truncate(&plain_text);
        entry.content_text = Some(plain_text);
        entry.content_html = Some(fragment);
        entry
    }

    /// Raster image. The hash covers the raw pixel buffer.
    pub fn image(image: CapturedImage) -> Self {
        let mut entry = Self::base(
            ContentType::Image,
            compute_hash(&image.rgba),
            image.rgba.len() as u64,
        );
        entry.content_preview = format!("[Image {}×{}]", image.width, image.height);
        entry.image_width = Some(image.width);
        entry.image_height = Some(image.height);
        entry.image = Some(image);
        entry
    }

    pub fn with_source(mut self, source: SourceInfo) -> Self {
        self.source_app = source.app;
        self.source_window = source.window;
        self
    }

    pub fn with_created_at(mut self, created_at_ms: i64) -> Self {
        self.created_at = created_at_ms;
        self
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }
    pub fn content_text(&self) -> Option<&str> {
        self.content_text.as_deref()
    }
    pub fn content_html(&self) -> Option<&str> {
        self.content_html.as_deref()
    }
    pub fn content_preview(&self) -> &str {
        &self.content_preview
    }
    pub fn image_width(&self) -> Option<u32> {
        self.image_width
    }
    pub fn image_height(&self) -> Option<u32> {
        self.image_height
    }
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }
    pub fn content_size(&self) -> u64 {
        self.content_size
    }
}

/// A persisted history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipboardEntry {
    pub id: i64,
    pub content_type: ContentType,
    pub content_text: Option<String>,
    pub content_html: Option<String>,
    pub content_preview: String,
    pub image_path: Option<String>,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
    pub content_hash: String,
    pub content_size: u64,
    pub source_app: Option<String>,
    pub source_window: Option<String>,
    pub is_pinned: bool,
    pub is_favorite: bool,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
    pub last_used_at: Option<i64>,
}
