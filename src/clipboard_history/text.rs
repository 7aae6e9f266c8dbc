//! Fingerprinting and text normalization helpers.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

/// Maximum preview length in characters, ellipsis included.
pub const PREVIEW_MAX_CHARS: usize = 200;
const ELLIPSIS: &str = "...";

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,6});").expect("valid regex")
});
static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://\S+|www\.\S+|ftp://\S+)$").expect("valid regex")
});

/// SHA-256 of `bytes`, lowercase hex.
pub fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Single-line preview: line breaks become spaces, the result is trimmed and
/// capped at [`PREVIEW_MAX_CHARS`] characters with a trailing `...`.
///
/// Idempotent: `truncate(&truncate(s)) == truncate(s)`.
pub fn truncate(text: &str) -> String {
    let single_line = text.replace("\r\n", " ").replace(['\r', '\n'], " ");
    let trimmed = single_line.trim();

    if trimmed.chars().count() <= PREVIEW_MAX_CHARS {
        return trimmed.to_string();
    }

    let keep = PREVIEW_MAX_CHARS - ELLIPSIS.len();
    let mut out: String = trimmed.chars().take(keep).collect();
    // Trailing whitespace before the ellipsis would not survive a second trim pass.
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    out.push_str(ELLIPSIS);
    out
}

/// Remove markup tags, decode entities and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let without_tags = TAG_RE.replace_all(html, "");
    let decoded = decode_entities(&without_tags);
    WHITESPACE_RE.replace_all(&decoded, " ").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body.strip_prefix("#x").or(body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match body {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    _ => None,
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// True if the trimmed text is a single URL (`http(s)://`, `www.`, `ftp://`).
pub fn is_url(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && URL_RE.is_match(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash_deterministic() {
        let a = compute_hash(b"clipboard");
        let b = compute_hash(b"clipboard");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64, "SHA-256 hash should be 64 hex chars");
    }

    #[test]
    fn test_compute_hash_single_bit_change() {
        let original = b"clipboard".to_vec();
        let mut flipped = original.clone();
        flipped[0] ^= 0b0000_0001;
        assert_ne!(compute_hash(&original), compute_hash(&flipped));
    }

    #[test]
    fn test_truncate_collapses_line_breaks() {
        assert_eq!(truncate("  one\r\ntwo\nthree\r "), "one two three");
    }

    #[test]
    fn test_truncate_caps_length_with_ellipsis() {
        let long = "x".repeat(500);
        let out = truncate(&long);
        assert_eq!(out.chars().count(), PREVIEW_MAX_CHARS);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_truncate_is_idempotent() {
        let samples = [
            String::new(),
            "short".to_string(),
            "a".repeat(199),
            "a".repeat(200),
            "b".repeat(201),
            format!("{}{}", "c".repeat(196), " tail that is cut off"),
            "line\n".repeat(80),
            "שלום ".repeat(60),
            "....".repeat(70),
        ];
        for s in samples {
            let once = truncate(&s);
            assert_eq!(truncate(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        let hebrew = "א".repeat(150);
        assert_eq!(truncate(&hebrew), hebrew);
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(
            strip_html("<p>Hello&nbsp;<b>world</b> &amp; friends</p>\n<br/>"),
            "Hello world & friends"
        );
        assert_eq!(strip_html("&#65;&#x42;&unknown;"), "AB&unknown;");
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/path?q=1"));
        assert!(is_url("  HTTP://EXAMPLE.COM  "));
        assert!(is_url("www.example.com"));
        assert!(is_url("ftp://files.example.com"));
        assert!(!is_url("https://example.com and more"));
        assert!(!is_url("example.com"));
        assert!(!is_url("   "));
    }
}
