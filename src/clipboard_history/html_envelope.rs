//! Rich-text clipboard envelope ("HTML Format")
//!
//! The payload is an ASCII header of `Name:value` lines followed by a markup
//! document. `StartFragment`/`EndFragment` are byte offsets into the encoded
//! buffer, so slicing must happen on bytes before decoding.

const HEADER_VERSION: &str = "Version:0.9\r\n";
const FRAGMENT_PREFIX: &str = "<html><body>\r\n<!--StartFragment-->";
const FRAGMENT_SUFFIX: &str = "<!--EndFragment-->\r\n</body></html>";
const START_FRAGMENT_KEY: &[u8] = b"StartFragment:";
const END_FRAGMENT_KEY: &[u8] = b"EndFragment:";

fn header(start_html: usize, end_html: usize, start_fragment: usize, end_fragment: usize) -> String {
    format!(
        "{HEADER_VERSION}StartHTML:{start_html:010}\r\nEndHTML:{end_html:010}\r\nStartFragment:{start_fragment:010}\r\nEndFragment:{end_fragment:010}\r\n"
    )
}

/// Wrap `fragment` in a complete envelope with correct byte offsets.
pub fn build_envelope(fragment: &str) -> String {
    // Offsets are zero-padded to a fixed width, so the header length is constant.
    let start_html = header(0, 0, 0, 0).len();
    let start_fragment = start_html + FRAGMENT_PREFIX.len();
    let end_fragment = start_fragment + fragment.len();
    let end_html = end_fragment + FRAGMENT_SUFFIX.len();

    let mut out = header(start_html, end_html, start_fragment, end_fragment);
    out.reserve(end_html - start_html);
    out.push_str(FRAGMENT_PREFIX);
    out.push_str(fragment);
    out.push_str(FRAGMENT_SUFFIX);
    out
}

/// Read the decimal value following `key`, terminated by CR or LF.
fn header_offset(raw: &[u8], key: &[u8]) -> Option<usize> {
    let pos = raw.windows(key.len()).position(|w| w == key)?;
    let value_start = pos + key.len();
    let rest = &raw[value_start..];
    let value_len = rest.iter().position(|&b| b == b'\r' || b == b'\n')?;
    let digits = std::str::from_utf8(&rest[..value_len]).ok()?;
    digits.trim().parse().ok()
}

/// Slice the fragment out of a raw envelope buffer.
///
/// Returns `None` when either offset marker is missing or the offsets do not
/// describe a valid range inside `raw`.
pub fn extract_fragment(raw: &[u8]) -> Option<String> {
    let start = header_offset(raw, START_FRAGMENT_KEY)?;
    let end = header_offset(raw, END_FRAGMENT_KEY)?;
    if start > end || end > raw.len() {
        return None;
    }
    Some(String::from_utf8_lossy(&raw[start..end]).into_owned())
}
