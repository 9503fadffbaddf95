//! Locates the JSON payload inside a free-form model completion.
//!
//! Models wrap their answer in whatever they like: a tagged fence, a bare
//! fence, or plain prose around an object. Attempts run in order of how
//! explicit the marker is and the first hit wins.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// ```json on its own line, interior, closing fence on its own line.
    static ref TAGGED_FENCE: Regex =
        Regex::new(r"(?s)```[ \t]*(?i:json)[ \t]*\r?\n(.*?)\r?\n[ \t]*```").unwrap();
    static ref ANY_FENCE: Regex = Regex::new(r"(?s)```(.*?)```").unwrap();
    /// Greedy: first `{` through last `}`.
    static ref OBJECT_SPAN: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
    /// Info string on the first line of a bare fence, e.g. `javascript`.
    static ref INFO_STRING: Regex = Regex::new(r"^[A-Za-z0-9_+.-]+[ \t]*\r?\n").unwrap();
}

/// Returns the candidate payload substring of `text`, or `text` itself when
/// nothing looks like a payload. The result is not parsed here.
pub fn extract_payload(text: &str) -> &str {
    if let Some(m) = TAGGED_FENCE.captures(text).and_then(|c| c.get(1)) {
        return m.as_str();
    }
    if let Some(m) = ANY_FENCE.captures(text).and_then(|c| c.get(1)) {
        return strip_info_string(m.as_str());
    }
    if let Some(m) = OBJECT_SPAN.find(text) {
        return m.as_str();
    }
    text
}

fn strip_info_string(interior: &str) -> &str {
    if let Some(m) = INFO_STRING.find(interior) {
        return &interior[m.end()..];
    }
    // ```json{...}``` with no line break after the tag
    let trimmed = interior.trim_start();
    match trimmed.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => {
            let rest = trimmed[4..].trim_start();
            if rest.starts_with('{') || rest.starts_with('[') {
                rest
            } else {
                interior
            }
        }
        _ => interior,
    }
}
