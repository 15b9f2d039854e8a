// Video identifier extraction
//
// Every URL form of the same video must map to the same 11-character id so the
// result store can deduplicate across watch/short/embed links.

use regex::Regex;

lazy_static::lazy_static! {
    // Order matters: first match wins.
    static ref ID_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"youtube\.com/watch\?(?:[^#]*?&)?v=([A-Za-z0-9_-]{11})").unwrap(),
        Regex::new(r"youtu\.be/([A-Za-z0-9_-]{11})").unwrap(),
        Regex::new(r"youtube\.com/embed/([A-Za-z0-9_-]{11})").unwrap(),
        Regex::new(r"youtube\.com/v/([A-Za-z0-9_-]{11})").unwrap(),
        Regex::new(r"youtube\.com/shorts/([A-Za-z0-9_-]{11})").unwrap(),
    ];
}

/// Extract the canonical video id from any URL-like string.
/// Returns `None` when no known shape matches.
pub fn extract_video_id(url: &str) -> Option<String> {
    ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Dedup key for a record: explicit id, else id parsed from its url, else the raw url.
/// `None` only when there is nothing to key on at all.
pub fn dedup_key(video_id: Option<&str>, url: &str) -> Option<String> {
    if let Some(id) = video_id.map(str::trim).filter(|id| !id.is_empty()) {
        return Some(id.to_string());
    }

    if let Some(id) = extract_video_id(url) {
        return Some(id);
    }

    let raw = url.trim();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}
