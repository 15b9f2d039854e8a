// Caption normalization
//
// Payloads arrive as plain VTT/SRT-ish text, YouTube json3 event lists, or simple
// `[{"text": ...}]` cue lists. Normalization never fails: anything that does not
// parse as structured data is cleaned as plain text.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;

/// Returned instead of an empty string when nothing readable survives cleaning
pub const NO_CAPTION_CONTENT: &str = "(no caption content)";

/// Returned when none of the requested languages has a caption track
pub const NO_CAPTIONS_IN_LANGUAGES: &str = "No captions available in the requested languages";

lazy_static::lazy_static! {
    static ref CUE_INDEX_RE: Regex = Regex::new(r"^\d+$").unwrap();
    static ref TIMESTAMP_RE: Regex = Regex::new(r"^\d{2}:\d{2}:\d{2}").unwrap();
    static ref HEADER_RE: Regex = Regex::new(r"^(WEBVTT|NOTE|STYLE|Kind:|Language:)").unwrap();
    static ref TAG_RE: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref ENTITY_RE: Regex = Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").unwrap();
}

/// Decode a raw payload and clean it into plain text.
pub fn normalize_payload(raw: &str) -> String {
    clean_captions(&decode_payload(raw))
}

/// Flatten structured payloads to newline text. Unrecognized input is returned as-is.
pub fn decode_payload(raw: &str) -> String {
    let trimmed = raw.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return raw.to_string();
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => match map.get("events").and_then(Value::as_array) {
            Some(events) => events
                .iter()
                .filter_map(|event| event.get("segs").and_then(Value::as_array))
                .map(|segs| {
                    segs.iter()
                        .filter_map(|seg| seg.get("utf8").and_then(Value::as_str))
                        .collect::<String>()
                        .trim()
                        .to_string()
                })
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
            None => raw.to_string(),
        },
        Ok(Value::Array(cues)) => cues
            .iter()
            .filter_map(|cue| cue.as_str().or_else(|| cue.get("text").and_then(Value::as_str)))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Ok(_) => raw.to_string(),
        Err(e) => {
            tracing::debug!(error = %e, "caption payload looked structured but did not parse");
            raw.to_string()
        }
    }
}

/// Strip cue numbers, timings, headers and markup; collapse repeated lines.
pub fn clean_captions(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty()
            || line == "--"
            || line.contains("-->")
            || CUE_INDEX_RE.is_match(line)
            || TIMESTAMP_RE.is_match(line)
            || HEADER_RE.is_match(line)
        {
            continue;
        }

        let stripped = TAG_RE.replace_all(line, "");
        let decoded = decode_entities(&stripped);
        let cleaned = decoded.trim();

        if cleaned.is_empty() {
            continue;
        }
        if out.last().map(String::as_str) == Some(cleaned) {
            continue;
        }
        out.push(cleaned.to_string());
    }

    if out.is_empty() {
        NO_CAPTION_CONTENT.to_string()
    } else {
        out.join("\n")
    }
}

fn decode_entities(line: &str) -> String {
    ENTITY_RE
        .replace_all(line, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ if entity.starts_with('#') => {
                    entity[1..].parse::<u32>().ok().and_then(char::from_u32)
                }
                _ => None,
            };
            decoded.map(String::from).unwrap_or_default()
        })
        .into_owned()
}

/// Pick the best caption track and normalize it.
///
/// The first language in `preferred` with a track wins. Otherwise the `fallback`
/// track is used and tagged with its source. Tracks that clean down to nothing are
/// skipped so a later language still gets a chance.
pub fn select_captions(
    tracks: &BTreeMap<String, String>,
    preferred: &[String],
    fallback: Option<&str>,
) -> String {
    for lang in preferred {
        if let Some(raw) = tracks.get(lang) {
            let text = normalize_payload(raw);
            if text != NO_CAPTION_CONTENT {
                return text;
            }
        }
    }

    if let Some(lang) = fallback {
        if let Some(raw) = tracks.get(lang) {
            let text = normalize_payload(raw);
            if text != NO_CAPTION_CONTENT {
                return format!("{}\n\n(caption source: {} fallback)", text, lang);
            }
        }
    }

    NO_CAPTIONS_IN_LANGUAGES.to_string()
}
