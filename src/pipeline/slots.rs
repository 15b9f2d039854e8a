// Sequential slot naming
//
// Input position i (0-based) always maps to slot number start + i. Names are pure
// functions of (prefix, number, width) and are recomputed every run.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Characters Windows and macOS refuse in a path segment
const FORBIDDEN: &str = r#"[<>:"/\\|?*]"#;

/// Widest zero padding accepted for slot numbers
pub const MAX_PAD_WIDTH: usize = 32;

/// Longest title fragment used in a per-video folder name
const MAX_TITLE_CHARS: usize = 80;

lazy_static::lazy_static! {
    static ref FORBIDDEN_RE: Regex = Regex::new(FORBIDDEN).unwrap();
}

/// One output slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentSlot {
    pub number: u32,
    pub name: String,
}

/// `<prefix>-<n>`, zero-padded to `width` when `width > 0`.
/// Widths above [`MAX_PAD_WIDTH`] are clamped.
pub fn make_name(prefix: &str, n: u32, width: usize) -> String {
    let width = width.min(MAX_PAD_WIDTH);
    if width > 0 {
        format!("{}-{:0width$}", prefix, n, width = width)
    } else {
        format!("{}-{}", prefix, n)
    }
}

/// Width used when the caller asks for automatic padding
pub fn auto_width(start: u32, count: usize) -> usize {
    let last = u64::from(start) + (count.max(1) as u64) - 1;
    last.to_string().len()
}

/// Slot names for `start..start+count`.
///
/// `pad_width <= 0` picks the digit count of the last number, so the range sorts
/// lexically. Returns an empty list when `count == 0` and stops at `u32::MAX`.
pub fn assign(prefix: &str, start: u32, count: usize, pad_width: i32) -> Vec<AssignmentSlot> {
    let width = if pad_width > 0 {
        pad_width as usize
    } else {
        auto_width(start, count)
    };

    (0..count)
        .map_while(|i| u32::try_from(i).ok().and_then(|i| start.checked_add(i)))
        .map(|number| AssignmentSlot {
            number,
            name: make_name(prefix, number, width),
        })
        .collect()
}

/// Make a generated name safe as a single path segment
pub fn sanitize(name: &str) -> String {
    FORBIDDEN_RE
        .replace_all(name, "-")
        .trim()
        .trim_end_matches(['.', ' '])
        .to_string()
}

/// Title fragment for a per-video folder: forbidden characters become `_`,
/// truncated to 80 characters, `Video` when nothing is left.
pub fn safe_title(title: &str) -> String {
    let replaced = FORBIDDEN_RE.replace_all(title, "_");
    let truncated: String = replaced.trim().chars().take(MAX_TITLE_CHARS).collect();
    let cleaned = truncated.trim_end_matches(['.', ' ']);

    if cleaned.is_empty() {
        "Video".to_string()
    } else {
        cleaned.to_string()
    }
}
