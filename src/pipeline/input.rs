// URL list input

use std::path::Path;

use tracing::warn;

use super::identifier::extract_video_id;

/// Parse a URL list: one URL per line, `#` comments and blank lines ignored.
/// Lines without a recognizable video id are dropped with a warning.
pub fn parse_url_list(content: &str) -> Vec<String> {
    let mut urls = Vec::new();

    for (idx, line) in content.trim_start_matches('\u{feff}').lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if extract_video_id(line).is_some() {
            urls.push(line.to_string());
        } else {
            warn!(line = idx + 1, url = %line, "invalid URL, skipping");
        }
    }

    urls
}

pub fn read_url_file(path: &Path) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_url_list(&content))
}
