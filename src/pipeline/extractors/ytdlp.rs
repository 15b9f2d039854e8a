// yt-dlp fetch adapter
//
// Runs `yt-dlp --dump-json --skip-download` for metadata, then downloads one caption
// track per wanted language over HTTP. Manual subtitles win over automatic captions.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::pipeline::errors::FetchError;
use crate::pipeline::models::FetchedVideo;
use crate::pipeline::tools::ToolManager;
use crate::pipeline::traits::FetchAdapter;
use crate::pipeline::utils::{last_error_line, run_output_with_timeout, CommandError};

/// Caption formats in order of preference
const CAPTION_FORMATS: [&str; 3] = ["json3", "vtt", "srv1"];

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Configuration for the yt-dlp adapter
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    /// Path to cookies.txt file
    pub cookies_path: Option<String>,
    /// Process and HTTP timeout in seconds
    pub timeout_seconds: u32,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            cookies_path: None,
            timeout_seconds: 60,
        }
    }
}

impl YtDlpConfig {
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_cookies_path(mut self, path: Option<String>) -> Self {
        self.cookies_path = path;
        self
    }

    pub fn with_timeout(mut self, seconds: u32) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

/// Metadata parsed from `--dump-json`, before captions are downloaded
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInfo {
    pub video_id: String,
    pub title: String,
    pub duration: f64,
    /// Caption download URL per language
    pub caption_urls: BTreeMap<String, String>,
}

pub struct YtDlpAdapter {
    ytdlp_path: Option<String>,
    config: YtDlpConfig,
    client: reqwest::Client,
}

impl YtDlpAdapter {
    pub fn new(config: YtDlpConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(u64::from(config.timeout_seconds)));

        if let Some(proxy_url) = config.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| FetchError::InvalidUrl(format!("proxy {}: {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::ExecutionError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            ytdlp_path: ToolManager::new().locate(),
            config,
            client,
        })
    }

    /// Build command arguments
    fn build_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--skip-download".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.config.timeout_seconds.to_string(),
            "--retries".to_string(),
            "2".to_string(),
            "--user-agent".to_string(),
            USER_AGENT.to_string(),
        ];

        if let Some(path) = &self.config.cookies_path {
            args.push("--cookies".to_string());
            args.push(path.clone());
        }

        if let Some(proxy) = &self.config.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args.push(url.to_string());
        args
    }

    /// Parse JSON output for the wanted languages
    pub fn parse_json(stdout: &[u8], languages: &[String]) -> Result<ParsedInfo, FetchError> {
        let json: Value = serde_json::from_slice(stdout)
            .map_err(|e| FetchError::ParseError(format!("Invalid JSON: {}", e)))?;

        let video_id = json["id"]
            .as_str()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| FetchError::ParseError("No video id in JSON".to_string()))?
            .to_string();

        let mut caption_urls = BTreeMap::new();
        for lang in languages {
            let url = pick_caption_url(&json["subtitles"][lang.as_str()])
                .or_else(|| pick_caption_url(&json["automatic_captions"][lang.as_str()]));
            if let Some(url) = url {
                caption_urls.insert(lang.clone(), url);
            }
        }

        Ok(ParsedInfo {
            video_id,
            title: json["title"].as_str().unwrap_or("Untitled").to_string(),
            duration: json["duration"].as_f64().unwrap_or(0.0),
            caption_urls,
        })
    }

    async fn download_caption(&self, url: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

/// Preferred format URL from a yt-dlp caption track list
fn pick_caption_url(tracks: &Value) -> Option<String> {
    let tracks = tracks.as_array()?;

    CAPTION_FORMATS
        .iter()
        .find_map(|fmt| {
            tracks
                .iter()
                .find(|t| t["ext"].as_str() == Some(*fmt))
                .and_then(|t| t["url"].as_str())
        })
        .or_else(|| tracks.iter().find_map(|t| t["url"].as_str()))
        .map(String::from)
}

#[async_trait]
impl FetchAdapter for YtDlpAdapter {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn is_available(&self) -> bool {
        match &self.ytdlp_path {
            Some(path) => std::process::Command::new(path)
                .arg("--version")
                .output()
                .map(|out| out.status.success())
                .unwrap_or(false),
            None => false,
        }
    }

    async fn fetch(&self, url: &str, languages: &[String]) -> Result<FetchedVideo, FetchError> {
        let ytdlp = self
            .ytdlp_path
            .as_deref()
            .ok_or_else(|| FetchError::AdapterUnavailable("yt-dlp binary not found".to_string()))?;

        let args = self.build_args(url);
        debug!(url, "running {} {}", ytdlp, args.join(" "));

        let output = run_output_with_timeout(ytdlp, args, u64::from(self.config.timeout_seconds))
            .await
            .map_err(|e| match e {
                CommandError::TimedOut { .. } => FetchError::NetworkTimeout,
                CommandError::Spawn { ref source, .. }
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    FetchError::AdapterUnavailable(e.to_string())
                }
                other => FetchError::ExecutionError(other.to_string()),
            })?;

        if !output.status.success() {
            let message = last_error_line(&output.stderr);
            warn!(url, error = %message, "yt-dlp failed");
            return Err(FetchError::from(message));
        }

        let info = Self::parse_json(&output.stdout, languages)?;

        let mut captions = BTreeMap::new();
        for (lang, caption_url) in &info.caption_urls {
            match self.download_caption(caption_url).await {
                Ok(text) if !text.trim().is_empty() => {
                    captions.insert(lang.clone(), text);
                }
                Ok(_) => debug!(url, lang = %lang, "caption track is empty"),
                Err(e) => warn!(url, lang = %lang, error = %e, "caption download failed"),
            }
        }

        info!(
            url,
            video_id = %info.video_id,
            languages = captions.len(),
            "yt-dlp fetch complete"
        );

        Ok(FetchedVideo {
            video_id: info.video_id,
            title: info.title,
            duration: info.duration,
            captions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn langs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_metadata_and_prefers_manual_json3() {
        let json = br#"{
            "id": "AAAAAAAAAAA",
            "title": "Bai giang 1",
            "duration": 321.5,
            "subtitles": {
                "vi": [
                    {"ext": "vtt", "url": "https://caps/vi.vtt"},
                    {"ext": "json3", "url": "https://caps/vi.json3"}
                ]
            },
            "automatic_captions": {
                "vi": [{"ext": "json3", "url": "https://auto/vi.json3"}],
                "en": [{"ext": "srv3", "url": "https://auto/en.srv3"}]
            }
        }"#;

        let info = YtDlpAdapter::parse_json(json, &langs(&["vi", "vi-VN", "en"])).unwrap();
        assert_eq!(info.video_id, "AAAAAAAAAAA");
        assert_eq!(info.title, "Bai giang 1");
        assert_eq!(info.duration, 321.5);
        assert_eq!(info.caption_urls.get("vi").map(String::as_str), Some("https://caps/vi.json3"));
        assert_eq!(info.caption_urls.get("en").map(String::as_str), Some("https://auto/en.srv3"));
        assert!(!info.caption_urls.contains_key("vi-VN"));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let info = YtDlpAdapter::parse_json(br#"{"id": "BBBBBBBBBBB"}"#, &langs(&["vi"])).unwrap();
        assert_eq!(info.title, "Untitled");
        assert_eq!(info.duration, 0.0);
        assert!(info.caption_urls.is_empty());
    }

    #[test]
    fn bad_json_is_a_parse_error() {
        assert!(matches!(
            YtDlpAdapter::parse_json(b"not json", &[]),
            Err(FetchError::ParseError(_))
        ));
        assert!(matches!(
            YtDlpAdapter::parse_json(br#"{"title": "no id"}"#, &[]),
            Err(FetchError::ParseError(_))
        ));
    }

    #[test]
    fn args_include_proxy_and_cookies() {
        let adapter = YtDlpAdapter::new(
            YtDlpConfig::default()
                .with_proxy(Some("socks5h://127.0.0.1:1080".to_string()))
                .with_cookies_path(Some("/tmp/cookies.txt".to_string())),
        )
        .unwrap();

        let args = adapter.build_args("https://youtu.be/AAAAAAAAAAA");
        assert!(args.windows(2).any(|w| w == ["--proxy", "socks5h://127.0.0.1:1080"]));
        assert!(args.windows(2).any(|w| w == ["--cookies", "/tmp/cookies.txt"]));
        assert!(args.contains(&"--skip-download".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/AAAAAAAAAAA"));
    }
}
