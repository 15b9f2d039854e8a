// Common data models for the pipeline

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{FetchError, ValidationError};
use super::slots::MAX_PAD_WIDTH;

pub const DEFAULT_PREFIX: &str = "LCTC";
pub const DEFAULT_STORE_FILE: &str = "youtube_results.json";

/// Outcome of fetching one video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Success,
    Error,
}

/// One persisted video record.
///
/// Field names follow the on-disk store format. Unknown fields written by other
/// tools are carried in `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Cleaned caption text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<String>,
    #[serde(default = "default_status")]
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// Legacy stores omit status on good records
fn default_status() -> RecordStatus {
    RecordStatus::Success
}

impl VideoRecord {
    pub fn success(url: &str, video: FetchedVideo, subtitles: String) -> Self {
        Self {
            url: url.to_string(),
            video_id: Some(video.video_id),
            title: Some(video.title),
            duration: Some(video.duration),
            subtitles: Some(subtitles),
            status: RecordStatus::Success,
            error: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn failure(url: &str, error: &FetchError) -> Self {
        Self {
            url: url.to_string(),
            video_id: None,
            title: None,
            duration: None,
            subtitles: None,
            status: RecordStatus::Error,
            error: Some(format!("Failed to fetch video info: {}", error)),
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RecordStatus::Success
    }
}

/// What a fetch adapter hands back for one URL
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchedVideo {
    pub video_id: String,
    pub title: String,
    /// Duration in seconds
    pub duration: f64,
    /// Raw caption payloads keyed by language code
    pub captions: BTreeMap<String, String>,
}

/// Pipeline lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Validating,
    BuildingSlots,
    FetchingMetadata,
    MergingResults,
    AssigningOutputs,
    Done,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::BuildingSlots => "building-slots",
            Self::FetchingMetadata => "fetching-metadata",
            Self::MergingResults => "merging-results",
            Self::AssigningOutputs => "assigning-outputs",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Progress notification for interactive surfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub state: RunState,
    pub current: usize,
    pub total: usize,
    pub message: String,
}

/// Per-run input supplied by the caller
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Ordered input; position i lands in slot `start + i`
    pub urls: Vec<String>,
    pub prefix: String,
    pub start: u32,
    /// Optional last slot number; must agree with the URL count
    pub end: Option<u32>,
    /// Zero-padding width; `<= 0` means automatic
    pub pad_width: i32,
    pub destination: PathBuf,
}

impl RunRequest {
    pub fn new(urls: Vec<String>, start: u32, destination: impl Into<PathBuf>) -> Self {
        Self {
            urls,
            prefix: DEFAULT_PREFIX.to_string(),
            start,
            end: None,
            pad_width: 0,
            destination: destination.into(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_end(mut self, end: Option<u32>) -> Self {
        self.end = end;
        self
    }

    pub fn with_pad_width(mut self, width: i32) -> Self {
        self.pad_width = width;
        self
    }

    /// Check everything that can be checked without touching the filesystem
    /// beyond reading destination metadata.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.urls.is_empty() {
            return Err(ValidationError::EmptyUrlList);
        }

        if self.prefix.trim().is_empty() {
            return Err(ValidationError::EmptyPrefix);
        }

        if self.pad_width > 0 && self.pad_width as usize > MAX_PAD_WIDTH {
            return Err(ValidationError::PadWidthTooLarge {
                width: self.pad_width,
                max: MAX_PAD_WIDTH,
            });
        }

        let count = self.urls.len();
        let last = u64::from(self.start) + count as u64 - 1;
        if last > u64::from(u32::MAX) {
            return Err(ValidationError::RangeOverflow {
                start: self.start,
                count,
            });
        }

        if let Some(end) = self.end {
            let slots = if end >= self.start {
                u64::from(end - self.start) + 1
            } else {
                0
            };
            if slots != count as u64 {
                return Err(ValidationError::SlotCountMismatch { slots, urls: count });
            }
        }

        validate_destination(&self.destination)
    }
}

fn validate_destination(path: &Path) -> Result<(), ValidationError> {
    let meta = std::fs::metadata(path)
        .map_err(|_| ValidationError::DestinationMissing(path.to_path_buf()))?;

    if !meta.is_dir() {
        return Err(ValidationError::DestinationNotDirectory(path.to_path_buf()));
    }

    if meta.permissions().readonly() {
        return Err(ValidationError::DestinationReadOnly(path.to_path_buf()));
    }

    Ok(())
}

/// Ambient pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Persisted result store
    pub store_path: PathBuf,
    /// Copied for placeholder documents; empty files when absent
    pub template_path: Option<PathBuf>,
    /// Randomized pause between consecutive new fetches
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound for a single fetch attempt
    pub fetch_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    /// Caption languages in preference order
    pub caption_languages: Vec<String>,
    pub fallback_language: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_FILE),
            template_path: None,
            min_delay: Duration::from_secs(20),
            max_delay: Duration::from_secs(25),
            fetch_timeout: Duration::from_secs(120),
            max_retries: 2,
            retry_base_delay: Duration::from_secs(5),
            caption_languages: vec!["vi".to_string(), "vi-VN".to_string()],
            fallback_language: Some("en".to_string()),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `LCTC_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            store_path: std::env::var("LCTC_STORE_PATH")
                .map(|p| expand_home(&p))
                .unwrap_or(defaults.store_path),
            template_path: std::env::var("LCTC_TEMPLATE")
                .ok()
                .map(|p| expand_home(&p))
                .or(defaults.template_path),
            min_delay: env_secs("LCTC_MIN_DELAY_SECS").unwrap_or(defaults.min_delay),
            max_delay: env_secs("LCTC_MAX_DELAY_SECS").unwrap_or(defaults.max_delay),
            fetch_timeout: env_secs("LCTC_FETCH_TIMEOUT_SECS").unwrap_or(defaults.fetch_timeout),
            max_retries: std::env::var("LCTC_FETCH_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_base_delay: defaults.retry_base_delay,
            caption_languages: std::env::var("LCTC_CAPTION_LANGS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(|l| l.trim().to_string())
                        .filter(|l| !l.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|langs| !langs.is_empty())
                .unwrap_or(defaults.caption_languages),
            fallback_language: match std::env::var("LCTC_FALLBACK_LANG") {
                Ok(lang) if lang.trim().is_empty() => None,
                Ok(lang) => Some(lang.trim().to_string()),
                Err(_) => defaults.fallback_language,
            },
        }
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    pub fn with_template(mut self, path: Option<PathBuf>) -> Self {
        self.template_path = path;
        self
    }

    pub fn with_delay_window(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay = min;
        self.max_delay = max;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    pub fn with_caption_languages(mut self, languages: Vec<String>, fallback: Option<String>) -> Self {
        self.caption_languages = languages;
        self.fallback_language = fallback;
        self
    }

    /// Every language worth asking the adapter for
    pub fn wanted_languages(&self) -> Vec<String> {
        let mut langs = self.caption_languages.clone();
        if let Some(fallback) = &self.fallback_language {
            if !langs.contains(fallback) {
                langs.push(fallback.clone());
            }
        }
        langs
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(dir) = self.store_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !dir.is_dir() {
                return Err(ValidationError::StoreDirMissing(dir.to_path_buf()));
            }
        }

        if self.min_delay > self.max_delay {
            return Err(ValidationError::InvalidDelayWindow {
                min: self.min_delay,
                max: self.max_delay,
            });
        }
        Ok(())
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Expand a leading `~/` to the user's home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_tolerates_missing_and_unknown_fields() {
        let json = r#"{"url":"https://youtu.be/AAAAAAAAAAA","title":"T","uploader":"someone"}"#;
        let record: VideoRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.status, RecordStatus::Success);
        assert_eq!(record.video_id, None);
        assert_eq!(record.extra.get("uploader").and_then(|v| v.as_str()), Some("someone"));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["uploader"], "someone");
        assert!(back.get("error").is_none());
    }

    #[test]
    fn failure_record_shape() {
        let record = VideoRecord::failure("https://youtu.be/x", &FetchError::RateLimited);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "error");
        assert!(value["error"].as_str().unwrap().contains("throttling"));
        assert!(!record.is_success());
    }

    #[test]
    fn request_validation_is_side_effect_free() {
        let dir = tempfile::tempdir().unwrap();
        let urls = vec!["a".to_string(), "b".to_string()];

        let ok = RunRequest::new(urls.clone(), 1, dir.path()).with_end(Some(2));
        assert!(ok.validate().is_ok());

        let mismatch = RunRequest::new(urls.clone(), 1, dir.path()).with_end(Some(3));
        assert_eq!(
            mismatch.validate(),
            Err(ValidationError::SlotCountMismatch { slots: 3, urls: 2 })
        );

        let backwards = RunRequest::new(urls.clone(), 5, dir.path()).with_end(Some(1));
        assert!(matches!(
            backwards.validate(),
            Err(ValidationError::SlotCountMismatch { slots: 0, .. })
        ));

        let missing = dir.path().join("nope");
        assert!(matches!(
            RunRequest::new(urls.clone(), 1, &missing).validate(),
            Err(ValidationError::DestinationMissing(_))
        ));
        assert!(!missing.exists());

        assert_eq!(
            RunRequest::new(Vec::new(), 1, dir.path()).validate(),
            Err(ValidationError::EmptyUrlList)
        );
        assert_eq!(
            RunRequest::new(urls.clone(), 1, dir.path()).with_prefix(" ").validate(),
            Err(ValidationError::EmptyPrefix)
        );
        assert!(matches!(
            RunRequest::new(urls, u32::MAX, dir.path()).validate(),
            Err(ValidationError::RangeOverflow { .. })
        ));
    }

    #[test]
    fn oversized_padding_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let urls = vec!["a".to_string()];

        assert_eq!(
            RunRequest::new(urls.clone(), 1, dir.path()).with_pad_width(70_000).validate(),
            Err(ValidationError::PadWidthTooLarge {
                width: 70_000,
                max: MAX_PAD_WIDTH
            })
        );
        assert!(RunRequest::new(urls, 1, dir.path())
            .with_pad_width(MAX_PAD_WIDTH as i32)
            .validate()
            .is_ok());
    }

    #[test]
    fn store_directory_must_exist() {
        let dir = tempfile::tempdir().unwrap();

        let ok = PipelineConfig::default().with_store_path(dir.path().join("results.json"));
        assert!(ok.validate().is_ok());

        let missing = dir.path().join("gone");
        let bad = PipelineConfig::default().with_store_path(missing.join("results.json"));
        assert_eq!(bad.validate(), Err(ValidationError::StoreDirMissing(missing)));
    }

    #[test]
    fn destination_must_be_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();

        assert!(matches!(
            RunRequest::new(vec!["a".into()], 1, &file).validate(),
            Err(ValidationError::DestinationNotDirectory(_))
        ));
    }

    #[test]
    fn config_delay_window_and_languages() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.wanted_languages(), vec!["vi", "vi-VN", "en"]);

        let bad = PipelineConfig::default()
            .with_delay_window(Duration::from_secs(5), Duration::from_secs(1));
        assert!(matches!(
            bad.validate(),
            Err(ValidationError::InvalidDelayWindow { .. })
        ));
    }

    #[test]
    fn expands_home_prefix() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/x"), home.join("x"));
        }
    }
}
