// Error types for the caption pipeline

use std::path::PathBuf;

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failure of a single fetch. Isolated into that item's record; never aborts a run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Network timeout while talking to YouTube
    #[error("Network timeout: YouTube is not responding")]
    NetworkTimeout,

    /// YouTube throttled the request (429, bot detection, etc.)
    #[error("YouTube is temporarily throttling requests from this address")]
    RateLimited,

    /// The fetch tool is missing or unusable
    #[error("Adapter unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Tool output could not be understood
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Private, deleted or otherwise unavailable video
    #[error("Video unavailable: {0}")]
    VideoUnavailable(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl FetchError {
    /// Whether trying again later might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout | Self::RateLimited | Self::ExecutionError(_)
        )
    }
}

// Classify raw tool stderr into a variant
impl From<String> for FetchError {
    fn from(s: String) -> Self {
        let lower = s.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::NetworkTimeout;
        }

        if lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("not a bot")
        {
            return Self::RateLimited;
        }

        if lower.contains("private video")
            || lower.contains("video unavailable")
            || lower.contains("is unavailable")
            || lower.contains("has been removed")
        {
            return Self::VideoUnavailable(s);
        }

        if lower.contains("command not found") || lower.contains("no such file") {
            return Self::AdapterUnavailable(s);
        }

        if lower.contains("invalid url") || lower.contains("unsupported url") {
            return Self::InvalidUrl(s);
        }

        if lower.contains("json") || lower.contains("parse") {
            return Self::ParseError(s);
        }

        Self::Unknown(s)
    }
}

impl From<&str> for FetchError {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

/// Bad run configuration. Always raised before any side effect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no URLs to process")]
    EmptyUrlList,

    #[error("slot range covers {slots} slots but {urls} URLs were given")]
    SlotCountMismatch { slots: u64, urls: usize },

    #[error("slot prefix is empty")]
    EmptyPrefix,

    #[error("slot range starting at {start} cannot hold {count} entries")]
    RangeOverflow { start: u32, count: usize },

    #[error("destination does not exist: {}", .0.display())]
    DestinationMissing(PathBuf),

    #[error("destination is not a directory: {}", .0.display())]
    DestinationNotDirectory(PathBuf),

    #[error("destination is read-only: {}", .0.display())]
    DestinationReadOnly(PathBuf),

    #[error("padding width {width} exceeds the maximum of {max}")]
    PadWidthTooLarge { width: i32, max: usize },

    #[error("result store directory does not exist: {}", .0.display())]
    StoreDirMissing(PathBuf),

    #[error("invalid delay window: min {min:?} is greater than max {max:?}")]
    InvalidDelayWindow {
        min: std::time::Duration,
        max: std::time::Duration,
    },
}

/// Run-level failure. Terminates the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("fetch adapter `{adapter}` unavailable: {reason}")]
    AdapterUnavailable { adapter: String, reason: String },

    #[error("a pipeline run is already in progress")]
    AlreadyRunning,

    #[error(
        "failed to persist result store at `{}` (dedup data may not have been saved): {source}",
        .path.display()
    )]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output at `{}`: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn persist(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persist {
            path: path.into(),
            source,
        }
    }

    pub fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Output {
            path: path.into(),
            source,
        }
    }

    /// True when the store write failed; operators must know dedup data may be lost
    pub fn is_persist(&self) -> bool {
        matches!(self, Self::Persist { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_tool_stderr() {
        assert_eq!(
            FetchError::from("ERROR: Read timed out."),
            FetchError::NetworkTimeout
        );
        assert_eq!(
            FetchError::from("HTTP Error 429: Too Many Requests"),
            FetchError::RateLimited
        );
        assert!(matches!(
            FetchError::from("ERROR: [youtube] abc: Private video"),
            FetchError::VideoUnavailable(_)
        ));
        assert!(matches!(
            FetchError::from("ERROR: Unsupported URL: https://example.com"),
            FetchError::InvalidUrl(_)
        ));
        assert!(matches!(
            FetchError::from("something odd"),
            FetchError::Unknown(_)
        ));
    }

    #[test]
    fn only_bot_checks_count_as_throttling() {
        assert_eq!(
            FetchError::from("ERROR: [youtube] abc: Sign in to confirm you're not a bot"),
            FetchError::RateLimited
        );
        assert!(matches!(
            FetchError::from("ERROR: [youtube] abc: something went wrong with the robot filter"),
            FetchError::Unknown(_)
        ));
    }

    #[test]
    fn retryable_variants() {
        assert!(FetchError::NetworkTimeout.is_retryable());
        assert!(FetchError::RateLimited.is_retryable());
        assert!(!FetchError::VideoUnavailable("gone".into()).is_retryable());
        assert!(!FetchError::AdapterUnavailable("yt-dlp".into()).is_retryable());
    }

    #[test]
    fn persist_error_is_distinct() {
        let err = PipelineError::persist(
            "youtube_results.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.is_persist());
        assert!(err.to_string().contains("dedup data may not have been saved"));

        let err = PipelineError::from(ValidationError::EmptyUrlList);
        assert!(!err.is_persist());
    }
}
