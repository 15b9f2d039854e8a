// Fetch adapter and progress sink definitions

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use super::errors::FetchError;
use super::models::{FetchedVideo, ProgressEvent};

/// Source of video metadata and captions.
///
/// Treated as slow and fallible; the orchestrator bounds every call with a timeout
/// and retries retryable failures.
#[async_trait]
pub trait FetchAdapter: Send + Sync {
    /// Name of the adapter (for logging)
    fn name(&self) -> &'static str;

    /// Check if the adapter can run at all. Checked once before a run starts.
    fn is_available(&self) -> bool;

    /// Fetch metadata plus raw captions for the given languages
    async fn fetch(&self, url: &str, languages: &[String]) -> Result<FetchedVideo, FetchError>;
}

/// Receiver of progress notifications
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Drops every event
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Forwards events to another task, e.g. a UI thread
pub struct ChannelProgress {
    tx: UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn emit(&self, event: ProgressEvent) {
        // Receiver gone means nobody is watching; the run carries on.
        let _ = self.tx.send(event);
    }
}

/// Writes events to the log at debug level
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn emit(&self, event: ProgressEvent) {
        tracing::debug!(
            state = %event.state,
            current = event.current,
            total = event.total,
            "{}",
            event.message
        );
    }
}
