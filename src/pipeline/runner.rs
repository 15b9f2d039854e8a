// Background runner for interactive front-ends
//
// Runs one pipeline at a time on a tokio task and streams progress back over a
// channel. A second start while a run is active is rejected, never interleaved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::info;

use super::cancel::CancellationToken;
use super::errors::{PipelineError, PipelineResult};
use super::models::{PipelineConfig, ProgressEvent, RunRequest};
use super::orchestrator::{Pipeline, RunSummary};
use super::traits::{ChannelProgress, FetchAdapter};

pub struct PipelineRunner {
    adapter: Arc<dyn FetchAdapter>,
    config: PipelineConfig,
    active: Arc<AtomicBool>,
}

/// Handle to a started run
pub struct RunHandle {
    pub cancel: CancellationToken,
    pub progress: UnboundedReceiver<ProgressEvent>,
    pub join: JoinHandle<PipelineResult<RunSummary>>,
}

impl RunHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Clears the active flag however the run ends
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl PipelineRunner {
    pub fn new(adapter: Arc<dyn FetchAdapter>, config: PipelineConfig) -> Self {
        Self {
            adapter,
            config,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start a run in the background. Must be called inside a tokio runtime.
    pub fn start(&self, request: RunRequest) -> PipelineResult<RunHandle> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PipelineError::AlreadyRunning);
        }
        let guard = ActiveGuard(self.active.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let mut pipeline = Pipeline::new(self.adapter.clone(), self.config.clone())
            .with_progress(Arc::new(ChannelProgress::new(tx)));

        let token = cancel.clone();
        let join = tokio::spawn(async move {
            let _guard = guard;
            info!(urls = request.urls.len(), "background run started");
            pipeline.run(&request, &token).await
        });

        Ok(RunHandle {
            cancel,
            progress: rx,
            join,
        })
    }
}
