// Pipeline orchestrator
//
// Idle -> Validating -> BuildingSlots -> FetchingMetadata -> MergingResults
//      -> AssigningOutputs -> Done
//
// Cancellation is polled between items. Completed fetches are always merged and
// persisted before a cancelled run exits; nothing already done is rolled back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::cancel::CancellationToken;
use super::captions::select_captions;
use super::errors::{FetchError, PipelineError, PipelineResult};
use super::identifier::dedup_key;
use super::layout::{self, ArtifactOutcome};
use super::models::{FetchedVideo, PipelineConfig, ProgressEvent, RunRequest, RunState, VideoRecord};
use super::rate_limit::RateLimiter;
use super::slots::assign;
use super::store::ResultStore;
use super::traits::{FetchAdapter, NoopProgress, ProgressSink};

/// Observable outcome of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub final_state: RunState,
    pub total_slots: usize,
    pub slots_created: usize,
    pub slots_existed: usize,
    /// Items fetched from the network this run
    pub fetched: usize,
    /// Items answered from the store or an earlier item of this run
    pub cache_hits: usize,
    /// Fetched items that ended as error records
    pub fetch_failures: usize,
    /// Items never reached because of cancellation
    pub not_processed: usize,
    pub merged_new: usize,
    pub already_known: usize,
    /// Per-video artifacts written this run
    pub assigned: usize,
    /// Items whose artifacts already existed or whose slot folder was missing
    pub skipped: usize,
    pub error_notes: usize,
}

impl RunSummary {
    fn new(total_slots: usize) -> Self {
        Self {
            final_state: RunState::Idle,
            total_slots,
            slots_created: 0,
            slots_existed: 0,
            fetched: 0,
            cache_hits: 0,
            fetch_failures: 0,
            not_processed: 0,
            merged_new: 0,
            already_known: 0,
            assigned: 0,
            skipped: 0,
            error_notes: 0,
        }
    }

    pub fn was_cancelled(&self) -> bool {
        self.final_state == RunState::Cancelled
    }
}

pub struct Pipeline {
    adapter: Arc<dyn FetchAdapter>,
    config: PipelineConfig,
    progress: Arc<dyn ProgressSink>,
    state: RunState,
}

impl Pipeline {
    pub fn new(adapter: Arc<dyn FetchAdapter>, config: PipelineConfig) -> Self {
        Self {
            adapter,
            config,
            progress: Arc::new(NoopProgress),
            state: RunState::Idle,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fail fast when the adapter cannot run, instead of trying to repair it
    pub fn check_adapter(&self) -> PipelineResult<()> {
        if self.adapter.is_available() {
            Ok(())
        } else {
            Err(PipelineError::AdapterUnavailable {
                adapter: self.adapter.name().to_string(),
                reason: "capability check failed".to_string(),
            })
        }
    }

    /// Execute one complete run
    pub async fn run(
        &mut self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> PipelineResult<RunSummary> {
        match self.run_inner(request, cancel).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                if e.is_persist() {
                    warn!(error = %e, "result store was not saved");
                }
                self.transition(RunState::Failed, 0, 0, e.to_string());
                Err(e)
            }
        }
    }

    async fn run_inner(
        &mut self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> PipelineResult<RunSummary> {
        let total = request.urls.len();

        self.transition(RunState::Validating, 0, total, "validating run configuration");
        self.config.validate()?;
        request.validate()?;
        self.check_adapter()?;

        let slots = assign(&request.prefix, request.start, total, request.pad_width);
        let mut summary = RunSummary::new(slots.len());

        self.transition(
            RunState::BuildingSlots,
            0,
            total,
            format!("ensuring {} slot folders", slots.len()),
        );
        let built = layout::build_slots(
            &request.destination,
            &slots,
            self.config.template_path.as_deref(),
        )?;
        summary.slots_created = built.created;
        summary.slots_existed = built.existed;

        let mut store = ResultStore::load(&self.config.store_path);

        self.transition(RunState::FetchingMetadata, 0, total, "fetching metadata");
        let fetched = self.fetch_all(&request.urls, &store, cancel, &mut summary).await;

        self.transition(
            RunState::MergingResults,
            fetched.results.len(),
            total,
            "merging results into store",
        );
        let merged = store.merge(fetched.new_records);
        summary.merged_new = merged.appended;
        summary.already_known = merged.already_known;
        store.persist()?;

        if fetched.cancelled {
            summary.not_processed = total - fetched.results.len();
            return Ok(self.finish_cancelled(summary, fetched.results.len(), total));
        }

        self.transition(RunState::AssigningOutputs, 0, total, "writing artifacts");
        for (position, record) in fetched.results.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(self.finish_cancelled(summary, position, total));
            }

            let slot = &slots[position];
            let dir = &built.paths[position];
            if !dir.is_dir() {
                warn!(slot = %slot.name, "slot folder missing, skipping");
                summary.skipped += 1;
                continue;
            }

            if record.is_success() {
                match layout::write_video_artifacts(dir, &slot.name, record)? {
                    ArtifactOutcome::Written => {
                        info!(slot = %slot.name, url = %record.url, "captions saved");
                        summary.assigned += 1;
                    }
                    ArtifactOutcome::AlreadyPresent => summary.skipped += 1,
                }
            } else {
                match layout::write_error_note(dir, position, record)? {
                    ArtifactOutcome::Written => {
                        warn!(slot = %slot.name, url = %record.url, "error note written");
                        summary.error_notes += 1;
                    }
                    ArtifactOutcome::AlreadyPresent => summary.skipped += 1,
                }
            }

            self.emit(position + 1, total, format!("assigned {}", slot.name));
        }

        summary.final_state = RunState::Done;
        self.transition(
            RunState::Done,
            total,
            total,
            format!(
                "assigned {}/{} videos to {}-*",
                summary.assigned, total, request.prefix
            ),
        );
        Ok(summary)
    }

    async fn fetch_all(
        &self,
        urls: &[String],
        store: &ResultStore,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> FetchPhase {
        let mut phase = FetchPhase::default();
        let mut seen_this_run: HashMap<String, usize> = HashMap::new();
        let mut limiter = RateLimiter::new(self.config.min_delay, self.config.max_delay);
        let total = urls.len();

        for (i, url) in urls.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(processed = i, total, "cancellation requested, stopping fetch");
                phase.cancelled = true;
                break;
            }

            let key = dedup_key(None, url);

            if let Some(cached) = store.lookup_input(url) {
                info!(url = %url, "reusing stored result");
                summary.cache_hits += 1;
                phase.results.push(cached.clone());
                self.emit(i + 1, total, format!("reused stored result for {}", url));
                continue;
            }

            if let Some(&earlier) = key.as_deref().and_then(|k| seen_this_run.get(k)) {
                info!(url = %url, "reusing result fetched earlier in this run");
                summary.cache_hits += 1;
                let record = phase.results[earlier].clone();
                phase.results.push(record);
                self.emit(i + 1, total, format!("reused result for {}", url));
                continue;
            }

            if !limiter.wait_turn(cancel).await {
                info!(processed = i, total, "cancelled while waiting for next fetch");
                phase.cancelled = true;
                break;
            }

            let record = match self.fetch_with_retry(url, cancel).await {
                Ok(video) => {
                    let subtitles = select_captions(
                        &video.captions,
                        &self.config.caption_languages,
                        self.config.fallback_language.as_deref(),
                    );
                    info!(url = %url, video_id = %video.video_id, "fetched video info");
                    VideoRecord::success(url, video, subtitles)
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "fetch failed");
                    summary.fetch_failures += 1;
                    VideoRecord::failure(url, &e)
                }
            };
            summary.fetched += 1;

            if let Some(k) = key {
                seen_this_run.insert(k, phase.results.len());
            }
            phase.new_records.push(record.clone());
            phase.results.push(record);
            self.emit(i + 1, total, format!("processed {}", url));
        }

        phase
    }

    /// One fetch bounded by the configured timeout, retried with backoff
    async fn fetch_with_retry(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedVideo, FetchError> {
        let languages = self.config.wanted_languages();
        let mut attempt: u32 = 0;

        loop {
            let result = match tokio::time::timeout(
                self.config.fetch_timeout,
                self.adapter.fetch(url, &languages),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(FetchError::NetworkTimeout),
            };

            let err = match result {
                Ok(video) => return Ok(video),
                Err(e) => e,
            };

            if !err.is_retryable() || attempt >= self.config.max_retries {
                return Err(err);
            }

            let backoff = self.backoff(attempt);
            warn!(
                url,
                attempt = attempt + 1,
                backoff_secs = backoff.as_secs_f64(),
                error = %err,
                "fetch failed, retrying after backoff"
            );

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = cancel.cancelled() => return Err(err),
            }
            attempt += 1;
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.retry_base_delay;
        if base.is_zero() {
            return Duration::ZERO;
        }
        let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
        base.saturating_mul(3u32.saturating_pow(attempt)) + jitter
    }

    fn finish_cancelled(&mut self, mut summary: RunSummary, current: usize, total: usize) -> RunSummary {
        summary.final_state = RunState::Cancelled;
        self.transition(
            RunState::Cancelled,
            current,
            total,
            "run cancelled; completed work kept",
        );
        summary
    }

    fn transition(&mut self, next: RunState, current: usize, total: usize, message: impl Into<String>) {
        let message = message.into();
        info!(from = %self.state, to = %next, "{}", message);
        self.state = next;
        self.emit(current, total, message);
    }

    fn emit(&self, current: usize, total: usize, message: impl Into<String>) {
        self.progress.emit(ProgressEvent {
            state: self.state,
            current,
            total,
            message: message.into(),
        });
    }
}

#[derive(Default)]
struct FetchPhase {
    /// One record per processed input, in input order
    results: Vec<VideoRecord>,
    /// Records produced by new fetches, to be merged
    new_records: Vec<VideoRecord>,
    cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FlakyAdapter {
        failures_left: AtomicUsize,
        calls: AtomicUsize,
        error: FetchError,
    }

    #[async_trait]
    impl FetchAdapter for FlakyAdapter {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn fetch(&self, url: &str, _languages: &[String]) -> Result<FetchedVideo, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(self.error.clone());
            }
            Ok(FetchedVideo {
                video_id: crate::pipeline::identifier::extract_video_id(url).unwrap_or_default(),
                title: "ok".to_string(),
                duration: 1.0,
                captions: Default::default(),
            })
        }
    }

    struct Unavailable;

    #[async_trait]
    impl FetchAdapter for Unavailable {
        fn name(&self) -> &'static str {
            "missing-tool"
        }

        fn is_available(&self) -> bool {
            false
        }

        async fn fetch(&self, _url: &str, _languages: &[String]) -> Result<FetchedVideo, FetchError> {
            Err(FetchError::AdapterUnavailable("missing".into()))
        }
    }

    struct Recorder(Mutex<Vec<RunState>>);

    impl ProgressSink for Recorder {
        fn emit(&self, event: ProgressEvent) {
            let mut states = self.0.lock().unwrap();
            if states.last() != Some(&event.state) {
                states.push(event.state);
            }
        }
    }

    fn quiet_config(dir: &std::path::Path) -> PipelineConfig {
        PipelineConfig::default()
            .with_store_path(dir.join("results.json"))
            .with_delay_window(Duration::ZERO, Duration::ZERO)
            .with_retries(2, Duration::ZERO)
    }

    fn pipeline(adapter: Arc<dyn FetchAdapter>, dir: &std::path::Path) -> Pipeline {
        Pipeline::new(adapter, quiet_config(dir))
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(FlakyAdapter {
            failures_left: AtomicUsize::new(2),
            calls: AtomicUsize::new(0),
            error: FetchError::NetworkTimeout,
        });
        let pipeline = pipeline(adapter.clone(), dir.path());

        let video = pipeline
            .fetch_with_retry("https://youtu.be/AAAAAAAAAAA", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(video.video_id, "AAAAAAAAAAA");
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(FlakyAdapter {
            failures_left: AtomicUsize::new(5),
            calls: AtomicUsize::new(0),
            error: FetchError::VideoUnavailable("Private video".into()),
        });
        let pipeline = pipeline(adapter.clone(), dir.path());

        let err = pipeline
            .fetch_with_retry("https://youtu.be/AAAAAAAAAAA", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::VideoUnavailable(_)));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(FlakyAdapter {
            failures_left: AtomicUsize::new(10),
            calls: AtomicUsize::new(0),
            error: FetchError::RateLimited,
        });
        let pipeline = pipeline(adapter.clone(), dir.path());

        let err = pipeline
            .fetch_with_retry("https://youtu.be/AAAAAAAAAAA", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::RateLimited);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unavailable_adapter_fails_before_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out");
        std::fs::create_dir(&dest).unwrap();

        let mut pipeline = pipeline(Arc::new(Unavailable), dir.path());
        let request = RunRequest::new(vec!["https://youtu.be/AAAAAAAAAAA".into()], 1, &dest);

        let err = pipeline.run(&request, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::AdapterUnavailable { .. }));
        assert_eq!(pipeline.state(), RunState::Failed);
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
        assert!(!dir.path().join("results.json").exists());
    }

    #[tokio::test]
    async fn walks_states_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out");
        std::fs::create_dir(&dest).unwrap();

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let adapter = Arc::new(FlakyAdapter {
            failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            error: FetchError::RateLimited,
        });
        let mut pipeline = pipeline(adapter, dir.path()).with_progress(recorder.clone());

        let request = RunRequest::new(vec!["https://youtu.be/AAAAAAAAAAA".into()], 1, &dest);
        let summary = pipeline.run(&request, &CancellationToken::new()).await.unwrap();
        assert_eq!(summary.final_state, RunState::Done);

        let states = recorder.0.lock().unwrap().clone();
        assert_eq!(
            states,
            vec![
                RunState::Validating,
                RunState::BuildingSlots,
                RunState::FetchingMetadata,
                RunState::MergingResults,
                RunState::AssigningOutputs,
                RunState::Done,
            ]
        );
    }
}
