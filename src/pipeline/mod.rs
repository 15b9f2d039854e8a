// Pipeline module - caption fetch, dedup store and slot assignment

pub mod cancel;
pub mod captions;
pub mod errors;
pub mod extractors;
pub mod identifier;
pub mod input;
pub mod layout;
pub mod models;
pub mod orchestrator;
pub mod rate_limit;
pub mod runner;
pub mod slots;
pub mod store;
pub mod tools;
pub mod traits;
pub mod utils;

pub use cancel::CancellationToken;
pub use errors::{FetchError, PipelineError, PipelineResult, ValidationError};
pub use extractors::{YtDlpAdapter, YtDlpConfig};
pub use models::{
    FetchedVideo, PipelineConfig, ProgressEvent, RecordStatus, RunRequest, RunState, VideoRecord,
};
pub use orchestrator::{Pipeline, RunSummary};
pub use runner::{PipelineRunner, RunHandle};
pub use slots::AssignmentSlot;
pub use store::{MergeOutcome, ResultStore};
pub use traits::{ChannelProgress, FetchAdapter, LogProgress, NoopProgress, ProgressSink};
