pub mod cli;
pub mod logging;
pub mod pipeline;

pub use pipeline::{
    CancellationToken, FetchAdapter, Pipeline, PipelineConfig, PipelineError, PipelineResult,
    PipelineRunner, RunRequest, RunSummary,
};

/// Entry point for the binary; returns the process exit code
pub async fn run() -> u8 {
    cli::run().await
}
