// Command-line surface: run, slots, check

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use tracing::{info, warn};

use crate::pipeline::input::read_url_file;
use crate::pipeline::models::{expand_home, DEFAULT_PREFIX};
use crate::pipeline::slots::assign;
use crate::pipeline::tools::ToolManager;
use crate::pipeline::{
    CancellationToken, FetchAdapter, FetchError, LogProgress, Pipeline, PipelineConfig,
    PipelineError, RunRequest, RunSummary, YtDlpAdapter, YtDlpConfig,
};

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_VALIDATION: u8 = 2;
pub const EXIT_PERSIST: u8 = 3;
pub const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Parser)]
#[command(name = "lctc-pipeline")]
#[command(about = "Fetch YouTube captions into numbered slot folders, resumably")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch metadata and captions, then write them into slot folders
    Run(RunArgs),
    /// Print the slot names a run would use
    Slots(SlotsArgs),
    /// Report whether yt-dlp is usable
    Check,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Video URL; repeat for several, order is preserved
    #[arg(long = "url", value_name = "URL", required_unless_present = "urls_file")]
    pub urls: Vec<String>,

    /// Text file with one URL per line
    #[arg(long, value_name = "FILE", conflicts_with = "urls")]
    pub urls_file: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_PREFIX)]
    pub prefix: String,

    /// First slot number
    #[arg(long)]
    pub start: u32,

    /// Last slot number; must match the URL count
    #[arg(long)]
    pub end: Option<u32>,

    /// Zero-padding width, 0 or negative for automatic
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub pad: i32,

    /// Directory that holds the slot folders
    #[arg(long)]
    pub dest: String,

    /// Result store file
    #[arg(long)]
    pub store: Option<String>,

    /// Template copied into each placeholder document
    #[arg(long)]
    pub template: Option<String>,

    /// Minimum pause between new fetches, seconds
    #[arg(long)]
    pub min_delay: Option<f64>,

    /// Maximum pause between new fetches, seconds
    #[arg(long)]
    pub max_delay: Option<f64>,

    /// Proxy for yt-dlp and caption downloads (socks5h://, http://)
    #[arg(long)]
    pub proxy: Option<String>,

    /// cookies.txt passed to yt-dlp
    #[arg(long)]
    pub cookies: Option<String>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SlotsArgs {
    #[arg(long)]
    pub start: u32,

    #[arg(long)]
    pub count: usize,

    #[arg(long, default_value = DEFAULT_PREFIX)]
    pub prefix: String,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub pad: i32,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read URL file {}: {source}", .path.display())]
    UrlFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid delay: {0}")]
    InvalidDelay(String),

    #[error("failed to set up yt-dlp adapter: {0}")]
    Adapter(#[from] FetchError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("failed to render summary: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Pipeline(PipelineError::Validation(_)) | CliError::InvalidDelay(_) => {
                EXIT_VALIDATION
            }
            CliError::Pipeline(e) if e.is_persist() => EXIT_PERSIST,
            _ => EXIT_FAILURE,
        }
    }
}

impl RunArgs {
    /// Resolve the URL list and build the per-run request
    pub fn to_request(&self) -> Result<RunRequest, CliError> {
        let urls = match &self.urls_file {
            Some(path) => read_url_file(path).map_err(|source| CliError::UrlFile {
                path: path.clone(),
                source,
            })?,
            None => self
                .urls
                .iter()
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect(),
        };

        Ok(RunRequest::new(urls, self.start, expand_home(&self.dest))
            .with_prefix(self.prefix.clone())
            .with_end(self.end)
            .with_pad_width(self.pad))
    }

    /// Apply flag overrides on top of environment configuration
    pub fn apply(&self, mut config: PipelineConfig) -> Result<PipelineConfig, CliError> {
        if let Some(store) = &self.store {
            config = config.with_store_path(expand_home(store));
        }
        if let Some(template) = &self.template {
            config = config.with_template(Some(expand_home(template)));
        }

        let min = self.min_delay.map(secs).transpose()?.unwrap_or(config.min_delay);
        let max = self.max_delay.map(secs).transpose()?.unwrap_or(config.max_delay);
        Ok(config.with_delay_window(min, max))
    }

    fn adapter_config(&self, config: &PipelineConfig) -> YtDlpConfig {
        let timeout = u32::try_from(config.fetch_timeout.as_secs()).unwrap_or(u32::MAX);
        YtDlpConfig::default()
            .with_proxy(self.proxy.clone())
            .with_cookies_path(self.cookies.as_deref().map(|p| expand_home(p).display().to_string()))
            .with_timeout(timeout.max(1))
    }
}

fn secs(value: f64) -> Result<Duration, CliError> {
    if value.is_finite() && value >= 0.0 {
        Ok(Duration::from_secs_f64(value))
    } else {
        Err(CliError::InvalidDelay(format!("{} is not a non-negative number of seconds", value)))
    }
}

/// Parse arguments, dispatch, and return the process exit code
pub async fn run() -> u8 {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => match run_pipeline(&args).await {
            Ok(summary) if summary.was_cancelled() => EXIT_CANCELLED,
            Ok(_) => EXIT_OK,
            Err(e) => {
                eprintln!("error: {}", e);
                e.exit_code()
            }
        },
        Command::Slots(args) => {
            for slot in assign(&args.prefix, args.start, args.count, args.pad) {
                println!("{}", slot.name);
            }
            EXIT_OK
        }
        Command::Check => check(),
    }
}

async fn run_pipeline(args: &RunArgs) -> Result<RunSummary, CliError> {
    let config = args.apply(PipelineConfig::from_env())?;
    let request = args.to_request()?;
    let adapter: Arc<dyn FetchAdapter> = Arc::new(YtDlpAdapter::new(args.adapter_config(&config))?);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current item and saving results");
            on_signal.cancel();
        }
    });

    info!(
        urls = request.urls.len(),
        store = %config.store_path.display(),
        "starting run"
    );

    let mut pipeline = Pipeline::new(adapter, config).with_progress(Arc::new(LogProgress));
    let summary = pipeline.run(&request, &cancel).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{}: {} assigned, {} skipped, {} error notes, {} fetched, {} from cache",
            summary.final_state,
            summary.assigned,
            summary.skipped,
            summary.error_notes,
            summary.fetched,
            summary.cache_hits
        );
    }

    Ok(summary)
}

fn check() -> u8 {
    let info = ToolManager::new().get_tool_info();
    match (&info.path, &info.version) {
        (Some(path), Some(version)) => {
            println!("{} {} ({})", info.name, version, path);
            EXIT_OK
        }
        (Some(path), None) => {
            println!("{} found at {} but --version failed", info.name, path);
            EXIT_FAILURE
        }
        _ => {
            println!("{} not found; install it or set {}", info.name, crate::pipeline::tools::YTDLP_ENV);
            EXIT_FAILURE
        }
    }
}
