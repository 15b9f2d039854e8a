//! Tracing subscriber setup for the pipeline binary.
//!
//! Filter comes from `RUST_LOG` (default `lctc_pipeline=info`). Output goes to
//! stderr so stdout stays clean for `slots` and `check`; set `LCTC_LOG_FORMAT=json`
//! for one JSON object per line.

use tracing_subscriber::EnvFilter;

pub const LOG_FORMAT_ENV: &str = "LCTC_LOG_FORMAT";

const DEFAULT_FILTER: &str = "lctc_pipeline=info,lctc_pipeline_lib=info";

/// Install the global subscriber. Later calls are no-ops.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    if wants_json() {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}

fn wants_json() -> bool {
    std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
