use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Missing .env is fine; the environment and flags still apply.
    let _ = dotenvy::dotenv();
    lctc_pipeline_lib::logging::init();

    ExitCode::from(lctc_pipeline_lib::run().await)
}
