pub mod agent;
pub mod api;
pub mod browser;
pub mod config;
pub mod error;
pub mod job;
pub mod platforms;
pub mod poll;
pub mod session;

use anyhow::Result;
use log::info;
use tokio::io::AsyncBufReadExt;

use browser::ChromeLauncher;
use config::AppConfig;
use job::UploadJob;
use platforms::douyin::{self, PublishReport};
use session::login::{self, SetupOutcome};

/// Run the HTTP API until the process is stopped.
pub async fn run_server(config: AppConfig) -> Result<()> {
    api::serve(config).await
}

/// Check the session file and, unless `check_only`, regenerate it through an
/// interactive QR login when it is missing, invalid, or `force` is set.
pub async fn run_login(config: &AppConfig, check_only: bool, force: bool) -> Result<SetupOutcome> {
    let headed = ChromeLauncher::new(config).headed();
    let checker = ChromeLauncher::new(config);
    let outcome = login::setup(
        &headed,
        &checker,
        &config.session_path,
        &config.timings,
        check_only,
        force,
        wait_for_enter(),
    )
    .await?;
    info!("[扫码登录] {:?}: {}", outcome, config.session_path.display());
    Ok(outcome)
}

/// Publish one video with the real browser.
pub async fn run_upload(config: &AppConfig, job: &UploadJob) -> Result<PublishReport> {
    let launcher = ChromeLauncher::new(config);
    let agent = agent::agent_from_config(&config.agent)?;
    let report = douyin::perform_upload(config, &launcher, agent.as_ref(), job).await?;
    Ok(report)
}

/// Resolves when the operator presses Enter; never resolves if stdin is closed.
async fn wait_for_enter() {
    let mut line = String::new();
    let mut reader = tokio::io::BufReader::new(tokio::io::stdin());
    match reader.read_line(&mut line).await {
        Ok(n) if n > 0 => {}
        _ => std::future::pending::<()>().await,
    }
}
