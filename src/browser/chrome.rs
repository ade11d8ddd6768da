use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use log::{info, warn};
use serde::Deserialize;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::automation::{self, ChromePage};
use super::page::{BrowserContext, ContextLauncher, PageDriver};
use crate::config::AppConfig;

const DEBUG_PORT_START: u16 = 9300;
const DEBUG_PORT_END: u16 = 9800;

#[derive(Debug, Deserialize)]
struct CdpTarget {
    #[serde(rename = "type")]
    target_type: String,
}

/// Allocate an available debugging port by probing localhost listeners.
pub fn allocate_port() -> Result<u16> {
    for port in DEBUG_PORT_START..=DEBUG_PORT_END {
        if TcpListener::bind(("127.0.0.1", port)).is_ok() {
            return Ok(port);
        }
    }

    bail!(
        "No available Chrome debugging port in range {}-{}",
        DEBUG_PORT_START,
        DEBUG_PORT_END
    )
}

/// Detect Chrome installation path on the current OS
pub fn detect_chrome() -> Result<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        let paths = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        for p in &paths {
            let path = PathBuf::from(p);
            if path.exists() {
                return Ok(path);
            }
        }
        if let Ok(path) = which::which("google-chrome") {
            return Ok(path);
        }
    }

    #[cfg(target_os = "windows")]
    {
        let paths = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ];
        for p in &paths {
            let path = PathBuf::from(p);
            if path.exists() {
                return Ok(path);
            }
        }
        if let Ok(path) = which::which("chrome") {
            return Ok(path);
        }
    }

    #[cfg(target_os = "linux")]
    {
        let names = [
            "google-chrome",
            "google-chrome-stable",
            "chromium-browser",
            "chromium",
        ];
        for name in &names {
            if let Ok(path) = which::which(name) {
                return Ok(path);
            }
        }
    }

    bail!("Could not find Chrome browser. Please install Google Chrome or set CHROME_PATH.")
}

/// Create a fresh, uniquely named profile directory for one job.
pub fn create_job_profile_dir(base: &Path) -> Result<PathBuf> {
    let name = format!(
        "job-{}-{:08x}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>()
    );
    let profile_dir = base.join(name);
    std::fs::create_dir_all(&profile_dir)
        .with_context(|| format!("Failed to create profile dir {}", profile_dir.display()))?;
    Ok(profile_dir)
}

/// Delete a Chrome profile directory
pub fn delete_profile(profile_dir: &Path) -> Result<()> {
    if profile_dir.exists() {
        std::fs::remove_dir_all(profile_dir)?;
        info!("Deleted Chrome profile: {}", profile_dir.display());
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub in_container: bool,
}

/// Command-line flags for one automation Chrome instance.
pub fn chrome_args(profile_dir: &Path, port: u16, opts: &LaunchOptions) -> Vec<String> {
    let mut args = vec![
        format!("--user-data-dir={}", profile_dir.display()),
        format!("--remote-debugging-port={}", port),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-default-apps".to_string(),
        "--deny-permission-prompts".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        format!("--window-size={},{}", 1280, 800),
    ];
    if opts.headless {
        args.push("--headless=new".to_string());
    }
    if opts.in_container {
        args.push("--no-sandbox".to_string());
        args.push("--disable-dev-shm-usage".to_string());
    }
    args.push("about:blank".to_string());
    args
}

/// Launch Chrome with a debugging port and return (Child, port)
pub fn launch_chrome_with_debug(
    chrome_path: &Path,
    profile_dir: &Path,
    opts: &LaunchOptions,
) -> Result<(Child, u16)> {
    let port = allocate_port()?;
    info!(
        "[Chrome launch] preparing profile={} port={} headless={}",
        profile_dir.display(),
        port,
        opts.headless
    );

    let child = Command::new(chrome_path)
        .args(chrome_args(profile_dir, port, opts))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .context("Failed to launch Chrome")?;

    info!(
        "Launched Chrome (PID: {:?}, port: {}) profile: {}",
        child.id(),
        port,
        profile_dir.display()
    );
    Ok((child, port))
}

/// Wait for the Chrome debugging endpoint to expose a page target.
pub async fn wait_for_chrome_ready(port: u16, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    let mut saw_version = false;

    loop {
        if start.elapsed() > timeout {
            if saw_version {
                bail!(
                    "CHROME_NOT_READY: Chrome 调试端口 {} 可访问，但在 {} 秒内没有可操作页面。",
                    port,
                    timeout.as_secs()
                );
            }
            bail!(
                "CHROME_NOT_READY: Chrome 在 {} 秒内未就绪（端口 {}）。请检查 Chrome 是否成功启动后重试。",
                timeout.as_secs(),
                port
            );
        }

        let version_url = format!("http://127.0.0.1:{}/json/version", port);
        if let Ok(resp) = reqwest::get(&version_url).await {
            if resp.status().is_success() {
                saw_version = true;
                match has_page_target(port).await {
                    Ok(true) => {
                        info!("Chrome is ready on port {}", port);
                        return Ok(());
                    }
                    Ok(false) => {
                        info!(
                            "Chrome version endpoint ready on port {}, waiting for page target...",
                            port
                        );
                    }
                    Err(e) => {
                        info!(
                            "Chrome version endpoint ready on port {}, page target check failed: {}",
                            port, e
                        );
                    }
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

async fn has_page_target(port: u16) -> Result<bool> {
    let list_url = format!("http://127.0.0.1:{}/json/list", port);
    let resp = reqwest::get(&list_url)
        .await
        .context("请求 Chrome json/list 失败")?;

    if !resp.status().is_success() {
        return Ok(false);
    }

    let body = resp.text().await.unwrap_or_default();
    let targets: Vec<CdpTarget> = serde_json::from_str(&body).unwrap_or_default();
    Ok(targets.iter().any(|target| target.target_type == "page"))
}

/// Starts one Chrome process per context, each in its own throwaway profile.
pub struct ChromeLauncher {
    chrome_path: Option<PathBuf>,
    profiles_dir: PathBuf,
    options: LaunchOptions,
    ready_timeout: Duration,
    shutdown_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            chrome_path: config.browser.chrome_path.clone(),
            profiles_dir: config.browser.profiles_dir.clone(),
            options: LaunchOptions {
                headless: config.browser.headless,
                in_container: config.browser.in_container,
            },
            ready_timeout: config.timings.chrome_ready,
            shutdown_timeout: config.timings.shutdown,
        }
    }

    /// Same launcher, but with a visible window (interactive login).
    pub fn headed(mut self) -> Self {
        self.options.headless = false;
        self
    }

    async fn start(&self, profile_dir: &Path) -> Result<(Child, Browser, JoinHandle<()>, ChromePage)> {
        let chrome_path = match &self.chrome_path {
            Some(path) => path.clone(),
            None => detect_chrome()?,
        };
        let (child, port) = launch_chrome_with_debug(&chrome_path, profile_dir, &self.options)?;
        wait_for_chrome_ready(port, self.ready_timeout).await?;
        let (browser, handler, page) = automation::connect_to_chrome(port).await?;
        Ok((child, browser, handler, ChromePage::new(page)))
    }
}

#[async_trait]
impl ContextLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserContext>> {
        let profile_dir = create_job_profile_dir(&self.profiles_dir)?;
        match self.start(&profile_dir).await {
            Ok((child, browser, handler, page)) => Ok(Box::new(ChromeContext {
                page,
                browser: Some(browser),
                handler: Some(handler),
                child: Some(child),
                profile_dir,
                shutdown_timeout: self.shutdown_timeout,
            })),
            Err(e) => {
                // the child was dropped with kill_on_drop; only the profile is left
                if let Err(cleanup) = delete_profile(&profile_dir) {
                    warn!("Failed to delete Chrome profile {}: {}", profile_dir.display(), cleanup);
                }
                Err(e)
            }
        }
    }
}

pub struct ChromeContext {
    page: ChromePage,
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    child: Option<Child>,
    profile_dir: PathBuf,
    shutdown_timeout: Duration,
}

#[async_trait]
impl BrowserContext for ChromeContext {
    fn page(&self) -> &dyn PageDriver {
        &self.page
    }

    async fn shutdown(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            match tokio::time::timeout(self.shutdown_timeout, browser.close()).await {
                Ok(Ok(_)) => info!("[Chrome shutdown] browser closed"),
                Ok(Err(e)) => warn!("[Chrome shutdown] close failed: {}", e),
                Err(_) => warn!(
                    "[Chrome shutdown] close did not finish within {}s, killing process",
                    self.shutdown_timeout.as_secs()
                ),
            }
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        if let Some(mut child) = self.child.take() {
            if let Ok(Err(e)) = tokio::time::timeout(self.shutdown_timeout, child.kill()).await {
                warn!("[Chrome shutdown] kill failed: {}", e);
            }
        }
        if let Err(e) = delete_profile(&self.profile_dir) {
            warn!(
                "Failed to delete Chrome profile {}: {}",
                self.profile_dir.display(),
                e
            );
        }
    }
}

impl Drop for ChromeContext {
    // shutdown() was skipped: kill the process and remove the profile anyway
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        if let Some(mut child) = self.child.take() {
            warn!("[Chrome shutdown] context dropped without shutdown, killing process");
            if let Err(e) = child.start_kill() {
                warn!("[Chrome shutdown] kill failed: {}", e);
            }
            if let Err(e) = delete_profile(&self.profile_dir) {
                warn!(
                    "Failed to delete Chrome profile {}: {}",
                    self.profile_dir.display(),
                    e
                );
            }
        }
    }
}
