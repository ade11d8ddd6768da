use anyhow::{Context, Result};
use log::warn;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_COOKIES_FILE: &str = "cookies/douyin.json";
const DEFAULT_AGENT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_AGENT_MODEL: &str = "deepseek/deepseek-v3.2-251201";

/// Process-wide configuration, read once from the environment at startup and
/// passed by reference into every component.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub addr: String,
    pub port: u16,
    pub browser: BrowserSettings,
    pub session_path: PathBuf,
    pub upload_dir: PathBuf,
    pub debug_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub agent: AgentSettings,
    pub timings: Timings,
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub in_container: bool,
    pub chrome_path: Option<PathBuf>,
    pub profiles_dir: PathBuf,
}

/// Credentials for the semantic UI fallback agent. `api_key == None` disables it.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

/// Every interval and deadline used by the automation. Kept in one place so a
/// run can be tuned without touching the drivers.
#[derive(Debug, Clone)]
pub struct Timings {
    pub chrome_ready: Duration,
    pub navigation: Duration,
    pub session_settle: Duration,
    pub file_input_wait: Duration,
    pub file_input_interval: Duration,
    pub publish_view_interval: Duration,
    pub publish_view_deadline: Duration,
    pub completion_interval: Duration,
    pub completion_deadline: Duration,
    pub publish_attempts: u32,
    pub publish_settle: Duration,
    pub redirect_interval: Duration,
    pub redirect_deadline: Duration,
    pub cover_resolutions: u32,
    pub login_interval: Duration,
    pub login_deadline: Duration,
    pub shutdown: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            chrome_ready: Duration::from_secs(30),
            navigation: Duration::from_secs(30),
            session_settle: Duration::from_secs(3),
            file_input_wait: Duration::from_secs(10),
            file_input_interval: Duration::from_millis(500),
            publish_view_interval: Duration::from_secs(1),
            publish_view_deadline: Duration::from_secs(60),
            completion_interval: Duration::from_secs(2),
            completion_deadline: Duration::from_secs(60),
            publish_attempts: 5,
            publish_settle: Duration::from_secs(2),
            redirect_interval: Duration::from_millis(500),
            redirect_deadline: Duration::from_secs(3),
            cover_resolutions: 3,
            login_interval: Duration::from_secs(10),
            login_deadline: Duration::from_secs(300),
            shutdown: Duration::from_secs(10),
        }
    }
}

impl AppConfig {
    /// Build the configuration from environment variables (after `.env` has been loaded).
    pub fn from_env() -> Result<Self> {
        let in_container = detect_container();
        let mut headless = env_bool("HEADLESS", true)?;
        if !headless && cfg!(target_os = "linux") && env::var_os("DISPLAY").is_none() {
            warn!("HEADLESS=false but no DISPLAY is available; falling back to headless mode");
            headless = true;
        }

        let profiles_dir = match env::var("PROFILE_DIR") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => default_profiles_dir()?,
        };

        let mut timings = Timings::default();
        if let Some(secs) = env_parse::<u64>("UPLOAD_TIMEOUT_SECS")? {
            timings.publish_view_deadline = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("COMPLETION_TIMEOUT_SECS")? {
            timings.completion_deadline = Duration::from_secs(secs);
        }

        let max_upload_mb = env_parse::<usize>("MAX_UPLOAD_MB")?.unwrap_or(1024);

        Ok(Self {
            addr: env_string("ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env_parse::<u16>("PORT")?.unwrap_or(3000),
            browser: BrowserSettings {
                headless,
                in_container,
                chrome_path: env_string("CHROME_PATH").map(PathBuf::from),
                profiles_dir,
            },
            session_path: resolve_session_path(env_string("DOUYIN_COOKIES_FILE").as_deref()),
            upload_dir: PathBuf::from(env_string("UPLOAD_DIR").unwrap_or_else(|| "upload".into())),
            debug_dir: PathBuf::from(env_string("DEBUG_DIR").unwrap_or_else(|| "debug".into())),
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            agent: AgentSettings {
                api_key: env_string("OPENAI_API_KEY"),
                base_url: env_string("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_AGENT_BASE_URL.to_string()),
                model: env_string("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_AGENT_MODEL.to_string()),
            },
            timings,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

/// Session file location: an override is taken relative to the working directory.
pub fn resolve_session_path(overridden: Option<&str>) -> PathBuf {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match overridden {
        Some(path) if Path::new(path).is_absolute() => PathBuf::from(path),
        Some(path) => cwd.join(path),
        None => cwd.join(DEFAULT_COOKIES_FILE),
    }
}

/// Base directory for the throwaway Chrome profiles each job runs in
pub fn default_profiles_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Cannot find home directory")?;
    Ok(home.join(".douyin-uploader").join("profiles"))
}

fn detect_container() -> bool {
    if Path::new("/.dockerenv").exists() || env::var_os("container").is_some() {
        return true;
    }
    std::fs::read_to_string("/proc/1/cgroup")
        .map(|body| cgroup_mentions_container(&body))
        .unwrap_or(false)
}

fn cgroup_mentions_container(body: &str) -> bool {
    ["docker", "kubepods", "containerd", "lxc"]
        .iter()
        .any(|marker| body.contains(marker))
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {} ({})", key, raw, e)),
        None => Ok(None),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env_string(key) {
        Some(raw) => parse_bool(&raw)
            .with_context(|| format!("Invalid boolean for {}: {}", key, raw)),
        None => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
impl AppConfig {
    /// Configuration rooted in a scratch directory, for tests.
    pub fn for_tests(root: &Path) -> Self {
        Self {
            addr: "127.0.0.1".into(),
            port: 0,
            browser: BrowserSettings {
                headless: true,
                in_container: false,
                chrome_path: None,
                profiles_dir: root.join("profiles"),
            },
            session_path: root.join("cookies").join("douyin.json"),
            upload_dir: root.join("upload"),
            debug_dir: root.join("debug"),
            max_upload_bytes: 16 * 1024 * 1024,
            agent: AgentSettings {
                api_key: None,
                base_url: DEFAULT_AGENT_BASE_URL.into(),
                model: DEFAULT_AGENT_MODEL.into(),
            },
            timings: Timings::default(),
        }
    }
}

#[cfg(test)]
impl Timings {
    /// Millisecond-scale waits for tests that run on the real clock.
    pub fn fast() -> Self {
        let ms = Duration::from_millis;
        Self {
            chrome_ready: ms(500),
            navigation: ms(500),
            session_settle: ms(10),
            file_input_wait: ms(200),
            file_input_interval: ms(10),
            publish_view_interval: ms(10),
            publish_view_deadline: ms(500),
            completion_interval: ms(10),
            completion_deadline: ms(500),
            publish_attempts: 2,
            publish_settle: ms(10),
            redirect_interval: ms(10),
            redirect_deadline: ms(100),
            cover_resolutions: 1,
            login_interval: ms(10),
            login_deadline: ms(200),
            shutdown: ms(200),
        }
    }
}
