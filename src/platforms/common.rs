//! Detection and click helpers shared by the platform drivers.

use anyhow::Result;
use log::{debug, info};

use crate::browser::{ClickTarget, PageDriver, Probe};

/// One named way of detecting something on the page.
#[derive(Debug, Clone, Copy)]
pub struct Strategy {
    pub name: &'static str,
    pub probe: Probe,
}

impl Strategy {
    pub const fn new(name: &'static str, probe: Probe) -> Self {
        Self { name, probe }
    }
}

/// One named way of clicking something.
#[derive(Debug, Clone, Copy)]
pub struct ClickStrategy {
    pub name: &'static str,
    pub target: ClickTarget,
}

impl ClickStrategy {
    pub const fn new(name: &'static str, target: ClickTarget) -> Self {
        Self { name, target }
    }
}

/// Try `strategies` in order and return the name of the first that matches.
/// `step` only prefixes the log line.
pub async fn first_match(
    page: &dyn PageDriver,
    step: &str,
    strategies: &[Strategy],
) -> Result<Option<&'static str>> {
    for strategy in strategies {
        if page.probe(&strategy.probe).await? {
            info!("[{}] matched {} ({})", step, strategy.name, strategy.probe);
            return Ok(Some(strategy.name));
        }
        debug!("[{}] no match for {}", step, strategy.name);
    }
    Ok(None)
}

/// Like `first_match`, but a probe that fails to evaluate (page mid-navigation)
/// counts as no match.
pub async fn first_match_lenient(
    page: &dyn PageDriver,
    step: &str,
    strategies: &[Strategy],
) -> Option<&'static str> {
    for strategy in strategies {
        match page.probe(&strategy.probe).await {
            Ok(true) => {
                info!("[{}] matched {} ({})", step, strategy.name, strategy.probe);
                return Some(strategy.name);
            }
            Ok(false) => {}
            Err(e) => debug!("[{}] probe {} failed: {}", step, strategy.name, e),
        }
    }
    None
}

/// Click the first target that exists. Returns the strategy name used.
pub async fn click_first(
    page: &dyn PageDriver,
    step: &str,
    strategies: &[ClickStrategy],
) -> Option<&'static str> {
    for strategy in strategies {
        match page.click(&strategy.target).await {
            Ok(true) => {
                info!("[{}] clicked via {} ({})", step, strategy.name, strategy.target);
                return Some(strategy.name);
            }
            Ok(false) => debug!("[{}] {} not found", step, strategy.name),
            Err(e) => debug!("[{}] click via {} failed: {}", step, strategy.name, e),
        }
    }
    None
}

/// Read-back check for filled fields. Editors reflow whitespace and may wrap
/// the text, so whitespace is ignored and extra surrounding text is accepted.
pub fn value_matches(actual: &str, expected: &str) -> bool {
    let squash = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    let expected = squash(expected);
    !expected.is_empty() && squash(actual).contains(&expected)
}

/// Whether `url` is on `host` and under one of `paths`.
pub fn is_target_url(url: &str, host: &str, paths: &[&str]) -> bool {
    url.contains(host) && path_allowed(url, paths)
}

fn path_allowed(url: &str, allowed_paths: &[&str]) -> bool {
    if allowed_paths.is_empty() {
        return true;
    }
    allowed_paths.iter().any(|path| url.contains(path))
}
