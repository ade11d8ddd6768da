//! Scripted in-memory page for exercising the Douyin flow without Chrome.
//!
//! The page is a set of "shown" keys. A `Probe` or `ClickTarget` matches when
//! its display string is shown; clicks and file selections can trigger
//! effects, optionally delayed on the tokio clock.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use super::page::{BrowserContext, ClickTarget, ContextLauncher, FieldCandidate, FillMethod, PageDriver, Probe};
use crate::session::store::CookieRecord;

#[derive(Debug, Clone)]
pub enum Effect {
    SetUrl(String),
    Show(String),
    Hide(String),
    After(Duration, Box<Effect>),
}

impl Effect {
    pub fn show(key: impl Display) -> Self {
        Self::Show(key.to_string())
    }

    pub fn hide(key: impl Display) -> Self {
        Self::Hide(key.to_string())
    }

    pub fn url(url: &str) -> Self {
        Self::SetUrl(url.to_string())
    }

    pub fn after(delay: Duration, effect: Effect) -> Self {
        Self::After(delay, Box::new(effect))
    }
}

#[derive(Default)]
struct State {
    url: String,
    shown: HashSet<String>,
    on_click: HashMap<String, Vec<Effect>>,
    on_files: Vec<Effect>,
    scheduled: Vec<(Instant, Effect)>,
    values: HashMap<String, String>,
    rich: HashSet<String>,
    broken_fills: HashSet<FillMethod>,
    candidates: Vec<FieldCandidate>,
    fail_navigation: bool,
    clicks: Vec<String>,
    fills: Vec<(String, FillMethod)>,
    navigations: Vec<String>,
    files: Vec<(String, PathBuf)>,
    cookies: Vec<CookieRecord>,
    screenshots: Vec<PathBuf>,
}

impl State {
    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::SetUrl(url) => self.url = url,
            Effect::Show(key) => {
                self.shown.insert(key);
            }
            Effect::Hide(key) => {
                self.shown.remove(&key);
            }
            Effect::After(delay, inner) => self.scheduled.push((Instant::now() + delay, *inner)),
        }
    }

    fn apply_due(&mut self) {
        let now = Instant::now();
        let (due, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.scheduled).into_iter().partition(|(at, _)| *at <= now);
        self.scheduled = pending;
        for (_, effect) in due {
            self.apply(effect);
        }
    }

    fn has_selector(&self, selector: &str) -> bool {
        self.shown.contains(&format!("selector:{}", selector))
            || self.shown.contains(&format!("visible:{}", selector))
    }
}

pub struct FakePage {
    state: Mutex<State>,
}

impl FakePage {
    pub fn new(url: &str) -> Self {
        Self {
            state: Mutex::new(State {
                url: url.to_string(),
                ..State::default()
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        state.apply_due();
        f(&mut state)
    }

    pub fn show(&self, key: impl Display) -> &Self {
        self.with(|s| s.shown.insert(key.to_string()));
        self
    }

    pub fn hide(&self, key: impl Display) -> &Self {
        self.with(|s| s.shown.remove(&key.to_string()));
        self
    }

    pub fn on_click(&self, target: ClickTarget, effects: Vec<Effect>) -> &Self {
        self.with(|s| s.on_click.insert(target.to_string(), effects));
        self
    }

    pub fn on_files(&self, effects: Vec<Effect>) -> &Self {
        self.with(|s| s.on_files = effects);
        self
    }

    pub fn schedule(&self, effect: Effect) -> &Self {
        self.with(|s| s.apply(effect));
        self
    }

    pub fn rich_text(&self, selector: &str) -> &Self {
        self.with(|s| s.rich.insert(selector.to_string()));
        self
    }

    /// Fills with `method` report success but leave the field empty.
    pub fn break_fill(&self, method: FillMethod) -> &Self {
        self.with(|s| s.broken_fills.insert(method));
        self
    }

    pub fn set_candidates(&self, candidates: Vec<FieldCandidate>) -> &Self {
        self.with(|s| s.candidates = candidates);
        self
    }

    pub fn fail_navigation(&self) -> &Self {
        self.with(|s| s.fail_navigation = true);
        self
    }

    pub fn current_url(&self) -> String {
        self.with(|s| s.url.clone())
    }

    pub fn clicks(&self) -> Vec<String> {
        self.with(|s| s.clicks.clone())
    }

    pub fn click_count(&self, target: ClickTarget) -> usize {
        let key = target.to_string();
        self.with(|s| s.clicks.iter().filter(|c| **c == key).count())
    }

    pub fn fills(&self) -> Vec<(String, FillMethod)> {
        self.with(|s| s.fills.clone())
    }

    pub fn value(&self, selector: &str) -> Option<String> {
        self.with(|s| s.values.get(selector).cloned())
    }

    pub fn navigations(&self) -> Vec<String> {
        self.with(|s| s.navigations.clone())
    }

    pub fn files(&self) -> Vec<(String, PathBuf)> {
        self.with(|s| s.files.clone())
    }

    pub fn installed_cookies(&self) -> Vec<CookieRecord> {
        self.with(|s| s.cookies.clone())
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.with(|s| s.screenshots.clone())
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn url(&self) -> Result<String> {
        Ok(self.current_url())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.with(|s| {
            s.navigations.push(url.to_string());
            if s.fail_navigation {
                bail!("net::ERR_CONNECTION_RESET at {}", url);
            }
            s.url = url.to_string();
            Ok(())
        })
    }

    async fn probe(&self, probe: &Probe) -> Result<bool> {
        let key = probe.to_string();
        Ok(self.with(|s| s.shown.contains(&key)))
    }

    async fn reveal(&self, selector: &str) -> Result<bool> {
        Ok(self.with(|s| s.has_selector(selector)))
    }

    async fn click(&self, target: &ClickTarget) -> Result<bool> {
        let key = target.to_string();
        Ok(self.with(|s| {
            if !s.shown.contains(&key) {
                return false;
            }
            s.clicks.push(key.clone());
            if let Some(effects) = s.on_click.get(&key).cloned() {
                for effect in effects {
                    s.apply(effect);
                }
            }
            true
        }))
    }

    async fn set_input_files(&self, selector: &str, path: &Path) -> Result<bool> {
        Ok(self.with(|s| {
            if !s.has_selector(selector) {
                return false;
            }
            s.files.push((selector.to_string(), path.to_path_buf()));
            for effect in s.on_files.clone() {
                s.apply(effect);
            }
            true
        }))
    }

    async fn is_rich_text(&self, selector: &str) -> Result<bool> {
        Ok(self.with(|s| s.rich.contains(selector)))
    }

    async fn fill(&self, selector: &str, text: &str, method: FillMethod) -> Result<bool> {
        Ok(self.with(|s| {
            if !s.has_selector(selector) {
                return false;
            }
            s.fills.push((selector.to_string(), method));
            let stored = if s.broken_fills.contains(&method) {
                String::new()
            } else {
                text.to_string()
            };
            s.values.insert(selector.to_string(), stored);
            true
        }))
    }

    async fn read_value(&self, selector: &str) -> Result<Option<String>> {
        Ok(self.with(|s| s.values.get(selector).cloned()))
    }

    async fn field_candidates(&self) -> Result<Vec<FieldCandidate>> {
        Ok(self.with(|s| {
            for c in &s.candidates {
                s.shown.insert(format!("selector:{}", c.selector));
            }
            s.candidates.clone()
        }))
    }

    async fn set_cookies(&self, cookies: &[CookieRecord]) -> Result<()> {
        self.with(|s| s.cookies.extend_from_slice(cookies));
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<CookieRecord>> {
        Ok(self.installed_cookies())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.with(|s| s.screenshots.push(path.to_path_buf()));
        Ok(())
    }
}

/// Launcher handing out contexts around one shared `FakePage`.
pub struct FakeLauncher {
    pub page: Arc<FakePage>,
    launches: AtomicU32,
    shutdowns: Arc<AtomicU32>,
    fail: bool,
}

impl FakeLauncher {
    pub fn new(page: FakePage) -> Self {
        Self {
            page: Arc::new(page),
            launches: AtomicU32::new(0),
            shutdowns: Arc::new(AtomicU32::new(0)),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(FakePage::new("about:blank"))
        }
    }

    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> u32 {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserContext>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("CHROME_NOT_READY: fake launcher refuses to start");
        }
        Ok(Box::new(FakeContext {
            page: self.page.clone(),
            shutdowns: self.shutdowns.clone(),
            closed: false,
        }))
    }
}

pub struct FakeContext {
    page: Arc<FakePage>,
    shutdowns: Arc<AtomicU32>,
    closed: bool,
}

#[async_trait]
impl BrowserContext for FakeContext {
    fn page(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }

    async fn shutdown(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }
}
