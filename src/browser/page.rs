//! The seam between the Douyin flow and a live browser.
//!
//! Drivers only talk to `PageDriver`; `ChromePage` implements it over CDP and
//! the tests implement it with a scripted fake.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::session::store::CookieRecord;

/// A yes/no question asked of the current DOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Probe {
    /// At least one element matches the CSS selector.
    Selector(&'static str),
    /// At least one matching element is rendered with a non-zero box.
    VisibleSelector(&'static str),
    /// An element matching the selector has text containing the needle.
    SelectorText(&'static str, &'static str),
    /// The page's rendered text contains the needle anywhere.
    PageText(&'static str),
    /// A visible element's own text contains the needle.
    VisibleText(&'static str),
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selector(sel) => write!(f, "selector:{}", sel),
            Self::VisibleSelector(sel) => write!(f, "visible:{}", sel),
            Self::SelectorText(sel, text) => write!(f, "selector_text:{}|{}", sel, text),
            Self::PageText(text) => write!(f, "page_text:{}", text),
            Self::VisibleText(text) => write!(f, "visible_text:{}", text),
        }
    }
}

/// Something to click, from most to least precise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClickTarget {
    /// First visible element matching the selector.
    Selector(&'static str),
    /// First visible element in `scope` whose trimmed text equals `text`.
    ExactText { scope: &'static str, text: &'static str },
    /// First visible element in `scope` whose text contains `text`.
    PartialText { scope: &'static str, text: &'static str },
    /// `element.click()` on the deepest element whose text equals `text`,
    /// bypassing visibility and pointer checks.
    DomText(&'static str),
}

impl fmt::Display for ClickTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selector(sel) => write!(f, "selector:{}", sel),
            Self::ExactText { scope, text } => write!(f, "exact:{}|{}", scope, text),
            Self::PartialText { scope, text } => write!(f, "partial:{}|{}", scope, text),
            Self::DomText(text) => write!(f, "dom_text:{}", text),
        }
    }
}

/// How text is put into a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FillMethod {
    /// Native value setter plus input/change events (form inputs).
    Fill,
    /// Direct assignment of value / innerText.
    SetValue,
    /// One `Input.insertText` per character.
    TypeChars,
    /// Key down/up events carrying each character.
    KeyStrokes,
    /// Synthetic clipboard paste.
    ClipboardPaste,
}

impl FillMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fill => "fill",
            Self::SetValue => "set_value",
            Self::TypeChars => "type_chars",
            Self::KeyStrokes => "key_strokes",
            Self::ClipboardPaste => "clipboard_paste",
        }
    }
}

/// An editable element offered to the semantic agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCandidate {
    pub index: usize,
    /// Selector that addresses exactly this element.
    pub selector: String,
    pub tag: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub text: String,
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn url(&self) -> Result<String>;
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn probe(&self, probe: &Probe) -> Result<bool>;
    /// Scroll the first element matching `selector` into view; falls back to
    /// the top of the page. Returns whether the element existed.
    async fn reveal(&self, selector: &str) -> Result<bool>;
    /// Returns `false` when nothing matched the target.
    async fn click(&self, target: &ClickTarget) -> Result<bool>;
    /// Returns `false` when no file input matched the selector.
    async fn set_input_files(&self, selector: &str, path: &Path) -> Result<bool>;
    async fn is_rich_text(&self, selector: &str) -> Result<bool>;
    async fn fill(&self, selector: &str, text: &str, method: FillMethod) -> Result<bool>;
    async fn read_value(&self, selector: &str) -> Result<Option<String>>;
    async fn field_candidates(&self) -> Result<Vec<FieldCandidate>>;
    async fn set_cookies(&self, cookies: &[CookieRecord]) -> Result<()>;
    async fn cookies(&self) -> Result<Vec<CookieRecord>>;
    async fn screenshot(&self, path: &Path) -> Result<()>;
}

/// A live, isolated browser plus its page.
#[async_trait]
pub trait BrowserContext: Send + Sync {
    fn page(&self) -> &dyn PageDriver;
    /// Release every resource. Must be safe to call more than once.
    async fn shutdown(&mut self);
}

/// Creates fresh isolated contexts.
#[async_trait]
pub trait ContextLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserContext>>;
}
