//! Session file persistence.
//!
//! The file is a Playwright-style storage state: a `cookies` array plus an
//! optional `origins` array that is carried through untouched.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionFile {
    pub cookies: Vec<CookieRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub origins: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Unix seconds; `None` for a session cookie (`-1` on disk).
    #[serde(
        default,
        deserialize_with = "deserialize_expires",
        serialize_with = "serialize_expires"
    )]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: SameSite,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl CookieRecord {
    pub fn is_expired_at(&self, now_unix: f64) -> bool {
        matches!(self.expires, Some(exp) if exp <= now_unix)
    }
}

impl SessionFile {
    /// Cookies still worth installing into a browser at `now_unix`.
    pub fn live_cookies(&self, now_unix: f64) -> Vec<CookieRecord> {
        self.cookies
            .iter()
            .filter(|c| !c.is_expired_at(now_unix))
            .cloned()
            .collect()
    }
}

/// Read a session file. `Ok(None)` when the file does not exist; an error when
/// it exists but cannot be read or parsed.
pub fn load(path: &Path) -> Result<Option<SessionFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session file {}", path.display()))?;
    let session: SessionFile = serde_json::from_str(&body)
        .with_context(|| format!("Session file {} is not a valid cookie document", path.display()))?;
    Ok(Some(session))
}

/// Write a session file, creating parent directories. The write goes through a
/// sibling temp file so a crash never leaves a half-written session behind.
pub fn save(path: &Path, session: &SessionFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let body = serde_json::to_string_pretty(session)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move session file into {}", path.display()))?;
    Ok(())
}

fn default_path() -> String {
    "/".to_string()
}

fn deserialize_expires<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.filter(|v| *v > 0.0))
}

fn serialize_expires<S>(value: &Option<f64>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(value.unwrap_or(-1.0))
}
