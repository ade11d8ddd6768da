//! Decides whether a saved session still logs us in.

use log::{info, warn};
use std::fmt;
use std::path::Path;

use super::store;
use crate::browser::{BrowserContext, ContextLauncher};
use crate::config::Timings;
use crate::error::UploadError;
use crate::platforms::common::{first_match, Strategy};

/// Where to look and what a logged-out page shows.
#[derive(Debug, Clone, Copy)]
pub struct LoginCheck<'a> {
    pub url: &'a str,
    pub markers: &'a [Strategy],
}

pub enum SessionValidity {
    /// The context is live and authenticated; the caller owns its shutdown.
    Valid(Box<dyn BrowserContext>),
    Missing,
    Expired,
    CheckError(String),
}

impl fmt::Debug for SessionValidity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid(_) => f.write_str("Valid"),
            Self::Missing => f.write_str("Missing"),
            Self::Expired => f.write_str("Expired"),
            Self::CheckError(reason) => write!(f, "CheckError({})", reason),
        }
    }
}

impl SessionValidity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn into_context(self, path: &Path) -> Result<Box<dyn BrowserContext>, UploadError> {
        match self {
            Self::Valid(ctx) => Ok(ctx),
            Self::Missing => Err(UploadError::SessionMissing(path.to_path_buf())),
            Self::Expired => Err(UploadError::SessionExpired),
            Self::CheckError(reason) => Err(UploadError::SessionCheckError(reason)),
        }
    }
}

/// Validate the session stored at `path`.
///
/// Missing or malformed files are classified without starting a browser. A
/// `Valid` result hands back the live context; every other outcome has already
/// shut its context down. Nothing is written to disk.
pub async fn validate(
    launcher: &dyn ContextLauncher,
    path: &Path,
    check: &LoginCheck<'_>,
    timings: &Timings,
) -> SessionValidity {
    let session = match store::load(path) {
        Ok(Some(session)) => session,
        Ok(None) => {
            warn!("[Cookie 校验] 文件不存在: {}", path.display());
            return SessionValidity::Missing;
        }
        Err(e) => {
            warn!("[Cookie 校验] 文件无法解析: {:#}", e);
            return SessionValidity::CheckError(format!("{:#}", e));
        }
    };

    let now = chrono::Utc::now().timestamp() as f64;
    let cookies = session.live_cookies(now);
    if cookies.len() < session.cookies.len() {
        info!(
            "[Cookie 校验] 跳过 {} 个已过期 cookie",
            session.cookies.len() - cookies.len()
        );
    }

    let mut ctx = match launcher.launch().await {
        Ok(ctx) => ctx,
        Err(e) => return SessionValidity::CheckError(format!("{:#}", e)),
    };

    let outcome = async {
        let page = ctx.page();
        page.set_cookies(&cookies).await?;
        tokio::time::timeout(timings.navigation, page.navigate(check.url))
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "打开 {} 超时（{} 秒）",
                    check.url,
                    timings.navigation.as_secs()
                )
            })??;
        tokio::time::sleep(timings.session_settle).await;
        first_match(page, "Cookie 校验", check.markers).await
    }
    .await;

    match outcome {
        Ok(None) => {
            info!("[Cookie 校验] Cookie 有效");
            SessionValidity::Valid(ctx)
        }
        Ok(Some(marker)) => {
            warn!("[Cookie 校验] 出现登录入口 ({}), Cookie 已失效", marker);
            ctx.shutdown().await;
            SessionValidity::Expired
        }
        Err(e) => {
            warn!("[Cookie 校验] 校验失败: {:#}", e);
            ctx.shutdown().await;
            SessionValidity::CheckError(format!("{:#}", e))
        }
    }
}
