//! Interactive cookie generation: the operator scans the QR code in a visible
//! browser and the resulting cookies become the session file.

use anyhow::{Context, Result};
use log::{info, warn};
use std::future::Future;
use std::path::Path;

use super::store::{self, SessionFile};
use super::validator::{self, SessionValidity};
use crate::browser::{ContextLauncher, PageDriver};
use crate::config::Timings;
use crate::platforms::common::{first_match_lenient, is_target_url};
use crate::platforms::douyin::selectors::{HOST, LOGIN_CHECK, LOGIN_URL};
use crate::poll::{poll_until, PollPolicy};

/// What `setup` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    AlreadyValid,
    Invalid,
    Generated,
    GenerateFailed,
}

impl SetupOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::AlreadyValid | Self::Generated)
    }
}

/// Logged in once the portal shows no login entry and we are still on it.
pub async fn is_logged_in(page: &dyn PageDriver) -> bool {
    let on_portal = match page.url().await {
        Ok(url) => is_target_url(&url, HOST, &[]),
        Err(_) => false,
    };
    on_portal && first_match_lenient(page, "扫码登录", LOGIN_CHECK.markers).await.is_none()
}

pub async fn wait_for_login(page: &dyn PageDriver, policy: PollPolicy) -> bool {
    poll_until(policy, || is_logged_in(page)).await
}

/// Open a visible browser on the portal and save its cookies once the operator
/// has logged in (or pressed Enter via `confirmed`). Returns whether the new
/// session validates.
pub async fn generate<F>(
    headed: &dyn ContextLauncher,
    checker: &dyn ContextLauncher,
    path: &Path,
    timings: &Timings,
    confirmed: F,
) -> Result<bool>
where
    F: Future<Output = ()> + Send,
{
    let mut ctx = headed.launch().await.context("无法启动登录浏览器")?;

    let saved = async {
        let page = ctx.page();
        page.navigate(LOGIN_URL).await?;
        info!("[扫码登录] 请在浏览器中扫码登录，完成后会自动保存（也可以按回车键立即保存）");

        let policy = PollPolicy::new(timings.login_interval, timings.login_deadline);
        tokio::select! {
            logged_in = wait_for_login(page, policy) => {
                if logged_in {
                    info!("[扫码登录] 检测到登录成功");
                } else {
                    warn!("[扫码登录] {} 秒内未检测到登录，仍然保存当前 Cookie", timings.login_deadline.as_secs());
                }
            }
            _ = confirmed => info!("[扫码登录] 收到回车确认"),
        }

        let cookies = page.cookies().await?;
        let session = SessionFile {
            cookies,
            origins: Vec::new(),
        };
        store::save(path, &session)?;
        info!("[扫码登录] 已保存 {} 个 Cookie 到 {}", session.cookies.len(), path.display());
        Ok::<(), anyhow::Error>(())
    }
    .await;

    ctx.shutdown().await;
    saved?;

    let mut validity = validator::validate(checker, path, &LOGIN_CHECK, timings).await;
    let valid = validity.is_valid();
    if let SessionValidity::Valid(live) = &mut validity {
        live.shutdown().await;
    }
    Ok(valid)
}

/// Check the session at `path` and regenerate it when needed.
///
/// `check_only` never opens the login browser; `force` regenerates even a
/// valid session.
pub async fn setup<F>(
    headed: &dyn ContextLauncher,
    checker: &dyn ContextLauncher,
    path: &Path,
    timings: &Timings,
    check_only: bool,
    force: bool,
    confirmed: F,
) -> Result<SetupOutcome>
where
    F: Future<Output = ()> + Send,
{
    if !force {
        let mut validity = validator::validate(checker, path, &LOGIN_CHECK, timings).await;
        info!("[Cookie 校验] {} -> {:?}", path.display(), validity);
        if let SessionValidity::Valid(live) = &mut validity {
            live.shutdown().await;
            return Ok(SetupOutcome::AlreadyValid);
        }
    }
    if check_only {
        return Ok(SetupOutcome::Invalid);
    }

    if generate(headed, checker, path, timings, confirmed).await? {
        Ok(SetupOutcome::Generated)
    } else {
        Ok(SetupOutcome::GenerateFailed)
    }
}
