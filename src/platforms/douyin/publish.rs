use log::{info, warn};

use super::cover::resolve_missing_cover;
use super::selectors::{CONFIRM_BUTTON, CONFIRM_DIALOG, MANAGE_PATH, MISSING_COVER, PUBLISH_BUTTON, VERIFICATION};
use crate::browser::PageDriver;
use crate::config::Timings;
use crate::error::{Obstruction, UploadError};
use crate::platforms::common::{click_first, first_match_lenient};
use crate::poll::{bounded_poll, PollPolicy, Tick};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// Publish clicks that counted against the attempt budget.
    pub attempts: u32,
    pub covers_resolved: u32,
    pub manage_url: String,
}

/// What one click led to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Observation {
    Succeeded(String),
    Verification,
    MissingCover,
    NoRedirect,
}

/// Click publish until the portal redirects to the management page.
pub async fn publish(page: &dyn PageDriver, timings: &Timings) -> Result<PublishReport, UploadError> {
    let max = timings.publish_attempts;
    let mut attempt = 0u32;
    let mut covers = 0u32;
    let mut last: Option<UploadError> = None;

    while attempt < max {
        attempt += 1;
        info!("[抖音发布] 第 {}/{} 次尝试发布", attempt, max);
        if click_first(page, "抖音发布", &PUBLISH_BUTTON).await.is_none() {
            warn!("[抖音发布] 没有找到发布按钮");
        }
        tokio::time::sleep(timings.publish_settle).await;

        match observe(page, timings).await {
            Observation::Succeeded(url) => {
                info!("[抖音发布] 发布成功，已跳转到 {}", url);
                return Ok(PublishReport {
                    attempts: attempt,
                    covers_resolved: covers,
                    manage_url: url,
                });
            }
            Observation::Verification => {
                warn!("[抖音发布] 出现验证码/身份验证，停止自动发布");
                return Err(UploadError::PublishUnrecoverable(Obstruction::VerificationChallenge));
            }
            Observation::MissingCover => {
                if covers < timings.cover_resolutions && resolve_missing_cover(page, timings).await {
                    covers += 1;
                    // the cover fix gets a fresh click on the same attempt number
                    attempt -= 1;
                    continue;
                }
                last = Some(UploadError::PublishObstructed(Obstruction::MissingCover));
            }
            Observation::NoRedirect => {
                last = Some(UploadError::PublishTimedOutAttempt(attempt));
            }
        }
    }

    Err(UploadError::PublishExhausted {
        attempts: max,
        last: Box::new(last.unwrap_or(UploadError::PublishTimedOutAttempt(0))),
    })
}

async fn observe(page: &dyn PageDriver, timings: &Timings) -> Observation {
    if first_match_lenient(page, "抖音发布", &VERIFICATION).await.is_some() {
        return Observation::Verification;
    }

    if first_match_lenient(page, "抖音发布", &CONFIRM_DIALOG).await.is_some() {
        info!("[抖音发布] 处理确认发布弹窗");
        if click_first(page, "抖音发布", &CONFIRM_BUTTON).await.is_none() {
            warn!("[抖音发布] 确认弹窗里没有可点的按钮");
        }
        tokio::time::sleep(timings.publish_settle).await;
        if first_match_lenient(page, "抖音发布", &VERIFICATION).await.is_some() {
            return Observation::Verification;
        }
    }

    let policy = PollPolicy::new(timings.redirect_interval, timings.redirect_deadline);
    let redirected = bounded_poll(policy, |_| async move {
        match page.url().await {
            Ok(url) if url.contains(MANAGE_PATH) => Tick::Ready(url),
            _ => Tick::Pending,
        }
    })
    .await;
    if let Some(url) = redirected {
        return Observation::Succeeded(url);
    }

    if first_match_lenient(page, "抖音发布", &MISSING_COVER).await.is_some() {
        return Observation::MissingCover;
    }
    Observation::NoRedirect
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{Effect, FakePage};
    use crate::browser::{ClickTarget, Probe};
    use crate::platforms::douyin::selectors::{COVER_APPLY_CONFIRM, COVER_APPLY_PROMPT, MANAGE_URL, RECOMMENDED_COVER};

    const PUBLISH: ClickTarget = ClickTarget::ExactText { scope: "button", text: "发布" };
    const CONFIRM: ClickTarget = ClickTarget::ExactText { scope: "button", text: "确认发布" };

    fn publish_page() -> FakePage {
        let page = FakePage::new("https://creator.douyin.com/creator-micro/content/post/video");
        page.show(PUBLISH);
        page
    }

    #[tokio::test(start_paused = true)]
    async fn redirect_after_click_succeeds() {
        let page = publish_page();
        page.on_click(PUBLISH, vec![Effect::after(std::time::Duration::from_secs(3), Effect::url(MANAGE_URL))]);
        let report = publish(&page, &Timings::default()).await.unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(report.manage_url, MANAGE_URL);
    }

    #[tokio::test(start_paused = true)]
    async fn verification_stops_after_one_click() {
        let page = publish_page();
        page.on_click(PUBLISH, vec![Effect::show(Probe::VisibleText("接收短信验证码"))]);
        let err = publish(&page, &Timings::default()).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::PublishUnrecoverable(Obstruction::VerificationChallenge)
        ));
        assert_eq!(page.click_count(PUBLISH), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn verification_behind_confirm_dialog_is_caught() {
        let page = publish_page();
        page.show(CONFIRM)
            .on_click(PUBLISH, vec![Effect::show(Probe::VisibleText("确认发布"))])
            .on_click(CONFIRM, vec![Effect::show(Probe::VisibleText("短信验证"))]);
        let err = publish(&page, &Timings::default()).await.unwrap_err();
        assert_eq!(err.code(), "PUBLISH_UNRECOVERABLE");
        assert_eq!(page.click_count(PUBLISH), 1);
        assert_eq!(page.click_count(CONFIRM), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn confirm_dialog_then_redirect() {
        let page = publish_page();
        page.show(CONFIRM)
            .on_click(PUBLISH, vec![Effect::show(Probe::VisibleText("确认发布"))])
            .on_click(CONFIRM, vec![Effect::hide(Probe::VisibleText("确认发布")), Effect::url(MANAGE_URL)]);
        let report = publish(&page, &Timings::default()).await.unwrap();
        assert_eq!(report.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_cover_resolution_does_not_consume_an_attempt() {
        let page = publish_page();
        let missing = Probe::VisibleText("请设置封面后再发布");
        let dom_publish = ClickTarget::DomText("发布");
        page.show(missing)
            .show(RECOMMENDED_COVER)
            .show(COVER_APPLY_CONFIRM)
            .on_click(RECOMMENDED_COVER, vec![Effect::show(COVER_APPLY_PROMPT)])
            .on_click(
                COVER_APPLY_CONFIRM,
                vec![
                    Effect::hide(missing),
                    Effect::hide(COVER_APPLY_PROMPT),
                    // the retried click lands on the DOM-level fallback
                    Effect::hide(PUBLISH),
                    Effect::show(dom_publish),
                ],
            )
            .on_click(dom_publish, vec![Effect::url(MANAGE_URL)]);
        let mut timings = Timings::default();
        timings.publish_attempts = 1;

        let report = publish(&page, &timings).await.unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(report.covers_resolved, 1);
        assert_eq!(page.click_count(PUBLISH), 1);
        assert_eq!(page.click_count(dom_publish), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_carries_last_failure() {
        let page = publish_page();
        let mut timings = Timings::default();
        timings.publish_attempts = 3;
        let err = publish(&page, &timings).await.unwrap_err();
        match err {
            UploadError::PublishExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, UploadError::PublishTimedOutAttempt(3)));
            }
            other => panic!("unexpected {}", other),
        }
        assert_eq!(page.click_count(PUBLISH), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unresolvable_cover_is_reported() {
        let page = publish_page();
        page.show(Probe::VisibleText("请设置封面后再发布"));
        let mut timings = Timings::default();
        timings.publish_attempts = 2;
        let err = publish(&page, &timings).await.unwrap_err();
        match err {
            UploadError::PublishExhausted { last, .. } => {
                assert!(matches!(*last, UploadError::PublishObstructed(Obstruction::MissingCover)));
            }
            other => panic!("unexpected {}", other),
        }
    }
}
