//! Douyin creator-portal publishing: session check, upload, transcoding wait,
//! metadata, optional cover and the publish click loop.

pub mod completion;
pub mod cover;
pub mod metadata;
pub mod publish;
pub mod selectors;
pub mod upload;

use log::{info, warn};

use super::traits::PlatformInfo;
use crate::agent::SemanticAgent;
use crate::browser::{BrowserContext, ContextLauncher, PageDriver};
use crate::config::AppConfig;
use crate::error::UploadError;
use crate::job::{validate_video_file, UploadJob};
use crate::session::validator;
pub use publish::PublishReport;

pub fn info() -> PlatformInfo {
    PlatformInfo {
        id: "douyin".into(),
        name: "抖音".into(),
        name_en: "Douyin".into(),
        login_url: selectors::LOGIN_URL.into(),
        upload_url: selectors::UPLOAD_URL.into(),
        manage_url: selectors::MANAGE_URL.into(),
    }
}

/// Run one job end to end. The browser context is shut down on every path.
pub async fn perform_upload(
    config: &AppConfig,
    launcher: &dyn ContextLauncher,
    agent: &dyn SemanticAgent,
    job: &UploadJob,
) -> Result<PublishReport, UploadError> {
    validate_video_file(&job.video)?;
    info!("[抖音上传] 开始任务: {} ({})", job.title, job.video.display());

    let mut ctx = validator::validate(
        launcher,
        &config.session_path,
        &selectors::LOGIN_CHECK,
        &config.timings,
    )
    .await
    .into_context(&config.session_path)?;

    let result = drive(ctx.as_ref(), config, agent, job).await;
    if let Err(e) = &result {
        capture_failure(ctx.page(), config, e).await;
    }
    ctx.shutdown().await;
    info!("[抖音上传] 浏览器已关闭");
    result
}

async fn drive(
    ctx: &dyn BrowserContext,
    config: &AppConfig,
    agent: &dyn SemanticAgent,
    job: &UploadJob,
) -> Result<PublishReport, UploadError> {
    let page = ctx.page();
    let timings = &config.timings;

    upload::select_video(page, &job.video, timings).await?;

    let state = completion::wait_for_completion(page, timings).await;
    metadata::fill_metadata(
        page,
        agent,
        &job.title,
        &job.description,
        &job.tags,
        Some(state),
        timings,
    )
    .await?;

    match &job.cover {
        Some(cover) if !cover.is_file() => {
            warn!("[抖音封面] 封面文件不存在，跳过: {}", cover.display());
        }
        Some(cover) => {
            if let Err(e) = cover::set_cover(page, cover, timings).await {
                warn!("[抖音封面] 设置封面失败，继续发布: {:#}", e);
            }
        }
        None => {}
    }

    publish::publish(page, timings).await
}

async fn capture_failure(page: &dyn PageDriver, config: &AppConfig, err: &UploadError) {
    let name = format!(
        "{}-{}.png",
        err.code().to_ascii_lowercase(),
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    );
    let path = config.debug_dir.join(name);
    match page.screenshot(&path).await {
        Ok(()) => info!("[抖音上传] 失败截图已保存: {}", path.display()),
        Err(e) => warn!("[抖音上传] 保存失败截图出错: {}", e),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::agent::DisabledAgent;
    use crate::browser::fake::{Effect, FakeLauncher, FakePage};
    use crate::browser::{ClickTarget, Probe};
    use crate::session::store::{self, CookieRecord, SameSite, SessionFile};
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    const TITLE: &str = "input[placeholder*=\"填写作品标题\"]";
    const ZONE: &str = ".zone-container[contenteditable=\"true\"]";
    pub const PUBLISH: ClickTarget = ClickTarget::ExactText { scope: "button", text: "发布" };
    const PUBLISH_VIEW: &str = "https://creator.douyin.com/creator-micro/content/post/video?enter_from=publish_page";

    pub fn write_session(path: &Path) {
        let session = SessionFile {
            cookies: vec![CookieRecord {
                name: "sessionid".into(),
                value: "abc".into(),
                domain: ".douyin.com".into(),
                path: "/".into(),
                expires: None,
                http_only: true,
                secure: true,
                same_site: SameSite::Lax,
            }],
            origins: vec![],
        };
        store::save(path, &session).unwrap();
    }

    pub fn write_video(dir: &Path) -> PathBuf {
        let path = dir.join("clip.mp4");
        std::fs::write(&path, b"not really a video").unwrap();
        path
    }

    /// A portal that accepts the upload, finishes transcoding after a few
    /// seconds and offers a working title/description form.
    pub fn happy_portal() -> FakePage {
        let page = FakePage::new("about:blank");
        page.show(Probe::Selector(selectors::PRIMARY_FILE_INPUT))
            .on_files(vec![
                Effect::after(Duration::from_secs(2), Effect::url(PUBLISH_VIEW)),
                Effect::after(
                    Duration::from_secs(8),
                    Effect::show(Probe::SelectorText(selectors::CARD_REGION, "重新上传")),
                ),
                Effect::show(Probe::VisibleSelector(TITLE)),
                Effect::show(Probe::Selector(ZONE)),
            ])
            .rich_text(ZONE)
            .show(PUBLISH);
        page
    }

    fn setup() -> (TempDir, AppConfig, UploadJob) {
        let dir = tempdir().unwrap();
        let config = AppConfig::for_tests(dir.path());
        let job = UploadJob {
            video: write_video(dir.path()),
            title: "周末出游".into(),
            description: "海边".into(),
            tags: vec!["旅行".into(), "vlog".into()],
            cover: None,
        };
        (dir, config, job)
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_a_full_publish() {
        let (_dir, config, job) = setup();
        write_session(&config.session_path);
        let page = happy_portal();
        page.on_click(PUBLISH, vec![Effect::url(selectors::MANAGE_URL)]);
        let launcher = FakeLauncher::new(page);

        let report = perform_upload(&config, &launcher, &DisabledAgent, &job).await.unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(launcher.page.value(TITLE).as_deref(), Some("周末出游"));
        assert_eq!(launcher.page.value(ZONE).as_deref(), Some("海边 #旅行 #vlog"));
        assert_eq!(launcher.shutdowns(), 1);
        assert!(launcher.page.screenshots().is_empty());
        assert_eq!(job.video_info().filename, "clip.mp4");
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_b_missing_session() {
        let (_dir, config, job) = setup();
        let launcher = FakeLauncher::new(happy_portal());

        let err = perform_upload(&config, &launcher, &DisabledAgent, &job).await.unwrap_err();
        assert_eq!(err.code(), "SESSION_MISSING");
        assert_eq!(launcher.launches(), 0);
        assert!(launcher.page.navigations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_c_verification_challenge() {
        let (_dir, config, job) = setup();
        write_session(&config.session_path);
        let page = happy_portal();
        page.on_click(PUBLISH, vec![Effect::show(Probe::VisibleText("短信验证"))]);
        let launcher = FakeLauncher::new(page);

        let err = perform_upload(&config, &launcher, &DisabledAgent, &job).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::PublishUnrecoverable(crate::error::Obstruction::VerificationChallenge)
        ));
        assert_eq!(launcher.page.click_count(PUBLISH), 1);
        assert_eq!(launcher.shutdowns(), 1);
        assert_eq!(launcher.page.screenshots().len(), 1);
        assert!(launcher.page.screenshots()[0].starts_with(&config.debug_dir));
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_d_missing_cover_then_success() {
        let (_dir, config, job) = setup();
        write_session(&config.session_path);
        let page = happy_portal();
        let missing = Probe::VisibleText("请设置封面后再发布");
        page.show(selectors::RECOMMENDED_COVER)
            .show(selectors::COVER_APPLY_CONFIRM)
            .on_click(PUBLISH, vec![Effect::show(missing)])
            .on_click(selectors::RECOMMENDED_COVER, vec![Effect::show(selectors::COVER_APPLY_PROMPT)])
            .on_click(
                selectors::COVER_APPLY_CONFIRM,
                vec![
                    Effect::hide(missing),
                    Effect::hide(selectors::COVER_APPLY_PROMPT),
                    Effect::hide(PUBLISH),
                    Effect::show(ClickTarget::DomText("发布")),
                ],
            )
            .on_click(ClickTarget::DomText("发布"), vec![Effect::url(selectors::MANAGE_URL)]);
        let launcher = FakeLauncher::new(page);

        let report = perform_upload(&config, &launcher, &DisabledAgent, &job).await.unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(report.covers_resolved, 1);
        assert_eq!(launcher.shutdowns(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_video_fails_before_launch() {
        let (dir, config, mut job) = setup();
        write_session(&config.session_path);
        job.video = dir.path().join("notes.txt");
        std::fs::write(&job.video, b"x").unwrap();
        let launcher = FakeLauncher::new(happy_portal());

        let err = perform_upload(&config, &launcher, &DisabledAgent, &job).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_VIDEO");
        assert_eq!(launcher.launches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cover_failure_does_not_fail_the_job() {
        let (dir, config, mut job) = setup();
        write_session(&config.session_path);
        let cover = dir.path().join("cover.png");
        std::fs::write(&cover, b"png").unwrap();
        job.cover = Some(cover);
        let page = happy_portal();
        page.on_click(PUBLISH, vec![Effect::url(selectors::MANAGE_URL)]);
        let launcher = FakeLauncher::new(page);

        perform_upload(&config, &launcher, &DisabledAgent, &job).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn upload_failure_marker_aborts_before_fill() {
        let (_dir, config, job) = setup();
        write_session(&config.session_path);
        let page = FakePage::new("about:blank");
        page.show(Probe::Selector(selectors::PRIMARY_FILE_INPUT))
            .on_files(vec![
                Effect::url(PUBLISH_VIEW),
                Effect::after(Duration::from_secs(4), Effect::show(Probe::VisibleText("上传失败"))),
            ]);
        let launcher = FakeLauncher::new(page);

        let err = perform_upload(&config, &launcher, &DisabledAgent, &job).await.unwrap_err();
        assert_eq!(err.code(), "UPLOAD_FAILED_MARKER");
        assert!(launcher.page.fills().is_empty());
        assert_eq!(launcher.shutdowns(), 1);
    }
}
