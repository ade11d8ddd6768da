use log::{info, warn};
use std::path::Path;

use super::selectors::{GENERIC_FILE_INPUT, HOST, PRIMARY_FILE_INPUT, PUBLISH_VIEW_PATHS};
use crate::browser::{PageDriver, Probe};
use crate::config::Timings;
use crate::error::UploadError;
use crate::platforms::common::is_target_url;
use crate::poll::{bounded_poll, poll_until, PollPolicy, Tick};

/// Put the video into the upload page's file input and wait for the portal to
/// move on to the publish view. Returns the publish view URL.
pub async fn select_video(
    page: &dyn PageDriver,
    video: &Path,
    timings: &Timings,
) -> Result<String, UploadError> {
    let selector = pick_file_input(page, timings).await?;
    info!("[抖音上传] 使用文件输入框 {}", selector);

    match page.set_input_files(selector, video).await {
        Ok(true) => {}
        Ok(false) => {
            return Err(UploadError::UploadSelectFailed(format!(
                "文件输入框 {} 在选择文件时消失",
                selector
            )))
        }
        Err(e) => return Err(UploadError::Browser(format!("选择视频文件失败: {:#}", e))),
    }

    let policy = PollPolicy::new(timings.publish_view_interval, timings.publish_view_deadline);
    let reached = bounded_poll(policy, |round| async move {
        match page.url().await {
            Ok(url) if is_target_url(&url, HOST, &PUBLISH_VIEW_PATHS) => Tick::Ready(url),
            Ok(url) => {
                if round % 10 == 0 {
                    info!("[抖音上传] 等待进入发布页... 当前 {}", url);
                }
                Tick::Pending
            }
            Err(e) => {
                warn!("[抖音上传] 读取页面地址失败: {}", e);
                Tick::Pending
            }
        }
    })
    .await;

    match reached {
        Some(url) => {
            info!("[抖音上传] 已进入发布页 {}", url);
            Ok(url)
        }
        None => Err(UploadError::UploadTimedOut(format!(
            "{} 秒内未进入发布页",
            timings.publish_view_deadline.as_secs()
        ))),
    }
}

async fn pick_file_input(page: &dyn PageDriver, timings: &Timings) -> Result<&'static str, UploadError> {
    let policy = PollPolicy::new(timings.file_input_interval, timings.file_input_wait);
    let primary = poll_until(policy, || async {
        page.probe(&Probe::Selector(PRIMARY_FILE_INPUT)).await.unwrap_or(false)
    })
    .await;
    if primary {
        return Ok(PRIMARY_FILE_INPUT);
    }

    warn!("[抖音上传] 未找到主上传输入框，尝试通用 input[type=file]");
    match page.probe(&Probe::Selector(GENERIC_FILE_INPUT)).await {
        Ok(true) => Ok(GENERIC_FILE_INPUT),
        Ok(false) => Err(UploadError::UploadSelectFailed(
            "页面上没有可用的文件输入框".to_string(),
        )),
        Err(e) => Err(UploadError::UploadSelectFailed(format!("{:#}", e))),
    }
}
