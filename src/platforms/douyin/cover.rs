use anyhow::{bail, Result};
use log::{info, warn};
use std::path::Path;

use super::selectors::{
    COVER_APPLY_CONFIRM, COVER_APPLY_PROMPT, COVER_DONE, COVER_FILE_INPUT, COVER_MODAL, OPEN_COVER,
    RECOMMENDED_COVER, VERTICAL_COVER,
};
use crate::browser::{PageDriver, Probe};
use crate::config::Timings;
use crate::poll::{poll_until, PollPolicy};

/// Upload `cover` as the vertical cover through the cover modal.
pub async fn set_cover(page: &dyn PageDriver, cover: &Path, timings: &Timings) -> Result<()> {
    let wait = PollPolicy::new(timings.file_input_interval, timings.file_input_wait);

    if !page.click(&OPEN_COVER).await? {
        bail!("没有找到“选择封面”入口");
    }
    if !poll_until(wait, || async { page.probe(&COVER_MODAL).await.unwrap_or(false) }).await {
        bail!("封面弹窗没有出现");
    }
    if !page.click(&VERTICAL_COVER).await.unwrap_or(false) {
        warn!("[抖音封面] 没有“设置竖封面”选项，直接上传");
    }

    let input_ready = poll_until(wait, || async {
        page.probe(&Probe::Selector(COVER_FILE_INPUT)).await.unwrap_or(false)
    })
    .await;
    if !input_ready || !page.set_input_files(COVER_FILE_INPUT, cover).await? {
        bail!("封面上传输入框不可用");
    }
    tokio::time::sleep(timings.publish_settle).await;

    if !poll_until(wait, || async { page.click(&COVER_DONE).await.unwrap_or(false) }).await {
        bail!("封面弹窗的“完成”按钮不可点击");
    }
    info!("[抖音封面] 已设置封面 {}", cover.display());
    Ok(())
}

/// Answer "请设置封面后再发布" by picking the first recommended cover.
/// Returns whether a cover was applied.
pub async fn resolve_missing_cover(page: &dyn PageDriver, timings: &Timings) -> bool {
    match page.click(&RECOMMENDED_COVER).await {
        Ok(true) => {}
        Ok(false) => {
            warn!("[抖音封面] 没有推荐封面可选");
            return false;
        }
        Err(e) => {
            warn!("[抖音封面] 点击推荐封面失败: {}", e);
            return false;
        }
    }
    tokio::time::sleep(timings.publish_settle).await;

    if page.probe(&COVER_APPLY_PROMPT).await.unwrap_or(false) {
        if !page.click(&COVER_APPLY_CONFIRM).await.unwrap_or(false) {
            warn!("[抖音封面] 无法确认应用推荐封面");
            return false;
        }
        tokio::time::sleep(timings.publish_settle).await;
    }
    info!("[抖音封面] 已应用第一个推荐封面");
    true
}
