use log::{info, warn};

use super::selectors::{CARD_REGION, COMPLETION, UPLOAD_FAILED};
use crate::browser::PageDriver;
use crate::config::Timings;
use crate::error::UploadError;
use crate::platforms::common::first_match_lenient;
use crate::poll::{bounded_poll, PollPolicy, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    /// The portal offers "重新上传", i.e. transcoding finished.
    Complete,
    Failed,
    TimedOut,
}

impl CompletionState {
    pub fn into_result(self, timings: &Timings) -> Result<(), UploadError> {
        match self {
            Self::Complete => Ok(()),
            Self::Failed => Err(UploadError::UploadFailedMarker),
            Self::TimedOut => Err(UploadError::UploadTimedOut(format!(
                "视频处理在 {} 秒内未完成",
                timings.completion_deadline.as_secs()
            ))),
        }
    }
}

/// One observation: completion wins over a failure marker seen in the same tick.
async fn observe(page: &dyn PageDriver) -> Option<CompletionState> {
    if let Err(e) = page.reveal(CARD_REGION).await {
        warn!("[抖音上传] 滚动到上传卡片失败: {}", e);
    }
    if first_match_lenient(page, "抖音上传完成", &COMPLETION).await.is_some() {
        return Some(CompletionState::Complete);
    }
    if first_match_lenient(page, "抖音上传失败", &UPLOAD_FAILED).await.is_some() {
        return Some(CompletionState::Failed);
    }
    None
}

pub async fn wait_for_completion(page: &dyn PageDriver, timings: &Timings) -> CompletionState {
    let policy = PollPolicy::new(timings.completion_interval, timings.completion_deadline);
    let state = bounded_poll(policy, |round| async move {
        match observe(page).await {
            Some(state) => Tick::Ready(state),
            None => {
                info!("[抖音上传] 视频处理中... 第 {} 次检查", round);
                Tick::Pending
            }
        }
    })
    .await
    .unwrap_or(CompletionState::TimedOut);
    info!("[抖音上传] 上传状态: {:?}", state);
    state
}
