use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Something the page put in front of the publish flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Obstruction {
    ConfirmDialog,
    MissingCover,
    VerificationChallenge,
}

impl Obstruction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfirmDialog => "confirm_dialog",
            Self::MissingCover => "missing_cover",
            Self::VerificationChallenge => "verification_challenge",
        }
    }
}

impl fmt::Display for Obstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an upload job failed. A job is either fully published or one of these.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("INVALID_VIDEO: {0}")]
    InvalidVideo(String),

    #[error("SESSION_MISSING: Cookie 文件不存在：{}。请先运行 login 子命令扫码登录。", .0.display())]
    SessionMissing(PathBuf),

    #[error("SESSION_EXPIRED: Cookie 已失效，需要重新登录")]
    SessionExpired,

    #[error("SESSION_CHECK_ERROR: Cookie 验证过程出错：{0}")]
    SessionCheckError(String),

    #[error("UPLOAD_SELECT_FAILED: {0}")]
    UploadSelectFailed(String),

    #[error("UPLOAD_TIMED_OUT: {0}")]
    UploadTimedOut(String),

    #[error("UPLOAD_FAILED_MARKER: 页面提示视频上传失败")]
    UploadFailedMarker,

    #[error("FILL_FAILED: {0}")]
    FillFailed(String),

    #[error("PUBLISH_OBSTRUCTED: 发布被页面阻挡（{0}）")]
    PublishObstructed(Obstruction),

    #[error("PUBLISH_UNRECOVERABLE: 发布需要人工处理（{0}），已停止自动发布")]
    PublishUnrecoverable(Obstruction),

    #[error("PUBLISH_TIMED_OUT_ATTEMPT: 第 {0} 次发布点击后未跳转到作品管理页")]
    PublishTimedOutAttempt(u32),

    #[error("PUBLISH_EXHAUSTED: {attempts} 次发布尝试均未成功，最后一次：{last}")]
    PublishExhausted { attempts: u32, last: Box<UploadError> },

    #[error("BROWSER: {0}")]
    Browser(String),
}

impl UploadError {
    /// Stable code prefix used by API consumers and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidVideo(_) => "INVALID_VIDEO",
            Self::SessionMissing(_) => "SESSION_MISSING",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::SessionCheckError(_) => "SESSION_CHECK_ERROR",
            Self::UploadSelectFailed(_) => "UPLOAD_SELECT_FAILED",
            Self::UploadTimedOut(_) => "UPLOAD_TIMED_OUT",
            Self::UploadFailedMarker => "UPLOAD_FAILED_MARKER",
            Self::FillFailed(_) => "FILL_FAILED",
            Self::PublishObstructed(_) => "PUBLISH_OBSTRUCTED",
            Self::PublishUnrecoverable(_) => "PUBLISH_UNRECOVERABLE",
            Self::PublishTimedOutAttempt(_) => "PUBLISH_TIMED_OUT_ATTEMPT",
            Self::PublishExhausted { .. } => "PUBLISH_EXHAUSTED",
            Self::Browser(_) => "BROWSER",
        }
    }
}
