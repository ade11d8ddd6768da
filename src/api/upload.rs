use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    BoxError, Json,
};
use futures::{Stream, TryStreamExt};
use log::{error, info, warn};
use serde_json::json;
use std::io;
use std::path::{Path, PathBuf};
use tokio::{fs::File, io::AsyncWriteExt, io::BufWriter};
use tokio_util::io::StreamReader;

use super::AppState;
use crate::error::UploadError;
use crate::job::{parse_tags, unique_upload_name, validate_video_file, UploadJob};
use crate::platforms::douyin;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Job(UploadError),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Job(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

#[derive(Default)]
struct UploadForm {
    video: Option<PathBuf>,
    title: String,
    description: String,
    tags: Vec<String>,
}

/// `POST /api/v1/upload_video`: ingest the multipart form, then run the job.
pub async fn upload_video(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = read_form(&state.config.upload_dir, multipart).await?;

    let video = form
        .video
        .ok_or_else(|| ApiError::BadRequest("缺少视频文件字段 video".to_string()))?;
    let invalid = if form.title.trim().is_empty() {
        Some("title 不能为空".to_string())
    } else if form.description.trim().is_empty() {
        Some("description 不能为空".to_string())
    } else {
        validate_video_file(&video).err().map(|e| e.to_string())
    };
    if let Some(message) = invalid {
        discard(&video).await;
        return Err(ApiError::BadRequest(message));
    }

    let job = UploadJob {
        video,
        title: form.title.trim().to_string(),
        description: form.description.trim().to_string(),
        tags: parse_tags(&form.tags),
        cover: None,
    };

    // one job at a time per session file
    let permit = state
        .jobs
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    info!("[API] 开始上传 {}", job.video.display());

    // detached: a dropped connection must not cancel the job mid-flow
    let task = {
        let state = state.clone();
        let job = job.clone();
        tokio::spawn(async move {
            let _permit = permit;
            douyin::perform_upload(&state.config, state.launcher.as_ref(), state.agent.as_ref(), &job).await
        })
    };
    let outcome = task
        .await
        .map_err(|e| ApiError::Internal(format!("上传任务异常退出: {}", e)))?;

    match outcome {
        Ok(report) => {
            info!(
                "[API] 发布成功 {} (尝试 {} 次)",
                job.video.display(),
                report.attempts
            );
            Ok((
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": "视频发布成功",
                    "videoInfo": job.video_info(),
                })),
            )
                .into_response())
        }
        Err(e) => {
            error!("[API] 发布失败: {}", e);
            Err(ApiError::Job(e))
        }
    }
}

async fn read_form(upload_dir: &Path, mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| ApiError::Internal(format!("无法创建上传目录: {}", e)))?;

    let mut form = UploadForm::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                if let Some(path) = &form.video {
                    discard(path).await;
                }
                return Err(ApiError::BadRequest(format!("表单解析失败: {}", e)));
            }
        };

        if let Some(file_name) = field.file_name().map(str::to_owned) {
            if form.video.is_some() {
                warn!("[API] 忽略多余的文件字段 {}", file_name);
                continue;
            }
            let path = upload_dir.join(unique_upload_name(&file_name));
            info!("[API] 保存上传文件到 {}", path.display());
            if let Err(e) = stream_to_file(&path, field).await {
                discard(&path).await;
                return Err(e);
            }
            form.video = Some(path);
            continue;
        }

        let name = field.name().unwrap_or_default().to_string();
        let value = match field.text().await {
            Ok(value) => value,
            Err(e) => {
                if let Some(path) = &form.video {
                    discard(path).await;
                }
                return Err(ApiError::BadRequest(format!("字段 {} 读取失败: {}", name, e)));
            }
        };
        match name.as_str() {
            "title" => form.title = value,
            "description" => form.description = value,
            "tags" | "tags[]" => form.tags.push(value),
            _ => {}
        }
    }
    Ok(form)
}

// Save a `Stream` to a file
async fn stream_to_file<S, E>(path: &Path, stream: S) -> Result<(), ApiError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    async {
        let body_with_io_error = stream.map_err(io::Error::other);
        let body_reader = StreamReader::new(body_with_io_error);
        futures::pin_mut!(body_reader);

        let mut file = BufWriter::new(File::create(path).await?);
        tokio::io::copy(&mut body_reader, &mut file).await?;
        file.flush().await?;

        Ok::<_, io::Error>(())
    }
    .await
    .map_err(|err| ApiError::BadRequest(format!("文件接收失败: {}", err)))
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("[API] 删除上传文件 {} 失败: {}", path.display(), e);
    }
}
