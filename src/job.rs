use serde::Serialize;
use std::path::{Component, Path, PathBuf};

use crate::error::UploadError;

pub const VIDEO_EXTENSIONS: [&str; 8] = ["mp4", "mov", "avi", "mkv", "flv", "wmv", "webm", "m4v"];

/// One publish request.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub video: PathBuf,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub cover: Option<PathBuf>,
}

/// Echoed back to API callers on success.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub filename: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl UploadJob {
    pub fn video_info(&self) -> VideoInfo {
        VideoInfo {
            filename: self
                .video
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            title: self.title.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Reject anything that cannot be a usable video before a browser is started.
pub fn validate_video_file(path: &Path) -> Result<(), UploadError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if !VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        return Err(UploadError::InvalidVideo(format!(
            "不支持的视频格式 '{}'，支持: {}",
            ext,
            VIDEO_EXTENSIONS.join(", ")
        )));
    }
    let meta = std::fs::metadata(path)
        .map_err(|e| UploadError::InvalidVideo(format!("无法读取 {}: {}", path.display(), e)))?;
    if !meta.is_file() {
        return Err(UploadError::InvalidVideo(format!("{} 不是文件", path.display())));
    }
    if meta.len() == 0 {
        return Err(UploadError::InvalidVideo(format!("{} 是空文件", path.display())));
    }
    Ok(())
}

/// Tags from form values: each value may be a JSON array string or a
/// comma-separated list. Leading `#` is dropped and duplicates removed.
pub fn parse_tags(values: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for raw in values {
        let raw = raw.trim();
        let parts: Vec<String> = if raw.starts_with('[') {
            serde_json::from_str::<Vec<String>>(raw).unwrap_or_default()
        } else {
            raw.split([',', '，']).map(str::to_string).collect()
        };
        for part in parts {
            let tag = part.trim().trim_start_matches('#').trim().to_string();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }
    tags
}

/// Storage name for an ingested file: the client's base name plus a timestamp
/// and random suffix, so concurrent uploads never collide.
pub fn unique_upload_name(client_name: &str) -> String {
    let base = Path::new(client_name)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .last()
        .unwrap_or_else(|| "video".to_string());
    let path = Path::new(&base);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".to_string());
    let suffix = format!(
        "{}-{:06x}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>() & 0xff_ffff
    );
    match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}-{}", stem, suffix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn tags_from_every_form_shape() {
        let csv = parse_tags(&["旅行, #vlog,，日常".to_string()]);
        assert_eq!(csv, vec!["旅行", "vlog", "日常"]);

        let json = parse_tags(&[r##"["旅行", "#美食"]"##.to_string()]);
        assert_eq!(json, vec!["旅行", "美食"]);

        let repeated = parse_tags(&["a".to_string(), "b".to_string(), "a".to_string()]);
        assert_eq!(repeated, vec!["a", "b"]);

        assert!(parse_tags(&[" ".to_string()]).is_empty());
    }

    #[test]
    fn video_validation() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("clip.MP4");
        std::fs::write(&good, b"data").unwrap();
        assert!(validate_video_file(&good).is_ok());

        let empty = dir.path().join("empty.mp4");
        std::fs::write(&empty, b"").unwrap();
        assert_eq!(validate_video_file(&empty).unwrap_err().code(), "INVALID_VIDEO");

        let text = dir.path().join("notes.txt");
        std::fs::write(&text, b"data").unwrap();
        assert!(validate_video_file(&text).is_err());

        assert!(validate_video_file(&dir.path().join("missing.mp4")).is_err());
    }

    #[test]
    fn upload_names_are_unique_and_safe() {
        let a = unique_upload_name("../../etc/clip.mp4");
        let b = unique_upload_name("../../etc/clip.mp4");
        assert_ne!(a, b);
        assert!(a.starts_with("clip-"));
        assert!(a.ends_with(".mp4"));
        assert!(!a.contains('/'));
    }
}
