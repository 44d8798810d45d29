use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::core::error::{IndexerError, Result};
use crate::core::video::backend::VideoBackend;

pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// 配置里的视频条目：id 兼作摄像头 id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDescriptor {
    pub id: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    /// 定向搜索关键字
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

impl VideoDescriptor {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            camera_id: None,
            keyword: None,
        }
    }

    pub fn with_camera(mut self, camera_id: impl Into<String>) -> Self {
        self.camera_id = Some(camera_id.into());
        self
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn camera(&self) -> &str {
        self.camera_id.as_deref().unwrap_or(&self.id)
    }

    /// 记录里的 source_video：文件名
    pub fn source_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

/// 探测得到的流信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMeta {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// 0 表示未知，读到流结束为止
    pub frame_count: u64,
}

/// 已打开的视频源，打开后不可变
#[derive(Debug, Clone)]
pub struct VideoSource {
    pub id: String,
    pub camera_id: String,
    pub source_video: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub frame_count: u64,
}

impl VideoSource {
    pub fn open(descriptor: &VideoDescriptor, backend: &dyn VideoBackend) -> Result<Self> {
        Self::open_path(
            &descriptor.id,
            descriptor.camera(),
            &descriptor.source_name(),
            &descriptor.path,
            backend,
        )
    }

    pub fn open_path(
        id: &str,
        camera_id: &str,
        source_video: &str,
        path: &Path,
        backend: &dyn VideoBackend,
    ) -> Result<Self> {
        File::open(path).map_err(|e| IndexerError::source_unavailable(path, e))?;

        let meta = backend.probe(path)?;
        let frame_rate = normalize_frame_rate(meta.frame_rate);
        if frame_rate != meta.frame_rate {
            warn!(
                "⚠️ {:?}: unreadable frame rate {}, using {}",
                path, meta.frame_rate, frame_rate
            );
        }

        debug!(
            "📼 Opened {:?}: {}x{} @ {:.3} fps, {} frames",
            path, meta.width, meta.height, frame_rate, meta.frame_count
        );

        Ok(Self {
            id: id.to_string(),
            camera_id: camera_id.to_string(),
            source_video: source_video.to_string(),
            path: path.to_path_buf(),
            width: meta.width,
            height: meta.height,
            frame_rate,
            frame_count: meta.frame_count,
        })
    }

    pub fn duration_secs(&self) -> Option<f64> {
        (self.frame_count > 0).then(|| self.frame_count as f64 / self.frame_rate)
    }

    /// 时间点对应的最近帧号
    pub fn frame_at(&self, seconds: f64) -> u64 {
        (seconds * self.frame_rate).round().max(0.0) as u64
    }
}

pub fn normalize_frame_rate(frame_rate: f64) -> f64 {
    if frame_rate.is_finite() && frame_rate > 0.0 {
        frame_rate
    } else {
        DEFAULT_FRAME_RATE
    }
}
