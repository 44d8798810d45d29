//! 索引器配置（JSON5 文件）

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::core::error::{IndexerError, Result};
use crate::core::video::VideoDescriptor;

pub const DEFAULT_SAMPLING_INTERVAL_SECS: f64 = 1.0;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.7;
pub const DEFAULT_TIMESTAMP_PRECISION: u8 = 1;
pub const MAX_WORKERS: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// 源视频目录（只读）
    pub video_dir: PathBuf,
    /// 高亮截图输出目录
    pub screenshot_dir: PathBuf,
    /// 临时片段目录
    pub clip_dir: PathBuf,
    pub db_path: PathBuf,
    /// 启动时自动处理的视频；相对路径相对于 video_dir
    pub videos: Vec<VideoDescriptor>,
    pub sampling_interval_secs: f64,
    pub confidence_threshold: f32,
    /// 去重键时间戳保留的小数位
    pub timestamp_precision: u8,
    pub max_workers: usize,
    pub segment_timeout_secs: u64,
    /// 批处理前清空已有记录
    pub clear_on_startup: bool,
    /// 设置后只保留包含该关键字的检测（不区分大小写），每帧最多一条
    pub keyword: Option<String>,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub tesseract: TesseractConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractConfig {
    /// tessdata 目录；None 时用 TESSDATA_PREFIX 或系统默认位置
    pub data_path: Option<PathBuf>,
    pub language: String,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            language: "eng".to_string(),
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            video_dir: PathBuf::from("videos"),
            screenshot_dir: PathBuf::from("screenshots"),
            clip_dir: std::env::temp_dir(),
            db_path: PathBuf::from("video_text.db"),
            videos: Vec::new(),
            sampling_interval_secs: DEFAULT_SAMPLING_INTERVAL_SECS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            timestamp_precision: DEFAULT_TIMESTAMP_PRECISION,
            max_workers: MAX_WORKERS,
            segment_timeout_secs: 60,
            clear_on_startup: false,
            keyword: None,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            tesseract: TesseractConfig::default(),
        }
    }
}

impl IndexerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("⚙️ Loading config from {:?}", path);
        let text = std::fs::read_to_string(path)?;
        Self::from_json5(&text)
    }

    pub fn from_json5(text: &str) -> Result<Self> {
        let config: Self =
            json5::from_str(text).map_err(|e| IndexerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sampling_interval_secs.is_finite() && self.sampling_interval_secs > 0.0) {
            return Err(IndexerError::Config(format!(
                "sampling_interval_secs must be > 0, got {}",
                self.sampling_interval_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(IndexerError::Config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.timestamp_precision > 6 {
            return Err(IndexerError::Config(format!(
                "timestamp_precision must be <= 6, got {}",
                self.timestamp_precision
            )));
        }
        if self.max_workers == 0 {
            return Err(IndexerError::Config("max_workers must be >= 1".to_string()));
        }
        if self.segment_timeout_secs == 0 {
            return Err(IndexerError::Config(
                "segment_timeout_secs must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// 配置的视频，相对路径拼到 video_dir 下
    pub fn resolved_videos(&self) -> Vec<VideoDescriptor> {
        self.videos
            .iter()
            .map(|v| {
                let mut v = v.clone();
                if v.path.is_relative() {
                    v.path = self.video_dir.join(&v.path);
                }
                v
            })
            .collect()
    }

    /// 实际线程数：min(可用核数, max_workers, 4)
    pub fn worker_count(&self) -> usize {
        num_cpus::get().min(self.max_workers).min(MAX_WORKERS).max(1)
    }

    pub fn segment_timeout(&self) -> Duration {
        Duration::from_secs(self.segment_timeout_secs)
    }
}
