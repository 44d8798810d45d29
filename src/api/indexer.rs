//! 索引服务入口：持有存储、视频后端、工作池和片段截取器

use std::sync::Arc;

use log::info;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::api::error::ApiError;
use crate::core::config::IndexerConfig;
use crate::core::detection::{DetectorFactory, TesseractDetector, TextDetector};
use crate::core::error::Result;
use crate::core::ingest::{BatchHandle, IngestOrchestrator, IngestSettings, IngestState, PipelineContext};
use crate::core::screenshot::ScreenshotWriter;
use crate::core::store::{ClearScope, DetectionStore, SqliteDetectionStore};
use crate::core::video::{FfmpegBackend, SegmentExtractor, VideoBackend, VideoDescriptor};

/// 视频目录下允许直接引用的文件名
static VIDEO_FILE_NAME: Lazy<std::result::Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 ._-]*$"));

pub struct VideoTextIndexer {
    pub(crate) config: IndexerConfig,
    pub(crate) store: Arc<dyn DetectionStore>,
    pub(crate) orchestrator: IngestOrchestrator,
    pub(crate) segments: Arc<SegmentExtractor>,
    pub(crate) backend: Arc<dyn VideoBackend>,
}

impl VideoTextIndexer {
    /// 生产配置：SQLite + ffmpeg + tesseract
    pub fn create(config: IndexerConfig) -> std::result::Result<Self, ApiError> {
        config.validate()?;
        let store = Arc::new(SqliteDetectionStore::open(&config.db_path, config.timestamp_precision)?);
        let backend = Arc::new(FfmpegBackend::new(
            config.ffmpeg_path.clone(),
            config.ffprobe_path.clone(),
        ));

        let tesseract = config.tesseract.clone();
        let factory = move || -> Result<Box<dyn TextDetector>> {
            Ok(Box::new(TesseractDetector::new(
                tesseract.data_path.as_deref(),
                &tesseract.language,
            )?))
        };

        Self::with_components(config, store, backend, Arc::new(factory))
    }

    pub fn with_components(
        mut config: IndexerConfig,
        store: Arc<dyn DetectionStore>,
        backend: Arc<dyn VideoBackend>,
        factory: Arc<dyn DetectorFactory>,
    ) -> std::result::Result<Self, ApiError> {
        config.videos = config.resolved_videos();
        let screenshots = Arc::new(ScreenshotWriter::new(&config.screenshot_dir)?);
        let ctx = PipelineContext {
            store: Arc::clone(&store),
            backend: Arc::clone(&backend),
            screenshots,
            settings: IngestSettings {
                sampling_interval_secs: config.sampling_interval_secs,
                confidence_threshold: config.confidence_threshold,
                keyword: config.keyword.clone(),
            },
        };
        let orchestrator = IngestOrchestrator::new(ctx, factory, config.worker_count())?;
        let segments = Arc::new(SegmentExtractor::new(
            Arc::clone(&backend),
            config.clip_dir.clone(),
            config.segment_timeout(),
        ));

        info!(
            "🚀 VideoTextIndexer: {} configured videos, {} workers",
            config.videos.len(),
            orchestrator.workers()
        );
        Ok(Self {
            config,
            store,
            orchestrator,
            segments,
            backend,
        })
    }

    /// 处理配置中的全部视频，按需先清空存储。派发后立即返回。
    pub fn start(&self) -> std::result::Result<BatchHandle, ApiError> {
        let videos = self.config.videos.clone();
        if self.config.clear_on_startup {
            Ok(self.orchestrator.clear_and_dispatch(&ClearScope::All, videos)?)
        } else {
            Ok(self.orchestrator.dispatch(videos))
        }
    }

    pub fn ingest_state(&self, video_id: &str) -> IngestState {
        self.orchestrator.state(video_id)
    }

    pub fn ingest_states(&self) -> Vec<(String, IngestState)> {
        self.orchestrator.states()
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// 配置里的 id 或文件名优先，其次是视频目录下的文件
    pub(crate) fn resolve_video(
        &self,
        name: &str,
        camera_id: Option<&str>,
    ) -> std::result::Result<VideoDescriptor, ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::invalid_input("No video path provided"));
        }

        let configured = self
            .config
            .videos
            .iter()
            .find(|v| v.id == name || v.source_name() == name);
        let descriptor = match configured {
            Some(v) => v.clone(),
            None => {
                let pattern = VIDEO_FILE_NAME
                    .as_ref()
                    .map_err(|e| ApiError::internal(format!("Invalid video name pattern: {}", e)))?;
                if name.contains("..") || !pattern.is_match(name) {
                    return Err(ApiError::invalid_input(format!("Invalid video name: {}", name)));
                }
                VideoDescriptor::new(name, self.config.video_dir.join(name))
            }
        };

        Ok(match camera_id {
            Some(camera) => descriptor.with_camera(camera),
            None => descriptor,
        })
    }
}

impl Drop for VideoTextIndexer {
    fn drop(&mut self) {
        info!("🗑️ VideoTextIndexer: released");
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::indexer;
    use super::*;

    #[test]
    fn test_start_ingests_configured_videos() {
        let (_dir, _backend, indexer) = indexer(&[("CAM_01", "OCR-Video.mp4"), ("CAM_02", "dock.mp4")], |_| {});

        let report = indexer.start().unwrap().wait();
        assert_eq!(report.completed.len(), 2);
        assert_eq!(indexer.store.count().unwrap(), 20);
        assert!(matches!(indexer.ingest_state("CAM_01"), IngestState::Done(_)));
        assert_eq!(indexer.ingest_states().len(), 2);
    }

    #[test]
    fn test_clear_on_startup() {
        let (_dir, _backend, indexer) = indexer(&[("CAM_01", "OCR-Video.mp4")], |c| c.clear_on_startup = true);
        indexer.start().unwrap().wait();
        indexer.start().unwrap().wait();

        // 清空后重新写入，而不是全部判为重复
        let states = indexer.ingest_states();
        match &states[0].1 {
            IngestState::Done(summary) => assert_eq!(summary.accepted, 10),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_relative_configured_path_is_found_in_video_dir() {
        let (_dir, _backend, indexer) = indexer(&[("CAM_01", "OCR-Video.mp4")], |c| {
            c.videos[0].path = std::path::PathBuf::from("OCR-Video.mp4");
        });
        assert!(indexer.config().videos[0].path.is_absolute());

        let report = indexer.start().unwrap().wait();
        assert!(report.failed.is_empty(), "{:?}", report.failed);
        assert_eq!(report.completed.len(), 1);
        assert_eq!(indexer.search("msi-30").unwrap().results[0].source_video, "OCR-Video.mp4");
    }

    #[test]
    fn test_resolve_video() {
        let (_dir, _backend, indexer) = indexer(&[("CAM_01", "OCR-Video.mp4")], |_| {});

        assert_eq!(indexer.resolve_video("CAM_01", None).unwrap().id, "CAM_01");
        assert_eq!(indexer.resolve_video("OCR-Video.mp4", None).unwrap().id, "CAM_01");
        assert_eq!(
            indexer.resolve_video("other.mp4", Some("CAM_09")).unwrap().camera(),
            "CAM_09"
        );

        for bad in ["", "../etc/passwd", "a/b.mp4", "..", ".hidden"] {
            let err = indexer.resolve_video(bad, None).unwrap_err();
            assert_eq!(err.status_code(), 400, "{}", bad);
        }
    }
}
