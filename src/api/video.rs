//! 视频列表、手动处理、片段截取

use log::info;

use crate::api::error::ApiError;
use crate::api::indexer::VideoTextIndexer;
use crate::api::models::{ProcessAccepted, ProcessRequest, VideoListItem, VideoListResponse};
use crate::core::ingest::IngestSummary;
use crate::core::video::segment::validate_range;
use crate::core::video::{SegmentClip, SegmentJob, VideoDescriptor, VideoSource};

impl VideoTextIndexer {
    pub fn list_videos(&self) -> VideoListResponse {
        let videos = self
            .config
            .videos
            .iter()
            .map(|v| VideoListItem {
                id: v.id.clone(),
                name: v.source_name(),
                camera_id: v.camera().to_string(),
            })
            .collect();
        VideoListResponse { videos }
    }

    fn request_descriptor(&self, request: &ProcessRequest) -> Result<VideoDescriptor, ApiError> {
        let descriptor = self.resolve_video(&request.video, request.camera_id.as_deref())?;
        Ok(match request.keyword.as_deref().map(str::trim) {
            Some(keyword) if !keyword.is_empty() => descriptor.with_keyword(keyword),
            _ => descriptor,
        })
    }

    /// 后台处理，立即返回
    pub fn process(&self, request: &ProcessRequest) -> Result<ProcessAccepted, ApiError> {
        let descriptor = self.request_descriptor(request)?;
        info!("📥 Process requested: {} ({:?})", descriptor.id, descriptor.path);
        // 不等待结果，进度通过 ingest_state 查询
        drop(self.orchestrator.spawn_on_demand(descriptor)?);
        Ok(ProcessAccepted::processing(&request.video))
    }

    /// 同步处理单个视频
    pub fn process_and_wait(&self, request: &ProcessRequest) -> Result<IngestSummary, ApiError> {
        let descriptor = self.request_descriptor(request)?;
        Ok(self.orchestrator.process_and_wait(&descriptor)?)
    }

    /// 在后台线程上截取片段，参数校验和视频解析完成后立即返回。
    ///
    /// 传输层在方便的时候 `wait` 拿到片段；片段在 `SegmentClip` 被丢弃时删除。
    pub fn spawn_video_segment(
        &self,
        video_path: &str,
        start_secs: f64,
        end_secs: f64,
    ) -> Result<SegmentJob, ApiError> {
        validate_range(start_secs, end_secs)?;
        let descriptor = self.resolve_video(video_path, None)?;
        let source = VideoSource::open(&descriptor, self.backend.as_ref())?;
        Ok(self.segments.spawn(source, start_secs, end_secs)?)
    }

    /// 同步版本：调用线程等待截取完成，再把片段交给 `transfer`（例如写入 HTTP 响应体）。
    ///
    /// `transfer` 返回后临时片段即被删除，包括 `transfer` 自己 panic 的情况。
    pub fn video_segment<T>(
        &self,
        video_path: &str,
        start_secs: f64,
        end_secs: f64,
        transfer: impl FnOnce(&SegmentClip) -> T,
    ) -> Result<T, ApiError> {
        let clip = self.spawn_video_segment(video_path, start_secs, end_secs)?.wait()?;
        Ok(transfer(&clip))
    }
}
