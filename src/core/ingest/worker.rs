//! 单个视频的处理流程：抽帧 → 检测 → 过滤 → 截图 + 入库

use std::sync::Arc;
use std::time::Instant;

use log::{info, warn};
use serde::Serialize;

use crate::core::detection::adapter::DetectionAdapter;
use crate::core::detection::detector::DetectionCandidate;
use crate::core::detection::filter::{DetectionFilter, FilterDecision, Observation};
use crate::core::error::Result;
use crate::core::screenshot::ScreenshotWriter;
use crate::core::store::{DetectionRecord, DetectionStore, UpsertOutcome};
use crate::core::video::frame::Frame;
use crate::core::video::sampler::FrameSampler;
use crate::core::video::source::{VideoDescriptor, VideoSource};
use crate::core::video::VideoBackend;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestSummary {
    pub frames_sampled: u64,
    pub candidates: u64,
    pub accepted: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub screenshot_failures: u64,
    pub detection_failures: u64,
    pub store_failures: u64,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub sampling_interval_secs: f64,
    pub confidence_threshold: f32,
    /// 定向搜索关键字；视频自己的 keyword 优先
    pub keyword: Option<String>,
}

/// 工作线程共享的只读上下文，store 是唯一被写入的共享状态
pub struct PipelineContext {
    pub store: Arc<dyn DetectionStore>,
    pub backend: Arc<dyn VideoBackend>,
    pub screenshots: Arc<ScreenshotWriter>,
    pub settings: IngestSettings,
}

/// 处理一个视频。
///
/// 只有打开视频失败会返回错误；单帧检测、截图和单条写入失败都在内部记录后继续。
/// `progress` 在每个采样帧处理完后调用。
pub fn ingest_video(
    ctx: &PipelineContext,
    adapter: &mut DetectionAdapter,
    descriptor: &VideoDescriptor,
    mut progress: impl FnMut(&IngestSummary),
) -> Result<IngestSummary> {
    let started = Instant::now();
    let source = VideoSource::open(descriptor, ctx.backend.as_ref())?;
    let sampler = FrameSampler::open(&source, ctx.backend.as_ref(), ctx.settings.sampling_interval_secs)?;

    let keyword = descriptor.keyword.as_deref().or(ctx.settings.keyword.as_deref());
    info!(
        "🎬 Ingesting {} ({}) every {} frames, keyword: {:?}",
        source.id,
        source.source_video,
        sampler.step(),
        keyword
    );

    let mut filter =
        DetectionFilter::new(ctx.settings.confidence_threshold, ctx.store.key_precision()).with_keyword(keyword);
    let mut summary = IngestSummary::default();
    let failures_before = adapter.failures();

    for frame in sampler {
        summary.frames_sampled += 1;
        let candidates = adapter.detect(&frame);
        summary.candidates += candidates.len() as u64;

        for candidate in &candidates {
            let matched = handle_candidate(ctx, &mut filter, &source, &frame, candidate, &mut summary);
            // 定向搜索每帧只取第一个命中
            if matched && filter.keyword().is_some() {
                break;
            }
        }
        progress(&summary);
    }

    summary.detection_failures = adapter.failures() - failures_before;
    info!(
        "✅ {} done in {:.2?}: {} frames, {} new, {} duplicate, {} rejected",
        source.id,
        started.elapsed(),
        summary.frames_sampled,
        summary.accepted,
        summary.duplicates,
        summary.rejected
    );
    Ok(summary)
}

/// 返回候选是否命中（新记录或重复记录）
fn handle_candidate(
    ctx: &PipelineContext,
    filter: &mut DetectionFilter,
    source: &VideoSource,
    frame: &Frame,
    candidate: &DetectionCandidate,
    summary: &mut IngestSummary,
) -> bool {
    let timestamp = frame.timestamp_secs();
    let observation = Observation {
        camera_id: &source.camera_id,
        source_video: &source.source_video,
        timestamp_secs: timestamp,
    };

    let decision = match filter.evaluate(candidate, observation, ctx.store.as_ref()) {
        Ok(decision) => decision,
        Err(e) => {
            summary.store_failures += 1;
            warn!("⚠️ {}: lookup failed for {:?}: {}", source.id, candidate.text, e);
            return false;
        }
    };

    let key = match decision {
        FilterDecision::Reject => {
            summary.rejected += 1;
            return false;
        }
        FilterDecision::Duplicate(_) => {
            summary.duplicates += 1;
            return true;
        }
        FilterDecision::Accept(key) => key,
    };

    // 同一视频可能被两个任务同时处理：只有插入成功的一方落盘截图，
    // 输掉的一方丢弃自己的临时文件，不覆盖已有截图
    let pending = ctx.screenshots.render(
        frame,
        &candidate.region,
        &candidate.text,
        timestamp,
        &source.camera_id,
    );
    if pending.is_none() {
        summary.screenshot_failures += 1;
    }

    let record = DetectionRecord {
        text: candidate.text.clone(),
        timestamp,
        camera_id: source.camera_id.clone(),
        source_video: source.source_video.clone(),
        confidence: candidate.confidence,
        screenshot: pending.as_ref().map(|p| p.filename().to_string()),
    };
    match ctx.store.upsert(&record) {
        Ok(UpsertOutcome::Inserted) => {
            summary.accepted += 1;
            if let Some(pending) = pending {
                if let Err(e) = pending.commit() {
                    summary.screenshot_failures += 1;
                    warn!("⚠️ {}: screenshot for {} failed: {}", source.id, key.as_id(), e);
                }
            }
        }
        Ok(UpsertOutcome::Duplicate) => summary.duplicates += 1,
        Err(e) => {
            summary.store_failures += 1;
            warn!("⚠️ {}: upsert {} failed: {}", source.id, key.as_id(), e);
        }
    }
    true
}
