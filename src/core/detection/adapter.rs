use log::{debug, info, warn};

use crate::core::detection::detector::{DetectionCandidate, DetectorFactory, RawDetection, TextDetector};
use crate::core::error::Result;
use crate::core::video::frame::Frame;

/// 包装外部检测引擎：把输出规范化为候选，吞掉单帧错误
pub struct DetectionAdapter {
    engine: Box<dyn TextDetector>,
    failures: u64,
}

impl DetectionAdapter {
    pub fn new(engine: Box<dyn TextDetector>) -> Self {
        info!("🔤 DetectionAdapter: bound to {}", engine.name());
        Self { engine, failures: 0 }
    }

    pub fn from_factory(factory: &dyn DetectorFactory) -> Result<Self> {
        Ok(Self::new(factory.create()?))
    }

    /// 单帧检测。引擎报错时记录日志并返回空集。
    pub fn detect(&mut self, frame: &Frame) -> Vec<DetectionCandidate> {
        match self.engine.detect(frame) {
            Ok(raw) => raw.into_iter().filter_map(normalize).collect(),
            Err(e) => {
                self.failures += 1;
                warn!(
                    "⚠️ {} failed on frame {}: {}",
                    self.engine.name(),
                    frame.frame_number,
                    e
                );
                Vec::new()
            }
        }
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}

impl Drop for DetectionAdapter {
    fn drop(&mut self) {
        debug!("🗑️ DetectionAdapter: releasing {}", self.engine.name());
    }
}

/// 文本保持原样（去重键依赖原始字符串），只丢弃空文本和坏数值
fn normalize(raw: RawDetection) -> Option<DetectionCandidate> {
    if raw.text.trim().is_empty() || !raw.confidence.is_finite() || !raw.region.is_finite() {
        return None;
    }
    Some(DetectionCandidate {
        region: raw.region,
        text: raw.text,
        confidence: raw.confidence.clamp(0.0, 1.0),
    })
}
