use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::video::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// 文字区域：左上、右上、右下、左下
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub points: [Point; 4],
}

impl TextRegion {
    pub fn from_rect(left: f32, top: f32, width: f32, height: f32) -> Self {
        let right = left + width;
        let bottom = top + height;
        Self {
            points: [
                Point::new(left, top),
                Point::new(right, top),
                Point::new(right, bottom),
                Point::new(left, bottom),
            ],
        }
    }

    /// 外接矩形 (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        self.points.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(min_x, min_y, max_x, max_y), p| {
                (min_x.min(p.x), min_y.min(p.y), max_x.max(p.x), max_y.max(p.y))
            },
        )
    }

    pub fn is_finite(&self) -> bool {
        self.points.iter().all(|p| p.x.is_finite() && p.y.is_finite())
    }
}

/// 检测引擎的原始输出
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub region: TextRegion,
    pub text: String,
    pub confidence: f32,
}

/// 规范化后的候选：文本非空，置信度在 [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionCandidate {
    pub region: TextRegion,
    pub text: String,
    pub confidence: f32,
}

/// 外部文字检测能力。
///
/// 实例有内部状态且不能被并发调用，所以是 `Send` 而不是 `Sync`：
/// 每个工作线程持有自己的实例。
pub trait TextDetector: Send {
    fn name(&self) -> &str {
        "text-detector"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;
}

/// 每个工作线程启动时调用一次
pub trait DetectorFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn TextDetector>>;
}

impl<F> DetectorFactory for F
where
    F: Fn() -> Result<Box<dyn TextDetector>> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn TextDetector>> {
        self()
    }
}
