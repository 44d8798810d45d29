//! 视频编解码接缝：生产环境用 ffmpeg，测试用合成帧

use std::path::Path;

use crate::core::error::Result;
use crate::core::video::frame::Frame;
use crate::core::video::source::{VideoMeta, VideoSource};

/// 顺序读帧。持有独占的读句柄，Drop 时释放。
pub trait FrameReader: Send {
    /// 下一次 read_frame 返回的帧号
    fn position(&self) -> u64;

    /// Ok(None) 表示流结束
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// 只能向前跳；返回 false 表示在到达目标前流已结束
    fn seek(&mut self, frame_index: u64) -> Result<bool> {
        while self.position() < frame_index {
            if self.read_frame()?.is_none() {
                return Ok(false);
            }
        }
        Ok(self.position() == frame_index)
    }
}

/// 顺序写帧到新容器
pub trait FrameWriter: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// 收尾并返回写入帧数
    fn finish(self: Box<Self>) -> Result<u64>;
}

pub trait VideoBackend: Send + Sync {
    fn probe(&self, path: &Path) -> Result<VideoMeta>;

    /// 打开读句柄，尽量从 `start_frame` 开始解码。
    ///
    /// 不支持跳转的实现可以从更早的位置开始，调用方以 `position()` 为准。
    fn open_reader(&self, source: &VideoSource, start_frame: u64) -> Result<Box<dyn FrameReader>>;

    fn create_writer(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        frame_rate: f64,
    ) -> Result<Box<dyn FrameWriter>>;
}
