//! 按时间区间截取片段

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tempfile::TempPath;

use crate::core::error::{IndexerError, Result};
use crate::core::video::backend::{FrameWriter, VideoBackend};
use crate::core::video::source::VideoSource;

/// 临时片段文件。Drop 时删除，无论传输是否成功。
#[derive(Debug)]
pub struct SegmentClip {
    path: TempPath,
    pub frames_written: u64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

impl SegmentClip {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> io::Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// 拷贝到输出流，返回字节数
    pub fn stream_to<W: Write>(&self, mut out: W) -> io::Result<u64> {
        let mut file = File::open(&self.path)?;
        let copied = io::copy(&mut file, &mut out)?;
        out.flush()?;
        Ok(copied)
    }

    pub fn read_bytes(&self) -> io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }
}

impl Drop for SegmentClip {
    fn drop(&mut self) {
        debug!("🗑️ Releasing clip {:?}", &*self.path);
    }
}

pub struct SegmentExtractor {
    backend: Arc<dyn VideoBackend>,
    output_dir: PathBuf,
    timeout: Duration,
}

impl SegmentExtractor {
    pub fn new(backend: Arc<dyn VideoBackend>, output_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            backend,
            output_dir: output_dir.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 截取 [round(start·fps), round(end·fps)) 帧，保留原宽高与帧率。
    ///
    /// 超过 wall-clock 超时返回 `SegmentTimeout`，未完成的输出文件被删除。
    pub fn extract(&self, source: &VideoSource, start_secs: f64, end_secs: f64) -> Result<SegmentClip> {
        validate_range(start_secs, end_secs)?;

        let deadline = Instant::now() + self.timeout;
        let start_frame = source.frame_at(start_secs);
        let end_frame = source.frame_at(end_secs);
        let empty = || IndexerError::EmptySegment {
            start: start_secs,
            end: end_secs,
        };

        if end_frame <= start_frame || (source.frame_count > 0 && start_frame >= source.frame_count) {
            return Err(empty());
        }

        info!(
            "✂️ Extracting {} frames {}..{} ({:.2}s - {:.2}s)",
            source.id, start_frame, end_frame, start_secs, end_secs
        );

        std::fs::create_dir_all(&self.output_dir)?;
        let temp_path = tempfile::Builder::new()
            .prefix("segment_")
            .suffix(".mp4")
            .tempfile_in(&self.output_dir)?
            .into_temp_path();

        let timed_out = || {
            warn!("⏱️ Segment extraction for {} exceeded {:?}", source.id, self.timeout);
            IndexerError::SegmentTimeout(self.timeout)
        };

        let mut reader = self.backend.open_reader(source, start_frame)?;
        // 后端没能直接跳到起点时逐帧丢弃，同样受超时约束
        while reader.position() < start_frame {
            if Instant::now() >= deadline {
                return Err(timed_out());
            }
            if reader.read_frame()?.is_none() {
                return Err(empty());
            }
        }

        // 第一帧到手后再起编码器，空区间不产生进程
        let mut writer: Option<Box<dyn FrameWriter>> = None;
        let mut width = source.width;
        let mut height = source.height;

        while reader.position() < end_frame {
            if Instant::now() >= deadline {
                return Err(timed_out());
            }

            let Some(frame) = reader.read_frame()? else {
                break;
            };

            if writer.is_none() {
                width = frame.width;
                height = frame.height;
                writer = Some(self.backend.create_writer(&temp_path, width, height, source.frame_rate)?);
            }
            if let Some(w) = writer.as_mut() {
                w.write_frame(&frame)?;
            }
        }
        drop(reader);

        let Some(writer) = writer else {
            return Err(empty());
        };
        let frames_written = writer.finish()?;
        if frames_written == 0 {
            return Err(empty());
        }

        debug!("✅ Clip {:?}: {} frames", &*temp_path, frames_written);
        Ok(SegmentClip {
            path: temp_path,
            frames_written,
            width,
            height,
            frame_rate: source.frame_rate,
        })
    }

    /// 在独立线程上截取，立即返回。请求线程可以去做别的事，之后再 `wait`。
    pub fn spawn(self: &Arc<Self>, source: VideoSource, start_secs: f64, end_secs: f64) -> Result<SegmentJob> {
        let extractor = Arc::clone(self);
        let video_id = source.id.clone();
        let handle = thread::Builder::new()
            .name(format!("segment-{}", video_id))
            .spawn(move || extractor.extract(&source, start_secs, end_secs))?;
        Ok(SegmentJob { handle, video_id })
    }
}

/// 后台截取任务。丢弃时不等待；截取完成后片段随结果一起被删除。
pub struct SegmentJob {
    handle: JoinHandle<Result<SegmentClip>>,
    video_id: String,
}

impl SegmentJob {
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 阻塞到截取结束
    pub fn wait(self) -> Result<SegmentClip> {
        self.handle
            .join()
            .map_err(|_| IndexerError::WorkerPanicked(format!("segment extraction for {}", self.video_id)))?
    }
}

pub fn validate_range(start_secs: f64, end_secs: f64) -> Result<()> {
    if !start_secs.is_finite() || !end_secs.is_finite() {
        return Err(IndexerError::InvalidInput(
            "start_time and end_time must be numbers".to_string(),
        ));
    }
    if start_secs < 0.0 || end_secs < 0.0 {
        return Err(IndexerError::InvalidInput(
            "start_time and end_time must be >= 0".to_string(),
        ));
    }
    if start_secs > end_secs {
        return Err(IndexerError::InvalidInput(format!(
            "start_time {} is after end_time {}",
            start_secs, end_secs
        )));
    }
    Ok(())
}
