//! ffmpeg / ffprobe 后端
//!
//! - 元数据：ffprobe JSON
//! - 解码：ffmpeg-sidecar rawvideo (rgb24) 帧迭代
//! - 编码：RGBA 帧写入 ffmpeg stdin，输出 H.264 MP4

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, Command};

use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel, OutputVideoFrame};
use ffmpeg_sidecar::iter::FfmpegIterator;
use log::{debug, error, info, warn};
use serde::Deserialize;

use crate::core::error::{IndexerError, Result};
use crate::core::video::backend::{FrameReader, FrameWriter, VideoBackend};
use crate::core::video::frame::Frame;
use crate::core::video::source::{VideoMeta, VideoSource};

#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegBackend {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl VideoBackend for FfmpegBackend {
    fn probe(&self, path: &Path) -> Result<VideoMeta> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate,avg_frame_rate,nb_frames,duration",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .map_err(|e| IndexerError::source_unavailable(path, format!("ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IndexerError::source_unavailable(path, stderr.trim()));
        }

        parse_probe_output(&output.stdout)
            .ok_or_else(|| IndexerError::source_unavailable(path, "no video stream"))
    }

    fn open_reader(&self, source: &VideoSource, start_frame: u64) -> Result<Box<dyn FrameReader>> {
        let input = source.path.to_string_lossy().into_owned();

        let mut cmd = FfmpegCommand::new_with_path(&self.ffmpeg_path);
        cmd.hide_banner();
        // -ss 放在 -i 之前：输入端跳转，不用从第 0 帧解码
        let position = if start_frame > 0 && source.frame_rate > 0.0 {
            cmd.seek(format!("{:.6}", start_frame as f64 / source.frame_rate));
            start_frame
        } else {
            0
        };
        cmd.input(&input).rawvideo();
        debug!("🎞️ Decode command: {:?}", cmd.as_inner());

        let mut child = cmd
            .spawn()
            .map_err(|e| IndexerError::source_unavailable(&source.path, e))?;
        let frames = match child.iter() {
            Ok(iter) => iter.filter_frames(),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(IndexerError::source_unavailable(&source.path, e));
            }
        };

        Ok(Box::new(FfmpegFrameReader {
            child,
            frames: Box::new(frames),
            position,
            frame_rate: source.frame_rate,
            path: source.path.clone(),
        }))
    }

    fn create_writer(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        frame_rate: f64,
    ) -> Result<Box<dyn FrameWriter>> {
        // yuv420p 要求偶数宽高
        let pix_fmt = if width % 2 == 0 && height % 2 == 0 {
            "yuv420p"
        } else {
            "yuv444p"
        };
        let size = format!("{}x{}", width, height);
        let rate = format!("{}", frame_rate);

        let mut cmd = FfmpegCommand::new_with_path(&self.ffmpeg_path);
        cmd.hide_banner()
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "-s", size.as_str(), "-r", rate.as_str()])
            .input("-")
            .args(["-c:v", "libx264", "-pix_fmt", pix_fmt, "-movflags", "+faststart"])
            .overwrite()
            .output(path);
        debug!("🎞️ Encode command: {:?}", cmd.as_inner());

        let mut child = cmd.spawn().map_err(|e| IndexerError::Codec(e.to_string()))?;
        let stdin = child.take_stdin();
        // 迭代器线程负责排空 stderr，避免管道写满阻塞 ffmpeg
        let events = match child.iter() {
            Ok(iter) => iter,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(IndexerError::Codec(e.to_string()));
            }
        };

        Ok(Box::new(FfmpegFrameWriter {
            child,
            stdin,
            events: Some(events),
            width,
            height,
            frames_written: 0,
            finished: false,
            path: path.to_path_buf(),
        }))
    }
}

pub struct FfmpegFrameReader {
    child: FfmpegChild,
    frames: Box<dyn Iterator<Item = OutputVideoFrame> + Send>,
    position: u64,
    frame_rate: f64,
    path: PathBuf,
}

impl FrameReader for FfmpegFrameReader {
    fn position(&self) -> u64 {
        self.position
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(raw) = self.frames.next() else {
            return Ok(None);
        };

        let expected = raw.width as usize * raw.height as usize * 3;
        if raw.data.len() != expected {
            return Err(IndexerError::Codec(format!(
                "frame {} has {} bytes, expected {}",
                self.position,
                raw.data.len(),
                expected
            )));
        }

        let frame = Frame::from_rgb24(raw.width, raw.height, &raw.data, self.position, self.frame_rate);
        self.position += 1;
        Ok(Some(frame))
    }
}

impl Drop for FfmpegFrameReader {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        debug!("🗑️ Released decoder for {:?} at frame {}", self.path, self.position);
    }
}

pub struct FfmpegFrameWriter {
    child: FfmpegChild,
    stdin: Option<ChildStdin>,
    events: Option<FfmpegIterator>,
    width: u32,
    height: u32,
    frames_written: u64,
    finished: bool,
    path: PathBuf,
}

impl FrameWriter for FfmpegFrameWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.width != self.width || frame.height != self.height || !frame.is_well_formed() {
            return Err(IndexerError::Codec(format!(
                "frame {} is {}x{}, writer expects {}x{}",
                frame.frame_number, frame.width, frame.height, self.width, self.height
            )));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| IndexerError::Codec("encoder stdin closed".to_string()))?;
        stdin
            .write_all(&frame.data)
            .map_err(|e| IndexerError::Codec(format!("encoder write failed: {}", e)))?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<u64> {
        // 关闭 stdin，ffmpeg 才会收尾
        drop(self.stdin.take());

        let mut last_error = None;
        if let Some(events) = self.events.take() {
            for event in events {
                match event {
                    FfmpegEvent::Error(msg) | FfmpegEvent::Log(LogLevel::Error, msg) => {
                        warn!("ffmpeg: {}", msg);
                        last_error = Some(msg);
                    }
                    _ => {}
                }
            }
        }

        let status = self
            .child
            .wait()
            .map_err(|e| IndexerError::Codec(format!("encoder wait failed: {}", e)))?;
        self.finished = true;

        if !status.success() {
            error!("❌ Encoder for {:?} exited with {}", self.path, status);
            return Err(IndexerError::Codec(
                last_error.unwrap_or_else(|| format!("ffmpeg exited with {}", status)),
            ));
        }

        info!("✅ Encoded {} frames to {:?}", self.frames_written, self.path);
        Ok(self.frames_written)
    }
}

impl Drop for FfmpegFrameWriter {
    fn drop(&mut self) {
        if !self.finished {
            drop(self.stdin.take());
            let _ = self.child.kill();
            let _ = self.child.wait();
            debug!("🗑️ Aborted encoder for {:?}", self.path);
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

fn parse_probe_output(stdout: &[u8]) -> Option<VideoMeta> {
    let parsed: ProbeOutput = serde_json::from_slice(stdout).ok()?;
    let stream = parsed.streams.into_iter().next()?;

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rational)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rational))
        .unwrap_or(0.0);

    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .or_else(|| {
            let duration = stream.duration.as_deref()?.parse::<f64>().ok()?;
            (frame_rate > 0.0 && duration > 0.0).then(|| (duration * frame_rate).round() as u64)
        })
        .unwrap_or(0);

    Some(VideoMeta {
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        frame_rate,
        frame_count,
    })
}

/// "30000/1001" -> 29.97
fn parse_rational(value: &str) -> Option<f64> {
    let (num, den) = match value.split_once('/') {
        Some((n, d)) => (n.trim().parse::<f64>().ok()?, d.trim().parse::<f64>().ok()?),
        None => (value.trim().parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || !num.is_finite() {
        return None;
    }
    let rate = num / den;
    (rate > 0.0).then_some(rate)
}
