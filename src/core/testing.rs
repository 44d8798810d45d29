//! 测试用合成视频后端与脚本化检测引擎

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::core::detection::detector::{DetectorFactory, RawDetection, TextDetector};
use crate::core::error::{IndexerError, Result};
use crate::core::video::backend::{FrameReader, FrameWriter, VideoBackend};
use crate::core::video::frame::Frame;
use crate::core::video::source::{VideoMeta, VideoSource};

pub const SYNTHETIC_WIDTH: u32 = 32;
pub const SYNTHETIC_HEIGHT: u32 = 24;
const DEFAULT_SEED: u8 = 128;

/// 单色灰帧
pub fn synthetic_frame(frame_number: u64, frame_rate: f64) -> Frame {
    filled_frame(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, DEFAULT_SEED, frame_number, frame_rate)
}

fn filled_frame(width: u32, height: u32, seed: u8, frame_number: u64, frame_rate: f64) -> Frame {
    let data = [seed, seed, seed, 255].repeat((width * height) as usize);
    Frame::at_index(width, height, data, frame_number, frame_rate)
}

#[derive(Debug, Clone)]
struct SyntheticVideo {
    width: u32,
    height: u32,
    frame_rate: f64,
    frame_count: u64,
    seed: u8,
    fail_after: Option<u64>,
    read_delay: Duration,
    seekable: bool,
}

/// 合成视频后端。
///
/// `add_video` 在磁盘上写一个占位文件（打开/探测会检查它是否存在），
/// 帧内容由内存中的描述生成：所有像素的 RGB 都等于该视频的 seed。
#[derive(Default)]
pub struct SyntheticBackend {
    videos: Mutex<HashMap<PathBuf, SyntheticVideo>>,
    open_readers: Arc<AtomicUsize>,
    written: Arc<Mutex<HashMap<PathBuf, Vec<u64>>>>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_video(&self, dir: &Path, name: &str, width: u32, height: u32, frame_rate: f64, frames: u64) -> PathBuf {
        let path = dir.join(name);
        fs::write(
            &path,
            format!("synthetic {}x{} @ {} fps, {} frames\n", width, height, frame_rate, frames),
        )
        .unwrap();
        self.videos.lock().unwrap().insert(
            path.clone(),
            SyntheticVideo {
                width,
                height,
                frame_rate,
                frame_count: frames,
                seed: DEFAULT_SEED,
                fail_after: None,
                read_delay: Duration::ZERO,
                seekable: true,
            },
        );
        path
    }

    fn update(&self, path: &Path, f: impl FnOnce(&mut SyntheticVideo)) {
        let mut videos = self.videos.lock().unwrap();
        f(videos.get_mut(path).expect("unknown synthetic video"));
    }

    pub fn set_seed(&self, path: &Path, seed: u8) {
        self.update(path, |v| v.seed = seed);
    }

    /// 帧号 >= n 的读取返回错误
    pub fn fail_reads_after(&self, path: &Path, n: u64) {
        self.update(path, |v| v.fail_after = Some(n));
    }

    pub fn set_read_delay(&self, path: &Path, delay: Duration) {
        self.update(path, |v| v.read_delay = delay);
    }

    /// 读句柄忽略起始帧，总是从第 0 帧开始解码
    pub fn disable_seeking(&self, path: &Path) {
        self.update(path, |v| v.seekable = false);
    }

    pub fn open_readers(&self) -> usize {
        self.open_readers.load(Ordering::SeqCst)
    }

    pub fn written_frames(&self, path: &Path) -> Vec<u64> {
        self.written.lock().unwrap().get(path).cloned().unwrap_or_default()
    }

    fn lookup(&self, path: &Path) -> Result<SyntheticVideo> {
        File::open(path).map_err(|e| IndexerError::source_unavailable(path, e))?;
        self.videos
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| IndexerError::Codec(format!("{:?} is not a synthetic video", path)))
    }
}

impl VideoBackend for SyntheticBackend {
    fn probe(&self, path: &Path) -> Result<VideoMeta> {
        let video = self.lookup(path)?;
        Ok(VideoMeta {
            width: video.width,
            height: video.height,
            frame_rate: video.frame_rate,
            frame_count: video.frame_count,
        })
    }

    fn open_reader(&self, source: &VideoSource, start_frame: u64) -> Result<Box<dyn FrameReader>> {
        let video = self.lookup(&source.path)?;
        let position = if video.seekable {
            start_frame.min(video.frame_count)
        } else {
            0
        };
        self.open_readers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticReader {
            video,
            frame_rate: source.frame_rate,
            position,
            open_readers: Arc::clone(&self.open_readers),
        }))
    }

    fn create_writer(&self, path: &Path, _width: u32, _height: u32, _frame_rate: f64) -> Result<Box<dyn FrameWriter>> {
        Ok(Box::new(SyntheticWriter {
            file: File::create(path)?,
            path: path.to_path_buf(),
            frames: Vec::new(),
            written: Arc::clone(&self.written),
        }))
    }
}

struct SyntheticReader {
    video: SyntheticVideo,
    frame_rate: f64,
    position: u64,
    open_readers: Arc<AtomicUsize>,
}

impl FrameReader for SyntheticReader {
    fn position(&self) -> u64 {
        self.position
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.position >= self.video.frame_count {
            return Ok(None);
        }
        if !self.video.read_delay.is_zero() {
            thread::sleep(self.video.read_delay);
        }
        if matches!(self.video.fail_after, Some(n) if self.position >= n) {
            return Err(IndexerError::Codec(format!("corrupt packet at frame {}", self.position)));
        }

        let frame = filled_frame(
            self.video.width,
            self.video.height,
            self.video.seed,
            self.position,
            self.frame_rate,
        );
        self.position += 1;
        Ok(Some(frame))
    }
}

impl Drop for SyntheticReader {
    fn drop(&mut self) {
        self.open_readers.fetch_sub(1, Ordering::SeqCst);
    }
}

struct SyntheticWriter {
    file: File,
    path: PathBuf,
    frames: Vec<u64>,
    written: Arc<Mutex<HashMap<PathBuf, Vec<u64>>>>,
}

impl FrameWriter for SyntheticWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.file.write_all(&frame.frame_number.to_le_bytes())?;
        self.frames.push(frame.frame_number);
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<u64> {
        self.file.flush()?;
        let count = self.frames.len() as u64;
        self.written
            .lock()
            .unwrap()
            .insert(self.path.clone(), std::mem::take(&mut self.frames));
        Ok(count)
    }
}

type Script = Box<dyn FnMut(&Frame) -> Result<Vec<RawDetection>> + Send>;

/// 按闭包返回结果的检测引擎
pub struct ScriptedDetector {
    script: Script,
}

impl ScriptedDetector {
    pub fn new(script: impl FnMut(&Frame) -> Result<Vec<RawDetection>> + Send + 'static) -> Self {
        Self {
            script: Box::new(script),
        }
    }
}

impl TextDetector for ScriptedDetector {
    fn name(&self) -> &str {
        "scripted"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        (self.script)(frame)
    }
}

/// 记录创建次数的引擎工厂
pub struct CountingFactory {
    make: Box<dyn Fn() -> Result<Box<dyn TextDetector>> + Send + Sync>,
    created: AtomicUsize,
}

impl CountingFactory {
    pub fn new(make: impl Fn() -> Result<Box<dyn TextDetector>> + Send + Sync + 'static) -> Self {
        Self {
            make: Box::new(make),
            created: AtomicUsize::new(0),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl DetectorFactory for CountingFactory {
    fn create(&self) -> Result<Box<dyn TextDetector>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        (self.make)()
    }
}
