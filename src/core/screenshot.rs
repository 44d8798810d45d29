//! 检测截图：在帧副本上画出文字区域外框并保存为 PNG

use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageOutputFormat, Rgba, RgbaImage};
use log::{debug, warn};
use tempfile::NamedTempFile;

use crate::core::detection::detector::TextRegion;
use crate::core::error::{IndexerError, Result};
use crate::core::video::frame::Frame;

pub const HIGHLIGHT_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
pub const HIGHLIGHT_THICKNESS: u32 = 2;
const MAX_TEXT_CHARS: usize = 20;

/// `<文本中的字母数字，最多20个>_<camera>_<时间戳1位小数，点换成下划线>s.png`
pub fn screenshot_filename(text: &str, camera_id: &str, timestamp_secs: f64) -> String {
    let safe_text: String = text
        .chars()
        .filter(|c| c.is_alphanumeric())
        .take(MAX_TEXT_CHARS)
        .collect();
    let safe_camera: String = camera_id
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    let ts = format!("{:.1}", timestamp_secs).replace('.', "_");
    format!("{}_{}_{}s.png", safe_text, safe_camera, ts)
}

/// 只允许目录内的纯文件名
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty() && !name.contains("..") && !name.contains('/') && !name.contains('\\')
}

pub struct ScreenshotWriter {
    dir: PathBuf,
}

impl ScreenshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 渲染并立即落盘。失败时只告警并返回 None，检测记录照常保存
    pub fn write(
        &self,
        frame: &Frame,
        region: &TextRegion,
        text: &str,
        timestamp_secs: f64,
        camera_id: &str,
    ) -> Option<String> {
        let pending = self.render(frame, region, text, timestamp_secs, camera_id)?;
        let filename = pending.filename().to_string();
        match pending.commit() {
            Ok(()) => Some(filename),
            Err(e) => {
                warn!("⚠️ Screenshot {} failed: {}", filename, e);
                None
            }
        }
    }

    /// 渲染到目录内的临时文件，`commit` 之前目标文件名不会被占用或覆盖
    pub fn render(
        &self,
        frame: &Frame,
        region: &TextRegion,
        text: &str,
        timestamp_secs: f64,
        camera_id: &str,
    ) -> Option<PendingScreenshot> {
        let filename = screenshot_filename(text, camera_id, timestamp_secs);
        match self.render_to_temp(frame, region) {
            Ok(file) => Some(PendingScreenshot {
                target: self.dir.join(&filename),
                filename,
                file,
            }),
            Err(e) => {
                warn!("⚠️ Screenshot {} failed: {}", filename, e);
                None
            }
        }
    }

    fn render_to_temp(&self, frame: &Frame, region: &TextRegion) -> Result<NamedTempFile> {
        let mut img = frame.to_rgba_image().ok_or_else(|| {
            IndexerError::ArtifactWriteFailed(format!(
                "frame {} has {} bytes for {}x{}",
                frame.frame_number,
                frame.data.len(),
                frame.width,
                frame.height
            ))
        })?;
        draw_region(&mut img, region);

        // 先写临时文件再改名，读者看不到半个文件
        let mut tmp = tempfile::Builder::new()
            .prefix(".shot_")
            .suffix(".png")
            .tempfile_in(&self.dir)?;
        img.write_to(tmp.as_file_mut(), ImageOutputFormat::Png)
            .map_err(|e| IndexerError::ArtifactWriteFailed(e.to_string()))?;
        Ok(tmp)
    }
}

/// 已渲染、尚未落盘的截图。丢弃即删除临时文件。
pub struct PendingScreenshot {
    filename: String,
    target: PathBuf,
    file: NamedTempFile,
}

impl PendingScreenshot {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn commit(self) -> Result<()> {
        self.file
            .persist(&self.target)
            .map_err(|e| IndexerError::ArtifactWriteFailed(e.error.to_string()))?;
        debug!("📸 Screenshot saved: {}", self.filename);
        Ok(())
    }
}

/// 外接矩形描边，超出画面的部分裁掉
fn draw_region(img: &mut RgbaImage, region: &TextRegion) {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let (min_x, min_y, max_x, max_y) = region.bounds();
    let clamp_x = |v: f32| (v.round().max(0.0) as u32).min(width - 1);
    let clamp_y = |v: f32| (v.round().max(0.0) as u32).min(height - 1);
    let (x0, y0, x1, y1) = (clamp_x(min_x), clamp_y(min_y), clamp_x(max_x), clamp_y(max_y));

    for t in 0..HIGHLIGHT_THICKNESS {
        for x in x0..=x1 {
            for y in [y0.saturating_add(t).min(y1), y1.saturating_sub(t).max(y0)] {
                img.put_pixel(x, y, HIGHLIGHT_COLOR);
            }
        }
        for y in y0..=y1 {
            for x in [x0.saturating_add(t).min(x1), x1.saturating_sub(t).max(x0)] {
                img.put_pixel(x, y, HIGHLIGHT_COLOR);
            }
        }
    }
}
