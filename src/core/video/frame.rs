use std::io::Cursor;
use std::time::Duration;

use image::{ImageOutputFormat, RgbaImage};

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGBA 格式
    pub timestamp: Duration,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp: Duration,
        frame_number: u64,
    ) -> Self {
        Self {
            width,
            height,
            data,
            timestamp,
            frame_number,
        }
    }

    /// 由帧号和帧率推出时间戳
    pub fn at_index(width: u32, height: u32, data: Vec<u8>, frame_number: u64, frame_rate: f64) -> Self {
        let secs = if frame_rate > 0.0 {
            frame_number as f64 / frame_rate
        } else {
            0.0
        };
        Self::new(width, height, data, Duration::from_secs_f64(secs), frame_number)
    }

    /// ffmpeg rawvideo (rgb24) -> RGBA
    pub fn from_rgb24(width: u32, height: u32, rgb: &[u8], frame_number: u64, frame_rate: f64) -> Self {
        let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
        for chunk in rgb.chunks_exact(3) {
            rgba.extend_from_slice(&[chunk[0], chunk[1], chunk[2], 255]);
        }
        Self::at_index(width, height, rgba, frame_number, frame_rate)
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp.as_secs_f64()
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.pixel_count() * 4
    }

    /// 拷贝一份像素数据，原帧保持不变
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }

    pub fn encode_png(&self) -> Option<Vec<u8>> {
        let img = self.to_rgba_image()?;
        let mut buffer = Cursor::new(Vec::new());
        match img.write_to(&mut buffer, ImageOutputFormat::Png) {
            Ok(()) => Some(buffer.into_inner()),
            Err(_) => None,
        }
    }
}
