//! 固定间隔抽帧

use std::iter::FusedIterator;

use log::{debug, warn};

use crate::core::error::{IndexerError, Result};
use crate::core::video::backend::{FrameReader, VideoBackend};
use crate::core::video::frame::Frame;
use crate::core::video::source::VideoSource;

/// 相邻采样帧的间距：⌊interval × fps⌋，至少 1
pub fn sampling_step(interval_secs: f64, frame_rate: f64) -> u64 {
    ((interval_secs * frame_rate).floor() as u64).max(1)
}

/// 惰性、有限、不可重启的 (帧, 时间戳) 序列。
///
/// 从第 0 帧开始每隔 `step` 帧取一帧。读句柄由采样器独占，
/// 序列耗尽或被提前丢弃时随 reader 一起释放。中途读失败视为流结束。
pub struct FrameSampler {
    reader: Option<Box<dyn FrameReader>>,
    step: u64,
    next_index: u64,
    frame_count: u64,
    video_id: String,
}

impl FrameSampler {
    pub fn open(source: &VideoSource, backend: &dyn VideoBackend, interval_secs: f64) -> Result<Self> {
        if !(interval_secs.is_finite() && interval_secs > 0.0) {
            return Err(IndexerError::InvalidInput(format!(
                "sampling interval must be > 0, got {}",
                interval_secs
            )));
        }

        let reader = backend.open_reader(source, 0)?;
        let step = sampling_step(interval_secs, source.frame_rate);
        debug!(
            "🎞️ Sampling {} every {} frames ({}s @ {:.3} fps)",
            source.id, step, interval_secs, source.frame_rate
        );

        Ok(Self {
            reader: Some(reader),
            step,
            next_index: 0,
            frame_count: source.frame_count,
            video_id: source.id.clone(),
        })
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    fn finish(&mut self) {
        if self.reader.take().is_some() {
            debug!("🗑️ Sampler for {} released at frame {}", self.video_id, self.next_index);
        }
    }
}

impl Iterator for FrameSampler {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let reader = self.reader.as_mut()?;

        if self.frame_count > 0 && self.next_index >= self.frame_count {
            self.finish();
            return None;
        }

        let frame = match reader.seek(self.next_index) {
            Ok(true) => reader.read_frame(),
            Ok(false) => Ok(None),
            Err(e) => Err(e),
        };

        match frame {
            Ok(Some(frame)) => {
                self.next_index += self.step;
                Some(frame)
            }
            Ok(None) => {
                self.finish();
                None
            }
            Err(e) => {
                warn!(
                    "⚠️ {}: read failed at frame {}, ending stream: {}",
                    self.video_id, self.next_index, e
                );
                self.finish();
                None
            }
        }
    }
}

impl FusedIterator for FrameSampler {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::SyntheticBackend;
    use crate::core::video::VideoDescriptor;

    fn open_source(backend: &SyntheticBackend, dir: &std::path::Path, fps: f64, frames: u64) -> VideoSource {
        let path = backend.add_video(dir, "sample.mp4", 32, 24, fps, frames);
        VideoSource::open(&VideoDescriptor::new("CAM_01", path), backend).unwrap()
    }

    #[test]
    fn test_sampling_step() {
        assert_eq!(sampling_step(1.0, 30.0), 30);
        assert_eq!(sampling_step(0.5, 29.97), 14);
        assert_eq!(sampling_step(0.01, 30.0), 1);
    }

    #[test]
    fn test_visits_multiples_of_step() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SyntheticBackend::new();
        let source = open_source(&backend, dir.path(), 30.0, 100);

        let sampler = FrameSampler::open(&source, &backend, 1.0).unwrap();
        let visited: Vec<u64> = sampler.map(|f| f.frame_number).collect();

        assert_eq!(visited, vec![0, 30, 60, 90]);
    }

    #[test]
    fn test_timestamps_are_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SyntheticBackend::new();
        let source = open_source(&backend, dir.path(), 25.0, 250);

        let sampler = FrameSampler::open(&source, &backend, 0.4).unwrap();
        let timestamps: Vec<f64> = sampler.map(|f| f.timestamp_secs()).collect();

        assert_eq!(timestamps.len(), 25);
        assert_eq!(timestamps[0], 0.0);
        assert!(timestamps.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_rejects_non_positive_interval() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SyntheticBackend::new();
        let source = open_source(&backend, dir.path(), 30.0, 10);

        assert!(matches!(
            FrameSampler::open(&source, &backend, 0.0),
            Err(IndexerError::InvalidInput(_))
        ));
        assert!(matches!(
            FrameSampler::open(&source, &backend, f64::NAN),
            Err(IndexerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_read_failure_ends_stream_early() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SyntheticBackend::new();
        let source = open_source(&backend, dir.path(), 30.0, 300);
        backend.fail_reads_after(&source.path, 65);

        let sampler = FrameSampler::open(&source, &backend, 1.0).unwrap();
        let visited: Vec<u64> = sampler.map(|f| f.frame_number).collect();

        assert_eq!(visited, vec![0, 30, 60]);
        assert_eq!(backend.open_readers(), 0);
    }

    #[test]
    fn test_handle_released_on_early_drop() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SyntheticBackend::new();
        let source = open_source(&backend, dir.path(), 30.0, 300);

        let mut sampler = FrameSampler::open(&source, &backend, 1.0).unwrap();
        assert!(sampler.next().is_some());
        assert_eq!(backend.open_readers(), 1);

        drop(sampler);
        assert_eq!(backend.open_readers(), 0);
    }

    #[test]
    fn test_exhausted_sampler_stays_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SyntheticBackend::new();
        let source = open_source(&backend, dir.path(), 30.0, 31);

        let mut sampler = FrameSampler::open(&source, &backend, 1.0).unwrap();
        assert_eq!(sampler.next().map(|f| f.frame_number), Some(0));
        assert_eq!(sampler.next().map(|f| f.frame_number), Some(30));
        assert!(sampler.next().is_none());
        assert_eq!(backend.open_readers(), 0);
        assert!(sampler.next().is_none());
    }
}
