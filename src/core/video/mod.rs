pub mod backend;
pub mod ffmpeg;
pub mod frame;
pub mod sampler;
pub mod segment;
pub mod source;

pub use backend::{FrameReader, FrameWriter, VideoBackend};
pub use ffmpeg::FfmpegBackend;
pub use frame::Frame;
pub use sampler::{sampling_step, FrameSampler};
pub use segment::{SegmentClip, SegmentExtractor, SegmentJob};
pub use source::{VideoDescriptor, VideoMeta, VideoSource, DEFAULT_FRAME_RATE};
