pub mod adapter;
pub mod detector;
pub mod filter;
pub mod tesseract;

pub use adapter::DetectionAdapter;
pub use detector::{DetectionCandidate, DetectorFactory, Point, RawDetection, TextDetector, TextRegion};
pub use filter::{format_timestamp_key, DetectionFilter, DetectionKey, FilterDecision, Observation};
pub use tesseract::TesseractDetector;
