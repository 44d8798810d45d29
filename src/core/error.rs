use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Video source unavailable {path:?}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },
    #[error("Detection engine error: {0}")]
    DetectionEngineTransient(String),
    #[error("Detection engine init failed: {0}")]
    EngineInit(String),
    #[error("Screenshot write failed: {0}")]
    ArtifactWriteFailed(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("No frames between {start:.2}s and {end:.2}s")]
    EmptySegment { start: f64, end: f64 },
    #[error("Segment extraction exceeded {0:?}")]
    SegmentTimeout(Duration),
    #[error("Worker panicked while processing {0}")]
    WorkerPanicked(String),
    #[error("Video codec error: {0}")]
    Codec(String),
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("Config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IndexerError {
    pub fn source_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
