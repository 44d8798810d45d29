use serde::{Deserialize, Serialize};

use crate::core::error::IndexerError;

/// 对外暴露的错误，扁平可序列化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub error_type: String,
    pub message: String,
}

impl ApiError {
    fn new(error_type: &str, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new("InvalidInput", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NotFound", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("Internal", message)
    }

    /// HTTP 层使用的状态码
    pub fn status_code(&self) -> u16 {
        match self.error_type.as_str() {
            "InvalidInput" | "EmptySegment" => 400,
            "NotFound" | "SourceUnavailable" => 404,
            "SegmentTimeout" => 504,
            _ => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.error_type, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<IndexerError> for ApiError {
    fn from(e: IndexerError) -> Self {
        let error_type = match &e {
            IndexerError::SourceUnavailable { .. } => "SourceUnavailable",
            IndexerError::InvalidInput(_) => "InvalidInput",
            IndexerError::EmptySegment { .. } => "EmptySegment",
            IndexerError::SegmentTimeout(_) => "SegmentTimeout",
            IndexerError::EngineInit(_) => "EngineInit",
            IndexerError::Config(_) => "Config",
            IndexerError::Store(_) => "Store",
            _ => "Internal",
        };
        Self::new(error_type, e.to_string())
    }
}
