use serde::{Deserialize, Serialize};

use crate::core::store::SearchResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoListItem {
    pub id: String,
    /// 文件名
    pub name: String,
    pub camera_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoListResponse {
    pub videos: Vec<VideoListItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

/// `video` 可以是配置里的 id，也可以是视频目录下的文件名
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub video: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    /// 只保留包含该关键字的检测，每帧最多一条
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessAccepted {
    pub status: String,
    pub video: String,
    pub message: String,
}

impl ProcessAccepted {
    pub fn processing(video: &str) -> Self {
        Self {
            status: "processing".to_string(),
            video: video.to_string(),
            message: "Video processing started in the background".to_string(),
        }
    }
}
