//! 检测记录存储
//!
//! 进程内共享的唯一状态。所有写入经过 `upsert` / `clear`，
//! 同一记录身份键的重复写入是无操作成功。

pub mod sqlite;

use serde::{Deserialize, Serialize};

use crate::core::detection::filter::DetectionKey;
use crate::core::error::Result;

pub use sqlite::SqliteDetectionStore;

pub const MAX_SEARCH_RESULTS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub text: String,
    pub timestamp: f64,
    pub camera_id: String,
    pub source_video: String,
    pub confidence: f32,
    /// 截图文件名，写入失败时为空
    pub screenshot: Option<String>,
}

impl DetectionRecord {
    pub fn key(&self, precision: u8) -> DetectionKey {
        DetectionKey::new(
            &self.camera_id,
            &self.source_video,
            &self.text,
            self.timestamp,
            precision,
        )
    }
}

/// 查询结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub text: String,
    pub timestamp: f64,
    pub camera_id: String,
    pub source_video: String,
    pub confidence: f32,
    pub screenshot_filename: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ClearScope {
    All,
    Video { source_video: String },
}

pub trait DetectionStore: Send + Sync {
    /// 键已存在时返回 `Duplicate`，不是错误
    fn upsert(&self, record: &DetectionRecord) -> Result<UpsertOutcome>;

    fn contains(&self, key: &DetectionKey) -> Result<bool>;

    /// 大小写不敏感的子串匹配，最多 [`MAX_SEARCH_RESULTS`] 条。
    /// 排序：text, timestamp, camera_id, source_video
    fn search(&self, query: &str) -> Result<Vec<SearchResult>>;

    /// 返回删除的记录数
    fn clear(&self, scope: &ClearScope) -> Result<usize>;

    fn count(&self) -> Result<usize>;

    /// 时间戳键的小数位数
    fn key_precision(&self) -> u8;
}
