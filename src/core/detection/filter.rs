//! 置信度过滤 + 唯一性检查

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::detection::detector::DetectionCandidate;
use crate::core::error::Result;
use crate::core::store::DetectionStore;

/// 记录身份键：(camera_id, source_video, 原始文本, 按精度格式化的时间戳)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DetectionKey {
    pub camera_id: String,
    pub source_video: String,
    pub text: String,
    pub timestamp_key: String,
}

impl DetectionKey {
    pub fn new(camera_id: &str, source_video: &str, text: &str, timestamp_secs: f64, precision: u8) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            source_video: source_video.to_string(),
            text: text.to_string(),
            timestamp_key: format_timestamp_key(timestamp_secs, precision),
        }
    }

    /// 扁平 id，便于日志和外部存储
    pub fn as_id(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.camera_id, self.source_video, self.text, self.timestamp_key
        )
    }
}

pub fn format_timestamp_key(timestamp_secs: f64, precision: u8) -> String {
    format!("{:.*}", precision as usize, timestamp_secs)
}

/// 检测所属的视频与时间点
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub camera_id: &'a str,
    pub source_video: &'a str,
    pub timestamp_secs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterDecision {
    Accept(DetectionKey),
    /// 低于阈值，直接丢弃
    Reject,
    /// 已存在，按成功处理
    Duplicate(DetectionKey),
}

/// 一次处理过程（一个视频）内的过滤器
pub struct DetectionFilter {
    threshold: f32,
    precision: u8,
    /// 小写关键字；设置后只接受包含它的文本
    keyword: Option<String>,
    seen: HashSet<DetectionKey>,
}

impl DetectionFilter {
    pub fn new(threshold: f32, precision: u8) -> Self {
        Self {
            threshold,
            precision,
            keyword: None,
            seen: HashSet::new(),
        }
    }

    /// 定向搜索：文本不包含关键字（不区分大小写）的候选一律拒绝。空白关键字等于不设置。
    pub fn with_keyword(mut self, keyword: Option<&str>) -> Self {
        self.keyword = keyword
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase);
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn keyword(&self) -> Option<&str> {
        self.keyword.as_deref()
    }

    pub fn evaluate(
        &mut self,
        candidate: &DetectionCandidate,
        observation: Observation<'_>,
        store: &dyn DetectionStore,
    ) -> Result<FilterDecision> {
        if candidate.confidence < self.threshold {
            return Ok(FilterDecision::Reject);
        }
        if let Some(keyword) = &self.keyword {
            if !candidate.text.to_lowercase().contains(keyword.as_str()) {
                return Ok(FilterDecision::Reject);
            }
        }

        let key = DetectionKey::new(
            observation.camera_id,
            observation.source_video,
            &candidate.text,
            observation.timestamp_secs,
            self.precision,
        );

        if self.seen.contains(&key) || store.contains(&key)? {
            return Ok(FilterDecision::Duplicate(key));
        }

        self.seen.insert(key.clone());
        Ok(FilterDecision::Accept(key))
    }
}
