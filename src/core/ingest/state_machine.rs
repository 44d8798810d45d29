use std::collections::HashMap;
use std::sync::Mutex;

use log::warn;
use serde::Serialize;

use crate::core::ingest::worker::IngestSummary;

/// 单个视频的处理状态：Idle → Dispatching → Running → Done | Failed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IngestState {
    Idle,
    Dispatching,
    Running { frames_sampled: u64, records: u64 },
    Done(IngestSummary),
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    Dispatched,
    Started,
    Progress { frames_sampled: u64, records: u64 },
    Finished(IngestSummary),
    Errored(String),
}

impl IngestState {
    pub fn new() -> Self {
        IngestState::Idle
    }

    /// 非法迁移返回 None
    pub fn transition(&self, event: &IngestEvent) -> Option<IngestState> {
        match (self, event) {
            // 终态可以重新派发（重新处理）
            (
                IngestState::Idle | IngestState::Done(_) | IngestState::Failed { .. },
                IngestEvent::Dispatched,
            ) => Some(IngestState::Dispatching),

            (IngestState::Dispatching, IngestEvent::Started) => Some(IngestState::Running {
                frames_sampled: 0,
                records: 0,
            }),

            (
                IngestState::Running { .. },
                IngestEvent::Progress {
                    frames_sampled,
                    records,
                },
            ) => Some(IngestState::Running {
                frames_sampled: *frames_sampled,
                records: *records,
            }),

            (IngestState::Running { .. }, IngestEvent::Finished(summary)) => {
                Some(IngestState::Done(summary.clone()))
            }

            (IngestState::Dispatching | IngestState::Running { .. }, IngestEvent::Errored(reason)) => {
                Some(IngestState::Failed {
                    reason: reason.clone(),
                })
            }

            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestState::Done(_) | IngestState::Failed { .. })
    }

    pub fn is_active(&self) -> bool {
        matches!(self, IngestState::Dispatching | IngestState::Running { .. })
    }
}

impl Default for IngestState {
    fn default() -> Self {
        Self::new()
    }
}

/// 各视频状态表，在工作线程间共享
#[derive(Default)]
pub struct StateRegistry {
    states: Mutex<HashMap<String, IngestState>>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 应用事件，返回是否发生迁移
    pub fn apply(&self, video_id: &str, event: IngestEvent) -> bool {
        let mut states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        let current = states.entry(video_id.to_string()).or_default();
        match current.transition(&event) {
            Some(next) => {
                *current = next;
                true
            }
            None => {
                warn!("⚠️ {}: ignoring {:?} in state {:?}", video_id, event, current);
                false
            }
        }
    }

    pub fn get(&self, video_id: &str) -> IngestState {
        self.states
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(video_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> Vec<(String, IngestState)> {
        let states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        let mut all: Vec<_> = states.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
