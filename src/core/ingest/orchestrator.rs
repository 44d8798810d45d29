//! 多视频并发处理
//!
//! 固定大小的 rayon 线程池；每个工作线程第一次接到任务时创建自己的检测引擎，
//! 之后一直复用。一个视频从头到尾在同一个线程上处理。
//! 按需的单视频请求走池外线程。

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;

use crate::core::detection::adapter::DetectionAdapter;
use crate::core::detection::detector::DetectorFactory;
use crate::core::error::{IndexerError, Result};
use crate::core::ingest::state_machine::{IngestEvent, IngestState, StateRegistry};
use crate::core::ingest::worker::{ingest_video, IngestSummary, PipelineContext};
use crate::core::store::ClearScope;
use crate::core::video::source::VideoDescriptor;

thread_local! {
    // 工作线程独占的检测引擎，线程退出时释放
    static WORKER_ADAPTER: RefCell<Option<DetectionAdapter>> = const { RefCell::new(None) };
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoOutcome {
    pub video_id: String,
    pub result: std::result::Result<IngestSummary, String>,
}

/// 一批派发的视频；可以丢弃（不等待），也可以 `wait` 收集结果
pub struct BatchHandle {
    rx: Receiver<VideoOutcome>,
    expected: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub completed: Vec<(String, IngestSummary)>,
    pub failed: Vec<(String, String)>,
}

impl BatchHandle {
    pub fn len(&self) -> usize {
        self.expected
    }

    pub fn is_empty(&self) -> bool {
        self.expected == 0
    }

    /// 阻塞到这一批全部结束
    pub fn wait(self) -> BatchReport {
        let mut report = BatchReport::default();
        for outcome in self.rx.iter().take(self.expected) {
            match outcome.result {
                Ok(summary) => report.completed.push((outcome.video_id, summary)),
                Err(reason) => report.failed.push((outcome.video_id, reason)),
            }
        }
        report.completed.sort_by(|a, b| a.0.cmp(&b.0));
        report.failed.sort_by(|a, b| a.0.cmp(&b.0));
        report
    }
}

pub struct IngestOrchestrator {
    ctx: Arc<PipelineContext>,
    factory: Arc<dyn DetectorFactory>,
    states: Arc<StateRegistry>,
    pool: ThreadPool,
    workers: usize,
}

impl IngestOrchestrator {
    pub fn new(ctx: PipelineContext, factory: Arc<dyn DetectorFactory>, workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ingest-worker-{}", i))
            .panic_handler(|_| error!("💥 Ingest worker panicked"))
            .build()
            .map_err(|e| IndexerError::Config(format!("failed to build worker pool: {}", e)))?;

        info!("🧵 IngestOrchestrator: {} workers", workers);
        Ok(Self {
            ctx: Arc::new(ctx),
            factory,
            states: Arc::new(StateRegistry::new()),
            pool,
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// 派发完即返回，不等待处理结束
    pub fn dispatch(&self, videos: Vec<VideoDescriptor>) -> BatchHandle {
        let (tx, rx) = mpsc::channel();
        let expected = videos.len();
        info!("📤 Dispatching {} videos", expected);

        for descriptor in videos {
            self.states.apply(&descriptor.id, IngestEvent::Dispatched);

            let ctx = Arc::clone(&self.ctx);
            let factory = Arc::clone(&self.factory);
            let states = Arc::clone(&self.states);
            let tx = tx.clone();
            self.pool.spawn(move || {
                let result = run_on_worker(&ctx, factory.as_ref(), &states, &descriptor);
                let outcome = VideoOutcome {
                    video_id: descriptor.id.clone(),
                    result: result.map_err(|e| failure_reason(&e)),
                };
                // 调用方可能已经丢弃了 BatchHandle
                let _ = tx.send(outcome);
            });
        }

        BatchHandle { rx, expected }
    }

    /// 先按范围清空记录再派发
    pub fn clear_and_dispatch(&self, scope: &ClearScope, videos: Vec<VideoDescriptor>) -> Result<BatchHandle> {
        self.ctx.store.clear(scope)?;
        Ok(self.dispatch(videos))
    }

    /// 按需处理：在池外的独立线程上用自己的检测引擎处理，
    /// 不占用批处理的工作线程，也不会排在批处理后面
    pub fn spawn_on_demand(&self, descriptor: VideoDescriptor) -> Result<JoinHandle<Result<IngestSummary>>> {
        self.states.apply(&descriptor.id, IngestEvent::Dispatched);

        let ctx = Arc::clone(&self.ctx);
        let factory = Arc::clone(&self.factory);
        let states = Arc::clone(&self.states);
        let handle = thread::Builder::new()
            .name(format!("on-demand-{}", descriptor.id))
            .spawn(move || {
                run_tracked(&states, &descriptor, || {
                    let mut adapter = DetectionAdapter::from_factory(factory.as_ref())?;
                    ingest_video(&ctx, &mut adapter, &descriptor, progress_reporter(&states, &descriptor.id))
                })
            })?;
        Ok(handle)
    }

    /// 同步处理单个视频，调用方阻塞到完成
    pub fn process_and_wait(&self, descriptor: &VideoDescriptor) -> Result<IngestSummary> {
        self.spawn_on_demand(descriptor.clone())?
            .join()
            .map_err(|_| IndexerError::WorkerPanicked(descriptor.id.clone()))?
    }

    pub fn state(&self, video_id: &str) -> IngestState {
        self.states.get(video_id)
    }

    pub fn states(&self) -> Vec<(String, IngestState)> {
        self.states.snapshot()
    }
}

impl Drop for IngestOrchestrator {
    fn drop(&mut self) {
        debug!("🗑️ IngestOrchestrator: shutting down worker pool");
    }
}

/// 池内任务：复用本线程的检测引擎，第一次用到时创建
fn run_on_worker(
    ctx: &PipelineContext,
    factory: &dyn DetectorFactory,
    states: &StateRegistry,
    descriptor: &VideoDescriptor,
) -> Result<IngestSummary> {
    let result = run_tracked(states, descriptor, || {
        WORKER_ADAPTER.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_none() {
                *slot = Some(DetectionAdapter::from_factory(factory)?);
            }
            let adapter = slot.as_mut().ok_or_else(|| {
                IndexerError::EngineInit("detection adapter unavailable".to_string())
            })?;
            ingest_video(ctx, adapter, descriptor, progress_reporter(states, &descriptor.id))
        })
    });

    if matches!(result, Err(IndexerError::WorkerPanicked(_))) {
        // 引擎状态未知，下一个任务重新创建
        let _ = WORKER_ADAPTER.try_with(|cell| cell.replace(None));
    }
    result
}

/// 执行一个视频任务并维护它的状态；panic 被截住并记为失败
fn run_tracked(
    states: &StateRegistry,
    descriptor: &VideoDescriptor,
    job: impl FnOnce() -> Result<IngestSummary>,
) -> Result<IngestSummary> {
    states.apply(&descriptor.id, IngestEvent::Started);

    let result = panic::catch_unwind(AssertUnwindSafe(job))
        .unwrap_or_else(|_| Err(IndexerError::WorkerPanicked(descriptor.id.clone())));

    match &result {
        Ok(summary) => {
            states.apply(&descriptor.id, IngestEvent::Finished(summary.clone()));
        }
        Err(e) => {
            let reason = failure_reason(e);
            error!("❌ {} failed: {}", descriptor.id, reason);
            states.apply(&descriptor.id, IngestEvent::Errored(reason));
        }
    }
    result
}

fn progress_reporter<'a>(states: &'a StateRegistry, video_id: &'a str) -> impl FnMut(&IngestSummary) + 'a {
    move |summary| {
        states.apply(
            video_id,
            IngestEvent::Progress {
                frames_sampled: summary.frames_sampled,
                records: summary.accepted,
            },
        );
    }
}

fn failure_reason(e: &IndexerError) -> String {
    match e {
        IndexerError::SourceUnavailable { .. } => format!("source unavailable: {}", e),
        IndexerError::EngineInit(_) => format!("engine init failed: {}", e),
        IndexerError::WorkerPanicked(_) => "worker panicked".to_string(),
        _ => e.to_string(),
    }
}
