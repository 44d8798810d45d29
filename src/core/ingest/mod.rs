pub mod orchestrator;
pub mod state_machine;
pub mod worker;

pub use orchestrator::{BatchHandle, BatchReport, IngestOrchestrator, VideoOutcome};
pub use state_machine::{IngestEvent, IngestState, StateRegistry};
pub use worker::{ingest_video, IngestSettings, IngestSummary, PipelineContext};
