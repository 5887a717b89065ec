//! Real-time captioning pipeline.
//!
//! A capture callback pushes fixed-size frames into a bounded drop-oldest
//! queue; a single worker thread consumes them and runs every stage
//! synchronously: gate → denoise → recognize → post-process → fan-out.

pub mod error;
pub mod sink;
pub mod types;
pub mod worker;

pub use error::{ErrorReporter, LogReporter, StageError};
pub use sink::{CollectorSink, FanOutSink, TranscriptSink};
pub use types::TranscriptEvent;
pub use worker::{PipelineWorker, SessionHandle, SessionState, SessionStateCell};
