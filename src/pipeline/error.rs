//! Error types and reporting for pipeline stages.

use std::fmt;

/// Errors that can occur during stage processing.
#[derive(Debug, Clone)]
pub enum StageError {
    /// Recoverable error that allows the pipeline to continue processing.
    Recoverable(String),
    /// Fatal error that requires the pipeline to shut down.
    Fatal(String),
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Recoverable(msg) => write!(f, "Recoverable error: {}", msg),
            StageError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl std::error::Error for StageError {}

/// Trait for reporting stage errors.
///
/// This is the pipeline's error channel: persistence and recognition faults
/// land here instead of unwinding the worker thread.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a stage.
    fn report(&self, stage: &str, error: &StageError);
}

/// Simple error reporter that logs to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, stage: &str, error: &StageError) {
        eprintln!("ecoute: [{}] {}", stage, error);
    }
}
