//! écoute - always-on French speech captioning with safety alerts.
//!
//! Offline-first captioning for non-technical operators: microphone frames
//! flow through a bounded queue into a single pipeline thread (voice gate,
//! noise reduction, streaming recognition, punctuation, safety keywords)
//! and fan out to a SQLite store, running statistics, and a live
//! notification channel.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod app;
pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod stats;
pub mod store;
pub mod stt;
pub mod text;

// Core traits (source → process → sink)
pub use audio::source::AudioSource;
pub use pipeline::sink::{CollectorSink, FanOutSink, TranscriptSink};
pub use stt::recognizer::StreamingRecognizer;
pub use text::punctuate::Punctuator;

// Pipeline
pub use pipeline::worker::{PipelineWorker, SessionHandle, SessionState};

// Error handling
pub use error::{EcouteError, Result};

// Config
pub use config::{Config, SharedToggles, Toggles};

// Live events
pub use notify::{Notification, Notifier, notification_channel};

/// Build version string from the crate metadata.
pub fn version_string() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
