//! Captioning session composition root.
//!
//! Builds every collaborator once — store, stats, notification channel,
//! recognizer, worker — wires them together, and drains notifications for
//! display. No process-wide mutable state: everything a session needs lives
//! in the objects constructed here.

use crate::audio::queue::{FrameProducer, frame_queue};
use crate::audio::source::AudioSource;
use crate::config::{Config, SharedToggles};
use crate::error::Result;
use crate::notify::{Notification, notification_channel};
use crate::pipeline::sink::FanOutSink;
use crate::pipeline::worker::PipelineWorker;
use crate::stats::StatsAggregator;
use crate::store::TranscriptStore;
use crate::stt::recognizer::StreamingRecognizer;
use crate::text::punctuate::{Punctuator, SmartPunctuator};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Open the decoder session for this run.
///
/// A missing model is fatal: the session must not start listening without a
/// decoder (no partial operation).
#[cfg(feature = "vosk-stt")]
pub fn build_recognizer(config: &Config) -> Result<Box<dyn StreamingRecognizer>> {
    let recognizer =
        crate::stt::vosk::VoskRecognizer::load(&config.stt.model_path, config.audio.sample_rate)?;
    Ok(Box::new(recognizer))
}

/// Without the `vosk-stt` feature there is no decoder to load.
#[cfg(not(feature = "vosk-stt"))]
pub fn build_recognizer(_config: &Config) -> Result<Box<dyn StreamingRecognizer>> {
    Err(crate::error::EcouteError::Other(
        "this build has no speech decoder; rebuild with --features vosk-stt".to_string(),
    ))
}

/// The punctuation strategy for this build.
///
/// The heavy model-backed restorer is an optional capability; this build
/// wires the rule strategy through the same lazy-loading shell so a model
/// can be attached without touching the pipeline.
pub fn build_punctuator() -> Box<dyn Punctuator> {
    Box::new(SmartPunctuator::rule_only())
}

/// Feed frames from an [`AudioSource`] into the queue producer.
///
/// `pace` throttles finite sources to real time so a WAV replay behaves
/// like a microphone; pass zero to push as fast as the source reads.
pub fn spawn_source_pump(
    mut source: Box<dyn AudioSource>,
    producer: FrameProducer,
    pace: Duration,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut consecutive_errors: u32 = 0;
        const MAX_CONSECUTIVE_ERRORS: u32 = 10;

        loop {
            match source.read_frame() {
                Ok(Some(frame)) => {
                    consecutive_errors = 0;
                    producer.push(frame);
                    if !pace.is_zero() {
                        std::thread::sleep(pace);
                    }
                }
                Ok(None) => {
                    if source.is_finite() {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(16));
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        eprintln!(
                            "ecoute: audio capture failed {consecutive_errors} times in a row: {e}"
                        );
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(16));
                }
            }
        }

        if let Err(e) = source.stop() {
            eprintln!("ecoute: failed to stop audio source: {e}");
        }
    })
}

/// Everything one listening run needs, constructed once.
pub struct Session {
    pub store: Arc<TranscriptStore>,
    pub stats: Arc<StatsAggregator>,
    pub toggles: Arc<SharedToggles>,
    worker: Option<PipelineWorker>,
    notifications: crossbeam_channel::Receiver<Notification>,
    producer: FrameProducer,
}

impl Session {
    /// Build a session from configuration. Opens the store and the decoder;
    /// either failing aborts before anything starts listening.
    pub fn build(config: &Config) -> Result<Self> {
        let recognizer = build_recognizer(config)?;
        Self::build_with_recognizer(config, recognizer)
    }

    /// Build a session around an explicit decoder (tests, custom engines).
    pub fn build_with_recognizer(
        config: &Config,
        recognizer: Box<dyn StreamingRecognizer>,
    ) -> Result<Self> {
        let store = Arc::new(TranscriptStore::open(&config.store.path)?);
        let stats = Arc::new(StatsAggregator::new());
        let toggles = SharedToggles::from_config(config);
        let (notifier, notifications) = notification_channel();
        let (producer, consumer) = frame_queue(config.audio.queue_capacity);

        let sink = FanOutSink::new(store.clone(), stats.clone(), notifier.clone());
        let worker = PipelineWorker::new(
            config,
            consumer,
            recognizer,
            build_punctuator(),
            Box::new(sink),
            toggles.clone(),
        )
        .with_notifier(notifier)
        .with_stats(stats.clone());

        Ok(Self {
            store,
            stats,
            toggles,
            worker: Some(worker),
            notifications,
            producer,
        })
    }

    /// The producer half of the frame queue, for the capture side.
    pub fn frame_producer(&self) -> FrameProducer {
        self.producer.clone()
    }

    /// Notification stream for the display surface.
    pub fn notifications(&self) -> crossbeam_channel::Receiver<Notification> {
        self.notifications.clone()
    }

    /// Take the worker for spawning. Panics if taken twice.
    pub fn take_worker(&mut self) -> PipelineWorker {
        self.worker.take().expect("session worker already taken")
    }
}
