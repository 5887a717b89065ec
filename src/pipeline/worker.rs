//! The single-consumer pipeline loop.
//!
//! One worker thread owns every stage: it pops frames from the queue and
//! runs gate → denoise → recognize → post-process → sink synchronously, in
//! arrival order. The only blocking point is the timeout-bounded pop, so
//! the cooperative stop flag is observed at least once per timeout.

use crate::audio::denoise::NoiseReducer;
use crate::audio::gate::VoiceActivityGate;
use crate::audio::level::AudioLevelMeter;
use crate::audio::queue::{FrameConsumer, PopError};
use crate::config::{Config, SharedToggles};
use crate::defaults;
use crate::notify::Notifier;
use crate::pipeline::error::{ErrorReporter, LogReporter, StageError};
use crate::pipeline::sink::TranscriptSink;
use crate::pipeline::types::TranscriptEvent;
use crate::stats::StatsAggregator;
use crate::stt::recognizer::StreamingRecognizer;
use crate::text::emergency::EmergencyDetector;
use crate::text::punctuate::Punctuator;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Lifecycle of one recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// No worker running.
    Idle = 0,
    /// Worker is consuming frames.
    Listening = 1,
    /// Stop observed; the in-flight frame finishes, then Idle.
    Stopping = 2,
}

/// Shared, atomically-updated view of the session state.
#[derive(Debug)]
pub struct SessionStateCell(AtomicU8);

impl SessionStateCell {
    fn new() -> Arc<Self> {
        Arc::new(Self(AtomicU8::new(SessionState::Idle as u8)))
    }

    fn set(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    pub fn get(&self) -> SessionState {
        match self.0.load(Ordering::SeqCst) {
            1 => SessionState::Listening,
            2 => SessionState::Stopping,
            _ => SessionState::Idle,
        }
    }
}

/// The pipeline worker: owns the denoiser, the recognizer session, and the
/// sink for the lifetime of one recording run.
pub struct PipelineWorker {
    frames: FrameConsumer,
    recognizer: Box<dyn StreamingRecognizer>,
    sink: Box<dyn TranscriptSink>,
    gate: VoiceActivityGate,
    denoiser: NoiseReducer,
    punctuator: Box<dyn Punctuator>,
    emergency: EmergencyDetector,
    toggles: Arc<SharedToggles>,
    meter: AudioLevelMeter,
    notifier: Option<Notifier>,
    reporter: Arc<dyn ErrorReporter>,
    stats: Arc<StatsAggregator>,
    pop_timeout: Duration,
    stop: Arc<AtomicBool>,
    state: Arc<SessionStateCell>,
}

impl PipelineWorker {
    /// Wire a worker from its stages and the static configuration.
    pub fn new(
        config: &Config,
        frames: FrameConsumer,
        recognizer: Box<dyn StreamingRecognizer>,
        punctuator: Box<dyn Punctuator>,
        sink: Box<dyn TranscriptSink>,
        toggles: Arc<SharedToggles>,
    ) -> Self {
        Self {
            frames,
            recognizer,
            sink,
            gate: VoiceActivityGate::new(config.audio.sample_rate, config.vad.aggressiveness),
            denoiser: NoiseReducer::with_settings(
                config.noise.strength,
                config.noise.calibration_frames,
            ),
            punctuator,
            emergency: EmergencyDetector::new(),
            toggles,
            meter: AudioLevelMeter::new(),
            notifier: None,
            reporter: Arc::new(LogReporter),
            stats: Arc::new(StatsAggregator::new()),
            pop_timeout: Duration::from_millis(defaults::POP_TIMEOUT_MS),
            stop: Arc::new(AtomicBool::new(false)),
            state: SessionStateCell::new(),
        }
    }

    /// Emit per-frame audio levels on this channel.
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Report stage errors somewhere other than stderr.
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Count errors on a shared aggregator.
    pub fn with_stats(mut self, stats: Arc<StatsAggregator>) -> Self {
        self.stats = stats;
        self
    }

    /// Override the dequeue timeout (tests use a short one).
    pub fn with_pop_timeout(mut self, timeout: Duration) -> Self {
        self.pop_timeout = timeout;
        self
    }

    /// Observable session state.
    pub fn state_cell(&self) -> Arc<SessionStateCell> {
        self.state.clone()
    }

    /// Spawn the worker on its own thread.
    pub fn spawn(self) -> SessionHandle {
        let stop = self.stop.clone();
        let state = self.state.clone();
        let thread = std::thread::spawn(move || self.run());
        SessionHandle {
            stop,
            state,
            thread: Some(thread),
        }
    }

    /// Run the consumer loop on the current thread until the stop flag is
    /// set or the producer disconnects.
    pub fn run(mut self) {
        self.state.set(SessionState::Listening);

        loop {
            if self.stop.load(Ordering::SeqCst) {
                self.state.set(SessionState::Stopping);
                break;
            }

            match self.frames.pop(self.pop_timeout) {
                Ok(frame) => self.process_frame(&frame),
                Err(PopError::Timeout) => continue,
                Err(PopError::Disconnected) => {
                    self.state.set(SessionState::Stopping);
                    break;
                }
            }
        }

        self.state.set(SessionState::Idle);
    }

    /// Run one frame through every stage, in order. Per-frame faults fail
    /// open inside their stage; recognition and persistence faults are
    /// reported and the loop continues.
    fn process_frame(&mut self, frame: &[i16]) {
        let toggles = self.toggles.snapshot();

        let level = self.meter.level(frame);
        if let Some(ref notifier) = self.notifier {
            notifier.audio_level(level);
        }

        if toggles.vad && !self.gate.is_speech(frame) {
            return;
        }

        let denoised;
        let frame = if toggles.noise_reduction {
            denoised = self.denoiser.reduce(frame);
            denoised.as_slice()
        } else {
            frame
        };

        match self.recognizer.accept(frame) {
            Ok(true) => {
                let raw = self.recognizer.final_text();
                let raw = raw.trim();
                if raw.is_empty() {
                    return;
                }

                let text = if toggles.punctuation {
                    self.punctuator.punctuate(raw)
                } else {
                    raw.to_string()
                };

                let emergency_words = if toggles.emergency_detection {
                    self.emergency.matched_words(&text)
                } else {
                    BTreeSet::new()
                };

                let event = TranscriptEvent::final_event(text, emergency_words, level);
                if let Err(e) = self.sink.publish_final(&event) {
                    self.stats.record_error();
                    self.reporter.report(
                        self.sink.name(),
                        &StageError::Recoverable(format!("persistence failed: {e}")),
                    );
                }
            }
            Ok(false) => {
                let partial = self.recognizer.partial_text();
                if !partial.trim().is_empty() {
                    self.sink.publish_partial(&partial, level);
                }
            }
            Err(e) => {
                self.stats.record_error();
                self.reporter
                    .report("recognizer", &StageError::Recoverable(e.to_string()));
            }
        }
    }
}

/// Handle to a running session.
pub struct SessionHandle {
    stop: Arc<AtomicBool>,
    state: Arc<SessionStateCell>,
    thread: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Request a cooperative stop and wait for the worker to finish.
    ///
    /// Worst-case latency is one pop timeout plus one in-flight frame.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take()
            && let Err(panic_info) = thread.join()
        {
            let msg = panic_info
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                .unwrap_or("unknown panic");
            eprintln!("ecoute: pipeline thread panicked: {msg}");
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// True until the worker loop has exited.
    pub fn is_running(&self) -> bool {
        self.state.get() != SessionState::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::frame_queue;
    use crate::notify::{Notification, notification_channel};
    use crate::pipeline::sink::{CollectorSink, FanOutSink};
    use crate::stt::recognizer::MockRecognizer;
    use crate::store::TranscriptStore;
    use crate::text::punctuate::RulePunctuator;

    /// 30ms of silence: the exact VAD window, classified (not failed open).
    fn silence_window() -> Vec<i16> {
        vec![0i16; 480]
    }

    /// 30ms of loud, voiced-ish audio the gate should pass.
    fn speech_window() -> Vec<i16> {
        let period = 16_000 / 120;
        (0..480)
            .map(|i| (((i % period) as i32 * 40_000 / period as i32) - 20_000) as i16)
            .collect()
    }

    fn test_config() -> Config {
        Config::default()
    }

    struct Harness {
        store: Arc<TranscriptStore>,
        stats: Arc<StatsAggregator>,
        rx: crossbeam_channel::Receiver<Notification>,
        worker: PipelineWorker,
        producer: crate::audio::queue::FrameProducer,
    }

    /// Full fan-out pipeline over an in-memory store, fed by hand.
    fn harness(config: &Config, recognizer: MockRecognizer, capacity: usize) -> Harness {
        let (producer, consumer) = frame_queue(capacity);
        let store = Arc::new(TranscriptStore::open_in_memory().unwrap());
        let stats = Arc::new(StatsAggregator::new());
        let (notifier, rx) = notification_channel();
        let toggles = SharedToggles::from_config(config);

        let sink = FanOutSink::new(store.clone(), stats.clone(), notifier.clone());
        let worker = PipelineWorker::new(
            config,
            consumer,
            Box::new(recognizer),
            Box::new(RulePunctuator::new()),
            Box::new(sink),
            toggles,
        )
        .with_notifier(notifier)
        .with_stats(stats.clone())
        .with_pop_timeout(Duration::from_millis(20));

        Harness {
            store,
            stats,
            rx,
            worker,
            producer,
        }
    }

    fn finals(rx: &crossbeam_channel::Receiver<Notification>) -> Vec<TranscriptEvent> {
        rx.try_iter()
            .filter_map(|n| match n {
                Notification::Final { transcript } => Some(transcript),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_all_silence_stream_produces_nothing() {
        // The recognizer is scripted to finalize on its very first frame, so
        // any leak through the gate would show up immediately.
        let recognizer = MockRecognizer::new("mock").with_utterance(1, "fantôme");
        let h = harness(&test_config(), recognizer, 64);

        for _ in 0..40 {
            h.producer.push(silence_window());
        }
        drop(h.producer);
        h.worker.run();

        assert_eq!(h.store.total_count().unwrap(), 0);
        assert!(finals(&h.rx).is_empty());
        assert_eq!(h.stats.running().transcriptions, 0);
    }

    #[test]
    fn test_emergency_utterance_end_to_end() {
        let recognizer = MockRecognizer::new("mock").with_utterance(5, "j'ai mal");
        let mut config = test_config();
        // The contract under test is decode → fan-out, so the upstream
        // gates stay out of the way.
        config.vad.enabled = false;
        config.noise.enabled = false;
        let h = harness(&config, recognizer, 64);

        for _ in 0..6 {
            h.producer.push(speech_window());
        }
        drop(h.producer);
        h.worker.run();

        // Exactly one persisted record, flagged, with the matched word.
        let records = h.store.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_emergency);
        assert_eq!(records[0].emergency_words, vec!["mal".to_string()]);
        assert_eq!(records[0].text, "J'ai mal.");

        // Exactly one final notification.
        let final_events = finals(&h.rx);
        assert_eq!(final_events.len(), 1);
        assert!(final_events[0].is_emergency);

        // Counters moved by exactly one transcription and two words.
        let running = h.stats.running();
        assert_eq!(running.transcriptions, 1);
        assert_eq!(running.words, 2);
    }

    #[test]
    fn test_partials_are_notified_not_persisted() {
        let recognizer = MockRecognizer::new("mock")
            .with_utterance(100, "jamais")
            .with_partial("j'ai");
        let mut config = test_config();
        config.vad.enabled = false;
        config.noise.enabled = false;
        let h = harness(&config, recognizer, 64);

        for _ in 0..3 {
            h.producer.push(speech_window());
        }
        drop(h.producer);
        h.worker.run();

        assert_eq!(h.store.total_count().unwrap(), 0);
        let partials: Vec<String> = h
            .rx
            .try_iter()
            .filter_map(|n| match n {
                Notification::Partial { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(partials, vec!["j'ai"; 3]);
    }

    #[test]
    fn test_recognizer_fault_does_not_stop_the_stream() {
        let recognizer = MockRecognizer::new("mock")
            .with_failure_on(1)
            .with_utterance(2, "toujours là");
        let mut config = test_config();
        config.vad.enabled = false;
        config.noise.enabled = false;
        let h = harness(&config, recognizer, 64);

        h.producer.push(speech_window());
        h.producer.push(speech_window());
        drop(h.producer);
        h.worker.run();

        assert_eq!(h.store.total_count().unwrap(), 1);
        assert_eq!(h.stats.running().errors, 1);
    }

    #[test]
    fn test_persistence_failure_still_notifies() {
        let recognizer = MockRecognizer::new("mock").with_utterance(1, "au secours");
        let mut config = test_config();
        config.vad.enabled = false;
        config.noise.enabled = false;
        let h = harness(&config, recognizer, 8);
        h.store.break_for_tests();

        h.producer.push(speech_window());
        drop(h.producer);
        h.worker.run();

        assert_eq!(finals(&h.rx).len(), 1);
        assert_eq!(h.stats.running().errors, 1);
    }

    #[test]
    fn test_emergency_detection_toggle_off() {
        let recognizer = MockRecognizer::new("mock").with_utterance(1, "j'ai mal");
        let mut config = test_config();
        config.vad.enabled = false;
        config.noise.enabled = false;
        config.text.emergency_detection = false;
        let h = harness(&config, recognizer, 8);

        h.producer.push(speech_window());
        drop(h.producer);
        h.worker.run();

        let records = h.store.recent(1).unwrap();
        assert!(!records[0].is_emergency);
        assert!(records[0].emergency_words.is_empty());
    }

    #[test]
    fn test_punctuation_toggle_off_keeps_raw_text() {
        let recognizer = MockRecognizer::new("mock").with_utterance(1, "comment ça va");
        let mut config = test_config();
        config.vad.enabled = false;
        config.noise.enabled = false;
        config.text.punctuation = false;
        let h = harness(&config, recognizer, 8);

        h.producer.push(speech_window());
        drop(h.producer);
        h.worker.run();

        assert_eq!(h.store.recent(1).unwrap()[0].text, "comment ça va");
    }

    #[test]
    fn test_empty_final_text_is_skipped() {
        let recognizer = MockRecognizer::new("mock").with_utterance(1, "   ");
        let mut config = test_config();
        config.vad.enabled = false;
        config.noise.enabled = false;
        let h = harness(&config, recognizer, 8);

        h.producer.push(speech_window());
        drop(h.producer);
        h.worker.run();

        assert_eq!(h.store.total_count().unwrap(), 0);
        assert!(finals(&h.rx).is_empty());
    }

    #[test]
    fn test_audio_level_notifications_flow() {
        let recognizer = MockRecognizer::new("mock");
        let mut config = test_config();
        config.vad.enabled = false;
        config.noise.enabled = false;
        let h = harness(&config, recognizer, 8);

        h.producer.push(speech_window());
        drop(h.producer);
        h.worker.run();

        let levels: Vec<u8> = h
            .rx
            .try_iter()
            .filter_map(|n| match n {
                Notification::AudioLevel { level } => Some(level),
                _ => None,
            })
            .collect();
        assert_eq!(levels.len(), 1);
        assert!(levels[0] > 0);
    }

    #[test]
    fn test_session_state_machine_and_cooperative_stop() {
        let (producer, consumer) = frame_queue(4);
        let config = test_config();
        let toggles = SharedToggles::from_config(&config);
        let worker = PipelineWorker::new(
            &config,
            consumer,
            Box::new(MockRecognizer::new("mock")),
            Box::new(RulePunctuator::new()),
            Box::new(CollectorSink::new()),
            toggles,
        )
        .with_pop_timeout(Duration::from_millis(10));

        let state = worker.state_cell();
        assert_eq!(state.get(), SessionState::Idle);

        let handle = worker.spawn();

        // The worker reaches Listening shortly after spawn.
        let start = std::time::Instant::now();
        while handle.state() != SessionState::Listening {
            assert!(start.elapsed() < Duration::from_secs(1), "never started");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(handle.is_running());

        // Stop returns within one pop timeout + one frame, back to Idle.
        let stop_started = std::time::Instant::now();
        producer.push(vec![0i16; 480]);
        handle.stop();
        assert!(stop_started.elapsed() < Duration::from_secs(1));
        assert_eq!(state.get(), SessionState::Idle);
    }

    #[test]
    fn test_frames_reach_recognizer_in_order_without_gaps() {
        use std::sync::Mutex;

        struct OrderProbe {
            seen: Arc<Mutex<Vec<i16>>>,
        }

        impl StreamingRecognizer for OrderProbe {
            fn accept(&mut self, frame: &[i16]) -> crate::error::Result<bool> {
                self.seen.lock().unwrap().push(frame[0]);
                Ok(false)
            }
            fn final_text(&mut self) -> String {
                String::new()
            }
            fn partial_text(&mut self) -> String {
                String::new()
            }
            fn model_name(&self) -> &str {
                "probe"
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let (producer, consumer) = frame_queue(64);
        let mut config = test_config();
        config.vad.enabled = false;
        config.noise.enabled = false;
        let toggles = SharedToggles::from_config(&config);
        let worker = PipelineWorker::new(
            &config,
            consumer,
            Box::new(OrderProbe { seen: seen.clone() }),
            Box::new(RulePunctuator::new()),
            Box::new(CollectorSink::new()),
            toggles,
        )
        .with_pop_timeout(Duration::from_millis(10));

        for i in 0..20 {
            let mut frame = vec![0i16; 480];
            frame[0] = i;
            producer.push(frame);
        }
        drop(producer);
        worker.run();

        assert_eq!(*seen.lock().unwrap(), (0..20).collect::<Vec<i16>>());
    }
}
