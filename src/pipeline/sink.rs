//! Transcript fan-out: persistence, statistics, and live notification.

use crate::error::Result;
use crate::notify::Notifier;
use crate::pipeline::types::TranscriptEvent;
use crate::stats::StatsAggregator;
use crate::store::TranscriptStore;
use std::sync::Arc;

/// Pluggable destination for decoded transcripts.
/// Pairs with AudioSource for input — this handles recognition output.
pub trait TranscriptSink: Send {
    /// Handle a finalized transcript.
    ///
    /// An error means durable persistence failed; the live notification has
    /// already fired regardless, so the operator is never blinded by a
    /// storage outage. The transcript is not retried.
    fn publish_final(&mut self, event: &TranscriptEvent) -> Result<()>;

    /// Handle an in-progress guess. Never persisted, never counted.
    fn publish_partial(&mut self, text: &str, level: u8);

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Production sink: store + running stats + notification channel.
pub struct FanOutSink {
    store: Arc<TranscriptStore>,
    stats: Arc<StatsAggregator>,
    notifier: Notifier,
}

impl FanOutSink {
    pub fn new(store: Arc<TranscriptStore>, stats: Arc<StatsAggregator>, notifier: Notifier) -> Self {
        Self {
            store,
            stats,
            notifier,
        }
    }
}

impl TranscriptSink for FanOutSink {
    fn publish_final(&mut self, event: &TranscriptEvent) -> Result<()> {
        let persisted = self.store.add(
            &event.text,
            event.is_emergency,
            &event.emergency_words,
            event.audio_level,
        );

        self.stats.record(&event.text, event.audio_level);
        self.notifier.final_event(event);

        persisted.map(|_id| ())
    }

    fn publish_partial(&mut self, text: &str, level: u8) {
        self.notifier.partial(text, level);
    }

    fn name(&self) -> &'static str {
        "fan-out"
    }
}

/// Collects events in memory for tests and library use.
#[derive(Default)]
pub struct CollectorSink {
    pub finals: Vec<TranscriptEvent>,
    pub partials: Vec<String>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TranscriptSink for CollectorSink {
    fn publish_final(&mut self, event: &TranscriptEvent) -> Result<()> {
        self.finals.push(event.clone());
        Ok(())
    }

    fn publish_partial(&mut self, text: &str, _level: u8) {
        self.partials.push(text.to_string());
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}
