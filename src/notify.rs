//! Live notification channel for operator-facing consumers.
//!
//! The pipeline thread never touches display state directly; it emits
//! [`Notification`] events on a bounded channel and whoever owns the UI (the
//! CLI loop, a future web front end) drains them on its own schedule. Sends
//! never block and drop on overflow — a slow consumer must not backpressure
//! the real-time pipeline.

use crate::pipeline::types::TranscriptEvent;
use crossbeam_channel::{Receiver, Sender, bounded};
use serde::Serialize;

/// Default notification channel depth.
const CHANNEL_CAPACITY: usize = 256;

/// Events emitted while a session is listening.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    /// Best-effort guess for the utterance in progress. Never persisted.
    Partial { text: String, level: u8 },
    /// Decoder-confirmed utterance, as persisted and counted.
    Final {
        #[serde(flatten)]
        transcript: TranscriptEvent,
    },
    /// Microphone level of the frame just processed (0–100).
    AudioLevel { level: u8 },
}

/// Sending half; cheap to clone, lossy on overflow.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Sender<Notification>,
}

/// Create a notification channel with the default capacity.
pub fn notification_channel() -> (Notifier, Receiver<Notification>) {
    let (tx, rx) = bounded(CHANNEL_CAPACITY);
    (Notifier { tx }, rx)
}

impl Notifier {
    /// Emit a partial transcript guess.
    pub fn partial(&self, text: &str, level: u8) {
        self.send(Notification::Partial {
            text: text.to_string(),
            level,
        });
    }

    /// Emit a finalized transcript.
    pub fn final_event(&self, transcript: &TranscriptEvent) {
        self.send(Notification::Final {
            transcript: transcript.clone(),
        });
    }

    /// Emit the current audio level.
    pub fn audio_level(&self, level: u8) {
        self.send(Notification::AudioLevel { level });
    }

    fn send(&self, notification: Notification) {
        // Channel full or no consumer: drop. Display is best-effort.
        self.tx.try_send(notification).ok();
    }
}
