//! Data types flowing through the captioning pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A finalized or in-progress transcript, ready for fan-out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptEvent {
    /// Post-processed text.
    pub text: String,
    /// Decoder-confirmed utterance (true) vs. best-effort guess (false).
    pub is_final: bool,
    /// Whether any safety keyword was detected.
    pub is_emergency: bool,
    /// The distinct safety keywords found, if any.
    pub emergency_words: BTreeSet<String>,
    /// Operator audio level (0–100) at decode time.
    pub audio_level: u8,
    /// Wall-clock time the event was produced.
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEvent {
    /// Build a final event; the emergency flag follows the matched words.
    pub fn final_event(text: String, emergency_words: BTreeSet<String>, audio_level: u8) -> Self {
        Self {
            text,
            is_final: true,
            is_emergency: !emergency_words.is_empty(),
            emergency_words,
            audio_level,
            timestamp: Utc::now(),
        }
    }

    /// Build a partial (never persisted) event.
    pub fn partial_event(text: String, audio_level: u8) -> Self {
        Self {
            text,
            is_final: false,
            is_emergency: false,
            emergency_words: BTreeSet::new(),
            audio_level,
            timestamp: Utc::now(),
        }
    }

    /// Whitespace-separated word count of the text.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_event_with_emergency_words() {
        let words: BTreeSet<String> = ["mal".to_string()].into_iter().collect();
        let event = TranscriptEvent::final_event("J'ai mal.".to_string(), words, 42);

        assert!(event.is_final);
        assert!(event.is_emergency);
        assert!(event.emergency_words.contains("mal"));
        assert_eq!(event.audio_level, 42);
    }

    #[test]
    fn test_final_event_without_emergency_words() {
        let event = TranscriptEvent::final_event("Bonjour.".to_string(), BTreeSet::new(), 10);

        assert!(event.is_final);
        assert!(!event.is_emergency);
        assert!(event.emergency_words.is_empty());
    }

    #[test]
    fn test_partial_event_is_never_emergency() {
        let event = TranscriptEvent::partial_event("j'ai".to_string(), 30);

        assert!(!event.is_final);
        assert!(!event.is_emergency);
    }

    #[test]
    fn test_word_count() {
        let event = TranscriptEvent::final_event("j'ai mal".to_string(), BTreeSet::new(), 0);
        assert_eq!(event.word_count(), 2);

        let empty = TranscriptEvent::final_event(String::new(), BTreeSet::new(), 0);
        assert_eq!(empty.word_count(), 0);
    }

    #[test]
    fn test_serializes_with_tagged_fields() {
        let event = TranscriptEvent::final_event("Au secours.".to_string(), BTreeSet::new(), 5);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["text"], "Au secours.");
        assert_eq!(json["is_final"], true);
        assert_eq!(json["audio_level"], 5);
    }
}
