//! Voice-activity gate deciding whether a frame is worth decoding.
//!
//! Wraps the `earshot` WebRTC-style classifier. The gate is deliberately
//! fail-open: a frame of unexpected length, an unsupported sample rate, or a
//! classifier error all count as speech. Dropping real speech is worse than
//! decoding a little silence.

use crate::defaults;
use earshot::{VoiceActivityDetector, VoiceActivityProfile};

/// Per-frame speech/silence classifier.
pub struct VoiceActivityGate {
    detector: VoiceActivityDetector,
    sample_rate: u32,
    /// Exact number of samples the classifier window requires.
    frame_size: usize,
    aggressiveness: u8,
}

/// Map 0–3 aggressiveness onto earshot's detection profiles.
fn profile_for(aggressiveness: u8) -> VoiceActivityProfile {
    match aggressiveness {
        0 => VoiceActivityProfile::QUALITY,
        1 => VoiceActivityProfile::LBR,
        2 => VoiceActivityProfile::AGGRESSIVE,
        _ => VoiceActivityProfile::VERY_AGGRESSIVE,
    }
}

impl VoiceActivityGate {
    /// Create a gate for the given sample rate and aggressiveness (0–3).
    ///
    /// Values above 3 are clamped to the most aggressive profile.
    pub fn new(sample_rate: u32, aggressiveness: u8) -> Self {
        let frame_size = (sample_rate * defaults::VAD_FRAME_MS / 1000) as usize;
        Self {
            detector: VoiceActivityDetector::new(profile_for(aggressiveness)),
            sample_rate,
            frame_size,
            aggressiveness,
        }
    }

    /// Number of samples the gate expects per call.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Configured aggressiveness level.
    pub fn aggressiveness(&self) -> u8 {
        self.aggressiveness.min(3)
    }

    /// Classify one analysis window.
    ///
    /// Returns true (speech) whenever the frame cannot be classified: wrong
    /// length, a sample rate the classifier does not support, or an internal
    /// classifier error.
    pub fn is_speech(&mut self, frame: &[i16]) -> bool {
        if frame.len() != self.frame_size {
            return true;
        }
        // The underlying detector only handles the WebRTC rates; this build
        // wires it for 16kHz, everything else fails open.
        if self.sample_rate != 16_000 {
            return true;
        }
        self.detector.predict_16khz(frame).unwrap_or(true)
    }

    /// Reset classifier state between recording sessions.
    pub fn reset(&mut self) {
        self.detector.reset();
    }
}
