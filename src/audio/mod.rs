//! Audio capture, framing, and per-frame analysis.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod denoise;
pub mod gate;
pub mod level;
pub mod queue;
pub mod source;
pub mod wav;

pub use denoise::NoiseReducer;
pub use gate::VoiceActivityGate;
pub use level::AudioLevelMeter;
pub use queue::{FrameConsumer, FrameProducer, PopError, frame_queue};
pub use source::{AudioSource, MockAudioSource};
pub use wav::WavFrameSource;
