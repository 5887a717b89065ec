//! Streaming speech recognition contract and engine adapters.

pub mod recognizer;
#[cfg(feature = "vosk-stt")]
pub mod vosk;

pub use recognizer::{MockRecognizer, StreamingRecognizer};
#[cfg(feature = "vosk-stt")]
pub use vosk::VoskRecognizer;
