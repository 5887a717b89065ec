use crate::error::{EcouteError, Result};

/// Trait for audio frame sources.
///
/// Implementations deliver fixed-length blocks of 16-bit mono PCM. The
/// capture loop copies each block into the frame queue and nothing else —
/// all analysis happens on the pipeline thread.
pub trait AudioSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Read the next full frame, or `None` when no frame is ready yet.
    ///
    /// Finite sources return `None` forever once exhausted.
    fn read_frame(&mut self) -> Result<Option<Vec<i16>>>;

    /// True for sources that end (files), false for live microphones.
    fn is_finite(&self) -> bool {
        false
    }
}

/// Mock audio source for testing
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    is_started: bool,
    frames: Vec<Vec<i16>>,
    position: usize,
    should_fail_start: bool,
    error_message: String,
}

impl MockAudioSource {
    /// Create a mock that yields the given frames once, in order.
    pub fn new(frames: Vec<Vec<i16>>) -> Self {
        Self {
            is_started: false,
            frames,
            position: 0,
            should_fail_start: false,
            error_message: "mock audio error".to_string(),
        }
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Check if the audio source is started
    pub fn is_started(&self) -> bool {
        self.is_started
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            Err(EcouteError::AudioCapture {
                message: self.error_message.clone(),
            })
        } else {
            self.is_started = true;
            Ok(())
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.is_started = false;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Vec<i16>>> {
        if self.position >= self.frames.len() {
            return Ok(None);
        }
        let frame = self.frames[self.position].clone();
        self.position += 1;
        Ok(Some(frame))
    }

    fn is_finite(&self) -> bool {
        true
    }
}
