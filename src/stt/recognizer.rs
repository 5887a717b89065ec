use crate::error::{EcouteError, Result};

/// Trait for stateful streaming speech decoders.
///
/// One session per recording run. The pipeline feeds every frame that
/// passes the gate/denoise stages, strictly in arrival order, with no frame
/// skipped or duplicated.
pub trait StreamingRecognizer: Send {
    /// Feed the next frame of 16-bit mono PCM.
    ///
    /// Returns true when the frame completed an utterance; the finalized
    /// text is then available from [`final_text`](Self::final_text) and the
    /// decoder has reset for the next utterance.
    fn accept(&mut self, frame: &[i16]) -> Result<bool>;

    /// Take the finalized text for the utterance that just completed.
    fn final_text(&mut self) -> String;

    /// Best-effort text of the utterance in progress.
    fn partial_text(&mut self) -> String;

    /// Name of the loaded model, for diagnostics.
    fn model_name(&self) -> &str;
}

/// Mock recognizer for testing
///
/// Finalizes scripted utterances at scheduled frame counts and serves a
/// fixed partial in between.
pub struct MockRecognizer {
    model_name: String,
    /// (1-based frame number, finalized text), in schedule order.
    utterances: Vec<(usize, String)>,
    partial: String,
    fail_on_frame: Option<usize>,
    frames_accepted: usize,
    pending_final: Option<String>,
}

impl MockRecognizer {
    /// Create a new mock recognizer with default settings
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            utterances: Vec::new(),
            partial: String::new(),
            fail_on_frame: None,
            frames_accepted: 0,
            pending_final: None,
        }
    }

    /// Schedule an utterance boundary on the given (1-based) frame.
    pub fn with_utterance(mut self, on_frame: usize, text: &str) -> Self {
        self.utterances.push((on_frame, text.to_string()));
        self.utterances.sort_by_key(|(frame, _)| *frame);
        self
    }

    /// Serve this partial text while an utterance is in progress.
    pub fn with_partial(mut self, text: &str) -> Self {
        self.partial = text.to_string();
        self
    }

    /// Fail the accept call for the given (1-based) frame.
    pub fn with_failure_on(mut self, frame: usize) -> Self {
        self.fail_on_frame = Some(frame);
        self
    }

    /// Number of frames fed so far.
    pub fn frames_accepted(&self) -> usize {
        self.frames_accepted
    }
}

impl StreamingRecognizer for MockRecognizer {
    fn accept(&mut self, _frame: &[i16]) -> Result<bool> {
        self.frames_accepted += 1;

        if self.fail_on_frame == Some(self.frames_accepted) {
            return Err(EcouteError::Recognition {
                message: "mock recognition failure".to_string(),
            });
        }

        if let Some(&(frame, _)) = self.utterances.first()
            && frame == self.frames_accepted
        {
            let (_, text) = self.utterances.remove(0);
            self.pending_final = Some(text);
            return Ok(true);
        }

        Ok(false)
    }

    fn final_text(&mut self) -> String {
        self.pending_final.take().unwrap_or_default()
    }

    fn partial_text(&mut self) -> String {
        self.partial.clone()
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
