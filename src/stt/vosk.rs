//! Vosk-backed streaming recognizer.
//!
//! Requires libvosk at link time, so this adapter sits behind the
//! `vosk-stt` cargo feature. A missing model directory is a startup error:
//! the pipeline must not enter the listening state without a decoder.

use crate::error::{EcouteError, Result};
use crate::stt::recognizer::StreamingRecognizer;
use std::path::Path;
use vosk::{DecodingState, Model, Recognizer};

/// Streaming Kaldi decoder session over a Vosk model.
pub struct VoskRecognizer {
    recognizer: Recognizer,
    model_name: String,
}

impl VoskRecognizer {
    /// Load the model directory and open one decoder session.
    ///
    /// Fatal when the directory is missing or the model fails to load —
    /// there is no degraded mode without a decoder.
    pub fn load(model_dir: &Path, sample_rate: u32) -> Result<Self> {
        if !model_dir.exists() {
            return Err(EcouteError::ModelNotFound {
                path: model_dir.display().to_string(),
            });
        }

        let model_name = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| model_dir.display().to_string());

        let model =
            Model::new(model_dir.to_string_lossy().as_ref()).ok_or(EcouteError::ModelNotFound {
                path: model_dir.display().to_string(),
            })?;

        let mut recognizer =
            Recognizer::new(&model, sample_rate as f32).ok_or(EcouteError::Recognition {
                message: format!("failed to create decoder session at {sample_rate}Hz"),
            })?;
        recognizer.set_words(true);

        Ok(Self {
            recognizer,
            model_name,
        })
    }
}

impl StreamingRecognizer for VoskRecognizer {
    fn accept(&mut self, frame: &[i16]) -> Result<bool> {
        let state = self
            .recognizer
            .accept_waveform(frame)
            .map_err(|e| EcouteError::Recognition {
                message: format!("decoder rejected waveform: {e}"),
            })?;
        Ok(matches!(state, DecodingState::Finalized))
    }

    fn final_text(&mut self) -> String {
        self.recognizer
            .result()
            .single()
            .map(|r| r.text.to_string())
            .unwrap_or_default()
    }

    fn partial_text(&mut self) -> String {
        self.recognizer.partial_result().partial.to_string()
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
