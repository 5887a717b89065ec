//! WAV file audio source for finite runs and tests.

use crate::audio::source::AudioSource;
use crate::error::{EcouteError, Result};
use std::io::Read;
use std::path::Path;

/// Audio source that serves fixed-length frames from WAV data.
/// Supports arbitrary sample rates and channels, resampling to the pipeline
/// rate. The trailing partial frame is padded with silence so every frame
/// has the same length.
pub struct WavFrameSource {
    samples: Vec<i16>,
    position: usize,
    block_size: usize,
}

impl WavFrameSource {
    /// Create from any reader (for testing/flexibility).
    pub fn from_reader(
        reader: Box<dyn Read + Send>,
        target_rate: u32,
        block_size: usize,
    ) -> Result<Self> {
        let mut wav_reader =
            hound::WavReader::new(reader).map_err(|e| EcouteError::AudioCapture {
                message: format!("Failed to parse WAV file: {}", e),
            })?;

        let spec = wav_reader.spec();
        let source_rate = spec.sample_rate;
        let source_channels = spec.channels;

        let raw_samples: Vec<i16> = wav_reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| EcouteError::AudioCapture {
                message: format!("Failed to read WAV samples: {}", e),
            })?;

        // Convert to mono if stereo
        let mono_samples = if source_channels == 2 {
            raw_samples
                .chunks_exact(2)
                .map(|chunk| {
                    let left = chunk[0] as i32;
                    let right = chunk[1] as i32;
                    ((left + right) / 2) as i16
                })
                .collect()
        } else {
            raw_samples
        };

        let samples = if source_rate != target_rate {
            resample(&mono_samples, source_rate, target_rate)
        } else {
            mono_samples
        };

        Ok(Self {
            samples,
            position: 0,
            block_size: block_size.max(1),
        })
    }

    /// Create from a file on disk.
    pub fn open(path: &Path, target_rate: u32, block_size: usize) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(Box::new(file), target_rate, block_size)
    }

    /// Consume the source and return all samples as a single buffer.
    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

impl AudioSource for WavFrameSource {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Vec<i16>>> {
        if self.position >= self.samples.len() {
            return Ok(None);
        }

        let end = std::cmp::min(self.position + self.block_size, self.samples.len());
        let mut frame = self.samples[self.position..end].to_vec();
        frame.resize(self.block_size, 0);
        self.position = end;

        Ok(Some(frame))
    }

    fn is_finite(&self) -> bool {
        true
    }
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let src_pos = i as f64 * ratio;
            let idx = src_pos as usize;
            let frac = src_pos - idx as f64;

            if idx + 1 < samples.len() {
                let a = samples[idx] as f64;
                let b = samples[idx + 1] as f64;
                (a + (b - a) * frac) as i16
            } else {
                samples[samples.len() - 1]
            }
        })
        .collect()
}
