//! Two-phase noise reduction scoped to one recording session.
//!
//! Phase 1 collects the first K frames into a noise profile while passing
//! them through untouched. Phase 2 applies stationary spectral subtraction
//! against the profile. Noise reduction is an accuracy optimization, never a
//! correctness requirement: any internal failure returns the input frame
//! unmodified.

use crate::defaults;
use realfft::RealFftPlanner;
use realfft::num_complex::Complex;
use std::collections::VecDeque;

/// Fraction of the original magnitude kept as a floor in each bin, so heavy
/// subtraction never produces the hollow "musical noise" of zeroed bins.
const SPECTRAL_FLOOR: f32 = 0.05;

/// Immutable per-session noise fingerprint.
pub struct NoiseProfile {
    /// Concatenation of the calibration frames, normalized to [-1.0, 1.0].
    samples: Vec<f32>,
    /// Frame length the profile was built from.
    frame_len: usize,
    /// Average magnitude per FFT bin across the calibration frames.
    magnitude: Vec<f32>,
}

impl NoiseProfile {
    /// Total number of calibration samples captured.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Stateful denoiser: calibrate on the first K frames, then suppress.
pub struct NoiseReducer {
    strength: f32,
    calibration_target: usize,
    calibration: VecDeque<Vec<f32>>,
    profile: Option<NoiseProfile>,
    planner: RealFftPlanner<f32>,
}

fn to_float(frame: &[i16]) -> Vec<f32> {
    frame.iter().map(|&s| s as f32 / 32_768.0).collect()
}

fn to_pcm(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32_768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

impl NoiseReducer {
    /// Create a reducer with the default calibration depth and strength.
    pub fn new() -> Self {
        Self::with_settings(defaults::SUPPRESSION_STRENGTH, defaults::CALIBRATION_FRAMES)
    }

    /// Create a reducer with explicit suppression strength (0.0–1.0) and
    /// calibration depth.
    pub fn with_settings(strength: f32, calibration_frames: usize) -> Self {
        Self {
            strength: strength.clamp(0.0, 1.0),
            calibration_target: calibration_frames.max(1),
            calibration: VecDeque::with_capacity(calibration_frames.max(1)),
            profile: None,
            planner: RealFftPlanner::new(),
        }
    }

    /// True once the noise profile has been frozen.
    pub fn is_calibrated(&self) -> bool {
        self.profile.is_some()
    }

    /// The frozen profile, if calibration has completed.
    pub fn profile(&self) -> Option<&NoiseProfile> {
        self.profile.as_ref()
    }

    /// Process one frame. Identity during calibration; suppression afterward.
    /// Output length always equals input length.
    pub fn reduce(&mut self, frame: &[i16]) -> Vec<i16> {
        if self.profile.is_none() {
            self.calibrate(frame);
            return frame.to_vec();
        }
        match self.suppress(frame) {
            Ok(cleaned) => cleaned,
            Err(()) => frame.to_vec(),
        }
    }

    fn calibrate(&mut self, frame: &[i16]) {
        if frame.is_empty() {
            return;
        }
        if self.calibration.len() == self.calibration_target {
            self.calibration.pop_front();
        }
        self.calibration.push_back(to_float(frame));

        if self.calibration.len() == self.calibration_target {
            self.freeze_profile();
        }
    }

    /// Concatenate the calibration ring into the immutable profile and
    /// precompute its average magnitude spectrum.
    fn freeze_profile(&mut self) {
        let frame_len = match self.calibration.front() {
            Some(first) => first.len(),
            None => return,
        };
        let samples: Vec<f32> = self.calibration.iter().flatten().copied().collect();

        let r2c = self.planner.plan_fft_forward(frame_len);
        let mut magnitude = vec![0.0f32; frame_len / 2 + 1];
        let mut windows = 0usize;
        let mut spectrum = r2c.make_output_vec();

        for window in samples.chunks_exact(frame_len) {
            let mut input = window.to_vec();
            if r2c.process(&mut input, &mut spectrum).is_err() {
                continue;
            }
            for (avg, bin) in magnitude.iter_mut().zip(&spectrum) {
                *avg += bin.norm();
            }
            windows += 1;
        }
        if windows > 0 {
            for avg in &mut magnitude {
                *avg /= windows as f32;
            }
        }

        self.profile = Some(NoiseProfile {
            samples,
            frame_len,
            magnitude,
        });
        self.calibration.clear();
    }

    /// Magnitude-domain spectral subtraction against the frozen profile.
    fn suppress(&mut self, frame: &[i16]) -> Result<Vec<i16>, ()> {
        let profile = self.profile.as_ref().ok_or(())?;
        let n = frame.len();
        if n == 0 || n != profile.frame_len {
            return Err(());
        }

        let mut input = to_float(frame);
        let r2c = self.planner.plan_fft_forward(n);
        let mut spectrum = r2c.make_output_vec();
        r2c.process(&mut input, &mut spectrum).map_err(|_| ())?;

        for (bin, &noise) in spectrum.iter_mut().zip(&profile.magnitude) {
            let mag = bin.norm();
            if mag > 0.0 {
                let target = (mag - self.strength * noise).max(SPECTRAL_FLOOR * mag);
                *bin *= Complex::new(target / mag, 0.0);
            }
        }

        let c2r = self.planner.plan_fft_inverse(n);
        let mut output = c2r.make_output_vec();
        c2r.process(&mut spectrum, &mut output).map_err(|_| ())?;

        // realfft leaves the inverse unnormalized.
        let scale = 1.0 / n as f32;
        for s in &mut output {
            *s *= scale;
        }

        Ok(to_pcm(&output))
    }
}

impl Default for NoiseReducer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise_frame(len: usize, seed: i16) -> Vec<i16> {
        // Deterministic pseudo-noise, loud enough to produce a real profile.
        (0..len)
            .map(|i| {
                let x = (i as i32 * 2_654_435 + seed as i32) % 1_999;
                (x - 1_000) as i16
            })
            .collect()
    }

    #[test]
    fn test_identity_during_calibration() {
        let mut reducer = NoiseReducer::with_settings(0.8, 10);
        let frame = noise_frame(160, 1);

        for _ in 0..9 {
            assert_eq!(reducer.reduce(&frame), frame);
            assert!(!reducer.is_calibrated());
        }
    }

    #[test]
    fn test_calibration_completes_after_k_frames() {
        let mut reducer = NoiseReducer::with_settings(0.8, 5);
        let frame = noise_frame(160, 2);

        for i in 0..5 {
            reducer.reduce(&frame);
            assert_eq!(reducer.is_calibrated(), i == 4);
        }

        let profile = reducer.profile().unwrap();
        assert_eq!(profile.len(), 5 * 160);
        assert!(!profile.is_empty());
    }

    #[test]
    fn test_output_length_equals_input_length_after_calibration() {
        let mut reducer = NoiseReducer::with_settings(0.8, 3);
        let frame = noise_frame(320, 3);

        for _ in 0..3 {
            reducer.reduce(&frame);
        }
        assert!(reducer.is_calibrated());

        for seed in 0..5 {
            let input = noise_frame(320, seed);
            let output = reducer.reduce(&input);
            assert_eq!(output.len(), input.len());
        }
    }

    #[test]
    fn test_suppression_attenuates_stationary_noise() {
        let mut reducer = NoiseReducer::with_settings(0.8, 4);
        let frame = noise_frame(480, 7);

        for _ in 0..4 {
            reducer.reduce(&frame);
        }

        // Feeding the calibration noise itself back in should shrink it.
        let output = reducer.reduce(&frame);
        let energy_in: i64 = frame.iter().map(|&s| s as i64 * s as i64).sum();
        let energy_out: i64 = output.iter().map(|&s| s as i64 * s as i64).sum();
        assert!(
            energy_out < energy_in,
            "expected energy drop, got {energy_in} -> {energy_out}"
        );
    }

    #[test]
    fn test_mismatched_length_fails_open() {
        let mut reducer = NoiseReducer::with_settings(0.8, 2);
        let frame = noise_frame(160, 4);
        reducer.reduce(&frame);
        reducer.reduce(&frame);
        assert!(reducer.is_calibrated());

        let odd_frame = noise_frame(100, 5);
        assert_eq!(reducer.reduce(&odd_frame), odd_frame);
    }

    #[test]
    fn test_empty_frame_fails_open() {
        let mut reducer = NoiseReducer::new();
        assert_eq!(reducer.reduce(&[]), Vec::<i16>::new());
    }

    #[test]
    fn test_zero_strength_roundtrip_is_near_identity() {
        let mut reducer = NoiseReducer::with_settings(0.0, 2);
        let frame = noise_frame(160, 6);
        reducer.reduce(&frame);
        reducer.reduce(&frame);

        let output = reducer.reduce(&frame);
        // FFT round-trip plus i16 quantization: samples stay within ±1.
        for (a, b) in frame.iter().zip(&output) {
            assert!((a - b).abs() <= 1, "sample drifted: {a} vs {b}");
        }
    }
}
