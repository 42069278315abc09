//! Frequency-domain RMS extraction.
//!
//! Mirrors the behavior of a Web-Audio analyser node: a 512-point FFT
//! produces 256 frequency bins, each bin is smoothed over time with a 0.8
//! constant and normalized into `[0, 1]` over the -100..-30 dB range. The
//! lip-sync intensity is the RMS over all normalized bins, amplified by 3 and
//! clamped to `[0, 1]`.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// FFT window length; yields [`BIN_COUNT`] usable frequency bins.
pub const FFT_SIZE: usize = 512;
/// Number of frequency bins the analyser exposes.
pub const BIN_COUNT: usize = FFT_SIZE / 2;

/// Time-smoothing constant applied per bin between consecutive frames.
const SMOOTHING: f32 = 0.8;
/// Normalization floor in dB; bins at or below map to 0.
const MIN_DB: f32 = -100.0;
/// Normalization ceiling in dB; bins at or above map to 1.
const MAX_DB: f32 = -30.0;
/// Output amplification before the final clamp.
const GAIN: f32 = 3.0;

/// Stateful spectrum analyser. One instance per sampled audio source; the
/// smoothing state makes instances non-shareable across sources.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        let fft = FftPlanner::new().plan_fft_forward(FFT_SIZE);
        // Hann window.
        let window = (0..FFT_SIZE)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / FFT_SIZE as f32).cos()))
            .collect();
        Self {
            fft,
            window,
            smoothed: vec![0.0; BIN_COUNT],
            scratch: vec![Complex::default(); FFT_SIZE],
        }
    }

    /// Analyse one window of mono samples and return the lip-sync intensity.
    ///
    /// `samples` shorter than [`FFT_SIZE`] are zero-padded; longer input uses
    /// the newest [`FFT_SIZE`] samples.
    pub fn process(&mut self, samples: &[f32]) -> f32 {
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let sample = if samples.len() >= FFT_SIZE {
                samples[samples.len() - FFT_SIZE + i]
            } else {
                samples.get(i).copied().unwrap_or(0.0)
            };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let mut sum_squares = 0.0f32;
        for (bin, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.scratch[bin].norm() * 2.0 / FFT_SIZE as f32;
            *smoothed = SMOOTHING * *smoothed + (1.0 - SMOOTHING) * magnitude;
            let db = 20.0 * smoothed.max(1e-10).log10();
            let normalized = ((db - MIN_DB) / (MAX_DB - MIN_DB)).clamp(0.0, 1.0);
            sum_squares += normalized * normalized;
        }

        let rms = (sum_squares / BIN_COUNT as f32).sqrt();
        (rms * GAIN).clamp(0.0, 1.0)
    }

    /// Drop all smoothing state, as if freshly constructed.
    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_is_exactly_zero() {
        let mut analyzer = SpectrumAnalyzer::new();
        assert_eq!(analyzer.process(&vec![0.0; FFT_SIZE]), 0.0);
        // Stays zero across frames (smoothing of zero is zero).
        assert_eq!(analyzer.process(&vec![0.0; FFT_SIZE]), 0.0);
    }

    #[test]
    fn test_loud_tone_is_positive() {
        let mut analyzer = SpectrumAnalyzer::new();
        let tone: Vec<f32> = (0..FFT_SIZE)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / 16000.0).sin())
            .collect();
        let value = analyzer.process(&tone);
        assert!(value > 0.0, "expected positive intensity, got {value}");
        assert!(value <= 1.0);
    }

    #[test]
    fn test_short_input_zero_padded() {
        let mut analyzer = SpectrumAnalyzer::new();
        let value = analyzer.process(&[0.5, -0.5, 0.5, -0.5]);
        assert!((0.0..=1.0).contains(&value));
    }

    #[test]
    fn test_louder_is_at_least_as_open() {
        let quiet: Vec<f32> = (0..FFT_SIZE)
            .map(|i| 0.01 * (2.0 * PI * 200.0 * i as f32 / 16000.0).sin())
            .collect();
        let loud: Vec<f32> = quiet.iter().map(|s| s * 80.0).collect();

        let mut quiet_analyzer = SpectrumAnalyzer::new();
        let mut loud_analyzer = SpectrumAnalyzer::new();
        let quiet_value = quiet_analyzer.process(&quiet);
        let loud_value = loud_analyzer.process(&loud);
        assert!(loud_value >= quiet_value);
    }

    #[test]
    fn test_reset_clears_smoothing() {
        let mut analyzer = SpectrumAnalyzer::new();
        let tone: Vec<f32> = (0..FFT_SIZE)
            .map(|i| (2.0 * PI * 300.0 * i as f32 / 16000.0).sin())
            .collect();
        analyzer.process(&tone);
        analyzer.reset();
        assert_eq!(analyzer.process(&vec![0.0; FFT_SIZE]), 0.0);
    }
}
