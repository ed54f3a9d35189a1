//! Frequency-domain energy
//!
//! Mirrors what a browser analyser node reports as byte frequency data:
//! Blackman-windowed FFT, magnitudes smoothed over time, converted to decibels
//! and mapped from `[MIN_DECIBELS, MAX_DECIBELS]` onto `0..=255`. The acoustic
//! phase uses the mean of those bins as its energy sample.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

pub const DEFAULT_FFT_SIZE: usize = 256;
pub const DEFAULT_SMOOTHING: f64 = 0.8;
pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;

/// Streaming spectrum analyzer with per-bin temporal smoothing
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    smoothing: f32,
}

impl SpectrumAnalyzer {
    /// `fft_size` must be a power of two; `smoothing` is clamped to `[0, 1)`
    pub fn new(fft_size: usize, smoothing: f64) -> Self {
        let fft = FftPlanner::new().plan_fft_forward(fft_size);

        let window = (0..fft_size)
            .map(|i| {
                let phase = 2.0 * PI * i as f32 / fft_size as f32;
                0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
            })
            .collect();

        Self {
            fft,
            fft_size,
            window,
            smoothed: vec![0.0; fft_size / 2],
            smoothing: smoothing.clamp(0.0, 0.999) as f32,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Byte frequency data for the first `fft_size` samples of `pcm` (zero-padded)
    pub fn byte_frequency_data(&mut self, pcm: &[f32]) -> Vec<u8> {
        let mut buffer: Vec<Complex<f32>> = self
            .window
            .iter()
            .enumerate()
            .map(|(i, w)| Complex::new(pcm.get(i).copied().unwrap_or(0.0) * w, 0.0))
            .collect();

        self.fft.process(&mut buffer);

        let scale = 255.0 / (MAX_DECIBELS - MIN_DECIBELS);
        let n = self.fft_size as f32;

        buffer
            .iter()
            .take(self.bin_count())
            .zip(self.smoothed.iter_mut())
            .map(|(bin, smoothed)| {
                let magnitude = bin.norm() / n;
                *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;
                if *smoothed <= 0.0 {
                    return 0;
                }
                let db = 20.0 * smoothed.log10();
                (scale * (db - MIN_DECIBELS)).clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Mean byte energy of one PCM frame
    pub fn energy(&mut self, pcm: &[f32]) -> f64 {
        mean_energy(&self.byte_frequency_data(pcm))
    }

    /// Forget smoothing history
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// Mean of byte frequency bins (0 for an empty slice)
pub fn mean_energy(bins: &[u8]) -> f64 {
    if bins.is_empty() {
        return 0.0;
    }
    bins.iter().map(|&b| b as f64).sum::<f64>() / bins.len() as f64
}
