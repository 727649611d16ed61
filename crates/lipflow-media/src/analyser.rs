//! FFT analyser node
//!
//! An AnalyserNode-style frequency-analysis primitive built on rustfft: a
//! ring buffer of recent time-domain samples, a precomputed Hann window,
//! per-bin exponential smoothing over successive spectra, and a decibel
//! mapping onto byte magnitudes. The engine owns one analyser per graph
//! and snapshots its spectrum once per analysis tick.

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::{Result, SourceError};

/// Configuration for [`Analyser`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyserConfig {
    /// FFT window size in samples; a power of two, at least 32. Half of
    /// this many magnitude bins are produced.
    pub fft_size: usize,
    /// Per-bin exponential smoothing constant in [0, 1); higher values
    /// hold the previous spectrum longer.
    pub smoothing_time_constant: f32,
    /// Smoothed magnitude mapped to byte 0.
    pub min_decibels: f32,
    /// Smoothed magnitude mapped to byte 255.
    pub max_decibels: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyserConfig {
    fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two() || self.fft_size < 32 {
            return Err(SourceError::InvalidConfig(format!(
                "fft_size must be a power of two >= 32, got {}",
                self.fft_size
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing_time_constant) {
            return Err(SourceError::InvalidConfig(format!(
                "smoothing_time_constant must be in [0, 1), got {}",
                self.smoothing_time_constant
            )));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(SourceError::InvalidConfig(format!(
                "min_decibels ({}) must be below max_decibels ({})",
                self.min_decibels, self.max_decibels
            )));
        }
        Ok(())
    }
}

/// Frequency analyser over a sliding window of recent samples.
pub struct Analyser {
    config: AnalyserConfig,
    fft: Arc<dyn Fft<f32>>,
    ring: Vec<f32>,
    write_pos: usize,
    window: Vec<f32>,
    fft_buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl Analyser {
    /// Create an analyser, validating the configuration.
    pub fn new(config: AnalyserConfig) -> Result<Self> {
        config.validate()?;

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.fft_size);

        debug!(
            fft_size = config.fft_size,
            smoothing = config.smoothing_time_constant,
            "analyser created"
        );

        Ok(Self {
            ring: vec![0.0; config.fft_size],
            write_pos: 0,
            window: hann_window(config.fft_size),
            fft_buffer: vec![Complex::new(0.0, 0.0); config.fft_size],
            scratch: vec![Complex::new(0.0, 0.0); config.fft_size],
            smoothed: vec![0.0; config.fft_size / 2],
            fft,
            config,
        })
    }

    /// Number of magnitude bins produced per spectrum.
    pub fn frequency_bin_count(&self) -> usize {
        self.config.fft_size / 2
    }

    /// Push time-domain samples into the analysis window.
    ///
    /// Non-finite samples are zeroed before they can contaminate the
    /// spectrum.
    pub fn write_samples(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.ring[self.write_pos] = if sample.is_finite() { sample } else { 0.0 };
            self.write_pos = (self.write_pos + 1) % self.config.fft_size;
        }
    }

    /// Compute the current byte-magnitude spectrum into `out`, reusing the
    /// caller's buffer. Fills `min(out.len(), frequency_bin_count())` bins.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) {
        // Unwrap the ring so the oldest sample lands first, window applied.
        let n = self.config.fft_size;
        for i in 0..n {
            let src = (self.write_pos + i) % n;
            self.fft_buffer[i] = Complex::new(self.ring[src] * self.window[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.fft_buffer, &mut self.scratch);

        let tau = self.config.smoothing_time_constant;
        let norm = 1.0 / n as f32;
        let range = self.config.max_decibels - self.config.min_decibels;
        let count = out.len().min(self.smoothed.len());

        for (i, byte) in out.iter_mut().take(count).enumerate() {
            let magnitude = self.fft_buffer[i].norm() * norm;
            self.smoothed[i] = self.smoothed[i] * tau + magnitude * (1.0 - tau);

            let db = if self.smoothed[i] > 0.0 {
                20.0 * self.smoothed[i].log10()
            } else {
                f32::NEG_INFINITY
            };
            let scaled = (db - self.config.min_decibels) / range * 255.0;
            *byte = scaled.clamp(0.0, 255.0) as u8;
        }
    }

    /// Clear the analysis window and the smoothed spectrum.
    pub fn reset(&mut self) {
        self.ring.fill(0.0);
        self.write_pos = 0;
        self.smoothed.fill(0.0);
    }

    /// Apply a new configuration, rebuilding buffers when the FFT size
    /// changes.
    pub fn update_config(&mut self, config: AnalyserConfig) -> Result<()> {
        config.validate()?;

        if config.fft_size != self.config.fft_size {
            let mut planner = FftPlanner::new();
            self.fft = planner.plan_fft_forward(config.fft_size);
            self.ring = vec![0.0; config.fft_size];
            self.write_pos = 0;
            self.window = hann_window(config.fft_size);
            self.fft_buffer = vec![Complex::new(0.0, 0.0); config.fft_size];
            self.scratch = vec![Complex::new(0.0, 0.0); config.fft_size];
            self.smoothed = vec![0.0; config.fft_size / 2];
        }
        self.config = config;

        debug!(fft_size = self.config.fft_size, "analyser config updated");
        Ok(())
    }
}

/// Hann window coefficients for the given size.
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let t = i as f32 / (size - 1) as f32;
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, count: usize, amplitude: f32) -> Vec<f32> {
        (0..count)
            .map(|i| {
                (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin() * amplitude
            })
            .collect()
    }

    #[test]
    fn test_default_bin_count() {
        let analyser = Analyser::new(AnalyserConfig::default()).unwrap();
        assert_eq!(analyser.frequency_bin_count(), 128);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let bad = AnalyserConfig {
            fft_size: 100,
            ..AnalyserConfig::default()
        };
        assert!(Analyser::new(bad).is_err());

        let bad = AnalyserConfig {
            smoothing_time_constant: 1.0,
            ..AnalyserConfig::default()
        };
        assert!(Analyser::new(bad).is_err());

        let bad = AnalyserConfig {
            min_decibels: -20.0,
            max_decibels: -30.0,
            ..AnalyserConfig::default()
        };
        assert!(Analyser::new(bad).is_err());
    }

    #[test]
    fn test_silence_yields_zero_bytes() {
        let mut analyser = Analyser::new(AnalyserConfig::default()).unwrap();
        let mut out = [0xffu8; 128];
        analyser.byte_frequency_data(&mut out);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_sine_energy_lands_near_expected_bin() {
        let mut analyser = Analyser::new(AnalyserConfig::default()).unwrap();
        // 440 Hz at 48 kHz with a 256-sample window: bin width 187.5 Hz,
        // so the peak belongs around bin 2.
        analyser.write_samples(&sine(440.0, 48_000.0, 1024, 0.5));

        let mut out = [0u8; 128];
        for _ in 0..4 {
            analyser.byte_frequency_data(&mut out);
        }

        let peak_bin = out
            .iter()
            .enumerate()
            .max_by_key(|(_, &b)| b)
            .map(|(i, _)| i)
            .unwrap();
        assert!(
            (1..=4).contains(&peak_bin),
            "peak landed at bin {peak_bin}"
        );
        assert!(out[peak_bin] > out[64]);
    }

    #[test]
    fn test_non_finite_samples_are_sanitized() {
        let mut analyser = Analyser::new(AnalyserConfig::default()).unwrap();
        analyser.write_samples(&[f32::NAN, f32::INFINITY, f32::NEG_INFINITY]);
        analyser.write_samples(&vec![f32::NAN; 256]);

        let mut out = [0u8; 128];
        analyser.byte_frequency_data(&mut out);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_spectrum_decays_after_signal_stops() {
        let mut analyser = Analyser::new(AnalyserConfig::default()).unwrap();
        analyser.write_samples(&sine(440.0, 48_000.0, 1024, 0.5));

        let mut out = [0u8; 128];
        for _ in 0..4 {
            analyser.byte_frequency_data(&mut out);
        }
        let loud: u32 = out.iter().map(|&b| b as u32).sum();

        // Slide the whole window over silence; smoothing keeps the
        // spectrum alive briefly, then it must fade.
        analyser.write_samples(&vec![0.0; 256]);
        analyser.byte_frequency_data(&mut out);
        let fading: u32 = out.iter().map(|&b| b as u32).sum();
        assert!(fading > 0, "smoothing should hold some energy for a tick");
        assert!(fading < loud);

        for _ in 0..200 {
            analyser.byte_frequency_data(&mut out);
        }
        assert!(out.iter().all(|&b| b == 0), "spectrum never decayed");
    }

    #[test]
    fn test_reset_clears_spectrum() {
        let mut analyser = Analyser::new(AnalyserConfig::default()).unwrap();
        analyser.write_samples(&sine(440.0, 48_000.0, 1024, 0.5));
        let mut out = [0u8; 128];
        analyser.byte_frequency_data(&mut out);

        analyser.reset();
        analyser.byte_frequency_data(&mut out);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_update_config_resizes_buffers() {
        let mut analyser = Analyser::new(AnalyserConfig::default()).unwrap();
        assert_eq!(analyser.frequency_bin_count(), 128);

        let bigger = AnalyserConfig {
            fft_size: 512,
            ..AnalyserConfig::default()
        };
        analyser.update_config(bigger).unwrap();
        assert_eq!(analyser.frequency_bin_count(), 256);

        let bad = AnalyserConfig {
            fft_size: 31,
            ..AnalyserConfig::default()
        };
        assert!(analyser.update_config(bad).is_err());
        // Rejected configs must leave the analyser untouched.
        assert_eq!(analyser.frequency_bin_count(), 256);
    }
}
