//! Spectral feature extraction
//!
//! Converts one byte-magnitude spectrum frame into a [`FeatureSet`]:
//! normalized volume, five formant-like band energies, and (diagnostics
//! builds only) a spectral centroid plus a coarse 8-band partition for
//! level meters. True formant tracking is out of scope; fixed bin ranges
//! over a 256-sample analysis window stand in for the formant regions.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::{CoreError, Result};

/// Number of magnitude bins per spectrum frame (half of the 256-sample FFT).
pub const FREQUENCY_BIN_COUNT: usize = 128;

/// Number of coarse bands in the visualization partition.
pub const VIZ_BAND_COUNT: usize = 8;

/// Formant-like frequency bands over the 128-bin spectrum.
///
/// The approximate center frequencies assume speech-rate sampling; the bin
/// ranges are what classification actually consumes and are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormantBand {
    /// ~300 Hz region, first formant floor
    F1,
    /// ~600 Hz region
    F2,
    /// ~1200 Hz region
    F3,
    /// ~2000 Hz region
    F4,
    /// ~3500 Hz region, sibilant energy
    F5,
}

impl FormantBand {
    /// All bands in ascending frequency order.
    pub const ALL: [FormantBand; 5] = [
        FormantBand::F1,
        FormantBand::F2,
        FormantBand::F3,
        FormantBand::F4,
        FormantBand::F5,
    ];

    /// Bin range of this band within a [`FREQUENCY_BIN_COUNT`]-bin frame.
    pub fn bin_range(&self) -> Range<usize> {
        match self {
            FormantBand::F1 => 0..8,
            FormantBand::F2 => 8..20,
            FormantBand::F3 => 20..40,
            FormantBand::F4 => 40..70,
            FormantBand::F5 => 70..110,
        }
    }

    /// Approximate center frequency in Hz.
    pub fn approx_hz(&self) -> f32 {
        match self {
            FormantBand::F1 => 300.0,
            FormantBand::F2 => 600.0,
            FormantBand::F3 => 1200.0,
            FormantBand::F4 => 2000.0,
            FormantBand::F5 => 3500.0,
        }
    }
}

/// Configuration for [`FeatureExtractor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Sample rate of the analyzed signal, used for the centroid bin→Hz map
    pub sample_rate: u32,
    /// Compute visualization-only features (centroid, coarse bands) and
    /// emit per-frame trace output. Per instance; there is no global
    /// debug switch.
    pub diagnostics: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            diagnostics: false,
        }
    }
}

/// Features derived from a single spectrum frame.
///
/// Recomputed every tick; holds no cross-tick state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Mean magnitude of all bins, normalized to [0, 1]
    pub volume: f32,
    /// Mean magnitude per formant band, in [`FormantBand::ALL`] order,
    /// each in [0, 255]
    pub band_energies: [f32; 5],
    /// Energy-weighted mean frequency in Hz; visualization only, `None`
    /// unless diagnostics are enabled
    pub centroid_hz: Option<f32>,
    /// Coarse equal-width band means for meters; visualization only,
    /// never consulted by classification
    pub viz_bands: Option<[f32; VIZ_BAND_COUNT]>,
}

impl FeatureSet {
    /// The all-zero feature set of a silent frame.
    pub fn silent() -> Self {
        Self {
            volume: 0.0,
            band_energies: [0.0; 5],
            centroid_hz: None,
            viz_bands: None,
        }
    }

    /// True when volume and every band energy are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.volume.is_finite() && self.band_energies.iter().all(|e| e.is_finite())
    }
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self::silent()
    }
}

/// Converts spectrum frames into [`FeatureSet`]s.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
}

impl FeatureExtractor {
    /// Create an extractor for the given configuration.
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Frequency of bin `i` in Hz for the configured sample rate.
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.config.sample_rate as f32 / (2 * FREQUENCY_BIN_COUNT) as f32
    }

    /// Extract features from one frame of byte magnitudes.
    ///
    /// The frame must hold exactly [`FREQUENCY_BIN_COUNT`] bins; an
    /// analyser running at a different resolution is a configuration
    /// mismatch, not a recoverable signal condition.
    pub fn extract(&self, frame: &[u8]) -> Result<FeatureSet> {
        if frame.len() != FREQUENCY_BIN_COUNT {
            return Err(CoreError::InvalidFrame {
                expected: FREQUENCY_BIN_COUNT,
                actual: frame.len(),
            });
        }

        let total: u32 = frame.iter().map(|&m| m as u32).sum();
        let volume = total as f32 / frame.len() as f32 / 255.0;

        let mut band_energies = [0.0f32; 5];
        for (i, band) in FormantBand::ALL.iter().enumerate() {
            band_energies[i] = mean_magnitude(frame, band.bin_range());
        }

        let (centroid_hz, viz_bands) = if self.config.diagnostics {
            (Some(self.centroid(frame)), Some(viz_partition(frame)))
        } else {
            (None, None)
        };

        let features = FeatureSet {
            volume,
            band_energies,
            centroid_hz,
            viz_bands,
        };

        if self.config.diagnostics {
            tracing::trace!(
                volume,
                bands = ?features.band_energies,
                centroid = ?features.centroid_hz,
                "features extracted"
            );
        }

        Ok(features)
    }

    /// Energy-weighted mean frequency across all bins; 0 for a dead frame.
    fn centroid(&self, frame: &[u8]) -> f32 {
        let total: f32 = frame.iter().map(|&m| m as f32).sum();
        if total <= 0.0 {
            return 0.0;
        }
        let weighted: f32 = frame
            .iter()
            .enumerate()
            .map(|(i, &m)| self.bin_frequency(i) * m as f32)
            .sum();
        weighted / total
    }
}

fn mean_magnitude(frame: &[u8], range: Range<usize>) -> f32 {
    let len = range.len();
    if len == 0 {
        return 0.0;
    }
    let sum: u32 = frame[range].iter().map(|&m| m as u32).sum();
    sum as f32 / len as f32
}

/// Equal-width partition of the whole frame into [`VIZ_BAND_COUNT`] means.
fn viz_partition(frame: &[u8]) -> [f32; VIZ_BAND_COUNT] {
    let width = FREQUENCY_BIN_COUNT / VIZ_BAND_COUNT;
    let mut out = [0.0f32; VIZ_BAND_COUNT];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = mean_magnitude(frame, i * width..(i + 1) * width);
    }
    out
}
