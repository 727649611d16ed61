//! Viseme classification and transition smoothing
//!
//! Maps a [`FeatureSet`] to a [`ClassificationResult`] once per analysis
//! tick. Classification is a fixed-priority decision tree over the
//! formant-band fractions; smoothing ramps a transition progress toward 1
//! at a rate expressed per second, so behavior is stable under variable
//! frame rates.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::features::FeatureSet;
use crate::viseme::VisemeLabel;
use crate::{CoreError, Result};

/// Tunable constants for [`Classifier`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Volume at or below which a frame is forced to silence
    pub silence_threshold: f32,
    /// Minimum summed band magnitude required before band fractions are
    /// formed; starved frames classify as silence instead of dividing by
    /// near-zero
    pub min_band_energy: f32,
    /// Volume multiplier so typical speech maps to near-full intensity
    pub gain: f32,
    /// Transition progress gained per second after a label change; the
    /// default completes a transition in 1/15 s
    pub transition_rate: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 0.015,
            min_band_energy: 10.0,
            gain: 3.0,
            transition_rate: 15.0,
        }
    }
}

impl ClassifierConfig {
    /// Check the configuration for values the classifier cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.silence_threshold) {
            return Err(CoreError::InvalidConfig(format!(
                "silence_threshold must be in [0, 1], got {}",
                self.silence_threshold
            )));
        }
        if self.min_band_energy < 0.0 || !self.min_band_energy.is_finite() {
            return Err(CoreError::InvalidConfig(format!(
                "min_band_energy must be non-negative, got {}",
                self.min_band_energy
            )));
        }
        if self.gain <= 0.0 || !self.gain.is_finite() {
            return Err(CoreError::InvalidConfig(format!(
                "gain must be positive, got {}",
                self.gain
            )));
        }
        if self.transition_rate <= 0.0 || !self.transition_rate.is_finite() {
            return Err(CoreError::InvalidConfig(format!(
                "transition_rate must be positive, got {}",
                self.transition_rate
            )));
        }
        Ok(())
    }
}

/// Smoothing state carried across ticks of one connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingState {
    /// Label emitted on the previous tick
    pub last_label: VisemeLabel,
    /// Progress of the current transition, in [0, 1]
    pub transition_progress: f32,
}

impl Default for SmoothingState {
    fn default() -> Self {
        Self {
            last_label: VisemeLabel::Silence,
            transition_progress: 0.0,
        }
    }
}

/// Output of one classification tick.
///
/// A continuously overwritten snapshot, not a queued stream: consumers
/// read the latest value each render tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Current mouth-shape label
    pub viseme: VisemeLabel,
    /// Morph-target weight in [0, 1]
    pub intensity: f32,
    /// Raw features this tick classified
    pub features: FeatureSet,
}

impl ClassificationResult {
    /// The idle snapshot: silence at zero intensity.
    pub fn silent() -> Self {
        Self {
            viseme: VisemeLabel::Silence,
            intensity: 0.0,
            features: FeatureSet::silent(),
        }
    }
}

impl Default for ClassificationResult {
    fn default() -> Self {
        Self::silent()
    }
}

// Decision-tree thresholds over normalized band fractions (each band's
// share of the summed band energy). Tuned against byte-magnitude spectra
// of the 256-sample analysis window.
const STRONG_F1: f32 = 0.44;
const WEAK_F3: f32 = 0.25;
const STRONG_F3: f32 = 0.25;
const VOWEL_F5: f32 = 0.18;
const BALANCED_BAND: f32 = 0.20;
const BALANCED_LOW_SUM: f32 = 0.50;
const WEAK_F1: f32 = 0.10;
const WEAK_F2: f32 = 0.15;
const ROUNDED_F5_MIN: f32 = 0.30;
const DOMINANT_F5: f32 = 0.72;
const WEAK_LOW: f32 = 0.15;
const STRONG_MID_SUM: f32 = 0.50;
const FRICATIVE_F5: f32 = 0.40;
const FRICATIVE_F4_SPLIT: f32 = 0.18;
const WEAK_BAND: f32 = 0.20;
const VELAR_F4: f32 = 0.30;

/// Maps features to visemes with per-connection smoothing state.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
    state: SmoothingState,
}

impl Classifier {
    /// Create a classifier with the given configuration.
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            state: SmoothingState::default(),
        }
    }

    /// Current smoothing state.
    pub fn state(&self) -> SmoothingState {
        self.state
    }

    /// Active configuration.
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify one tick's features. `dt` is the measured elapsed time in
    /// seconds since the previous tick.
    ///
    /// Never fails: non-finite features and degenerate `dt` values fall
    /// back to the silence path.
    pub fn classify(&mut self, features: &FeatureSet, dt: f32) -> ClassificationResult {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        let label = self.decide_label(features);
        if label != self.state.last_label {
            trace!(from = %self.state.last_label, to = %label, "viseme change");
            self.state.last_label = label;
            self.state.transition_progress = 0.0;
        }
        self.state.transition_progress =
            (self.state.transition_progress + self.config.transition_rate * dt).min(1.0);

        let intensity = if label == VisemeLabel::Silence {
            0.0
        } else {
            (features.volume * self.config.gain).clamp(0.0, 1.0) * self.state.transition_progress
        };

        ClassificationResult {
            viseme: label,
            intensity,
            features: *features,
        }
    }

    /// Reset to the idle state, as on source disconnect.
    pub fn reset(&mut self) {
        self.state = SmoothingState::default();
    }

    fn decide_label(&self, features: &FeatureSet) -> VisemeLabel {
        if !features.is_finite() {
            return VisemeLabel::Silence;
        }
        if features.volume <= self.config.silence_threshold {
            return VisemeLabel::Silence;
        }
        let sum: f32 = features.band_energies.iter().sum();
        if sum < self.config.min_band_energy {
            return VisemeLabel::Silence;
        }
        let mut fractions = features.band_energies;
        for f in &mut fractions {
            *f /= sum;
        }
        decision_tree(&fractions)
    }
}

/// The fixed-priority tree; first matching rule wins. Fully deterministic.
fn decision_tree(fractions: &[f32; 5]) -> VisemeLabel {
    let [f1, f2, f3, f4, f5] = *fractions;

    // Vowel shapes first: jaw openness shows in the low formants.
    if f1 > STRONG_F1 && f3 < WEAK_F3 {
        return VisemeLabel::Aa;
    }
    if f3 > STRONG_F3 && f5 > VOWEL_F5 {
        return VisemeLabel::I;
    }
    if f1 >= BALANCED_BAND && f2 >= BALANCED_BAND && f1 + f2 >= BALANCED_LOW_SUM {
        return VisemeLabel::E;
    }
    if f1 < WEAK_F1 && f2 < WEAK_F2 && f5 > ROUNDED_F5_MIN && f5 < DOMINANT_F5 {
        return VisemeLabel::U;
    }
    if f1 < WEAK_LOW && f3 + f4 > STRONG_MID_SUM {
        return VisemeLabel::O;
    }

    // Consonants: a dominant sibilant band wins outright, then the
    // fricative class splits on upper-mid energy (labiodentals carry it,
    // dentals do not).
    if f5 >= DOMINANT_F5 {
        return VisemeLabel::Ch;
    }
    if f5 >= FRICATIVE_F5 {
        return if f4 > FRICATIVE_F4_SPLIT {
            VisemeLabel::Ff
        } else {
            VisemeLabel::Th
        };
    }
    if f1 < WEAK_BAND && f3 < WEAK_BAND && f5 < WEAK_BAND {
        return VisemeLabel::Pp;
    }
    if f3 < WEAK_BAND && f4 > VELAR_F4 {
        return VisemeLabel::Kk;
    }

    VisemeLabel::Dd
}
