//! LipFlow Core - Audio-to-Viseme Analysis Domain
//!
//! This crate contains the pure analysis domain for LipFlow, including:
//! - Viseme alphabet and morph-target mapping
//! - Spectral feature extraction over byte-magnitude spectrum frames
//! - The viseme decision tree with transition smoothing
//!
//! Nothing here performs I/O or owns a thread: the engine crate feeds
//! spectrum frames in and reads classification snapshots out, once per
//! analysis tick.

#![warn(missing_docs)]

use thiserror::Error;

pub mod classifier;
pub mod features;
pub mod viseme;

pub use classifier::{ClassificationResult, Classifier, ClassifierConfig, SmoothingState};
pub use features::{
    ExtractorConfig, FeatureExtractor, FeatureSet, FormantBand, FREQUENCY_BIN_COUNT,
    VIZ_BAND_COUNT,
};
pub use viseme::VisemeLabel;

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// Spectrum frame carried an unexpected bin count
    #[error("invalid spectrum frame: expected {expected} bins, got {actual}")]
    InvalidFrame {
        /// Bin count the extractor was built for
        expected: usize,
        /// Bin count actually supplied
        actual: usize,
    },

    /// Configuration value the pipeline cannot run with
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
