//! LipFlow Media - Audio Sources and the Analysis Engine
//!
//! This crate owns everything between a playable audio signal and the
//! classification snapshots consumed by a rendering layer:
//! - Audio source abstraction (in-memory buffers, WAV files, optional
//!   live capture behind the `capture` feature)
//! - The FFT analyser node
//! - The engine that wires a source into the analyser and runs the
//!   per-tick analysis pipeline

use thiserror::Error;

pub mod analyser;
#[cfg(feature = "capture")]
pub mod capture;
pub mod engine;
pub mod source;

pub use analyser::{Analyser, AnalyserConfig};
#[cfg(feature = "capture")]
pub use capture::CaptureSource;
pub use engine::{Engine, EngineConfig, EngineStats, Snapshot};
pub use source::{AudioSource, BufferSource, WavSource};

/// Source and analysis errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Audio payload could not be decoded
    #[error("failed to decode audio: {0}")]
    Decode(String),

    /// Source has no more samples and cannot recover
    #[error("audio source exhausted or closed")]
    StreamClosed,

    /// Capture device missing or unusable
    #[error("capture device unavailable: {0}")]
    Device(String),

    /// Configuration value the graph cannot be built with
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error raised by the analysis domain
    #[error("analysis error: {0}")]
    Analysis(#[from] lipflow_core::CoreError),
}

/// Result type for media operations
pub type Result<T> = std::result::Result<T, SourceError>;
