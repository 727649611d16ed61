//! Audio sources
//!
//! A source is a pull-based supply of decoded mono PCM. Sources are
//! consumed by value when connected to an engine, so one concrete source
//! can never be wired into two analysis graphs.

use std::path::Path;
use tracing::debug;

use crate::{Result, SourceError};

/// A live or prerecorded supply of decoded mono samples.
pub trait AudioSource {
    /// Sample rate of the produced signal in Hz.
    fn sample_rate(&self) -> u32;

    /// Fill `out` with up to `out.len()` samples, returning the number
    /// written. `Ok(0)` means the source has no samples to offer right
    /// now (or ever again, for finite sources).
    fn read(&mut self, out: &mut [f32]) -> Result<usize>;
}

/// Plays out an in-memory sample buffer, optionally looping.
#[derive(Debug)]
pub struct BufferSource {
    samples: Vec<f32>,
    position: usize,
    sample_rate: u32,
    looping: bool,
}

impl BufferSource {
    /// A source that plays the buffer once and then runs dry.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            position: 0,
            sample_rate,
            looping: false,
        }
    }

    /// A source that wraps around at the end of the buffer.
    pub fn looping(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            position: 0,
            sample_rate,
            looping: true,
        }
    }
}

impl AudioSource for BufferSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize> {
        if self.samples.is_empty() {
            return Ok(0);
        }
        let mut written = 0;
        while written < out.len() {
            if self.position >= self.samples.len() {
                if self.looping {
                    self.position = 0;
                } else {
                    break;
                }
            }
            let n = (out.len() - written).min(self.samples.len() - self.position);
            out[written..written + n]
                .copy_from_slice(&self.samples[self.position..self.position + n]);
            written += n;
            self.position += n;
        }
        Ok(written)
    }
}

/// Plays a WAV file as mono samples.
///
/// The file is decoded eagerly via `hound`; multi-channel audio is mixed
/// down by averaging. Integer formats are rescaled to [-1, 1].
#[derive(Debug)]
pub struct WavSource {
    inner: BufferSource,
}

impl WavSource {
    /// Open and decode a WAV file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let decode_err = |e: hound::Error| SourceError::Decode(e.to_string());

        let reader = hound::WavReader::open(path.as_ref()).map_err(decode_err)?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(decode_err)?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(decode_err)?
            }
        };

        let mono: Vec<f32> = if channels == 1 {
            samples
        } else {
            samples
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };

        debug!(
            path = %path.as_ref().display(),
            sample_rate = spec.sample_rate,
            channels,
            frames = mono.len(),
            "wav source opened"
        );

        Ok(Self {
            inner: BufferSource::new(mono, spec.sample_rate),
        })
    }
}

impl AudioSource for WavSource {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize> {
        self.inner.read(out)
    }
}
