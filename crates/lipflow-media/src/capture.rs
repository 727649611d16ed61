//! Live input capture (the `capture` feature)
//!
//! Wraps a cpal input stream as an [`AudioSource`]. The audio callback
//! mixes incoming frames to mono and hands them over a bounded channel;
//! when the consumer falls behind, whole chunks are dropped and counted
//! rather than ever blocking the audio thread.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::source::AudioSource;
use crate::{Result, SourceError};

/// Callback-to-consumer channel depth, in callback chunks.
const CHANNEL_CAPACITY: usize = 64;

/// Live microphone input via the default host device.
pub struct CaptureSource {
    sample_rate: u32,
    rx: Receiver<Vec<f32>>,
    pending: VecDeque<f32>,
    dropped: Arc<AtomicU64>,
    _stream: cpal::Stream,
}

impl CaptureSource {
    /// Open the default input device with its default configuration.
    pub fn open_default() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| SourceError::Device("no default input device".into()))?;
        let supported = device
            .default_input_config()
            .map_err(|e| SourceError::Device(e.to_string()))?;

        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(SourceError::InvalidConfig(format!(
                "unsupported capture sample format {:?}",
                supported.sample_format()
            )));
        }

        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels.max(1) as usize;

        let (tx, rx) = bounded::<Vec<f32>>(CHANNEL_CAPACITY);
        let dropped = Arc::new(AtomicU64::new(0));
        let dropped_in_callback = dropped.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono: Vec<f32> = if channels == 1 {
                        data.to_vec()
                    } else {
                        data.chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                            .collect()
                    };
                    if tx.try_send(mono).is_err() {
                        dropped_in_callback.fetch_add(1, Ordering::Relaxed);
                    }
                },
                |err| warn!("capture stream error: {err}"),
                None,
            )
            .map_err(|e| SourceError::Device(e.to_string()))?;
        stream.play().map_err(|e| SourceError::Device(e.to_string()))?;

        debug!(sample_rate, channels, "capture source opened");

        Ok(Self {
            sample_rate,
            rx,
            pending: VecDeque::new(),
            dropped,
            _stream: stream,
        })
    }

    /// Callback chunks dropped because the consumer fell behind.
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AudioSource for CaptureSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize> {
        // Drain whatever the callback has queued, without blocking.
        while self.pending.len() < out.len() {
            match self.rx.try_recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(_) => break,
            }
        }
        let n = out.len().min(self.pending.len());
        for slot in out[..n].iter_mut() {
            *slot = self.pending.pop_front().unwrap_or(0.0);
        }
        Ok(n)
    }
}
