//! The analysis engine
//!
//! Owns the analysis graph — an audio source wired into the FFT analyser —
//! and runs the per-tick pipeline: pull samples → spectrum snapshot →
//! feature extraction → classification → smoothing. The host render loop
//! calls [`Engine::update`] once per display frame; rendering consumers
//! poll [`Engine::snapshot`] or subscribe to the bounded snapshot channel.
//!
//! Everything here is single-threaded and cooperative. The only state
//! carried between ticks besides raw audio is the classifier's smoothing
//! state, and `disconnect` halts ticking synchronously.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use lipflow_core::{
    ClassificationResult, Classifier, ClassifierConfig, ExtractorConfig, FeatureExtractor,
    FeatureSet, VisemeLabel, FREQUENCY_BIN_COUNT,
};

use crate::analyser::{Analyser, AnalyserConfig};
use crate::source::AudioSource;
use crate::{Result, SourceError};

/// Tick length assumed before two host timestamps are available.
const DEFAULT_TICK_SECONDS: f32 = 1.0 / 60.0;
/// Longest stretch of audio pulled in one tick; host stalls clamp here so
/// a background tab cannot demand seconds of catch-up work.
const MAX_TICK_SECONDS: f32 = 0.25;

/// Configuration for [`Engine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Analyser node settings
    pub analyser: AnalyserConfig,
    /// Classifier thresholds and rates
    pub classifier: ClassifierConfig,
    /// Compute visualization-only features (centroid, coarse bands) and
    /// per-tick trace output. Per instance; there is no global debug
    /// switch.
    pub diagnostics: bool,
    /// Capacity of the snapshot channel handed to subscribers
    pub snapshot_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            analyser: AnalyserConfig::default(),
            classifier: ClassifierConfig::default(),
            diagnostics: false,
            snapshot_capacity: 16,
        }
    }
}

/// Engine counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStats {
    /// Update calls that ran a tick
    pub ticks: u64,
    /// Ticks that produced a fresh snapshot
    pub frames_analyzed: u64,
    /// Ticks skipped on a transient failure
    pub ticks_skipped: u64,
    /// Snapshots evicted because the channel was full
    pub dropped_snapshots: u64,
    /// Analysis graphs constructed over the engine's lifetime
    pub graphs_built: u32,
}

/// Readable output surface, current as of the last tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Current mouth-shape label
    pub viseme: VisemeLabel,
    /// Morph-target weight in [0, 1]
    pub intensity: f32,
    /// Features the label was derived from
    pub features: FeatureSet,
    /// Whether a source is attached and the graph is live
    pub connected: bool,
}

/// The built graph: source, analyser and per-tick working buffers.
struct AnalysisGraph {
    source: Box<dyn AudioSource>,
    analyser: Analyser,
    extractor: FeatureExtractor,
    spectrum: Vec<u8>,
    read_buf: Vec<f32>,
}

/// The signal source adapter: binds one audio source to the analysis
/// pipeline and manages its lifecycle.
pub struct Engine {
    config: EngineConfig,
    graph: Option<AnalysisGraph>,
    classifier: Classifier,
    latest: ClassificationResult,
    connected: bool,
    suspended: bool,
    last_timestamp: Option<f64>,
    stats: EngineStats,
    snapshot_tx: Sender<ClassificationResult>,
    snapshot_rx: Receiver<ClassificationResult>,
}

impl Engine {
    /// Create an engine; no graph exists until [`Engine::connect`].
    pub fn new(config: EngineConfig) -> Self {
        let (snapshot_tx, snapshot_rx) = bounded(config.snapshot_capacity.max(1));
        Self {
            classifier: Classifier::new(config.classifier.clone()),
            graph: None,
            latest: ClassificationResult::silent(),
            connected: false,
            suspended: false,
            last_timestamp: None,
            stats: EngineStats::default(),
            snapshot_tx,
            snapshot_rx,
            config,
        }
    }

    /// Attach a live audio source.
    ///
    /// Idempotent: a repeated call on an active engine only resumes a
    /// suspended graph and does not construct anything. Construction
    /// failures are logged and flip the engine to disconnected — this
    /// never returns an error, and the caller may simply retry.
    ///
    /// The source is consumed by value, so one concrete source can never
    /// feed two graphs.
    pub fn connect(&mut self, source: Box<dyn AudioSource>) {
        if self.connected {
            self.suspended = false;
            debug!("connect on an active engine; resuming");
            return;
        }
        match self.build_graph(source) {
            Ok(()) => {
                self.connected = true;
                self.suspended = false;
                self.classifier.reset();
                self.latest = ClassificationResult::silent();
                self.last_timestamp = None;
                debug!("engine connected");
            }
            Err(err) => {
                self.connected = false;
                warn!("failed to build analysis graph: {err}");
            }
        }
    }

    /// Suspend ticking without tearing anything down; the next `connect`
    /// resumes. Models a suspended audio context.
    pub fn suspend(&mut self) {
        if self.connected {
            self.suspended = true;
            debug!("engine suspended");
        }
    }

    /// Detach the engine from its source.
    ///
    /// Takes effect synchronously: no tick runs after this returns, and
    /// the exposed snapshot resets to the silence default. The built
    /// analyser is kept so reconnection stays cheap.
    pub fn disconnect(&mut self) {
        self.connected = false;
        self.suspended = false;
        self.classifier.reset();
        self.latest = ClassificationResult::silent();
        self.last_timestamp = None;
        debug!("engine disconnected");
    }

    /// Run one analysis tick. `timestamp` is the host clock in seconds;
    /// elapsed time between calls scales the transition smoothing and the
    /// amount of audio pulled.
    ///
    /// A no-op unless connected and not suspended. A failing tick keeps
    /// the previous snapshot and the loop alive.
    pub fn update(&mut self, timestamp: f64) {
        if !self.connected || self.suspended {
            return;
        }

        let dt = match self.last_timestamp {
            Some(last) => ((timestamp - last).max(0.0) as f32).min(MAX_TICK_SECONDS),
            None => DEFAULT_TICK_SECONDS,
        };
        self.last_timestamp = Some(timestamp);
        self.stats.ticks += 1;

        match self.run_tick(dt) {
            Ok(result) => {
                self.latest = result;
                self.stats.frames_analyzed += 1;
                self.publish(result);
            }
            Err(err) => {
                // One bad frame must never halt the loop.
                self.stats.ticks_skipped += 1;
                debug!("analysis tick skipped: {err}");
            }
        }
    }

    /// True while a source is attached.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Latest classification, overwritten each tick.
    pub fn latest(&self) -> &ClassificationResult {
        &self.latest
    }

    /// Output surface for rendering consumers, polled each render tick.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            viseme: self.latest.viseme,
            intensity: self.latest.intensity,
            features: self.latest.features,
            connected: self.connected,
        }
    }

    /// A receiver of per-tick results. The channel is bounded; when it
    /// backs up, the oldest entry is evicted so subscribers always see
    /// recent values.
    pub fn subscribe(&self) -> Receiver<ClassificationResult> {
        self.snapshot_rx.clone()
    }

    /// Engine counters.
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    fn build_graph(&mut self, source: Box<dyn AudioSource>) -> Result<()> {
        let sample_rate = source.sample_rate();
        if sample_rate == 0 {
            return Err(SourceError::InvalidConfig(
                "source reports a sample rate of 0".into(),
            ));
        }
        self.config.classifier.validate()?;

        let extractor = FeatureExtractor::new(ExtractorConfig {
            sample_rate,
            diagnostics: self.config.diagnostics,
        });
        let read_buf = vec![0.0f32; read_buffer_len(sample_rate)];

        // Re-wire a surviving analyser from a previous connection; the
        // analyser is the expensive part of the graph.
        if let Some(graph) = self.graph.as_mut() {
            graph.analyser.reset();
            graph.source = source;
            graph.extractor = extractor;
            graph.read_buf = read_buf;
            return Ok(());
        }

        let analyser = Analyser::new(self.config.analyser.clone())?;
        if analyser.frequency_bin_count() != FREQUENCY_BIN_COUNT {
            return Err(SourceError::InvalidConfig(format!(
                "analyser produces {} bins but the extractor expects {}",
                analyser.frequency_bin_count(),
                FREQUENCY_BIN_COUNT
            )));
        }
        let spectrum = vec![0u8; analyser.frequency_bin_count()];

        self.graph = Some(AnalysisGraph {
            source,
            analyser,
            extractor,
            spectrum,
            read_buf,
        });
        self.stats.graphs_built += 1;
        Ok(())
    }

    fn run_tick(&mut self, dt: f32) -> Result<ClassificationResult> {
        let graph = self.graph.as_mut().ok_or(SourceError::StreamClosed)?;

        let sample_rate = graph.source.sample_rate();
        let want = ((dt * sample_rate as f32) as usize).clamp(1, graph.read_buf.len());

        let got = graph.source.read(&mut graph.read_buf[..want])?;
        if got > 0 {
            graph.analyser.write_samples(&graph.read_buf[..got]);
        } else {
            // Exhausted source: slide the window over silence so the
            // spectrum decays instead of freezing on the last voiced frame.
            graph.read_buf[..want].fill(0.0);
            graph.analyser.write_samples(&graph.read_buf[..want]);
        }

        graph.analyser.byte_frequency_data(&mut graph.spectrum);
        let features = graph.extractor.extract(&graph.spectrum)?;
        Ok(self.classifier.classify(&features, dt))
    }

    fn publish(&mut self, result: ClassificationResult) {
        match self.snapshot_tx.try_send(result) {
            Ok(()) => {}
            Err(TrySendError::Full(result)) => {
                // Evict the stalest entry; subscribers want fresh values.
                let _ = self.snapshot_rx.try_recv();
                let _ = self.snapshot_tx.try_send(result);
                self.stats.dropped_snapshots += 1;
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

fn read_buffer_len(sample_rate: u32) -> usize {
    ((sample_rate as f32 * MAX_TICK_SECONDS) as usize).max(256)
}
