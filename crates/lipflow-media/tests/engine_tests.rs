//! Engine lifecycle tests: connect/suspend/disconnect semantics, tick
//! accounting, failure recovery and snapshot publishing, all driven with
//! synthetic sources.

use lipflow_core::VisemeLabel;
use lipflow_media::{
    AnalyserConfig, AudioSource, BufferSource, Engine, EngineConfig, Result, SourceError,
};

const TICK: f64 = 1.0 / 60.0;

fn sine(freq: f32, sample_rate: u32, seconds: f32, amplitude: f32) -> Vec<f32> {
    let count = (sample_rate as f32 * seconds) as usize;
    (0..count)
        .map(|i| {
            (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin() * amplitude
        })
        .collect()
}

fn voice_source() -> Box<BufferSource> {
    Box::new(BufferSource::looping(sine(300.0, 48_000, 0.5, 0.5), 48_000))
}

/// Source that errors on every read.
struct FailingSource;

impl AudioSource for FailingSource {
    fn sample_rate(&self) -> u32 {
        48_000
    }

    fn read(&mut self, _out: &mut [f32]) -> Result<usize> {
        Err(SourceError::Decode("synthetic failure".into()))
    }
}

/// Source that errors on every second read.
struct FlakySource {
    inner: BufferSource,
    calls: u32,
}

impl FlakySource {
    fn new() -> Self {
        Self {
            inner: BufferSource::looping(sine(300.0, 48_000, 0.5, 0.5), 48_000),
            calls: 0,
        }
    }
}

impl AudioSource for FlakySource {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize> {
        self.calls += 1;
        if self.calls % 2 == 0 {
            Err(SourceError::Decode("intermittent failure".into()))
        } else {
            self.inner.read(out)
        }
    }
}

fn run_ticks(engine: &mut Engine, start: f64, count: usize) -> f64 {
    let mut t = start;
    for _ in 0..count {
        engine.update(t);
        t += TICK;
    }
    t
}

#[test]
fn test_connect_is_idempotent() {
    let mut engine = Engine::new(EngineConfig::default());
    engine.connect(voice_source());
    engine.connect(voice_source());

    assert!(engine.is_connected());
    // Two consecutive connects must not construct a second analyser.
    assert_eq!(engine.stats().graphs_built, 1);
}

#[test]
fn test_engine_emits_speech_snapshot() {
    let mut engine = Engine::new(EngineConfig::default());
    engine.connect(voice_source());
    run_ticks(&mut engine, 0.0, 30);

    let snapshot = engine.snapshot();
    assert!(snapshot.connected);
    assert_ne!(snapshot.viseme, VisemeLabel::Silence);
    assert!(snapshot.intensity > 0.0);
    assert!(snapshot.intensity <= 1.0);
    assert_eq!(engine.stats().frames_analyzed, 30);
    assert_eq!(engine.stats().ticks_skipped, 0);
}

#[test]
fn test_silent_source_stays_silent() {
    let mut engine = Engine::new(EngineConfig::default());
    engine.connect(Box::new(BufferSource::looping(vec![0.0; 4800], 48_000)));
    run_ticks(&mut engine, 0.0, 10);

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.viseme, VisemeLabel::Silence);
    assert_eq!(snapshot.intensity, 0.0);
}

#[test]
fn test_disconnect_halts_ticks_synchronously() {
    let mut engine = Engine::new(EngineConfig::default());
    engine.connect(voice_source());
    let t = run_ticks(&mut engine, 0.0, 5);

    engine.disconnect();

    // Output resets to the silence default immediately.
    let snapshot = engine.snapshot();
    assert!(!snapshot.connected);
    assert_eq!(snapshot.viseme, VisemeLabel::Silence);
    assert_eq!(snapshot.intensity, 0.0);

    // No further tick executes.
    let ticks_before = engine.stats().ticks;
    run_ticks(&mut engine, t, 3);
    assert_eq!(engine.stats().ticks, ticks_before);
    assert_eq!(engine.snapshot().viseme, VisemeLabel::Silence);
}

#[test]
fn test_suspend_and_resume() {
    let mut engine = Engine::new(EngineConfig::default());
    engine.connect(voice_source());
    engine.update(0.0);
    assert_eq!(engine.stats().ticks, 1);

    engine.suspend();
    engine.update(TICK);
    assert_eq!(engine.stats().ticks, 1, "suspended engine must not tick");
    assert!(engine.is_connected());

    // connect on a suspended engine resumes it without a new graph.
    engine.connect(Box::new(BufferSource::new(Vec::new(), 48_000)));
    engine.update(2.0 * TICK);
    assert_eq!(engine.stats().ticks, 2);
    assert_eq!(engine.stats().graphs_built, 1);
}

#[test]
fn test_transient_failure_keeps_previous_snapshot() {
    let mut engine = Engine::new(EngineConfig::default());
    engine.connect(Box::new(FlakySource::new()));

    engine.update(0.0);
    assert_eq!(engine.stats().frames_analyzed, 1);
    let before = *engine.latest();

    // Second tick fails inside the source; the loop continues and the
    // previous result is retained.
    engine.update(TICK);
    assert_eq!(engine.stats().ticks_skipped, 1);
    assert_eq!(engine.latest(), &before);

    engine.update(2.0 * TICK);
    assert_eq!(engine.stats().frames_analyzed, 2);
}

#[test]
fn test_failing_source_never_halts_the_loop() {
    let mut engine = Engine::new(EngineConfig::default());
    engine.connect(Box::new(FailingSource));
    assert!(engine.is_connected());

    run_ticks(&mut engine, 0.0, 3);
    let stats = engine.stats();
    assert_eq!(stats.ticks, 3);
    assert_eq!(stats.ticks_skipped, 3);
    assert_eq!(stats.frames_analyzed, 0);
    assert_eq!(engine.snapshot().viseme, VisemeLabel::Silence);
}

#[test]
fn test_zero_sample_rate_source_fails_silently() {
    let mut engine = Engine::new(EngineConfig::default());
    engine.connect(Box::new(BufferSource::new(vec![0.0; 16], 0)));

    assert!(!engine.is_connected());
    assert_eq!(engine.stats().graphs_built, 0);

    // update is a no-op while disconnected.
    engine.update(0.0);
    assert_eq!(engine.stats().ticks, 0);
}

#[test]
fn test_mismatched_analyser_resolution_fails_silently() {
    let config = EngineConfig {
        analyser: AnalyserConfig {
            fft_size: 512,
            ..AnalyserConfig::default()
        },
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(config);
    engine.connect(voice_source());

    assert!(!engine.is_connected());
    assert_eq!(engine.stats().graphs_built, 0);
}

#[test]
fn test_subscriber_sees_recent_results() {
    let mut engine = Engine::new(EngineConfig::default());
    let rx = engine.subscribe();

    engine.connect(voice_source());
    run_ticks(&mut engine, 0.0, 40);

    // Capacity is 16; older entries were evicted, never blocking the loop.
    let received: Vec<_> = rx.try_iter().collect();
    assert_eq!(received.len(), 16);
    assert!(engine.stats().dropped_snapshots > 0);
    for result in received {
        assert!(result.intensity >= 0.0);
        assert!(result.intensity <= 1.0);
    }
}

#[test]
fn test_exhausted_source_decays_to_silence() {
    let mut engine = Engine::new(EngineConfig::default());
    // One tenth of a second of voice, no looping.
    engine.connect(Box::new(BufferSource::new(
        sine(300.0, 48_000, 0.1, 0.5),
        48_000,
    )));

    let t = run_ticks(&mut engine, 0.0, 5);
    assert_ne!(engine.snapshot().viseme, VisemeLabel::Silence);

    // Long after the buffer ran dry, the window has slid over silence and
    // the smoothed spectrum has faded out.
    run_ticks(&mut engine, t, 250);
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.viseme, VisemeLabel::Silence);
    assert_eq!(snapshot.intensity, 0.0);
}

#[test]
fn test_reconnect_after_disconnect_reuses_analyser() {
    let mut engine = Engine::new(EngineConfig::default());
    engine.connect(voice_source());
    let t = run_ticks(&mut engine, 0.0, 5);
    engine.disconnect();

    engine.connect(voice_source());
    assert!(engine.is_connected());
    // The analyser survives the reconnect; only one was ever built.
    assert_eq!(engine.stats().graphs_built, 1);

    run_ticks(&mut engine, t, 5);
    assert_eq!(engine.stats().frames_analyzed, 10);
}
