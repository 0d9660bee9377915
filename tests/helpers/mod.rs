//! Test helpers and fixtures for strata integration tests
//!
//! Engines here run on the offline driver: the test clocks every cycle
//! itself, feeds capture samples and collects what was played.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (passthrough, unity gain)
//! - `CURVE_EPSILON` (1e-3): Table-driven fades and automation
//! - `SILENCE_THRESHOLD` (0.0001): Silence detection (-80dB)
//! - `INT16_EPSILON`: One 16-bit step

#![allow(dead_code)]

pub mod tolerances;

use approx::abs_diff_eq;
use std::path::Path;
use std::time::{Duration, Instant};
use strata::prelude::*;
use strata::OfflineClock;

/// Default test sample rate (matches common hardware)
pub const TEST_SAMPLE_RATE: u32 = 48_000;

/// Small cycles keep block boundaries visible in assertions.
pub const TEST_BUFFER_SIZE: usize = 64;

/// Upper bound for anything waiting on the streaming worker.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Route engine logs to the test harness. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Started engine on the offline driver, and the clock that drives it.
pub fn offline_engine() -> (Engine, OfflineClock) {
    offline_engine_with(TEST_BUFFER_SIZE)
}

pub fn offline_engine_with(buffer_size: usize) -> (Engine, OfflineClock) {
    init_tracing();
    let (driver, clock) = OfflineDriver::new();
    let engine = Engine::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .buffer_size(buffer_size)
        // Offline cycles are clocked by the test, so overruns against the
        // nominal period are not faults.
        .xrun_policy(4096, 4096)
        .driver(Box::new(driver))
        .build()
        .expect("Failed to create test engine");
    engine.start().expect("Failed to start test engine");
    (engine, clock)
}

/// Session config without the output clamp, so sums can be checked exactly.
pub fn unclamped() -> SessionConfig {
    SessionConfig::default().with_output_clamp(None)
}

/// Run one cycle so posted edits apply, then wait for the streaming worker
/// to serve every seek those edits caused.
pub fn settle(session: &Session, clock: &OfflineClock) {
    assert!(clock.run_cycle(), "offline driver is not running");
    session
        .streamer()
        .sync(TIMEOUT)
        .expect("streaming worker did not answer");
}

/// Run `cycles` cycles and return what was played as `(left, right)`.
/// Anything played before is discarded.
pub fn render(clock: &OfflineClock, cycles: usize) -> (Vec<f32>, Vec<f32>) {
    let _ = clock.take_playback(0);
    let _ = clock.take_playback(1);
    assert_eq!(clock.run_cycles(cycles), cycles);
    (clock.take_playback(0), clock.take_playback(1))
}

/// Poll `check` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    check()
}

// =============================================================================
// Deterministic Signal Generators
// =============================================================================

/// Generate an integer staircase signal [0, 1, 2, ..., n-1] as f32.
///
/// Each sample equals its index, so any frame that was skipped, repeated
/// or misplaced shows up as a wrong value.
pub fn generate_integer_staircase(num_samples: usize) -> Vec<f32> {
    (0..num_samples).map(|i| i as f32).collect()
}

/// Generate a DC offset signal (constant value).
pub fn generate_dc(value: f32, num_samples: usize) -> Vec<f32> {
    vec![value; num_samples]
}

/// Generate a test signal: sine wave at given frequency for specified samples.
pub fn generate_sine(frequency: f64, sample_rate: u32, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            (2.0 * std::f64::consts::PI * frequency * t).sin() as f32
        })
        .collect()
}

/// Calculate RMS of a signal.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Calculate peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

// =============================================================================
// Assertion Functions
// =============================================================================

/// Assert two signals are equal within tolerance, with detailed error message.
pub fn assert_signals_equal(a: &[f32], b: &[f32], epsilon: f32, context: &str) {
    assert_eq!(a.len(), b.len(), "{context}: length mismatch");
    if let Some((i, (x, y))) = a
        .iter()
        .zip(b)
        .enumerate()
        .find(|(_, (x, y))| !abs_diff_eq!(**x, **y, epsilon = epsilon))
    {
        panic!("{context}: first mismatch at sample {i}: {x} vs {y} (epsilon {epsilon})");
    }
}

/// Assert signal is silent within threshold.
pub fn assert_is_silent(samples: &[f32], threshold: f32, context: &str) {
    let max = peak(samples);
    assert!(
        max <= threshold,
        "{context}: expected silence, peak was {max}"
    );
}

/// Assert signal is NOT silent (has content above threshold).
pub fn assert_not_silent(samples: &[f32], min_peak: f32, context: &str) {
    let max = peak(samples);
    assert!(
        max >= min_peak,
        "{context}: expected audio with peak >= {min_peak}, peak was {max}"
    );
}

// =============================================================================
// WAV Fixtures
// =============================================================================

/// Write a mono 32-bit float WAV file.
pub fn write_mono_wav(path: &Path, samples: &[f32], sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("Failed to create WAV");
    for &s in samples {
        writer.write_sample(s).expect("Write error");
    }
    writer.finalize().expect("Finalize error");
}

/// Load a WAV file as one buffer per channel.
pub fn load_wav_channels(path: &Path) -> (Vec<Vec<f32>>, u32) {
    let reader = hound::WavReader::open(path).expect("Failed to open WAV");
    let spec = reader.spec();
    let channels = spec.channels as usize;
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .expect("Failed to read float samples"),
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_val))
                .collect::<Result<_, _>>()
                .expect("Failed to read int samples")
        }
    };

    let mut out = vec![Vec::with_capacity(samples.len() / channels); channels];
    for frame in samples.chunks(channels) {
        for (ch, &s) in frame.iter().enumerate() {
            out[ch].push(s);
        }
    }
    (out, spec.sample_rate)
}
