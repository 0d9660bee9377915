//! Mixing integration tests
//!
//! Tracks, buses and the master rendered through a real session: clips come
//! from WAV files on disk and every cycle is clocked by the test.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use approx::assert_relative_eq;
use std::path::{Path, PathBuf};
use strata::prelude::*;
use tempfile::TempDir;

const BLOCK: usize = TEST_BUFFER_SIZE;

fn fixture(dir: &TempDir, name: &str, samples: &[f32]) -> PathBuf {
    let path = dir.path().join(name);
    write_mono_wav(&path, samples, TEST_SAMPLE_RATE);
    path
}

fn clip(path: &Path, start: u64, length: u64) -> ClipSpec {
    ClipSpec::frames(path, start, length, TEST_SAMPLE_RATE)
}

fn dc_track(session: &mut Session, dir: &TempDir, name: &str, value: f32) -> TrackId {
    let path = fixture(dir, &format!("{name}.wav"), &generate_dc(value, 8192));
    let track = session.add_track(name, TrackKind::Audio).unwrap();
    session.add_clip(track, clip(&path, 0, 8192)).unwrap();
    track
}

/// Two tracks at unity gain and center pan sum sample for sample.
#[test]
fn test_two_tracks_sum_at_unity() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, clock) = offline_engine();
    let mut session = engine.create_session(SessionConfig::default()).unwrap();
    dc_track(&mut session, &dir, "a", 0.25);
    dc_track(&mut session, &dir, "b", 0.5);

    settle(&session, &clock);
    session.play().unwrap();
    let (left, right) = render(&clock, 4);
    assert_signals_equal(&left, &[0.75; 4 * BLOCK], FLOAT_EPSILON, "left");
    assert_signals_equal(&right, &[0.75; 4 * BLOCK], FLOAT_EPSILON, "right");
}

/// The default clamp holds the master at full scale; the meter still sees
/// the unclamped peak.
#[test]
fn test_clamp_limits_master_overs() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, clock) = offline_engine();
    let mut session = engine.create_session(SessionConfig::default()).unwrap();
    dc_track(&mut session, &dir, "a", 0.75);
    dc_track(&mut session, &dir, "b", 0.5);

    settle(&session, &clock);
    session.play().unwrap();
    let (left, _) = render(&clock, 2);
    assert_signals_equal(&left, &[1.0; 2 * BLOCK], 0.0, "clamped");

    let meter = &session.master().meter;
    assert_relative_eq!(meter.peak(0), 1.25);
    assert_eq!(meter.clipped(), 2 * 2 * BLOCK as u64);
}

#[test]
fn test_unclamped_overs_pass_through() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, clock) = offline_engine();
    let mut session = engine.create_session(unclamped()).unwrap();
    dc_track(&mut session, &dir, "a", 0.75);
    dc_track(&mut session, &dir, "b", 0.5);

    settle(&session, &clock);
    session.play().unwrap();
    let (left, _) = render(&clock, 1);
    assert_signals_equal(&left, &[1.25; BLOCK], FLOAT_EPSILON, "unclamped");
}

/// An edit posted between two cycles shapes the whole next block.
#[test]
fn test_edits_apply_before_next_block() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, clock) = offline_engine();
    let mut session = engine.create_session(SessionConfig::default()).unwrap();
    let track = dc_track(&mut session, &dir, "a", 0.5);

    settle(&session, &clock);
    session.play().unwrap();
    let (left, _) = render(&clock, 1);
    assert_signals_equal(&left, &[0.5; BLOCK], 0.0, "unity");

    session.set_gain(track, GainEnvelope::Constant(0.5)).unwrap();
    let (left, _) = render(&clock, 1);
    assert_signals_equal(&left, &[0.25; BLOCK], FLOAT_EPSILON, "half gain");

    session.set_mute(track, true).unwrap();
    let (left, _) = render(&clock, 1);
    assert_is_silent(&left, 0.0, "muted");
}

#[test]
fn test_hard_pan_silences_one_side() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, clock) = offline_engine();
    let mut session = engine.create_session(SessionConfig::default()).unwrap();
    let track = dc_track(&mut session, &dir, "a", 0.5);
    session.set_pan(track, -1.0).unwrap();

    settle(&session, &clock);
    session.play().unwrap();
    let (left, right) = render(&clock, 1);
    assert_signals_equal(&left, &[0.5; BLOCK], FLOAT_EPSILON, "left");
    assert_is_silent(&right, 0.0, "right");
}

#[test]
fn test_solo_silences_other_tracks() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, clock) = offline_engine();
    let mut session = engine.create_session(SessionConfig::default()).unwrap();
    dc_track(&mut session, &dir, "a", 0.25);
    let b = dc_track(&mut session, &dir, "b", 0.5);
    session.set_solo(b, true).unwrap();

    settle(&session, &clock);
    session.play().unwrap();
    let (left, _) = render(&clock, 2);
    assert_signals_equal(&left, &[0.5; 2 * BLOCK], FLOAT_EPSILON, "solo");
}

/// Tracks routed to a bus reach the master through the bus's own gain.
#[test]
fn test_bus_routing() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, clock) = offline_engine();
    let mut session = engine.create_session(SessionConfig::default()).unwrap();
    let bus = session.add_track("group", TrackKind::Bus).unwrap();
    let a = dc_track(&mut session, &dir, "a", 0.25);
    let b = dc_track(&mut session, &dir, "b", 0.5);
    session.set_route(a, Route::Bus(bus)).unwrap();
    session.set_route(b, Route::Bus(bus)).unwrap();
    session.set_gain(bus, GainEnvelope::Constant(0.5)).unwrap();

    settle(&session, &clock);
    session.play().unwrap();
    let (left, _) = render(&clock, 1);
    assert_signals_equal(&left, &[0.375; BLOCK], FLOAT_EPSILON, "through bus");

    session.remove_track(bus).unwrap();
    let (left, _) = render(&clock, 1);
    assert_signals_equal(&left, &[0.75; BLOCK], FLOAT_EPSILON, "bus removed");
}

/// Gain automation ramps sample-accurately across block boundaries.
#[test]
fn test_gain_automation_ramps_across_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, clock) = offline_engine();
    let mut session = engine.create_session(SessionConfig::default()).unwrap();
    let track = dc_track(&mut session, &dir, "a", 1.0);
    let ramp = 2 * BLOCK as u64;
    session
        .set_gain(
            track,
            GainEnvelope::automation(vec![
                AutomationPoint::new(0, 0.0),
                AutomationPoint::new(ramp, 1.0),
            ]),
        )
        .unwrap();

    settle(&session, &clock);
    session.play().unwrap();
    let (left, _) = render(&clock, 3);
    let expected: Vec<f32> = (0..3 * BLOCK)
        .map(|i| (i as f32 / ramp as f32).min(1.0))
        .collect();
    assert_signals_equal(&left, &expected, CURVE_EPSILON, "automation");
}

/// A clip starting and ending inside blocks plays only its own frames.
#[test]
fn test_clip_boundaries_inside_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, "stairs.wav", &generate_integer_staircase(1000));
    let (engine, clock) = offline_engine();
    let mut session = engine.create_session(unclamped()).unwrap();
    let track = session.add_track("stairs", TrackKind::Audio).unwrap();
    session.add_clip(track, clip(&path, 10, 100)).unwrap();

    settle(&session, &clock);
    session.play().unwrap();
    let (left, _) = render(&clock, 2);

    let mut expected = vec![0.0; 2 * BLOCK];
    for (i, s) in expected[10..110].iter_mut().enumerate() {
        *s = i as f32;
    }
    assert_signals_equal(&left, &expected, 0.0, "clip placement");
}

#[test]
fn test_fade_in_shapes_clip_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, "dc.wav", &generate_dc(1.0, 4096));
    let (engine, clock) = offline_engine();
    let mut session = engine.create_session(SessionConfig::default()).unwrap();
    let track = session.add_track("dc", TrackKind::Audio).unwrap();
    let fade = FadeSpec::frames(BLOCK as u64, TEST_SAMPLE_RATE, FadeShape::Linear);
    session
        .add_clip(
            track,
            clip(&path, 0, 4096).with_fades(fade, FadeSpec::default()),
        )
        .unwrap();

    settle(&session, &clock);
    session.play().unwrap();
    let (left, _) = render(&clock, 2);
    assert!(left[0] < CURVE_EPSILON);
    assert!(left[..BLOCK].windows(2).all(|w| w[1] >= w[0]));
    assert_signals_equal(&left[BLOCK..], &[1.0; BLOCK], CURVE_EPSILON, "after fade");
}
