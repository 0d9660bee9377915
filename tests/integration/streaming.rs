//! Disk streaming integration tests
//!
//! Clips read through the session's streaming worker: short files, seeks,
//! faults that must stay on their own track, and recording to disk.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use std::path::PathBuf;
use strata::prelude::*;
use strata::stream::{self, CodecReader};
use strata::StreamConfig;
use tempfile::TempDir;

const BLOCK: usize = TEST_BUFFER_SIZE;

fn staircase_file(dir: &TempDir, frames: usize) -> PathBuf {
    let path = dir.path().join(format!("stairs-{frames}.wav"));
    write_mono_wav(&path, &generate_integer_staircase(frames), TEST_SAMPLE_RATE);
    path
}

/// Codec whose every read fails.
struct BrokenCodec;

impl CodecReader for BrokenCodec {
    fn channel_count(&self) -> usize {
        1
    }

    fn sample_rate(&self) -> u32 {
        TEST_SAMPLE_RATE
    }

    fn length(&self) -> u64 {
        48_000
    }

    fn seek(&mut self, _frame: u64) -> stream::Result<()> {
        Ok(())
    }

    fn read_frames(&mut self, _buffer: &mut [f32], _position: u64, _count: usize) -> stream::Result<usize> {
        Err(stream::Error::UnsupportedFormat("unreadable test codec".into()))
    }
}

/// A 100-frame file under a 128-frame clip: two blocks, the file's frames
/// in order, then zero padding.
#[test]
fn test_short_file_is_zero_padded() {
    let dir = tempfile::tempdir().unwrap();
    let path = staircase_file(&dir, 100);
    let (engine, clock) = offline_engine();
    let mut session = engine.create_session(unclamped()).unwrap();
    let track = session.add_track("short", TrackKind::Audio).unwrap();
    session
        .add_clip(track, ClipSpec::frames(&path, 0, 128, TEST_SAMPLE_RATE))
        .unwrap();

    settle(&session, &clock);
    session.play().unwrap();
    let (left, _) = render(&clock, 2);

    let mut expected = generate_integer_staircase(100);
    expected.resize(2 * BLOCK, 0.0);
    assert_signals_equal(&left, &expected, 0.0, "short file");
}

/// Reads stay in file order across many slots.
#[test]
fn test_delivery_is_monotonic_across_slots() {
    let dir = tempfile::tempdir().unwrap();
    let path = staircase_file(&dir, 4096);
    let (engine, clock) = offline_engine();
    let config = unclamped().with_stream(StreamConfig::default().with_slots(8, 256));
    let mut session = engine.create_session(config).unwrap();
    let track = session.add_track("stairs", TrackKind::Audio).unwrap();
    session
        .add_clip(track, ClipSpec::frames(&path, 0, 4096, TEST_SAMPLE_RATE))
        .unwrap();
    settle(&session, &clock);
    session.play().unwrap();

    let mut played = Vec::new();
    for _ in 0..(4096 / BLOCK) {
        let (left, _) = render(&clock, 1);
        played.extend(left);
        // Slots are recycled as they drain; keep the worker ahead.
        session.streamer().sync(TIMEOUT).unwrap();
    }
    assert_signals_equal(&played, &generate_integer_staircase(4096), 0.0, "file order");
}

/// Locating twice to the same place is the same as locating once.
#[test]
fn test_repeated_locate_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = staircase_file(&dir, 8192);
    let (engine, clock) = offline_engine();
    let mut session = engine.create_session(unclamped()).unwrap();
    let track = session.add_track("stairs", TrackKind::Audio).unwrap();
    session
        .add_clip(track, ClipSpec::frames(&path, 0, 8192, TEST_SAMPLE_RATE))
        .unwrap();
    settle(&session, &clock);
    session.play().unwrap();
    render(&clock, 2);

    let target = FramePosition::from_frames(1000, TEST_SAMPLE_RATE);
    session.stop().unwrap();
    session.locate(target).unwrap();
    session.locate(target).unwrap();
    settle(&session, &clock);
    assert_eq!(session.position(), target);

    session.play().unwrap();
    let (left, _) = render(&clock, 1);
    let expected: Vec<f32> = (1000..1000 + BLOCK).map(|i| i as f32).collect();
    assert_signals_equal(&left, &expected, 0.0, "after locate");
}

/// A source whose codec fails mutes its own track and nothing else.
#[test]
fn test_failed_source_is_contained() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.wav");
    write_mono_wav(&good, &generate_dc(0.5, 4096), TEST_SAMPLE_RATE);

    let (engine, clock) = offline_engine();
    let rx = engine.subscribe();
    let mut session = engine.create_session(SessionConfig::default()).unwrap();
    let broken = session.add_track("broken", TrackKind::Audio).unwrap();
    session
        .add_clip_from(
            broken,
            ClipSpec::frames("broken", 0, 4096, TEST_SAMPLE_RATE),
            Box::new(BrokenCodec),
        )
        .unwrap();
    let track = session.add_track("good", TrackKind::Audio).unwrap();
    session
        .add_clip(track, ClipSpec::frames(&good, 0, 4096, TEST_SAMPLE_RATE))
        .unwrap();

    settle(&session, &clock);
    session.play().unwrap();
    let (left, right) = render(&clock, 4);
    assert_signals_equal(&left, &[0.5; 4 * BLOCK], FLOAT_EPSILON, "left");
    assert_signals_equal(&right, &[0.5; 4 * BLOCK], FLOAT_EPSILON, "right");

    let good_source = session.track(track).unwrap().clips[0].source.0;
    let faults_on_good = rx.try_iter().any(|n| match n {
        Notification::BufferUnderrun { source } => source == good_source,
        Notification::SourceOutOfSync { source, .. } => source == good_source,
        _ => false,
    });
    assert!(!faults_on_good);
}

/// An armed track records its capture channel while rolling; disarming
/// finalizes the file.
#[test]
fn test_armed_track_records_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.wav");
    let (engine, clock) = offline_engine();
    let mut session = engine.create_session(SessionConfig::default()).unwrap();
    let track = session.add_track_with_inputs("vox", vec![0]).unwrap();
    let stream = session.arm(track, &path).unwrap();
    settle(&session, &clock);

    let take = generate_sine(440.0, TEST_SAMPLE_RATE, 4 * BLOCK);
    assert_eq!(clock.push_capture(0, &take), take.len());
    session.play().unwrap();
    render(&clock, 4);

    session.stop().unwrap();
    session.disarm(track).unwrap();
    clock.run_cycle();
    let finalized = wait_until(TIMEOUT, || {
        let _ = session.streamer().sync(TIMEOUT);
        session.streamer().stream_info(stream).is_none()
    });
    assert!(finalized, "recording was not finalized");

    let (channels, rate) = load_wav_channels(&path);
    assert_eq!(rate, TEST_SAMPLE_RATE);
    assert_eq!(channels.len(), 1);
    assert_signals_equal(&channels[0], &take, FLOAT_EPSILON, "recorded take");
}
