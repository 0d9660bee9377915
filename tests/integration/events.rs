//! Event channel integration tests
//!
//! Control-side edits travel through the session's bounded event queue and
//! are applied at the top of the next cycle, in the order they were posted.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use strata::prelude::*;
use strata::EventConfig;

const BLOCK: usize = TEST_BUFFER_SIZE;

/// With 1,024 slots, the 1,025th event without a cycle in between is
/// reported as saturation and leaves the session untouched.
#[test]
fn test_event_past_capacity_is_rejected() {
    let (engine, clock) = offline_engine();
    let events = EventConfig {
        capacity: 1024,
        retry_budget: 64,
        ..EventConfig::default()
    };
    let mut session = engine
        .create_session(SessionConfig::default().with_events(events))
        .unwrap();
    let track = session.add_track("a", TrackKind::Audio).unwrap();
    for i in 0..1023 {
        session.set_pan(track, (i % 3) as f32 * 0.25).unwrap();
    }
    assert_eq!(session.event_stats().pending_apply(), 1024);

    let err = session.set_pan(track, -1.0).unwrap_err();
    assert!(matches!(
        err,
        strata::mix::Error::Core(strata::core::Error::EventQueueSaturated {
            capacity: 1024,
            ..
        })
    ));
    assert_eq!(session.track(track).unwrap().pan, 0.0);

    clock.run_cycle();
    assert_eq!(session.event_stats().pending_apply(), 0);
    session.set_pan(track, -1.0).unwrap();
}

/// Edits posted back to back land in posting order: the last one wins.
#[test]
fn test_edits_apply_in_posting_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dc.wav");
    write_mono_wav(&path, &generate_dc(1.0, 4096), TEST_SAMPLE_RATE);

    let (engine, clock) = offline_engine();
    let mut session = engine.create_session(SessionConfig::default()).unwrap();
    let track = session.add_track("dc", TrackKind::Audio).unwrap();
    session
        .add_clip(track, ClipSpec::frames(&path, 0, 4096, TEST_SAMPLE_RATE))
        .unwrap();
    settle(&session, &clock);

    for gain in [0.1, 0.9, 0.3, 0.6] {
        session.set_gain(track, GainEnvelope::Constant(gain)).unwrap();
    }
    session.set_mute(track, true).unwrap();
    session.set_mute(track, false).unwrap();
    session.play().unwrap();

    let (left, _) = render(&clock, 1);
    assert_signals_equal(&left, &[0.6; BLOCK], FLOAT_EPSILON, "last gain wins");
}

/// Position notifications arrive in playhead order.
#[test]
fn test_position_notifications_are_ordered() {
    let (engine, clock) = offline_engine();
    let rx = engine.subscribe();
    let mut session = engine
        .create_session(SessionConfig::default().with_position_interval(1))
        .unwrap();
    session.play().unwrap();

    let mut positions = Vec::new();
    for cycle in 0..8 {
        clock.run_cycle();
        // One note per cycle once the previous one has been delivered.
        let delivered = wait_until(TIMEOUT, || {
            rx.try_iter().any(|n| match n {
                Notification::TransportPositionChanged { session: id, position }
                    if id == session.id() =>
                {
                    positions.push(position);
                    true
                }
                _ => false,
            })
        });
        assert!(delivered, "no position note after cycle {cycle}");
    }

    assert_eq!(positions.len(), 8);
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(
        positions[0],
        FramePosition::from_frames(BLOCK as u64, TEST_SAMPLE_RATE)
    );
}
