//! Engine lifecycle integration tests
//!
//! Tests engine creation, start/stop, driver swaps and the notification
//! stream subscribers see.

use crate::helpers::*;
use std::time::Duration;
use strata::prelude::*;
use strata::{NullDriver, OfflineDriver};

/// Test that a stopped engine runs no cycles and restarts cleanly.
#[test]
fn test_engine_start_stop() {
    let (engine, clock) = offline_engine();
    assert!(engine.is_running());
    assert!(clock.run_cycle());

    engine.stop();
    assert!(!engine.is_running());
    assert!(!clock.run_cycle());

    engine.start().unwrap();
    assert!(clock.run_cycle());
    assert_eq!(engine.device().cycles(), 2);
}

/// Test that the engine reports what the driver negotiated.
#[test]
fn test_engine_reports_driver_info() {
    let (engine, _clock) = offline_engine_with(256);
    assert_eq!(engine.sample_rate(), TEST_SAMPLE_RATE);
    assert_eq!(engine.buffer_size(), 256);
    assert_eq!(engine.info().playback_channels.len(), 2);
    assert!(engine.last_fault().is_none());
}

#[test]
fn test_cycle_finished_reaches_subscribers() {
    let (engine, clock) = offline_engine();
    let rx = engine.subscribe();
    clock.run_cycles(3);

    let finished = wait_until(TIMEOUT, || {
        rx.try_iter()
            .any(|n| matches!(n, Notification::CycleFinished { cycle } if cycle >= 1))
    });
    assert!(finished, "no cycle-finished notification");
}

/// Sessions keep rendering after the driver is swapped underneath them.
#[test]
fn test_sessions_survive_driver_swap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dc.wav");
    write_mono_wav(&path, &generate_dc(0.5, 4096), TEST_SAMPLE_RATE);

    let (engine, old_clock) = offline_engine();
    let rx = engine.subscribe();
    let mut session = engine.create_session(SessionConfig::default()).unwrap();
    let track = session.add_track("dc", TrackKind::Audio).unwrap();
    session
        .add_clip(track, ClipSpec::frames(&path, 0, 4096, TEST_SAMPLE_RATE))
        .unwrap();
    settle(&session, &old_clock);
    session.play().unwrap();
    let (left, _) = render(&old_clock, 1);
    assert_signals_equal(&left, &[0.5; TEST_BUFFER_SIZE], 0.0, "before swap");

    let (driver, clock) = OfflineDriver::new();
    engine.set_driver(Box::new(driver)).unwrap();
    assert!(!old_clock.run_cycle());

    let (left, right) = render(&clock, 2);
    assert_signals_equal(&left, &[0.5; 2 * TEST_BUFFER_SIZE], 0.0, "after swap left");
    assert_signals_equal(&right, &[0.5; 2 * TEST_BUFFER_SIZE], 0.0, "after swap right");

    let changed = wait_until(TIMEOUT, || {
        rx.try_iter()
            .any(|n| matches!(n, Notification::DriverChanged { ref name, .. } if name == "offline"))
    });
    assert!(changed, "no driver-changed notification");
}

/// A null driver runs cycles on its own clock.
#[test]
fn test_null_driver_cycles_in_background() {
    let engine = Engine::builder()
        .buffer_size(64)
        .driver(Box::new(NullDriver::new()))
        .build()
        .unwrap();
    engine.start().unwrap();
    assert!(wait_until(TIMEOUT, || engine.device().cycles() > 4));
    engine.stop();

    let stopped_at = engine.device().cycles();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(engine.device().cycles(), stopped_at);
}

#[test]
fn test_close_session_detaches_client() {
    let (engine, clock) = offline_engine();
    let session = engine.create_session(SessionConfig::default()).unwrap();
    clock.run_cycle();
    assert_eq!(clock.client_count(), Some(1));

    engine.close_session(session).unwrap();
    clock.run_cycle();
    assert_eq!(clock.client_count(), Some(0));
    assert_eq!(engine.session_count(), 0);
}
