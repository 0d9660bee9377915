//! Session persistence integration tests
//!
//! A saved document rebuilt into a fresh session sounds the same as the
//! session it was taken from.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use strata::mix::{TrackDocument, DOCUMENT_VERSION};
use strata::prelude::*;

const BLOCK: usize = TEST_BUFFER_SIZE;

#[test]
fn test_saved_session_restores_and_plays() {
    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("dc.wav");
    write_mono_wav(&audio, &generate_dc(0.5, 4096), TEST_SAMPLE_RATE);
    let saved = dir.path().join("session.json");

    let (engine, clock) = offline_engine();
    let mut original = engine.create_session(SessionConfig::default()).unwrap();
    let bus = original.add_track("group", TrackKind::Bus).unwrap();
    let track = original.add_track("dc", TrackKind::Audio).unwrap();
    original
        .add_clip(track, ClipSpec::frames(&audio, 0, 4096, TEST_SAMPLE_RATE))
        .unwrap();
    original.set_route(track, Route::Bus(bus)).unwrap();
    original.set_gain(bus, GainEnvelope::Constant(0.5)).unwrap();
    original.set_pan(track, 0.5).unwrap();

    let doc = original.document();
    doc.save(&saved).unwrap();
    engine.close_session(original).unwrap();

    let loaded = SessionDocument::load(&saved).unwrap();
    assert_eq!(loaded, doc);

    let mut restored = engine.create_session(SessionConfig::default()).unwrap();
    let ids = restored.restore(&loaded).unwrap();
    assert_eq!(ids.len(), 2);
    assert_eq!(restored.document(), doc);
    assert_eq!(restored.track(ids[1]).unwrap().route, Route::Bus(ids[0]));

    settle(&restored, &clock);
    restored.play().unwrap();
    let (left, right) = render(&clock, 2);
    // Pan 0.5 attenuates the left side by half.
    assert_signals_equal(&left, &[0.125; 2 * BLOCK], FLOAT_EPSILON, "left");
    assert_signals_equal(&right, &[0.25; 2 * BLOCK], FLOAT_EPSILON, "right");
}

/// An invalid document is refused before the session is touched.
#[test]
fn test_invalid_document_leaves_session_alone() {
    let (engine, _clock) = offline_engine();
    let mut session = engine.create_session(SessionConfig::default()).unwrap();
    let kept = session.add_track("kept", TrackKind::Audio).unwrap();

    let mut doc = SessionDocument::new(TEST_SAMPLE_RATE);
    let mut routed = TrackDocument::new("a", TrackKind::Audio);
    routed.route_to = Some(1);
    doc.tracks.push(routed);
    doc.tracks.push(TrackDocument::new("b", TrackKind::Audio));

    assert!(matches!(
        session.restore(&doc),
        Err(strata::mix::Error::InvalidRouting(_))
    ));
    assert_eq!(session.tracks().len(), 1);
    assert!(session.track(kept).is_some());
}

#[test]
fn test_newer_document_version_rejected() {
    let mut doc = SessionDocument::new(TEST_SAMPLE_RATE);
    doc.version = DOCUMENT_VERSION + 1;
    let json = serde_json::to_string(&doc).unwrap();
    assert!(SessionDocument::from_json(&json).is_err());
}
