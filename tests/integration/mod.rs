//! Integration test modules for strata
//!
//! Test categories:
//! - engine: Engine lifecycle, driver swaps, notifications
//! - mixing: Track sums, clamp, pan, solo, buses, edits between blocks
//! - streaming: Disk-backed clips, seeks, faults, recording
//! - events: Event channel capacity and ordering through a session
//! - persistence: Session documents saved, loaded and restored

pub mod engine;
pub mod events;
pub mod mixing;
pub mod persistence;
pub mod streaming;
