//! # Strata - Real-time Audio Engine Core
//!
//! Moves samples between storage and a callback-driven audio device while a
//! control thread edits tracks, clips, routing and gain without blocking the
//! audio callback.
//!
//! ## Architecture
//!
//! Strata is an umbrella crate that coordinates:
//! - **strata-core** - Rational time, ring buffers, the cross-thread event channel, device scheduling
//! - **strata-stream** - Disk streaming: slot queues, read sources, recording sinks, codecs
//! - **strata-mix** - Mixing graph: tracks, clips, buses, fades, gain, pan, sessions
//!
//! ## Quick Start
//!
//! ```ignore
//! use strata::prelude::*;
//!
//! let engine = Engine::builder().buffer_size(256).build()?;
//! let mut session = engine.create_session(SessionConfig::default())?;
//!
//! let track = session.add_track("vocals", TrackKind::Audio)?;
//! session.add_clip(track, ClipSpec::frames("vocals.wav", 0, 480_000, engine.sample_rate()))?;
//!
//! engine.start()?;
//! session.play()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - CPAL hardware driver
//! - `cpal` - Hardware output through CPAL; without it only the null and offline drivers exist

/// Re-export of strata-core for direct access
pub use strata_core as core;

/// Re-export of strata-stream for direct access
pub use strata_stream as stream;

/// Re-export of strata-mix for direct access
pub use strata_mix as mix;

pub use strata_core::{
    AudioDevice, ChannelStats, CpuMetrics, DeviceConfig, Driver, DriverInfo, EventConfig,
    FaultSeverity, FramePosition, FrameRange, Notification, NullDriver, OfflineClock,
    OfflineDriver,
};

#[cfg(feature = "cpal")]
pub use strata_core::CpalDriver;

pub use strata_stream::{BufferStatus, CodecReader, CodecWriter, StreamConfig, StreamId, SyncState};

pub use strata_mix::{
    ClipId, ClipSpec, FadeShape, FadeSpec, GainEnvelope, Placement, Processor, Route, Session,
    SessionConfig, SessionDocument, TrackId, TrackKind,
};

mod error;
pub use error::{Error, Result};

mod builder;
mod engine;

pub use builder::EngineBuilder;
pub use engine::Engine;

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{Engine, EngineBuilder};

    pub use crate::core::{DeviceConfig, FramePosition, Notification, OfflineDriver};

    pub use crate::mix::{
        AutomationPoint, ClipSpec, FadeShape, FadeSpec, GainEnvelope, Placement, Processor, Route,
        Session, SessionConfig, SessionDocument, TrackId, TrackKind,
    };

    pub use crate::stream::StreamConfig;
}
