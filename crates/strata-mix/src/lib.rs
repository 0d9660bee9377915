//! Mixing graph: tracks, clips, buses, fades, gain, pan and sessions.
//!
//! # Primary API
//!
//! - [`Session`]: control-side handle for one arrangement
//! - [`SessionProcessor`]: the device client that renders it
//! - [`SessionDocument`]: serde form for saving and restoring
//!
//! Every edit made through a [`Session`] becomes a [`SessionOp`] on the
//! session's event channel and is applied on the audio thread before the
//! next block is mixed.
//!
//! # Example
//!
//! ```ignore
//! use strata_mix::{ClipSpec, Session, SessionConfig, TrackKind};
//!
//! let (mut session, processor) = Session::new(SessionConfig::default(), 48_000, 512, hub)?;
//! device.add_client(Box::new(processor))?;
//! let track = session.add_track("drums", TrackKind::Audio)?;
//! session.add_clip(track, ClipSpec::frames("drums.wav", 0, 96_000, 48_000))?;
//! session.play()?;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::SessionConfig;

pub mod curve;
pub use curve::CubicCurve;

pub mod fade;
pub use fade::{ClipFades, Fade, FadeShape, FadeSpec};

pub mod gain;
pub use gain::{AutomationLane, AutomationPoint, GainEnvelope};

pub mod pan;
pub use pan::{apply_pan, pan_gains};

pub mod plugin;
pub use plugin::{Placement, PluginChain, Processor, MAX_PROCESSORS};

pub mod meter;
pub use meter::PeakMeter;

pub mod clip;
pub use clip::{Clip, ClipSpec};

pub mod strip;
pub use strip::Strip;

pub mod track;
pub use track::{AudioTrack, Block, BusTrack, ClipFault, Route, Track, TrackKind};

pub mod transport;
pub use transport::{Transport, TransportState};

pub mod graph;
pub use graph::{MixGraph, Retired, SessionNote, SessionOp, SessionProcessor};

pub mod document;
pub use document::{SessionDocument, TrackDocument, DOCUMENT_VERSION};

pub mod session;
pub use session::{ClipView, MasterView, Session, TrackView};

/// Identifies a track or bus within a session. Never 0, which addresses
/// the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u64);

/// Identifies a clip within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClipId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track:{}", self.0)
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clip:{}", self.0)
    }
}
