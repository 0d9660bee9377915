//! Session persistence.
//!
//! A document captures the arrangement and mixer state: tracks, routing,
//! clips, fades and gain. Positions are rational, so a document saved at
//! one sample rate restores correctly at another.

use crate::clip::ClipSpec;
use crate::gain::GainEnvelope;
use crate::track::TrackKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub version: u32,
    /// Rate the session ran at when saved. Informational.
    pub sample_rate: u32,
    #[serde(default)]
    pub master_gain: GainEnvelope,
    #[serde(default)]
    pub tracks: Vec<TrackDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDocument {
    pub name: String,
    pub kind: TrackKind,
    #[serde(default)]
    pub gain: GainEnvelope,
    #[serde(default)]
    pub pan: f32,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
    /// Index of the bus in `tracks` this track feeds; `None` is the master.
    #[serde(default)]
    pub route_to: Option<usize>,
    /// Capture channels recorded by an audio track.
    #[serde(default)]
    pub inputs: Vec<usize>,
    #[serde(default)]
    pub clips: Vec<ClipSpec>,
}

impl TrackDocument {
    pub fn new(name: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            name: name.into(),
            kind,
            gain: GainEnvelope::default(),
            pan: 0.0,
            mute: false,
            solo: false,
            route_to: None,
            inputs: Vec::new(),
            clips: Vec::new(),
        }
    }
}

impl SessionDocument {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            sample_rate,
            master_gain: GainEnvelope::default(),
            tracks: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let doc: Self = serde_json::from_str(json)?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Check what restoring would check, without touching a session.
    pub fn validate(&self) -> Result<()> {
        if self.version > DOCUMENT_VERSION {
            return Err(Error::InvalidConfig(format!(
                "document version {} is newer than {DOCUMENT_VERSION}",
                self.version
            )));
        }
        for (i, track) in self.tracks.iter().enumerate() {
            if let Some(to) = track.route_to {
                if track.kind == TrackKind::Bus {
                    return Err(Error::InvalidRouting(format!(
                        "bus '{}' can only feed the master",
                        track.name
                    )));
                }
                match self.tracks.get(to) {
                    Some(bus) if bus.kind == TrackKind::Bus && to != i => {}
                    _ => {
                        return Err(Error::InvalidRouting(format!(
                            "track '{}' routes to {to}, which is not a bus",
                            track.name
                        )))
                    }
                }
            }
            if track.kind == TrackKind::Bus && !track.clips.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "bus '{}' cannot hold clips",
                    track.name
                )));
            }
            if track.clips.iter().any(|c| c.length.is_zero()) {
                return Err(Error::ZeroLengthClip);
            }
        }
        Ok(())
    }
}
