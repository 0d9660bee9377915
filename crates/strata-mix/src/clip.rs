//! Clips: a region of a source file placed on a track's timeline.

use crate::fade::{ClipFades, FadeSpec};
use crate::{ClipId, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use strata_core::{AtomicFlag, FramePosition, FrameRange};
use strata_stream::{SourceFault, SourceReader, StreamId};

/// Document form of a clip. Positions are rational so a session keeps its
/// timing when reopened at another rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSpec {
    pub source: PathBuf,
    pub start: FramePosition,
    pub length: FramePosition,
    /// Where in the source file the clip begins.
    #[serde(default)]
    pub source_offset: FramePosition,
    #[serde(default = "unity")]
    pub gain: f32,
    #[serde(default)]
    pub fade_in: FadeSpec,
    #[serde(default)]
    pub fade_out: FadeSpec,
}

fn unity() -> f32 {
    1.0
}

impl ClipSpec {
    pub fn new(source: impl Into<PathBuf>, start: FramePosition, length: FramePosition) -> Self {
        Self {
            source: source.into(),
            start,
            length,
            source_offset: FramePosition::ZERO,
            gain: 1.0,
            fade_in: FadeSpec::default(),
            fade_out: FadeSpec::default(),
        }
    }

    /// Clip placed and sized in frames at `sample_rate`.
    pub fn frames(source: impl Into<PathBuf>, start: u64, length: u64, sample_rate: u32) -> Self {
        Self::new(
            source,
            FramePosition::from_frames(start, sample_rate),
            FramePosition::from_frames(length, sample_rate),
        )
    }

    pub fn with_offset(mut self, offset: FramePosition) -> Self {
        self.source_offset = offset;
        self
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_fades(mut self, fade_in: FadeSpec, fade_out: FadeSpec) -> Self {
        self.fade_in = fade_in;
        self.fade_out = fade_out;
        self
    }
}

/// A clip on the audio thread.
///
/// Owns its source reader and a scratch buffer sized for the largest
/// block, so rendering never allocates.
pub struct Clip {
    id: ClipId,
    start: u64,
    length: u64,
    offset: u64,
    gain: f32,
    fades: Box<ClipFades>,
    reader: SourceReader,
    scratch: Vec<Vec<f32>>,
    fault_pending: Arc<AtomicFlag>,
}

impl Clip {
    /// Resolve `spec` at `sample_rate`. Zero-length clips are rejected.
    pub fn new(
        id: ClipId,
        spec: &ClipSpec,
        sample_rate: u32,
        reader: SourceReader,
        max_frames: usize,
    ) -> Result<Self> {
        let length = spec.length.to_frames(sample_rate);
        if length == 0 {
            return Err(Error::ZeroLengthClip);
        }
        let channels = reader.channel_count();
        Ok(Self {
            id,
            start: spec.start.to_frames(sample_rate),
            length,
            offset: spec.source_offset.to_frames(sample_rate),
            gain: spec.gain,
            fades: Box::new(ClipFades::from_specs(&spec.fade_in, &spec.fade_out, sample_rate)),
            reader,
            scratch: vec![vec![0.0; max_frames]; channels],
            fault_pending: Arc::new(AtomicFlag::new(false)),
        })
    }

    pub fn id(&self) -> ClipId {
        self.id
    }

    pub fn source(&self) -> StreamId {
        self.reader.id()
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn range(&self) -> FrameRange {
        FrameRange::with_len(self.start, self.length)
    }

    pub fn reader(&self) -> &SourceReader {
        &self.reader
    }

    /// Set when a fault note is in flight; cleared by the control side.
    pub(crate) fn fault_flag(&self) -> &Arc<AtomicFlag> {
        &self.fault_pending
    }

    /// Position the source for a playhead at `playhead`.
    pub fn prime(&mut self, playhead: u64) {
        let into = playhead.saturating_sub(self.start).min(self.length);
        self.reader.seek_to(self.offset + into);
    }

    pub fn set_start(&mut self, start: u64) {
        self.start = start;
    }

    /// Swap in new fades, returning the old ones.
    pub fn replace_fades(&mut self, fades: Box<ClipFades>) -> Box<ClipFades> {
        std::mem::replace(&mut self.fades, fades)
    }

    /// Mix the part of this clip inside `[start, start + frames)` into `out`.
    ///
    /// A mono source feeds every output channel; otherwise channels map one
    /// to one and extra source channels are dropped. Short reads come back
    /// zero-padded from the reader.
    pub fn render(&mut self, start: u64, frames: usize, out: &mut [Vec<f32>]) -> Option<SourceFault> {
        let block = FrameRange::with_len(start, frames as u64);
        let overlap = block.intersect(&self.range())?;
        let n = (overlap.len() as usize).min(self.scratch.first().map_or(0, Vec::len));
        if n == 0 {
            return None;
        }
        let dst = (overlap.start - start) as usize;
        let rel = overlap.start - self.start;

        self.reader.read(self.offset + rel, n, &mut self.scratch);

        let sources = self.scratch.len();
        for i in 0..n {
            let g = self.gain * self.fades.gain(rel + i as u64, self.length);
            for (ch, buf) in out.iter_mut().enumerate() {
                let src = if sources == 1 { 0 } else { ch };
                if let Some(channel) = self.scratch.get(src) {
                    buf[dst + i] += channel[i] * g;
                }
            }
        }

        self.reader.take_fault()
    }
}
