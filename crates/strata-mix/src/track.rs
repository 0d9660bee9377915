//! Audio tracks and buses.

use crate::clip::Clip;
use crate::strip::Strip;
use crate::{ClipId, TrackId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strata_core::{AtomicFlag, AudioBus};
use strata_stream::{SinkWriter, SourceFault, StreamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    /// Plays clips and records from capture channels.
    Audio,
    /// Sums the tracks routed to it.
    Bus,
}

/// Where a track's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Route {
    #[default]
    Master,
    Bus(TrackId),
}

/// One block of processing, as seen by the tracks.
pub struct Block<'a> {
    /// Timeline frame of the first sample.
    pub start: u64,
    pub frames: usize,
    pub rolling: bool,
    pub any_solo: bool,
    pub capture: &'a AudioBus,
    /// Offset of this block inside the device cycle.
    pub offset: usize,
}

/// A clip read that faulted, with the flag that holds back repeats until
/// the control side has seen it.
#[derive(Debug, Clone)]
pub struct ClipFault {
    pub track: TrackId,
    pub clip: ClipId,
    pub source: StreamId,
    pub fault: SourceFault,
    pub ack: Arc<AtomicFlag>,
}

pub struct AudioTrack {
    id: TrackId,
    strip: Strip,
    clips: Vec<Box<Clip>>,
    max_clips: usize,
    route: Route,
    inputs: Vec<usize>,
    sink: Option<Box<SinkWriter>>,
    record: Vec<Vec<f32>>,
}

impl AudioTrack {
    pub fn new(
        id: TrackId,
        channels: usize,
        inputs: Vec<usize>,
        max_frames: usize,
        max_clips: usize,
    ) -> Self {
        Self {
            id,
            strip: Strip::new(channels, max_frames),
            clips: Vec::with_capacity(max_clips),
            max_clips,
            route: Route::Master,
            record: vec![vec![0.0; max_frames]; inputs.len()],
            inputs,
            sink: None,
        }
    }

    pub fn clips(&self) -> &[Box<Clip>] {
        &self.clips
    }

    pub fn inputs(&self) -> &[usize] {
        &self.inputs
    }

    pub fn is_armed(&self) -> bool {
        self.sink.is_some()
    }

    pub fn clip_mut(&mut self, id: ClipId) -> Option<&mut Clip> {
        self.clips.iter_mut().find(|c| c.id() == id).map(|c| &mut **c)
    }

    /// Add a clip. Hands it back when the reserved clip slots are used up.
    pub fn add_clip(&mut self, clip: Box<Clip>) -> Result<(), Box<Clip>> {
        if self.clips.len() >= self.max_clips {
            return Err(clip);
        }
        self.clips.push(clip);
        Ok(())
    }

    pub fn remove_clip(&mut self, id: ClipId) -> Option<Box<Clip>> {
        let index = self.clips.iter().position(|c| c.id() == id)?;
        Some(self.clips.remove(index))
    }

    /// Install or remove the record target, returning the previous one.
    pub fn replace_sink(&mut self, sink: Option<Box<SinkWriter>>) -> Option<Box<SinkWriter>> {
        std::mem::replace(&mut self.sink, sink)
    }

    /// Seek every clip for a playhead at `frame`.
    pub fn locate(&mut self, frame: u64) {
        for clip in self.clips.iter_mut() {
            clip.prime(frame);
        }
        self.strip.reset_processors();
    }

    fn process(&mut self, block: &Block<'_>, report: &mut dyn FnMut(ClipFault)) -> bool {
        let frames = block.frames;
        self.strip.clear(frames);

        let soloed_out = block.any_solo && !self.strip.is_soloed();
        let audible = !self.strip.is_muted() && !soloed_out;
        if !audible && self.sink.is_none() {
            return false;
        }

        if block.rolling {
            if let Some(sink) = self.sink.as_mut() {
                for (buf, &input) in self.record.iter_mut().zip(&self.inputs) {
                    let src = block
                        .capture
                        .channel(input)
                        .and_then(|c| c.buffer().get(block.offset..block.offset + frames));
                    match src {
                        Some(src) => buf[..frames].copy_from_slice(src),
                        None => buf[..frames].fill(0.0),
                    }
                }
                sink.write(&self.record, frames);
            }

            for clip in self.clips.iter_mut() {
                if let Some(fault) = clip.render(block.start, frames, self.strip.buffers_mut()) {
                    if !clip.fault_flag().swap(true) {
                        report(ClipFault {
                            track: self.id,
                            clip: clip.id(),
                            source: clip.source(),
                            fault,
                            ack: Arc::clone(clip.fault_flag()),
                        });
                    }
                }
            }
        }

        self.strip.run(block.start, frames);
        audible
    }
}

pub struct BusTrack {
    id: TrackId,
    strip: Strip,
}

impl BusTrack {
    pub fn new(id: TrackId, channels: usize, max_frames: usize) -> Self {
        Self {
            id,
            strip: Strip::new(channels, max_frames),
        }
    }

    /// Inputs were already summed into the strip by the graph.
    fn process(&mut self, block: &Block<'_>) -> bool {
        self.strip.run(block.start, block.frames);
        !self.strip.is_muted()
    }
}

/// A node in the mixing graph.
pub enum Track {
    Audio(AudioTrack),
    Bus(BusTrack),
}

impl Track {
    pub fn id(&self) -> TrackId {
        match self {
            Track::Audio(t) => t.id,
            Track::Bus(t) => t.id,
        }
    }

    pub fn kind(&self) -> TrackKind {
        match self {
            Track::Audio(_) => TrackKind::Audio,
            Track::Bus(_) => TrackKind::Bus,
        }
    }

    pub fn strip(&self) -> &Strip {
        match self {
            Track::Audio(t) => &t.strip,
            Track::Bus(t) => &t.strip,
        }
    }

    pub fn strip_mut(&mut self) -> &mut Strip {
        match self {
            Track::Audio(t) => &mut t.strip,
            Track::Bus(t) => &mut t.strip,
        }
    }

    /// Buses always feed the master.
    pub fn route(&self) -> Route {
        match self {
            Track::Audio(t) => t.route,
            Track::Bus(_) => Route::Master,
        }
    }

    /// Returns `false` for buses, which cannot be rerouted.
    pub fn set_route(&mut self, route: Route) -> bool {
        match self {
            Track::Audio(t) => {
                t.route = route;
                true
            }
            Track::Bus(_) => false,
        }
    }

    pub fn as_audio_mut(&mut self) -> Option<&mut AudioTrack> {
        match self {
            Track::Audio(t) => Some(t),
            Track::Bus(_) => None,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioTrack> {
        match self {
            Track::Audio(t) => Some(t),
            Track::Bus(_) => None,
        }
    }

    /// Produce this block's output in the strip buffers. Returns whether it
    /// should be summed into its destination.
    pub fn process(&mut self, block: &Block<'_>, report: &mut dyn FnMut(ClipFault)) -> bool {
        match self {
            Track::Audio(t) => t.process(block, report),
            Track::Bus(t) => t.process(block),
        }
    }
}
