//! The realtime mixing graph and the ops that mutate it.
//!
//! The control side never touches the graph directly. Every change is an
//! op posted through the session's event channel and applied by
//! [`SessionProcessor::drain_apply`](strata_core::Client::drain_apply) at the
//! top of a cycle. Whatever an op displaces travels back as a
//! [`Retired`] note so it is dropped off the audio thread.

use crate::clip::Clip;
use crate::config::SessionConfig;
use crate::fade::ClipFades;
use crate::gain::GainEnvelope;
use crate::plugin::{Placement, Processor};
use crate::strip::Strip;
use crate::track::{Block, ClipFault, Route, Track, TrackKind};
use crate::transport::{Transport, TransportState};
use crate::{ClipId, TrackId};
use std::fmt;
use std::sync::Arc;
use strata_core::event::ROOT;
use strata_core::{
    AtomicFlag, AudioPort, Client, CycleContext, EventTarget, FramePosition, Handle,
};
use strata_stream::SinkWriter;

/// Mutations of the mixing graph. The event target is the track handle, or
/// [`ROOT`] for the master bus and the transport.
pub enum SessionOp {
    AddTrack(Box<Track>),
    RemoveTrack,
    AddClip(Box<Clip>),
    RemoveClip(ClipId),
    MoveClip { clip: ClipId, start: u64 },
    SetFades { clip: ClipId, fades: Box<ClipFades> },
    SetGain(Box<GainEnvelope>),
    SetPan(f32),
    SetMute(bool),
    SetSolo(bool),
    SetRoute(Route),
    Arm(Option<Box<SinkWriter>>),
    InsertProcessor {
        placement: Placement,
        index: usize,
        processor: Box<dyn Processor>,
    },
    RemoveProcessor { placement: Placement, index: usize },
    Locate(FramePosition),
    Play,
    Stop,
}

impl fmt::Debug for SessionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOp::AddTrack(t) => write!(f, "AddTrack({:?})", t.id()),
            SessionOp::RemoveTrack => write!(f, "RemoveTrack"),
            SessionOp::AddClip(c) => write!(f, "AddClip({:?})", c.id()),
            SessionOp::RemoveClip(id) => write!(f, "RemoveClip({id:?})"),
            SessionOp::MoveClip { clip, start } => write!(f, "MoveClip({clip:?}, {start})"),
            SessionOp::SetFades { clip, .. } => write!(f, "SetFades({clip:?})"),
            SessionOp::SetGain(g) => write!(f, "SetGain({g:?})"),
            SessionOp::SetPan(p) => write!(f, "SetPan({p})"),
            SessionOp::SetMute(m) => write!(f, "SetMute({m})"),
            SessionOp::SetSolo(s) => write!(f, "SetSolo({s})"),
            SessionOp::SetRoute(r) => write!(f, "SetRoute({r:?})"),
            SessionOp::Arm(sink) => write!(f, "Arm({:?})", sink.as_ref().map(|s| s.id())),
            SessionOp::InsertProcessor {
                placement,
                index,
                processor,
            } => write!(
                f,
                "InsertProcessor({placement:?}, {index}, {})",
                processor.name()
            ),
            SessionOp::RemoveProcessor { placement, index } => {
                write!(f, "RemoveProcessor({placement:?}, {index})")
            }
            SessionOp::Locate(p) => write!(f, "Locate({p})"),
            SessionOp::Play => write!(f, "Play"),
            SessionOp::Stop => write!(f, "Stop"),
        }
    }
}

/// Something displaced from the graph, to be dropped on the control side.
pub enum Retired {
    Track(Box<Track>),
    Clip(Box<Clip>),
    Gain(Box<GainEnvelope>),
    Fades(Box<ClipFades>),
    Sink(Box<SinkWriter>),
    Processor(Box<dyn Processor>),
}

impl fmt::Debug for Retired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retired::Track(t) => write!(f, "Track({:?})", t.id()),
            Retired::Clip(c) => write!(f, "Clip({:?})", c.id()),
            Retired::Gain(_) => write!(f, "Gain"),
            Retired::Fades(_) => write!(f, "Fades"),
            Retired::Sink(s) => write!(f, "Sink({:?})", s.id()),
            Retired::Processor(p) => write!(f, "Processor({})", p.name()),
        }
    }
}

/// Audio → control notes of a session.
#[derive(Debug)]
pub enum SessionNote {
    Retired(Retired),
    /// An op the graph could not apply. Anything it carried comes back.
    Rejected {
        target: Handle,
        reason: &'static str,
        retired: Option<Retired>,
    },
    Position { position: FramePosition },
    SourceFault(ClipFault),
}

fn rejected(target: Handle, reason: &'static str, retired: Option<Retired>) -> Option<SessionNote> {
    Some(SessionNote::Rejected {
        target,
        reason,
        retired,
    })
}

fn retired(item: Retired) -> Option<SessionNote> {
    Some(SessionNote::Retired(item))
}

/// Tracks, buses and the master, owned by the audio thread.
pub struct MixGraph {
    tracks: Vec<Box<Track>>,
    max_tracks: usize,
    audible: Vec<bool>,
    master: Strip,
    clamp: Option<f32>,
    transport: Transport,
    max_frames: usize,
    position_pending: Arc<AtomicFlag>,
}

impl MixGraph {
    pub fn new(config: &SessionConfig, sample_rate: u32, max_frames: usize) -> Self {
        let max_frames = max_frames.max(1);
        Self {
            tracks: Vec::with_capacity(config.max_tracks),
            max_tracks: config.max_tracks,
            audible: Vec::with_capacity(config.max_tracks),
            master: Strip::new(config.channels, max_frames),
            clamp: config.output_clamp,
            transport: Transport::new(sample_rate, config.position_notify_interval),
            max_frames,
            position_pending: Arc::new(AtomicFlag::new(false)),
        }
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().map(|t| &**t)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id() == id).map(|t| &**t)
    }

    pub fn master(&self) -> &Strip {
        &self.master
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn transport_state(&self) -> Arc<TransportState> {
        self.transport.shared()
    }

    /// Set while a position note is in flight; cleared by the control side.
    pub fn position_flag(&self) -> Arc<AtomicFlag> {
        Arc::clone(&self.position_pending)
    }

    fn index_of(&self, handle: Handle) -> Option<usize> {
        self.tracks.iter().position(|t| t.id().0 == handle)
    }

    fn strip_mut(&mut self, handle: Handle) -> Option<&mut Strip> {
        if handle == ROOT {
            return Some(&mut self.master);
        }
        let i = self.index_of(handle)?;
        Some(self.tracks[i].strip_mut())
    }

    fn has_bus(&self, id: TrackId) -> bool {
        self.tracks
            .iter()
            .any(|t| t.id() == id && t.kind() == TrackKind::Bus)
    }

    /// Render one device cycle.
    pub fn process(&mut self, cx: &mut CycleContext<'_>, port: &AudioPort<SessionOp, SessionNote>) {
        self.transport.set_sample_rate(cx.sample_rate);

        let mut done = 0;
        while done < cx.frames {
            let n = (cx.frames - done).min(self.max_frames);
            self.process_block(cx, done, n, port);
            done += n;
        }

        if self.transport.end_cycle() {
            if self.position_pending.swap(true) {
                self.transport.defer_notify();
            } else if !port.post_from_audio(SessionNote::Position {
                position: self.transport.position(),
            }) {
                self.position_pending.set(false);
            }
        }
    }

    fn process_block(
        &mut self,
        cx: &mut CycleContext<'_>,
        offset: usize,
        frames: usize,
        port: &AudioPort<SessionOp, SessionNote>,
    ) {
        let start = self.transport.frame();
        let block = Block {
            start,
            frames,
            rolling: self.transport.is_rolling(),
            any_solo: self
                .tracks
                .iter()
                .any(|t| t.kind() == TrackKind::Audio && t.strip().is_soloed()),
            capture: cx.capture,
            offset,
        };
        let mut report = |fault: ClipFault| {
            port.post_from_audio(SessionNote::SourceFault(fault));
        };

        let len = self.tracks.len();
        self.audible.clear();
        self.audible.resize(len, false);

        for (track, audible) in self.tracks.iter_mut().zip(self.audible.iter_mut()) {
            if track.kind() == TrackKind::Audio {
                *audible = track.process(&block, &mut report);
            }
        }

        for b in 0..len {
            if self.tracks[b].kind() != TrackKind::Bus {
                continue;
            }
            let bus = self.tracks[b].id();
            self.tracks[b].strip_mut().clear(frames);
            for a in 0..len {
                if a != b && self.audible[a] && self.tracks[a].route() == Route::Bus(bus) {
                    let (src, dst) = pair_mut(&mut self.tracks, a, b);
                    dst.strip_mut().mix_from(src.strip(), frames);
                }
            }
            self.audible[b] = self.tracks[b].process(&block, &mut report);
        }

        self.master.clear(frames);
        for i in 0..len {
            if !self.audible[i] {
                continue;
            }
            let to_master = match self.tracks[i].route() {
                Route::Master => true,
                Route::Bus(id) => !self.has_bus(id),
            };
            if to_master {
                self.master.mix_from(self.tracks[i].strip(), frames);
            }
        }
        self.master.run(start, frames);

        if let Some(limit) = self.clamp {
            let mut clipped = 0;
            for buf in self.master.buffers_mut() {
                for s in buf[..frames].iter_mut() {
                    if s.abs() > limit {
                        *s = s.clamp(-limit, limit);
                        clipped += 1;
                    }
                }
            }
            self.master.meter().record_clipped(clipped);
        }

        let sources = self.master.channels();
        for ch in 0..cx.output_channels() {
            let src = if sources == 1 { 0 } else { ch };
            let Some(src) = self.master.buffers().get(src) else {
                continue;
            };
            if let Some(out) = cx.output(ch) {
                for (o, s) in out[offset..offset + frames].iter_mut().zip(&src[..frames]) {
                    *o += s;
                }
            }
        }

        self.transport.advance(frames);
    }

    fn locate(&mut self, position: FramePosition) {
        let frame = self.transport.locate(position);
        for track in self.tracks.iter_mut() {
            match track.as_audio_mut() {
                Some(audio) => audio.locate(frame),
                None => track.strip_mut().reset_processors(),
            }
        }
        self.master.reset_processors();
    }
}

/// A shared borrow of `a` and a mutable borrow of `b`.
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&left[a], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&right[0], &mut left[b])
    }
}

impl EventTarget for MixGraph {
    type Op = SessionOp;
    type Note = SessionNote;

    fn apply(&mut self, target: Handle, op: SessionOp) -> Option<SessionNote> {
        match op {
            SessionOp::AddTrack(track) => {
                if self.tracks.len() >= self.max_tracks {
                    return rejected(target, "track limit reached", Some(Retired::Track(track)));
                }
                self.tracks.push(track);
                None
            }
            SessionOp::RemoveTrack => {
                let Some(i) = self.index_of(target) else {
                    return rejected(target, "unknown track", None);
                };
                let track = self.tracks.remove(i);
                let id = track.id();
                for other in self.tracks.iter_mut() {
                    if other.route() == Route::Bus(id) {
                        other.set_route(Route::Master);
                    }
                }
                retired(Retired::Track(track))
            }
            SessionOp::AddClip(mut clip) => {
                let frame = self.transport.frame();
                let Some(i) = self.index_of(target) else {
                    return rejected(target, "unknown track", Some(Retired::Clip(clip)));
                };
                let Some(audio) = self.tracks[i].as_audio_mut() else {
                    return rejected(target, "clips need an audio track", Some(Retired::Clip(clip)));
                };
                clip.prime(frame);
                match audio.add_clip(clip) {
                    Ok(()) => None,
                    Err(clip) => rejected(target, "clip limit reached", Some(Retired::Clip(clip))),
                }
            }
            SessionOp::RemoveClip(id) => {
                let removed = self
                    .index_of(target)
                    .and_then(|i| self.tracks[i].as_audio_mut())
                    .and_then(|audio| audio.remove_clip(id));
                match removed {
                    Some(clip) => retired(Retired::Clip(clip)),
                    None => rejected(target, "unknown clip", None),
                }
            }
            SessionOp::MoveClip { clip, start } => {
                let frame = self.transport.frame();
                let found = self
                    .index_of(target)
                    .and_then(|i| self.tracks[i].as_audio_mut())
                    .and_then(|audio| audio.clip_mut(clip));
                match found {
                    Some(clip) => {
                        clip.set_start(start);
                        clip.prime(frame);
                        None
                    }
                    None => rejected(target, "unknown clip", None),
                }
            }
            SessionOp::SetFades { clip, fades } => {
                let found = self
                    .index_of(target)
                    .and_then(|i| self.tracks[i].as_audio_mut())
                    .and_then(|audio| audio.clip_mut(clip));
                match found {
                    Some(clip) => retired(Retired::Fades(clip.replace_fades(fades))),
                    None => rejected(target, "unknown clip", Some(Retired::Fades(fades))),
                }
            }
            SessionOp::SetGain(gain) => match self.strip_mut(target) {
                Some(strip) => retired(Retired::Gain(strip.replace_gain(gain))),
                None => rejected(target, "unknown track", Some(Retired::Gain(gain))),
            },
            SessionOp::SetPan(pan) => match self.strip_mut(target) {
                Some(strip) => {
                    strip.set_pan(pan);
                    None
                }
                None => rejected(target, "unknown track", None),
            },
            SessionOp::SetMute(mute) => match self.strip_mut(target) {
                Some(strip) => {
                    strip.set_mute(mute);
                    None
                }
                None => rejected(target, "unknown track", None),
            },
            SessionOp::SetSolo(solo) => match self.strip_mut(target) {
                Some(strip) => {
                    strip.set_solo(solo);
                    None
                }
                None => rejected(target, "unknown track", None),
            },
            SessionOp::SetRoute(route) => {
                if let Route::Bus(bus) = route {
                    if !self.has_bus(bus) {
                        return rejected(target, "route target is not a bus", None);
                    }
                }
                match self.index_of(target) {
                    Some(i) if self.tracks[i].set_route(route) => None,
                    Some(_) => rejected(target, "buses route to the master", None),
                    None => rejected(target, "unknown track", None),
                }
            }
            SessionOp::Arm(sink) => {
                let audio = self
                    .index_of(target)
                    .and_then(|i| self.tracks[i].as_audio_mut());
                match audio {
                    Some(audio) => audio.replace_sink(sink).map(|old| SessionNote::Retired(Retired::Sink(old))),
                    None => rejected(target, "only audio tracks record", sink.map(Retired::Sink)),
                }
            }
            SessionOp::InsertProcessor {
                placement,
                index,
                processor,
            } => match self.strip_mut(target) {
                Some(strip) => match strip.insert_processor(placement, index, processor) {
                    Ok(()) => None,
                    Err(p) => rejected(target, "processor chain full", Some(Retired::Processor(p))),
                },
                None => rejected(target, "unknown track", Some(Retired::Processor(processor))),
            },
            SessionOp::RemoveProcessor { placement, index } => {
                let removed = self
                    .strip_mut(target)
                    .and_then(|strip| strip.remove_processor(placement, index));
                match removed {
                    Some(p) => retired(Retired::Processor(p)),
                    None => rejected(target, "unknown processor", None),
                }
            }
            SessionOp::Locate(position) => {
                self.locate(position);
                None
            }
            SessionOp::Play => {
                self.transport.play();
                None
            }
            SessionOp::Stop => {
                self.transport.stop();
                None
            }
        }
    }
}

/// The device client that runs one session's graph.
pub struct SessionProcessor {
    name: String,
    audio: AudioPort<SessionOp, SessionNote>,
    graph: MixGraph,
}

impl SessionProcessor {
    pub(crate) fn new(name: String, audio: AudioPort<SessionOp, SessionNote>, graph: MixGraph) -> Self {
        Self { name, audio, graph }
    }

    pub fn graph(&self) -> &MixGraph {
        &self.graph
    }
}

impl Client for SessionProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn drain_apply(&mut self) {
        self.audio.drain_apply(&mut self.graph);
    }

    fn process(&mut self, cx: &mut CycleContext<'_>) {
        self.graph.process(cx, &self.audio);
    }
}
