//! Control-side handle of a session.
//!
//! A [`Session`] owns the control end of the session's event channel, its
//! streaming worker, the notify thread that turns audio-thread notes into
//! outward notifications, and a view of the arrangement that mirrors what
//! has been posted to the graph. The matching [`SessionProcessor`] is
//! registered with the audio device as a client.

use crate::clip::{Clip, ClipSpec};
use crate::config::SessionConfig;
use crate::document::{SessionDocument, TrackDocument, DOCUMENT_VERSION};
use crate::fade::{ClipFades, FadeSpec};
use crate::gain::GainEnvelope;
use crate::graph::{MixGraph, SessionNote, SessionOp, SessionProcessor};
use crate::meter::PeakMeter;
use crate::plugin::{self, Placement, Processor};
use crate::track::{AudioTrack, BusTrack, Route, Track, TrackKind};
use crate::transport::TransportState;
use crate::{ClipId, Error, Result, TrackId};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_core::event::ROOT;
use strata_core::{
    AtomicFlag, ChannelStats, ControlPort, EventChannel, FramePosition, Handle, Notification,
    NotificationHub, NotifyThread,
};
use strata_stream::{CodecReader, CodecWriter, DiskStreamer, SourceReader, StreamId, StreamWaker, SyncState};
use tracing::{debug, info, trace, warn};

static SESSION_IDS: AtomicU64 = AtomicU64::new(1);

/// Control-side record of a clip.
#[derive(Debug, Clone)]
pub struct ClipView {
    pub id: ClipId,
    pub spec: ClipSpec,
    pub source: StreamId,
}

/// Control-side record of a track or bus.
#[derive(Debug, Clone)]
pub struct TrackView {
    pub id: TrackId,
    pub name: String,
    pub kind: TrackKind,
    pub gain: GainEnvelope,
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
    pub route: Route,
    pub inputs: Vec<usize>,
    /// Sink being recorded into while armed.
    pub armed: Option<StreamId>,
    pub clips: Vec<ClipView>,
    pub pre_fader: Vec<String>,
    pub post_fader: Vec<String>,
    pub meter: Arc<PeakMeter>,
}

impl TrackView {
    pub fn clip(&self, id: ClipId) -> Option<&ClipView> {
        self.clips.iter().find(|c| c.id == id)
    }

    fn chain_mut(&mut self, placement: Placement) -> &mut Vec<String> {
        match placement {
            Placement::PreFader => &mut self.pre_fader,
            Placement::PostFader => &mut self.post_fader,
        }
    }
}

/// Control-side record of the master bus.
#[derive(Debug, Clone)]
pub struct MasterView {
    pub gain: GainEnvelope,
    pub pre_fader: Vec<String>,
    pub post_fader: Vec<String>,
    pub meter: Arc<PeakMeter>,
}

pub struct Session {
    id: u64,
    config: SessionConfig,
    sample_rate: u32,
    max_frames: usize,
    control: ControlPort<SessionOp, SessionNote>,
    tracks: Vec<TrackView>,
    master: MasterView,
    transport: Arc<TransportState>,
    next_id: u64,
    notify: NotifyThread,
    streamer: DiskStreamer,
}

impl Session {
    /// Create a session running at the device's `sample_rate` and largest
    /// block `max_frames`. Notifications are published to `hub`.
    pub fn new(
        config: SessionConfig,
        sample_rate: u32,
        max_frames: usize,
        hub: Arc<NotificationHub>,
    ) -> Result<(Self, SessionProcessor)> {
        config.validate()?;
        let id = SESSION_IDS.fetch_add(1, Ordering::Relaxed);

        let EventChannel {
            control,
            audio,
            notify,
        } = EventChannel::new(&config.events)?;

        let graph = MixGraph::new(&config, sample_rate, max_frames);
        let transport = graph.transport_state();
        let position_flag = graph.position_flag();
        let master = MasterView {
            gain: GainEnvelope::default(),
            pre_fader: Vec::new(),
            post_fader: Vec::new(),
            meter: Arc::clone(graph.master().meter()),
        };

        let mut streamer = DiskStreamer::new(config.stream.clone())?;
        streamer.start()?;

        let notify = notify.spawn_notify_thread(
            &format!("strata-session-{id}"),
            move |note| {
                handle_note(note, id, sample_rate, &hub, &position_flag);
                None
            },
            move |ticks| debug!(session = id, ticks, "session events waiting on a stopped device"),
        )?;

        info!(session = id, sample_rate, max_frames, "session created");
        let processor = SessionProcessor::new(format!("session-{id}"), audio, graph);
        Ok((
            Self {
                id,
                config,
                sample_rate,
                max_frames: max_frames.max(1),
                control,
                tracks: Vec::new(),
                master,
                transport,
                next_id: 1,
                notify,
                streamer,
            },
            processor,
        ))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn tracks(&self) -> &[TrackView] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&TrackView> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn master(&self) -> &MasterView {
        &self.master
    }

    /// Playhead as last published by the audio thread.
    pub fn position(&self) -> FramePosition {
        FramePosition::from_frames(self.transport.frame(), self.sample_rate)
    }

    pub fn is_rolling(&self) -> bool {
        self.transport.is_rolling()
    }

    pub fn streamer(&self) -> &DiskStreamer {
        &self.streamer
    }

    /// Handle that wakes the streaming worker; call once per cycle.
    pub fn waker(&self) -> StreamWaker {
        self.streamer.waker()
    }

    pub fn event_stats(&self) -> Arc<ChannelStats> {
        self.control.stats()
    }

    pub fn is_notify_running(&self) -> bool {
        self.notify.is_running()
    }

    pub fn add_track(&mut self, name: &str, kind: TrackKind) -> Result<TrackId> {
        let inputs = match kind {
            TrackKind::Audio => (0..self.config.channels).collect(),
            TrackKind::Bus => Vec::new(),
        };
        self.create_track(name, kind, inputs)
    }

    /// Audio track recording from the given capture channels.
    pub fn add_track_with_inputs(&mut self, name: &str, inputs: Vec<usize>) -> Result<TrackId> {
        self.create_track(name, TrackKind::Audio, inputs)
    }

    fn create_track(&mut self, name: &str, kind: TrackKind, inputs: Vec<usize>) -> Result<TrackId> {
        if self.tracks.len() >= self.config.max_tracks {
            return Err(Error::CapacityExhausted {
                what: "tracks",
                max: self.config.max_tracks,
            });
        }
        let id = TrackId(self.next_handle());
        let channels = self.config.channels;
        let track = match kind {
            TrackKind::Audio => Track::Audio(AudioTrack::new(
                id,
                channels,
                inputs.clone(),
                self.max_frames,
                self.config.max_clips_per_track,
            )),
            TrackKind::Bus => Track::Bus(BusTrack::new(id, channels, self.max_frames)),
        };
        let meter = Arc::clone(track.strip().meter());
        self.post(ROOT, SessionOp::AddTrack(Box::new(track)))?;

        debug!(session = self.id, track = id.0, name, ?kind, "track added");
        self.tracks.push(TrackView {
            id,
            name: name.to_string(),
            kind,
            gain: GainEnvelope::default(),
            pan: 0.0,
            mute: false,
            solo: false,
            route: Route::Master,
            inputs,
            armed: None,
            clips: Vec::new(),
            pre_fader: Vec::new(),
            post_fader: Vec::new(),
            meter,
        });
        Ok(id)
    }

    /// Remove a track. Tracks feeding a removed bus fall back to the master.
    pub fn remove_track(&mut self, id: TrackId) -> Result<()> {
        let index = self.index_of(id)?;
        self.post(id.0, SessionOp::RemoveTrack)?;
        self.tracks.remove(index);
        for track in self.tracks.iter_mut() {
            if track.route == Route::Bus(id) {
                track.route = Route::Master;
            }
        }
        debug!(session = self.id, track = id.0, "track removed");
        Ok(())
    }

    /// Place a clip of an audio file on a track.
    pub fn add_clip(&mut self, track: TrackId, spec: ClipSpec) -> Result<ClipId> {
        self.check_clip_slot(track, &spec)?;
        let reader = self.streamer.open_file(&spec.source)?;
        self.insert_clip(track, spec, reader)
    }

    /// Place a clip whose audio comes from `codec` instead of `spec.source`.
    pub fn add_clip_from(
        &mut self,
        track: TrackId,
        spec: ClipSpec,
        codec: Box<dyn CodecReader>,
    ) -> Result<ClipId> {
        self.check_clip_slot(track, &spec)?;
        let reader = self.streamer.open_source(codec)?;
        self.insert_clip(track, spec, reader)
    }

    fn check_clip_slot(&self, track: TrackId, spec: &ClipSpec) -> Result<()> {
        let view = self.audio_view(track)?;
        if view.clips.len() >= self.config.max_clips_per_track {
            return Err(Error::CapacityExhausted {
                what: "clips per track",
                max: self.config.max_clips_per_track,
            });
        }
        if spec.length.to_frames(self.sample_rate) == 0 {
            return Err(Error::ZeroLengthClip);
        }
        Ok(())
    }

    fn insert_clip(&mut self, track: TrackId, spec: ClipSpec, reader: SourceReader) -> Result<ClipId> {
        let id = ClipId(self.next_handle());
        let clip = Clip::new(id, &spec, self.sample_rate, reader, self.max_frames)?;
        let source = clip.source();
        self.post(track.0, SessionOp::AddClip(Box::new(clip)))?;

        debug!(session = self.id, track = track.0, clip = id.0, source = source.0, "clip added");
        let index = self.index_of(track)?;
        self.tracks[index].clips.push(ClipView { id, spec, source });
        Ok(id)
    }

    pub fn remove_clip(&mut self, track: TrackId, clip: ClipId) -> Result<()> {
        let index = self.clip_index(track, clip)?;
        self.post(track.0, SessionOp::RemoveClip(clip))?;
        let t = self.index_of(track)?;
        self.tracks[t].clips.remove(index);
        Ok(())
    }

    pub fn move_clip(&mut self, track: TrackId, clip: ClipId, start: FramePosition) -> Result<()> {
        let index = self.clip_index(track, clip)?;
        let frames = start.to_frames(self.sample_rate);
        self.post(track.0, SessionOp::MoveClip { clip, start: frames })?;
        let t = self.index_of(track)?;
        self.tracks[t].clips[index].spec.start = start;
        Ok(())
    }

    pub fn set_fades(
        &mut self,
        track: TrackId,
        clip: ClipId,
        fade_in: FadeSpec,
        fade_out: FadeSpec,
    ) -> Result<()> {
        let index = self.clip_index(track, clip)?;
        let fades = Box::new(ClipFades::from_specs(&fade_in, &fade_out, self.sample_rate));
        self.post(track.0, SessionOp::SetFades { clip, fades })?;
        let t = self.index_of(track)?;
        let spec = &mut self.tracks[t].clips[index].spec;
        spec.fade_in = fade_in;
        spec.fade_out = fade_out;
        Ok(())
    }

    pub fn set_gain(&mut self, track: TrackId, gain: GainEnvelope) -> Result<()> {
        let index = self.index_of(track)?;
        self.post(track.0, SessionOp::SetGain(Box::new(gain.clone())))?;
        self.tracks[index].gain = gain;
        Ok(())
    }

    pub fn set_master_gain(&mut self, gain: GainEnvelope) -> Result<()> {
        self.post(ROOT, SessionOp::SetGain(Box::new(gain.clone())))?;
        self.master.gain = gain;
        Ok(())
    }

    pub fn set_pan(&mut self, track: TrackId, pan: f32) -> Result<()> {
        let index = self.index_of(track)?;
        let pan = pan.clamp(-1.0, 1.0);
        self.post(track.0, SessionOp::SetPan(pan))?;
        self.tracks[index].pan = pan;
        Ok(())
    }

    pub fn set_mute(&mut self, track: TrackId, mute: bool) -> Result<()> {
        let index = self.index_of(track)?;
        self.post(track.0, SessionOp::SetMute(mute))?;
        self.tracks[index].mute = mute;
        Ok(())
    }

    pub fn set_solo(&mut self, track: TrackId, solo: bool) -> Result<()> {
        let index = self.index_of(track)?;
        self.post(track.0, SessionOp::SetSolo(solo))?;
        self.tracks[index].solo = solo;
        Ok(())
    }

    /// Send an audio track to a bus or the master.
    pub fn set_route(&mut self, track: TrackId, route: Route) -> Result<()> {
        let index = self.index_of(track)?;
        if self.tracks[index].kind == TrackKind::Bus {
            return Err(Error::InvalidRouting(format!(
                "bus {} can only feed the master",
                track.0
            )));
        }
        if let Route::Bus(bus) = route {
            match self.track(bus) {
                Some(view) if view.kind == TrackKind::Bus => {}
                _ => {
                    return Err(Error::InvalidRouting(format!(
                        "track {} is not a bus",
                        bus.0
                    )))
                }
            }
        }
        self.post(track.0, SessionOp::SetRoute(route))?;
        self.tracks[index].route = route;
        Ok(())
    }

    /// Arm a track to record its inputs into a new file while rolling.
    pub fn arm(&mut self, track: TrackId, path: impl AsRef<Path>) -> Result<StreamId> {
        let channels = self.audio_view(track)?.inputs.len();
        let sink = self.streamer.record_file(path, channels, self.sample_rate)?;
        self.install_sink(track, sink)
    }

    /// Arm a track to record into `codec`.
    pub fn arm_with(&mut self, track: TrackId, codec: Box<dyn CodecWriter>) -> Result<StreamId> {
        self.audio_view(track)?;
        let sink = self.streamer.create_sink(codec)?;
        self.install_sink(track, sink)
    }

    fn install_sink(&mut self, track: TrackId, sink: strata_stream::SinkWriter) -> Result<StreamId> {
        let stream = sink.id();
        self.post(track.0, SessionOp::Arm(Some(Box::new(sink))))?;
        let index = self.index_of(track)?;
        self.tracks[index].armed = Some(stream);
        info!(session = self.id, track = track.0, stream = stream.0, "track armed");
        Ok(stream)
    }

    /// Stop recording on a track. The file is finalized once the graph has
    /// let go of the sink.
    pub fn disarm(&mut self, track: TrackId) -> Result<()> {
        let index = self.index_of(track)?;
        if self.tracks[index].armed.is_none() {
            return Ok(());
        }
        self.post(track.0, SessionOp::Arm(None))?;
        self.tracks[index].armed = None;
        Ok(())
    }

    /// Arm into `path`, or disarm with `None`. Re-arming an armed track
    /// finalizes the previous take first.
    pub fn set_armed(
        &mut self,
        track: TrackId,
        path: Option<impl AsRef<Path>>,
    ) -> Result<Option<StreamId>> {
        match path {
            Some(path) => {
                self.disarm(track)?;
                self.arm(track, path).map(Some)
            }
            None => self.disarm(track).map(|_| None),
        }
    }

    /// Insert a processor on a track, or on the master when `track` is `None`.
    pub fn insert_processor(
        &mut self,
        track: Option<TrackId>,
        placement: Placement,
        index: usize,
        processor: Box<dyn Processor>,
    ) -> Result<()> {
        let name = processor.name().to_string();
        let target = self.processor_target(track)?;
        let chain = self.chain_names(track, placement)?;
        plugin::check_capacity(chain.len())?;
        let index = index.min(chain.len());
        self.post(
            target,
            SessionOp::InsertProcessor {
                placement,
                index,
                processor,
            },
        )?;
        self.chain_names(track, placement)?.insert(index, name);
        Ok(())
    }

    pub fn remove_processor(
        &mut self,
        track: Option<TrackId>,
        placement: Placement,
        index: usize,
    ) -> Result<()> {
        let target = self.processor_target(track)?;
        if index >= self.chain_names(track, placement)?.len() {
            return Err(Error::InvalidConfig(format!("no processor at {index}")));
        }
        self.post(target, SessionOp::RemoveProcessor { placement, index })?;
        self.chain_names(track, placement)?.remove(index);
        Ok(())
    }

    pub fn locate(&mut self, position: FramePosition) -> Result<()> {
        self.post(ROOT, SessionOp::Locate(position))
    }

    pub fn play(&mut self) -> Result<()> {
        self.post(ROOT, SessionOp::Play)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.post(ROOT, SessionOp::Stop)
    }

    /// Snapshot the arrangement for saving.
    pub fn document(&self) -> SessionDocument {
        let tracks = self
            .tracks
            .iter()
            .map(|t| TrackDocument {
                name: t.name.clone(),
                kind: t.kind,
                gain: t.gain.clone(),
                pan: t.pan,
                mute: t.mute,
                solo: t.solo,
                route_to: match t.route {
                    Route::Master => None,
                    Route::Bus(bus) => self.tracks.iter().position(|b| b.id == bus),
                },
                inputs: t.inputs.clone(),
                clips: t.clips.iter().map(|c| c.spec.clone()).collect(),
            })
            .collect();
        SessionDocument {
            version: DOCUMENT_VERSION,
            sample_rate: self.sample_rate,
            master_gain: self.master.gain.clone(),
            tracks,
        }
    }

    /// Replace the arrangement with `doc`, through the same paths as live
    /// edits. Returns the ids of the new tracks in document order.
    pub fn restore(&mut self, doc: &SessionDocument) -> Result<Vec<TrackId>> {
        doc.validate()?;
        let existing: Vec<TrackId> = self.tracks.iter().map(|t| t.id).collect();
        for id in existing {
            self.remove_track(id)?;
        }
        self.set_master_gain(doc.master_gain.clone())?;

        let mut created = Vec::with_capacity(doc.tracks.len());
        for t in &doc.tracks {
            let id = match (t.kind, t.inputs.is_empty()) {
                (TrackKind::Audio, false) => self.add_track_with_inputs(&t.name, t.inputs.clone())?,
                (kind, _) => self.add_track(&t.name, kind)?,
            };
            if t.gain != GainEnvelope::default() {
                self.set_gain(id, t.gain.clone())?;
            }
            if t.pan != 0.0 {
                self.set_pan(id, t.pan)?;
            }
            if t.mute {
                self.set_mute(id, true)?;
            }
            if t.solo {
                self.set_solo(id, true)?;
            }
            created.push(id);
        }

        for (t, &id) in doc.tracks.iter().zip(&created) {
            if let Some(bus) = t.route_to.and_then(|i| created.get(i)) {
                self.set_route(id, Route::Bus(*bus))?;
            }
            for clip in &t.clips {
                self.add_clip(id, clip.clone())?;
            }
        }
        info!(session = self.id, tracks = created.len(), "session restored");
        Ok(created)
    }

    fn post(&mut self, target: Handle, op: SessionOp) -> Result<()> {
        trace!(session = self.id, target, ?op, "post");
        self.control.post(target, op)?;
        Ok(())
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn index_of(&self, id: TrackId) -> Result<usize> {
        self.tracks
            .iter()
            .position(|t| t.id == id)
            .ok_or(Error::UnknownTrack(id.0))
    }

    fn audio_view(&self, id: TrackId) -> Result<&TrackView> {
        let view = &self.tracks[self.index_of(id)?];
        if view.kind != TrackKind::Audio {
            return Err(Error::NotAudioTrack(id.0));
        }
        Ok(view)
    }

    fn clip_index(&self, track: TrackId, clip: ClipId) -> Result<usize> {
        self.tracks[self.index_of(track)?]
            .clips
            .iter()
            .position(|c| c.id == clip)
            .ok_or(Error::UnknownClip(clip.0))
    }

    fn processor_target(&self, track: Option<TrackId>) -> Result<Handle> {
        match track {
            Some(id) => self.index_of(id).map(|_| id.0),
            None => Ok(ROOT),
        }
    }

    fn chain_names(&mut self, track: Option<TrackId>, placement: Placement) -> Result<&mut Vec<String>> {
        match track {
            Some(id) => {
                let index = self.index_of(id)?;
                Ok(self.tracks[index].chain_mut(placement))
            }
            None => Ok(match placement {
                Placement::PreFader => &mut self.master.pre_fader,
                Placement::PostFader => &mut self.master.post_fader,
            }),
        }
    }
}

/// Runs on the notify thread. Retired objects are dropped here.
fn handle_note(
    note: SessionNote,
    session: u64,
    sample_rate: u32,
    hub: &NotificationHub,
    position_flag: &AtomicFlag,
) {
    match note {
        SessionNote::Retired(item) => trace!(session, ?item, "retired"),
        SessionNote::Rejected {
            target,
            reason,
            retired,
        } => warn!(session, target, reason, ?retired, "op rejected by the audio thread"),
        SessionNote::Position { position } => {
            position_flag.set(false);
            hub.publish(Notification::TransportPositionChanged { session, position });
        }
        SessionNote::SourceFault(fault) => {
            fault.ack.set(false);
            let source = fault.source.0;
            match fault.fault.state {
                SyncState::OutOfSync => {
                    warn!(session, track = fault.track.0, clip = fault.clip.0, source, "source out of sync");
                    hub.publish(Notification::SourceOutOfSync {
                        source,
                        position: FramePosition::from_frames(fault.fault.resync_at, sample_rate),
                    });
                }
                _ => {
                    warn!(session, track = fault.track.0, clip = fault.clip.0, source, "source underrun");
                    hub.publish(Notification::BufferUnderrun { source });
                }
            }
        }
    }
}
