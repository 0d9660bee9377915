//! Audio channels and buses.
//!
//! Buses are built when a driver is configured and dropped with that
//! configuration. Channel buffers hold exactly one cycle of frames.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Hardware,
    Software,
}

/// One mono channel and its per-cycle buffer.
#[derive(Debug, Clone)]
pub struct AudioChannel {
    name: String,
    buffer: Vec<f32>,
}

impl AudioChannel {
    pub fn new(name: impl Into<String>, frames: usize) -> Self {
        Self {
            name: name.into(),
            buffer: vec![0.0; frames],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn buffer(&self) -> &[f32] {
        &self.buffer
    }

    #[inline]
    pub fn buffer_mut(&mut self) -> &mut [f32] {
        &mut self.buffer
    }

    /// Add `src` into the buffer, sample by sample.
    #[inline]
    pub fn mix_in(&mut self, src: &[f32]) {
        for (dst, s) in self.buffer.iter_mut().zip(src) {
            *dst += *s;
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// Ordered set of channels with a direction and a kind.
#[derive(Debug, Clone)]
pub struct AudioBus {
    name: String,
    direction: BusDirection,
    kind: BusKind,
    channels: Vec<AudioChannel>,
}

impl AudioBus {
    pub fn new(
        name: impl Into<String>,
        direction: BusDirection,
        kind: BusKind,
        channel_names: &[String],
        frames: usize,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            kind,
            channels: channel_names
                .iter()
                .map(|n| AudioChannel::new(n.clone(), frames))
                .collect(),
        }
    }

    /// Software bus with numbered channels.
    pub fn software(
        name: impl Into<String>,
        direction: BusDirection,
        channels: usize,
        frames: usize,
    ) -> Self {
        let name = name.into();
        let names: Vec<String> = (1..=channels).map(|i| format!("{name} {i}")).collect();
        Self::new(name, direction, BusKind::Software, &names, frames)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> BusDirection {
        self.direction
    }

    pub fn kind(&self) -> BusKind {
        self.kind
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Frames per channel buffer.
    #[inline]
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, |c| c.buffer.len())
    }

    #[inline]
    pub fn channel(&self, index: usize) -> Option<&AudioChannel> {
        self.channels.get(index)
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> Option<&mut AudioChannel> {
        self.channels.get_mut(index)
    }

    pub fn channels(&self) -> &[AudioChannel] {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut [AudioChannel] {
        &mut self.channels
    }

    pub fn clear(&mut self) {
        self.channels.iter_mut().for_each(AudioChannel::clear);
    }
}

/// The hardware capture and playback buses of one driver configuration.
#[derive(Debug, Clone)]
pub struct BusSet {
    pub capture: AudioBus,
    pub playback: AudioBus,
}

impl BusSet {
    pub fn new(capture: &[String], playback: &[String], frames: usize) -> Self {
        Self {
            capture: AudioBus::new(
                "capture",
                BusDirection::Input,
                BusKind::Hardware,
                capture,
                frames,
            ),
            playback: AudioBus::new(
                "playback",
                BusDirection::Output,
                BusKind::Hardware,
                playback,
                frames,
            ),
        }
    }

    /// Largest cycle the buffers can hold.
    pub fn max_frames(&self) -> usize {
        self.playback.frames()
    }
}
