//! Manually clocked driver for tests and faster-than-realtime rendering.
//!
//! The [`OfflineDriver`] goes into the device; the paired [`OfflineClock`]
//! stays with the caller, runs cycles on demand, feeds capture samples and
//! collects playback samples. Channel data moves through per-channel ring
//! buffers the same way hardware drivers move it.

use super::bus::AudioBus;
use super::driver::{channel_names, Driver, DriverInfo, DriverIo};
use super::processor::CycleProcessor;
use crate::config::DeviceConfig;
use crate::ring_buffer::{RingBuffer, RingConsumer, RingProducer};
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;

const DEFAULT_RING_FRAMES: usize = 1 << 16;

/// The audio-thread side of the ring buffers.
struct OfflineIo {
    capture: Vec<RingConsumer<f32>>,
    playback: Vec<RingProducer<f32>>,
}

impl DriverIo for OfflineIo {
    fn read(&mut self, frames: usize, capture: &mut AudioBus) {
        for (ring, channel) in self.capture.iter_mut().zip(capture.channels_mut()) {
            let buf = channel.buffer_mut();
            let n = frames.min(buf.len());
            ring.read(&mut buf[..n]);
        }
    }

    fn write(&mut self, frames: usize, playback: &AudioBus) {
        for (ring, channel) in self.playback.iter_mut().zip(playback.channels()) {
            let buf = channel.buffer();
            ring.write(&buf[..frames.min(buf.len())]);
        }
    }
}

#[derive(Default)]
struct OfflineState {
    processor: Option<CycleProcessor>,
    io: Option<OfflineIo>,
    capture_in: Vec<RingProducer<f32>>,
    playback_out: Vec<RingConsumer<f32>>,
    frames: usize,
    xrun_pending: bool,
}

pub struct OfflineDriver {
    info: Option<DriverInfo>,
    channels: Option<(usize, usize)>,
    ring_frames: usize,
    state: Arc<Mutex<OfflineState>>,
}

impl OfflineDriver {
    pub const NAME: &'static str = "offline";

    /// Driver honouring the device config, and its clock.
    pub fn new() -> (Self, OfflineClock) {
        let state = Arc::new(Mutex::new(OfflineState::default()));
        (
            Self {
                info: None,
                channels: None,
                ring_frames: DEFAULT_RING_FRAMES,
                state: Arc::clone(&state),
            },
            OfflineClock { state },
        )
    }

    /// Driver that negotiates its own channel counts.
    pub fn with_channels(inputs: usize, outputs: usize) -> (Self, OfflineClock) {
        let (mut driver, clock) = Self::new();
        driver.channels = Some((inputs, outputs));
        (driver, clock)
    }

    /// Frames each channel ring holds before data is dropped.
    pub fn ring_frames(mut self, frames: usize) -> Self {
        self.ring_frames = frames.max(1);
        self
    }
}

impl Driver for OfflineDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&mut self, config: &DeviceConfig) -> Result<DriverInfo> {
        let mut info = DriverInfo::from_config(Self::NAME, "Offline render driver", config);
        if let Some((inputs, outputs)) = self.channels {
            info.capture_channels = channel_names("capture", inputs);
            info.playback_channels = channel_names("playback", outputs);
        }

        let mut capture_in = Vec::new();
        let mut capture_out = Vec::new();
        for _ in 0..info.capture_channels.len() {
            let (p, c) = RingBuffer::new(self.ring_frames).split();
            capture_in.push(p);
            capture_out.push(c);
        }
        let mut playback_in = Vec::new();
        let mut playback_out = Vec::new();
        for _ in 0..info.playback_channels.len() {
            let (p, c) = RingBuffer::new(self.ring_frames).split();
            playback_in.push(p);
            playback_out.push(c);
        }

        let mut state = self.state.lock();
        state.io = Some(OfflineIo {
            capture: capture_out,
            playback: playback_in,
        });
        state.capture_in = capture_in;
        state.playback_out = playback_out;
        state.frames = info.buffer_size;

        self.info = Some(info.clone());
        Ok(info)
    }

    fn start(&mut self, processor: CycleProcessor) -> Result<()> {
        self.state.lock().processor = Some(processor);
        Ok(())
    }

    fn stop(&mut self) -> Option<CycleProcessor> {
        self.state.lock().processor.take()
    }

    fn is_running(&self) -> bool {
        self.state.lock().processor.is_some()
    }

    fn info(&self) -> Option<&DriverInfo> {
        self.info.as_ref()
    }
}

/// Caller-side handle that clocks an [`OfflineDriver`].
#[derive(Clone)]
pub struct OfflineClock {
    state: Arc<Mutex<OfflineState>>,
}

impl OfflineClock {
    /// Run one full-size cycle. Returns `false` when the driver is stopped.
    pub fn run_cycle(&self) -> bool {
        let frames = self.state.lock().frames;
        self.run_cycle_frames(frames)
    }

    /// Run one cycle of `frames` (capped at the buffer size).
    pub fn run_cycle_frames(&self, frames: usize) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let (Some(processor), Some(io)) = (state.processor.as_mut(), state.io.as_mut()) else {
            return false;
        };
        if std::mem::take(&mut state.xrun_pending) {
            processor.xrun_reporter().report();
        }
        processor.run_cycle(io, frames);
        true
    }

    /// Run up to `n` cycles, returning how many ran.
    pub fn run_cycles(&self, n: usize) -> usize {
        (0..n).take_while(|_| self.run_cycle()).count()
    }

    /// Queue capture samples for `channel`. Returns how many fit.
    pub fn push_capture(&self, channel: usize, samples: &[f32]) -> usize {
        self.state
            .lock()
            .capture_in
            .get_mut(channel)
            .map_or(0, |ring| ring.write(samples))
    }

    /// Everything played on `channel` since the last call.
    pub fn take_playback(&self, channel: usize) -> Vec<f32> {
        let mut state = self.state.lock();
        let Some(ring) = state.playback_out.get_mut(channel) else {
            return Vec::new();
        };
        let mut out = vec![0.0; ring.read_space()];
        let n = ring.read(&mut out);
        out.truncate(n);
        out
    }

    /// Mark the next cycle as an xrun.
    pub fn inject_xrun(&self) {
        self.state.lock().xrun_pending = true;
    }

    /// Clients in the processor while the driver runs.
    pub fn client_count(&self) -> Option<usize> {
        self.state
            .lock()
            .processor
            .as_ref()
            .map(CycleProcessor::client_count)
    }

    pub fn buffer_size(&self) -> usize {
        self.state.lock().frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{AudioDevice, Client, CycleContext};

    struct Passthrough;

    impl Client for Passthrough {
        fn name(&self) -> &str {
            "passthrough"
        }

        fn process(&mut self, cx: &mut CycleContext<'_>) {
            let frames = cx.frames;
            for ch in 0..cx.capture.len().min(cx.playback.len()) {
                let input: Vec<f32> = cx.input(ch).map(|s| s.to_vec()).unwrap_or_default();
                if let Some(out) = cx.output(ch) {
                    out[..frames].copy_from_slice(&input[..frames]);
                }
            }
        }
    }

    #[test]
    fn test_capture_to_playback() {
        let (driver, clock) = OfflineDriver::new();
        let config = DeviceConfig::default().with_buffer_size(4);
        let device = AudioDevice::new(Box::new(driver), config).unwrap();
        device.add_client(Box::new(Passthrough)).unwrap();
        device.start().unwrap();

        assert_eq!(clock.push_capture(0, &[0.1, 0.2, 0.3, 0.4]), 4);
        assert!(clock.run_cycle());
        assert_eq!(clock.take_playback(0), vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(clock.take_playback(1), vec![0.0; 4]);
    }

    #[test]
    fn test_stopped_clock_does_nothing() {
        let (driver, clock) = OfflineDriver::new();
        let device = AudioDevice::new(Box::new(driver), DeviceConfig::default()).unwrap();
        assert!(!clock.run_cycle());
        device.start().unwrap();
        assert_eq!(clock.run_cycles(3), 3);
        device.stop();
        assert_eq!(clock.run_cycles(3), 0);
    }

    #[test]
    fn test_short_cycle() {
        let (driver, clock) = OfflineDriver::new();
        let config = DeviceConfig::default().with_buffer_size(8);
        let device = AudioDevice::new(Box::new(driver), config).unwrap();
        device.start().unwrap();
        assert!(clock.run_cycle_frames(3));
        assert_eq!(clock.take_playback(0).len(), 3);
    }
}
