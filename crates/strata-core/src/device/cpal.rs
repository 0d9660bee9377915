//! Hardware driver through CPAL.

use super::bus::AudioBus;
use super::driver::{channel_names, Driver, DriverInfo, DriverIo};
use super::processor::{CycleProcessor, XrunReporter};
use crate::config::DeviceConfig;
use crate::ring_buffer::{RingBuffer, RingConsumer, RingProducer};
use crate::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Wrapper to hold a `cpal::Stream` in a `Send` context.
///
/// `cpal::Stream` is `!Send` due to platform internals. The handle is only
/// touched from the control side behind the device mutex and is dropped
/// there when the driver stops.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

// SAFETY: only accessed behind the device mutex, never concurrently.
unsafe impl Send for StreamHandle {}

/// Capture rings hold this many cycles before input is dropped.
const CAPTURE_CYCLES: usize = 8;

pub struct CpalDriver {
    device_index: Option<usize>,
    info: Option<DriverInfo>,
    stream_config: Option<(cpal::StreamConfig, cpal::SampleFormat)>,
    input_config: Option<cpal::StreamConfig>,
    slot: Arc<Mutex<Option<CycleProcessor>>>,
    output: Option<StreamHandle>,
    input: Option<StreamHandle>,
}

impl CpalDriver {
    pub const NAME: &'static str = "cpal";

    pub fn new(device_index: Option<usize>) -> Self {
        Self {
            device_index,
            info: None,
            stream_config: None,
            input_config: None,
            slot: Arc::new(Mutex::new(None)),
            output: None,
            input: None,
        }
    }

    /// List available output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        cpal::default_host()
            .output_devices()?
            .enumerate()
            .map(|(i, d)| Ok(format!("{i}: {}", d.name()?)))
            .collect()
    }

    fn start_streams(&mut self, reporter: XrunReporter) -> Result<()> {
        let (config, format) = self.stream_config.clone().ok_or(Error::DriverNotReady)?;
        let device = get_device(self.device_index)?;
        let info = self.info.as_ref().ok_or(Error::DriverNotReady)?;
        let capture_len = info.buffer_size * CAPTURE_CYCLES;

        let mut producers = Vec::new();
        let mut consumers = Vec::new();
        for _ in 0..info.capture_channels.len() {
            let (p, c) = RingBuffer::<f32>::new(capture_len).split();
            producers.push(p);
            consumers.push(c);
        }

        if let (Some(input_config), false) = (self.input_config.clone(), producers.is_empty()) {
            if let Some(input_device) = cpal::default_host().default_input_device() {
                let built =
                    build_input_stream(&input_device, &input_config, producers, reporter.clone());
                match built.and_then(|stream| {
                    stream.play()?;
                    Ok(stream)
                }) {
                    Ok(stream) => self.input = Some(StreamHandle(stream)),
                    // Capture stays silent; playback still runs.
                    Err(e) => warn!("cpal input stream unavailable: {e}"),
                }
            }
        }

        let slot = Arc::clone(&self.slot);
        let stream = match format {
            cpal::SampleFormat::F32 => {
                build_output_stream::<f32>(&device, &config, slot, consumers, reporter)?
            }
            cpal::SampleFormat::I16 => {
                build_output_stream::<i16>(&device, &config, slot, consumers, reporter)?
            }
            cpal::SampleFormat::U16 => {
                build_output_stream::<u16>(&device, &config, slot, consumers, reporter)?
            }
            format => {
                return Err(Error::InvalidConfig(format!(
                    "Unsupported sample format: {format:?}"
                )));
            }
        };
        stream.play()?;
        self.output = Some(StreamHandle(stream));
        Ok(())
    }
}

impl Driver for CpalDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&mut self, config: &DeviceConfig) -> Result<DriverInfo> {
        let device = get_device(config.device_index.or(self.device_index))?;
        self.device_index = config.device_index.or(self.device_index);
        let supported = device.default_output_config()?;
        let format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported.into();

        let name = device.name()?;
        let outputs = stream_config.channels as usize;
        let mut inputs = 0;
        self.input_config = None;
        if config.input_channels > 0 {
            if let Some(input) = cpal::default_host().default_input_device() {
                if let Ok(input_supported) = input.default_input_config() {
                    let mut input_config: cpal::StreamConfig = input_supported.into();
                    input_config.sample_rate = stream_config.sample_rate;
                    input_config.buffer_size = stream_config.buffer_size;
                    inputs = (input_config.channels as usize).min(config.input_channels);
                    self.input_config = Some(input_config);
                }
            }
        }

        let info = DriverInfo {
            name: name.clone(),
            long_name: format!("{} ({name})", cpal::default_host().id().name()),
            sample_rate: stream_config.sample_rate.0,
            bit_depth: (format.sample_size() * 8) as u16,
            buffer_size: config.buffer_size,
            capture_channels: channel_names("capture", inputs),
            playback_channels: channel_names("playback", outputs),
        };
        debug!(?info, "cpal driver negotiated");
        self.stream_config = Some((stream_config, format));
        self.info = Some(info.clone());
        Ok(info)
    }

    fn start(&mut self, processor: CycleProcessor) -> Result<()> {
        let reporter = processor.xrun_reporter();
        *self.slot.lock() = Some(processor);
        self.start_streams(reporter)
    }

    fn stop(&mut self) -> Option<CycleProcessor> {
        // Dropping the streams stops the callbacks.
        self.output = None;
        self.input = None;
        self.slot.lock().take()
    }

    fn is_running(&self) -> bool {
        self.output.is_some()
    }

    fn info(&self) -> Option<&DriverInfo> {
        self.info.as_ref()
    }

    fn detach(&mut self) {
        self.stream_config = None;
        self.input_config = None;
    }
}

fn get_device(index: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    match index {
        Some(i) => {
            let devices: Vec<_> = host.output_devices()?.collect();
            let count = devices.len();
            devices.into_iter().nth(i).ok_or_else(|| {
                Error::InvalidDevice(format!("Device index {i} out of range ({count} available)"))
            })
        }
        None => host
            .default_output_device()
            .ok_or_else(|| Error::InvalidDevice("No output device available".into())),
    }
}

/// Moves samples between the capture rings, the device buses and an
/// interleaved output scratch buffer.
struct CpalIo<'a> {
    capture: &'a mut [RingConsumer<f32>],
    out: &'a mut [f32],
    channels: usize,
    offset: usize,
}

impl DriverIo for CpalIo<'_> {
    fn read(&mut self, frames: usize, capture: &mut AudioBus) {
        for (ring, channel) in self.capture.iter_mut().zip(capture.channels_mut()) {
            let buf = channel.buffer_mut();
            let n = frames.min(buf.len());
            ring.read(&mut buf[..n]);
        }
    }

    fn write(&mut self, frames: usize, playback: &AudioBus) {
        for (ch, channel) in playback.channels().iter().enumerate().take(self.channels) {
            for (i, &s) in channel.buffer()[..frames].iter().enumerate() {
                self.out[(self.offset + i) * self.channels + ch] = s;
            }
        }
        self.offset += frames;
    }
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    slot: Arc<Mutex<Option<CycleProcessor>>>,
    mut capture: Vec<RingConsumer<f32>>,
    reporter: XrunReporter,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    // Grows on the first callback, then stable.
    let mut scratch = Vec::<f32>::new();
    let error_reporter = reporter.clone();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let frames = data.len() / channels;
                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                scratch[..data.len()].fill(0.0);

                match slot.try_lock() {
                    Some(mut guard) => {
                        if let Some(processor) = guard.as_mut() {
                            let chunk = processor.max_frames().max(1);
                            let mut io = CpalIo {
                                capture: &mut capture,
                                out: &mut scratch[..data.len()],
                                channels,
                                offset: 0,
                            };
                            let mut done = 0;
                            while done < frames {
                                let n = chunk.min(frames - done);
                                processor.run_cycle(&mut io, n);
                                done += n;
                            }
                        }
                    }
                    None => reporter.report(),
                }

                for (sample, value) in data.iter_mut().zip(scratch.iter()) {
                    *sample = T::from_sample(*value);
                }
            }));

            if result.is_err() {
                // Panic in callback - output silence
                for sample in data.iter_mut() {
                    *sample = T::from_sample(0.0);
                }
            }
        },
        move |_err| {
            // Cannot log from the callback; counted on the next cycle.
            error_reporter.report();
        },
        None,
    )?;

    Ok(stream)
}

fn build_input_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut rings: Vec<RingProducer<f32>>,
    reporter: XrunReporter,
) -> Result<cpal::Stream> {
    let channels = config.channels as usize;
    let mut scratch = Vec::<f32>::new();
    let error_reporter = reporter.clone();

    let stream = device.build_input_stream(
        config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let frames = data.len() / channels;
            if scratch.len() < frames {
                scratch.resize(frames, 0.0);
            }
            for (ch, ring) in rings.iter_mut().enumerate() {
                for (i, frame) in data.chunks_exact(channels).enumerate() {
                    scratch[i] = frame[ch];
                }
                if ring.write(&scratch[..frames]) < frames {
                    reporter.report();
                }
            }
        },
        move |_err| error_reporter.report(),
        None,
    )?;

    Ok(stream)
}
