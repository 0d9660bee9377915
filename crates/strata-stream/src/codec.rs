//! Codec capability consumed by the streaming engine.
//!
//! Readers deliver interleaved `f32` frames from any position; writers
//! accept interleaved blocks already converted to their sample format. WAV
//! files go through `hound`; the memory codecs back tests and rendered
//! material that never touches storage.

use crate::config::SampleFormat;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

/// Decoder side of a codec.
pub trait CodecReader: Send {
    fn channel_count(&self) -> usize;

    fn sample_rate(&self) -> u32;

    /// Length in frames.
    fn length(&self) -> u64;

    /// Move the read cursor to `frame`, clamped to the length.
    fn seek(&mut self, frame: u64) -> Result<()>;

    /// Read up to `count` interleaved frames starting at `position` into
    /// `buffer`. Returns the frames read; fewer than `count` means end of
    /// file.
    fn read_frames(&mut self, buffer: &mut [f32], position: u64, count: usize) -> Result<usize>;
}

/// An interleaved block handed to a [`CodecWriter`].
#[derive(Debug, Clone, Copy)]
pub enum SampleBlock<'a> {
    Float(&'a [f32]),
    /// Integer samples at the writer's bit depth.
    Int(&'a [i32]),
}

impl SampleBlock<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Float(s) => s.len(),
            Self::Int(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Encoder side of a codec.
pub trait CodecWriter: Send {
    fn channel_count(&self) -> usize;

    fn sample_rate(&self) -> u32;

    fn format(&self) -> SampleFormat;

    /// Write `count` interleaved frames from `block`. Returns frames written.
    fn write_frames(&mut self, block: SampleBlock<'_>, count: usize) -> Result<usize>;

    /// Flush headers and close. Further writes fail.
    fn finalize(&mut self) -> Result<()>;
}

/// Open a reader for `path`, chosen by extension.
pub fn open_reader(path: impl AsRef<Path>) -> Result<Box<dyn CodecReader>> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("wav" | "wave") => Ok(Box::new(WavFileReader::open(path)?)),
        other => Err(Error::UnsupportedFormat(format!(
            "no reader for {:?} ({})",
            other.unwrap_or(""),
            path.display()
        ))),
    }
}

/// Create a writer for `path`, chosen by extension.
pub fn create_writer(
    path: impl AsRef<Path>,
    channels: usize,
    sample_rate: u32,
    format: SampleFormat,
) -> Result<Box<dyn CodecWriter>> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("wav" | "wave") => Ok(Box::new(WavFileWriter::create(
            path,
            channels,
            sample_rate,
            format,
        )?)),
        other => Err(Error::UnsupportedFormat(format!(
            "no writer for {:?} ({})",
            other.unwrap_or(""),
            path.display()
        ))),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// WAV decoder. Integer files are scaled to [-1, 1).
pub struct WavFileReader {
    reader: hound::WavReader<BufReader<File>>,
    channels: usize,
    sample_rate: u32,
    length: u64,
    int_scale: Option<f32>,
    cursor: u64,
}

impl WavFileReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        if spec.channels == 0 {
            return Err(Error::ZeroChannels);
        }
        let int_scale = match spec.sample_format {
            hound::SampleFormat::Float if spec.bits_per_sample == 32 => None,
            hound::SampleFormat::Float => {
                return Err(Error::UnsupportedFormat(format!(
                    "{}-bit float WAV",
                    spec.bits_per_sample
                )))
            }
            hound::SampleFormat::Int => {
                Some(1.0 / (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32)
            }
        };
        Ok(Self {
            length: reader.duration() as u64,
            reader,
            channels: spec.channels as usize,
            sample_rate: spec.sample_rate,
            int_scale,
            cursor: 0,
        })
    }
}

impl CodecReader for WavFileReader {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        let frame = frame.min(self.length);
        self.reader.seek(frame as u32)?;
        self.cursor = frame;
        Ok(())
    }

    fn read_frames(&mut self, buffer: &mut [f32], position: u64, count: usize) -> Result<usize> {
        if position != self.cursor {
            self.seek(position)?;
        }
        let remaining = self.length.saturating_sub(self.cursor) as usize;
        let frames = count.min(remaining).min(buffer.len() / self.channels);
        let wanted = frames * self.channels;

        let mut got = 0;
        match self.int_scale {
            None => {
                for (dst, sample) in buffer[..wanted].iter_mut().zip(self.reader.samples::<f32>()) {
                    *dst = sample?;
                    got += 1;
                }
            }
            Some(scale) => {
                for (dst, sample) in buffer[..wanted].iter_mut().zip(self.reader.samples::<i32>()) {
                    *dst = sample? as f32 * scale;
                    got += 1;
                }
            }
        }

        let read = got / self.channels;
        self.cursor += read as u64;
        Ok(read)
    }
}

/// WAV encoder.
pub struct WavFileWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    channels: usize,
    sample_rate: u32,
    format: SampleFormat,
}

impl WavFileWriter {
    pub fn create(
        path: impl AsRef<Path>,
        channels: usize,
        sample_rate: u32,
        format: SampleFormat,
    ) -> Result<Self> {
        if channels == 0 {
            return Err(Error::ZeroChannels);
        }
        let spec = hound::WavSpec {
            channels: channels as u16,
            sample_rate,
            bits_per_sample: format.bits_per_sample(),
            sample_format: match format {
                SampleFormat::F32 => hound::SampleFormat::Float,
                SampleFormat::I16 | SampleFormat::I24 => hound::SampleFormat::Int,
            },
        };
        Ok(Self {
            writer: Some(hound::WavWriter::create(path, spec)?),
            channels,
            sample_rate,
            format,
        })
    }
}

impl CodecWriter for WavFileWriter {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn format(&self) -> SampleFormat {
        self.format
    }

    fn write_frames(&mut self, block: SampleBlock<'_>, count: usize) -> Result<usize> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| std::io::Error::other("WAV writer already finalized"))?;
        let frames = count.min(block.len() / self.channels);
        let samples = frames * self.channels;
        match (block, self.format) {
            (SampleBlock::Float(data), SampleFormat::F32) => {
                for &s in &data[..samples] {
                    writer.write_sample(s)?;
                }
            }
            (SampleBlock::Int(data), SampleFormat::I16 | SampleFormat::I24) => {
                for &s in &data[..samples] {
                    writer.write_sample(s)?;
                }
            }
            (_, format) => {
                return Err(Error::UnsupportedFormat(format!(
                    "block does not match writer format {format:?}"
                )))
            }
        }
        Ok(frames)
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(())
    }
}

/// Planar audio held in memory.
pub struct MemoryReader {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
    cursor: u64,
}

impl MemoryReader {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        let Some(first) = channels.first() else {
            return Err(Error::ZeroChannels);
        };
        let len = first.len();
        if channels.iter().any(|c| c.len() != len) {
            return Err(Error::UnsupportedFormat(
                "channels have different lengths".into(),
            ));
        }
        Ok(Self {
            channels,
            sample_rate,
            cursor: 0,
        })
    }

    pub fn from_interleaved(samples: &[f32], channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(Error::ZeroChannels);
        }
        let planar = (0..channels)
            .map(|ch| samples.iter().skip(ch).step_by(channels).copied().collect())
            .collect();
        Self::new(planar, sample_rate)
    }
}

impl CodecReader for MemoryReader {
    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn length(&self) -> u64 {
        self.channels[0].len() as u64
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        self.cursor = frame.min(self.length());
        Ok(())
    }

    fn read_frames(&mut self, buffer: &mut [f32], position: u64, count: usize) -> Result<usize> {
        let channels = self.channels.len();
        let start = position.min(self.length()) as usize;
        let frames = count
            .min(self.channels[0].len() - start)
            .min(buffer.len() / channels);
        for (ch, data) in self.channels.iter().enumerate() {
            for (i, &s) in data[start..start + frames].iter().enumerate() {
                buffer[i * channels + ch] = s;
            }
        }
        self.cursor = (start + frames) as u64;
        Ok(frames)
    }
}

/// What a [`MemoryWriter`] has received so far.
#[derive(Debug, Default, Clone)]
pub struct RecordedAudio {
    /// Interleaved samples, integer formats scaled back to [-1, 1).
    pub samples: Vec<f32>,
    pub finalized: bool,
}

/// Writer that keeps everything in memory behind a shared handle.
pub struct MemoryWriter {
    channels: usize,
    sample_rate: u32,
    format: SampleFormat,
    recorded: Arc<Mutex<RecordedAudio>>,
}

impl MemoryWriter {
    pub fn new(
        channels: usize,
        sample_rate: u32,
        format: SampleFormat,
    ) -> (Self, Arc<Mutex<RecordedAudio>>) {
        let recorded = Arc::new(Mutex::new(RecordedAudio::default()));
        (
            Self {
                channels: channels.max(1),
                sample_rate,
                format,
                recorded: Arc::clone(&recorded),
            },
            recorded,
        )
    }
}

impl CodecWriter for MemoryWriter {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn format(&self) -> SampleFormat {
        self.format
    }

    fn write_frames(&mut self, block: SampleBlock<'_>, count: usize) -> Result<usize> {
        let frames = count.min(block.len() / self.channels);
        let samples = frames * self.channels;
        let mut recorded = self.recorded.lock();
        match (block, self.format.full_scale()) {
            (SampleBlock::Float(data), None) => recorded.samples.extend_from_slice(&data[..samples]),
            (SampleBlock::Int(data), Some(full)) => {
                let scale = 1.0 / (full as f32 + 1.0);
                recorded
                    .samples
                    .extend(data[..samples].iter().map(|&s| s as f32 * scale));
            }
            _ => {
                return Err(Error::UnsupportedFormat(format!(
                    "block does not match writer format {:?}",
                    self.format
                )))
            }
        }
        Ok(frames)
    }

    fn finalize(&mut self) -> Result<()> {
        self.recorded.lock().finalized = true;
        Ok(())
    }
}
