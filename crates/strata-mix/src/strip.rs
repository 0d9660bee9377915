//! The per-track signal chain: pre-fader inserts, pan, gain, post-fader
//! inserts and metering.

use crate::gain::GainEnvelope;
use crate::meter::PeakMeter;
use crate::pan::apply_pan;
use crate::plugin::{Placement, PluginChain, Processor};
use std::sync::Arc;

/// Buffers and processing state shared by tracks, buses and the master.
pub struct Strip {
    gain: Box<GainEnvelope>,
    pan: f32,
    mute: bool,
    solo: bool,
    pre: PluginChain,
    post: PluginChain,
    meter: Arc<PeakMeter>,
    buffers: Vec<Vec<f32>>,
    gains: Vec<f32>,
}

impl Strip {
    pub fn new(channels: usize, max_frames: usize) -> Self {
        Self {
            gain: Box::default(),
            pan: 0.0,
            mute: false,
            solo: false,
            pre: PluginChain::new(),
            post: PluginChain::new(),
            meter: Arc::new(PeakMeter::new(channels)),
            buffers: vec![vec![0.0; max_frames]; channels],
            gains: vec![0.0; max_frames],
        }
    }

    pub fn channels(&self) -> usize {
        self.buffers.len()
    }

    pub fn max_frames(&self) -> usize {
        self.gains.len()
    }

    pub fn buffers(&self) -> &[Vec<f32>] {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.buffers
    }

    pub fn meter(&self) -> &Arc<PeakMeter> {
        &self.meter
    }

    pub fn gain(&self) -> &GainEnvelope {
        &self.gain
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn is_muted(&self) -> bool {
        self.mute
    }

    pub fn is_soloed(&self) -> bool {
        self.solo
    }

    /// Swap in a new gain, returning the old one.
    pub fn replace_gain(&mut self, gain: Box<GainEnvelope>) -> Box<GainEnvelope> {
        std::mem::replace(&mut self.gain, gain)
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(-1.0, 1.0);
    }

    pub fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
    }

    pub fn set_solo(&mut self, solo: bool) {
        self.solo = solo;
    }

    pub fn chain_mut(&mut self, placement: Placement) -> &mut PluginChain {
        match placement {
            Placement::PreFader => &mut self.pre,
            Placement::PostFader => &mut self.post,
        }
    }

    pub fn insert_processor(
        &mut self,
        placement: Placement,
        index: usize,
        processor: Box<dyn Processor>,
    ) -> Result<(), Box<dyn Processor>> {
        self.chain_mut(placement).insert(index, processor)
    }

    pub fn remove_processor(&mut self, placement: Placement, index: usize) -> Option<Box<dyn Processor>> {
        self.chain_mut(placement).remove(index)
    }

    pub fn reset_processors(&mut self) {
        self.pre.reset();
        self.post.reset();
    }

    pub fn clear(&mut self, frames: usize) {
        for buf in self.buffers.iter_mut() {
            buf[..frames].fill(0.0);
        }
    }

    /// Add another strip's output into this one's buffers.
    pub fn mix_from(&mut self, other: &Strip, frames: usize) {
        let sources = other.buffers.len();
        for (ch, dst) in self.buffers.iter_mut().enumerate() {
            let src = if sources == 1 { 0 } else { ch };
            if let Some(src) = other.buffers.get(src) {
                for (d, s) in dst[..frames].iter_mut().zip(&src[..frames]) {
                    *d += s;
                }
            }
        }
    }

    /// Run the chain over the first `frames` samples. `start` is the
    /// timeline frame of sample 0, used by gain automation.
    pub fn run(&mut self, start: u64, frames: usize) {
        self.pre.process(&mut self.buffers, frames);

        if let [left, right] = &mut self.buffers[..] {
            apply_pan(self.pan, &mut left[..frames], &mut right[..frames]);
        }

        self.gain
            .apply(start, &mut self.buffers, frames, &mut self.gains);

        self.post.process(&mut self.buffers, frames);

        for (ch, buf) in self.buffers.iter().enumerate() {
            self.meter.update(ch, &buf[..frames]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gain::AutomationPoint;

    struct Invert;

    impl Processor for Invert {
        fn name(&self) -> &str {
            "invert"
        }

        fn process(&mut self, buffers: &mut [Vec<f32>], frames: usize) {
            for buf in buffers.iter_mut() {
                buf[..frames].iter_mut().for_each(|s| *s = -*s);
            }
        }
    }

    fn filled(strip: &mut Strip, value: f32) {
        for buf in strip.buffers_mut() {
            buf.fill(value);
        }
    }

    #[test]
    fn test_pan_then_gain() {
        let mut strip = Strip::new(2, 4);
        strip.set_pan(0.5);
        strip.replace_gain(Box::new(GainEnvelope::Constant(0.5)));
        filled(&mut strip, 1.0);
        strip.run(0, 4);
        assert_eq!(strip.buffers()[0], vec![0.25; 4]);
        assert_eq!(strip.buffers()[1], vec![0.5; 4]);
        assert_eq!(strip.meter().take_peaks(), vec![0.25, 0.5]);
    }

    #[test]
    fn test_post_fader_sees_gained_signal() {
        let mut strip = Strip::new(1, 2);
        strip.replace_gain(Box::new(GainEnvelope::automation(vec![
            AutomationPoint::new(0, 0.0),
            AutomationPoint::new(2, 1.0),
        ])));
        assert!(strip
            .insert_processor(Placement::PostFader, 0, Box::new(Invert))
            .is_ok());
        filled(&mut strip, 1.0);
        strip.run(0, 2);
        assert_eq!(strip.buffers()[0], vec![0.0, -0.5]);
    }

    #[test]
    fn test_mix_from_mono_feeds_both() {
        let mut bus = Strip::new(2, 4);
        let mut mono = Strip::new(1, 4);
        filled(&mut mono, 0.25);
        bus.mix_from(&mono, 3);
        bus.mix_from(&mono, 3);
        assert_eq!(bus.buffers()[1], vec![0.5, 0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_only_first_frames_touched() {
        let mut strip = Strip::new(1, 8);
        filled(&mut strip, 1.0);
        strip.clear(4);
        assert_eq!(strip.buffers()[0], vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);
    }
}
