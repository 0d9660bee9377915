//! Insert processors on a track or the master bus.

use crate::{Error, Result};

/// Maximum processors in one chain. Slots are reserved up front so inserts
/// on the audio thread never grow the chain.
pub const MAX_PROCESSORS: usize = 16;

/// An insert effect run in place on a strip's buffers.
pub trait Processor: Send {
    fn name(&self) -> &str;

    /// Process the first `frames` samples of each channel in place.
    fn process(&mut self, buffers: &mut [Vec<f32>], frames: usize);

    /// Clear internal state after a locate.
    fn reset(&mut self) {}
}

/// Where a processor sits relative to the fader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    PreFader,
    PostFader,
}

/// An ordered chain of processors.
pub struct PluginChain {
    slots: Vec<Box<dyn Processor>>,
}

impl PluginChain {
    pub fn new() -> Self {
        Self {
            slots: Vec::with_capacity(MAX_PROCESSORS),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Insert at `index` (clamped to the end). Hands the processor back when
    /// the chain is full.
    pub fn insert(
        &mut self,
        index: usize,
        processor: Box<dyn Processor>,
    ) -> std::result::Result<(), Box<dyn Processor>> {
        if self.slots.len() >= MAX_PROCESSORS {
            return Err(processor);
        }
        let index = index.min(self.slots.len());
        self.slots.insert(index, processor);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<Box<dyn Processor>> {
        (index < self.slots.len()).then(|| self.slots.remove(index))
    }

    pub fn process(&mut self, buffers: &mut [Vec<f32>], frames: usize) {
        for processor in self.slots.iter_mut() {
            processor.process(buffers, frames);
        }
    }

    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|p| p.reset());
    }

    pub fn names(&self) -> Vec<String> {
        self.slots.iter().map(|p| p.name().to_string()).collect()
    }
}

impl Default for PluginChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Check a control-side insert against the chain limit.
pub(crate) fn check_capacity(len: usize) -> Result<()> {
    if len >= MAX_PROCESSORS {
        return Err(Error::CapacityExhausted {
            what: "processors per chain",
            max: MAX_PROCESSORS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scale(f32);

    impl Processor for Scale {
        fn name(&self) -> &str {
            "scale"
        }

        fn process(&mut self, buffers: &mut [Vec<f32>], frames: usize) {
            for buf in buffers.iter_mut() {
                buf[..frames].iter_mut().for_each(|s| *s *= self.0);
            }
        }
    }

    struct Offset;

    impl Processor for Offset {
        fn name(&self) -> &str {
            "offset"
        }

        fn process(&mut self, buffers: &mut [Vec<f32>], frames: usize) {
            for buf in buffers.iter_mut() {
                buf[..frames].iter_mut().for_each(|s| *s += 1.0);
            }
        }
    }

    #[test]
    fn test_chain_runs_in_order() {
        let mut chain = PluginChain::new();
        chain.insert(0, Box::new(Scale(2.0))).ok().unwrap();
        chain.insert(1, Box::new(Offset)).ok().unwrap();
        let mut bufs = vec![vec![1.0; 2]];
        chain.process(&mut bufs, 2);
        assert_eq!(bufs[0], vec![3.0, 3.0]);
        assert_eq!(chain.names(), vec!["scale", "offset"]);
    }

    #[test]
    fn test_chain_limit() {
        let mut chain = PluginChain::new();
        for _ in 0..MAX_PROCESSORS {
            assert!(chain.insert(usize::MAX, Box::new(Offset)).is_ok());
        }
        assert!(chain.insert(0, Box::new(Offset)).is_err());
        assert!(check_capacity(chain.len()).is_err());
    }

    #[test]
    fn test_remove() {
        let mut chain = PluginChain::new();
        chain.insert(0, Box::new(Offset)).ok().unwrap();
        assert!(chain.remove(3).is_none());
        assert_eq!(chain.remove(0).map(|p| p.name().to_string()), Some("offset".into()));
        assert!(chain.is_empty());
    }
}
