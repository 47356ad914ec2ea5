//! Fixed-capacity sample history
//!
//! The buffer keeps the most recent `N` samples and silently overwrites the
//! oldest once full. Iteration is always oldest to newest, which is the order
//! every windowed analysis expects.

use heapless::{HistoryBuf, Vec};

use super::SensorSample;

/// Default number of samples retained (10 s of history at 100 ms acquisition).
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

pub struct SampleBuffer<const N: usize = DEFAULT_BUFFER_CAPACITY> {
    ring: HistoryBuf<SensorSample, N>,
}

impl<const N: usize> SampleBuffer<N> {
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
        }
    }

    /// Append a sample, evicting the oldest when full.
    pub fn push(&mut self, sample: SensorSample) {
        self.ring.write(sample);
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn latest(&self) -> Option<&SensorSample> {
        self.ring.recent()
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }

    /// Iterate from the oldest retained sample to the newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &SensorSample> + '_ {
        self.ring.oldest_ordered()
    }

    /// Copy the whole history, oldest first, into a contiguous vector.
    pub fn snapshot(&self) -> Vec<SensorSample, N> {
        let mut out = Vec::new();
        for sample in self.iter() {
            // Capacities match, push cannot fail
            let _ = out.push(*sample);
        }
        out
    }

    /// Copy the newest `count` samples (fewer if not yet available), oldest first.
    pub fn recent(&self, count: usize) -> Vec<SensorSample, N> {
        let skip = self.len().saturating_sub(count);
        let mut out = Vec::new();
        for sample in self.iter().skip(skip) {
            let _ = out.push(*sample);
        }
        out
    }
}

impl<const N: usize> Default for SampleBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
