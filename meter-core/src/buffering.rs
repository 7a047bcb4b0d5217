//! Bounded sample queue shared by the device reader and simulator.
//!
//! The teacher's `ringbuf`-backed SPSC queue only carries `f32`; the raw
//! sample here is a 5-tuple, so we roll a small drop-oldest queue instead.
//! Capacity and policy follow §4.A/4.B: bounded at ~1000 entries, oldest
//! dropped on overflow so the producer thread never blocks on a full queue.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// `(monotonic_timestamp, filtered_value, tone_arm, smoothed_raw, raw_adc)`
pub type RawSample = (f64, f64, f64, f64, f64);

pub const QUEUE_CAPACITY: usize = 1000;

/// Single-producer, multi-drain bounded queue with drop-oldest backpressure.
#[derive(Clone)]
pub struct SampleQueue {
    inner: Arc<Mutex<VecDeque<RawSample>>>,
    capacity: usize,
}

impl SampleQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Push a sample. If the queue is at capacity, the oldest entry is
    /// dropped to make room — the producer never blocks.
    pub fn push(&self, sample: RawSample) {
        let mut guard = self.inner.lock();
        if guard.len() >= self.capacity {
            guard.pop_front();
        }
        guard.push_back(sample);
    }

    /// Drain up to `max` samples in FIFO order.
    pub fn drain(&self, max: usize) -> Vec<RawSample> {
        let mut guard = self.inner.lock();
        let n = guard.len().min(max);
        guard.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::new(QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_fifo_order() {
        let q = SampleQueue::new(4);
        q.push((0.0, 0.1, 2.0, 0.1, 100.0));
        q.push((1.0, 0.2, 2.0, 0.2, 200.0));
        let drained = q.drain(10);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].0, 0.0);
        assert_eq!(drained[1].0, 1.0);
    }

    #[test]
    fn drops_oldest_on_overflow() {
        let q = SampleQueue::new(2);
        q.push((0.0, 0.0, 0.0, 0.0, 0.0));
        q.push((1.0, 0.0, 0.0, 0.0, 0.0));
        q.push((2.0, 0.0, 0.0, 0.0, 0.0));
        let drained = q.drain(10);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].0, 1.0);
        assert_eq!(drained[1].0, 2.0);
    }

    #[test]
    fn drain_respects_max() {
        let q = SampleQueue::new(10);
        for i in 0..5 {
            q.push((i as f64, 0.0, 0.0, 0.0, 0.0));
        }
        let drained = q.drain(3);
        assert_eq!(drained.len(), 3);
        assert_eq!(q.len(), 2);
    }
}
