//! Two-phase circular store of timestamped frames.
//!
//! A [`RingBuffer`] starts life in a growable *bootstrap* phase, collecting samples
//! until it holds `capacity` of them. The push that fills it triggers the one-time
//! *conversion event*: every buffered frame is copied, in arrival order, into a
//! single fixed arena and the bootstrap list is released. From then on each push
//! advances `tail` by one slot and overwrites that slot in place.
//!
//! # Memory Layout
//! ```text
//! Bootstrapping:  Vec<Sample>            (grows to capacity, then dropped)
//!
//! Ready:          frames:     [capacity × height × width] f64   (allocated once)
//!                 timestamps: [capacity] i64
//!                 tail ──▶ most recently written slot
//!                 (tail + 1) % capacity ──▶ oldest slot
//! ```
//!
//! The arena never grows or shrinks after conversion, so steady-state memory is
//! `capacity × height × width × 8` bytes regardless of stream length.

use crate::core::{Sample, SampleView};
use crate::error::{PipelineError, Result};
use ndarray::{Array3, ArrayView2, ArrayView3, Axis};

/// Lifecycle phase of a [`RingBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPhase {
    /// Collecting the initial window; no reads allowed.
    Bootstrapping,
    /// Fixed arena allocated; pushes overwrite the oldest slot.
    Ready,
}

enum Storage {
    Bootstrapping(Vec<Sample>),
    Ready {
        frames: Array3<f64>,
        timestamps: Vec<i64>,
    },
}

/// Fixed-capacity circular store of `(timestamp, frame)` pairs.
pub struct RingBuffer {
    capacity: usize,
    tail: usize,
    shape: Option<(usize, usize)>,
    storage: Storage,
}

impl RingBuffer {
    /// Create an empty buffer that converts once it holds `capacity` samples.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "ring buffer capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            tail: capacity - 1,
            shape: None,
            storage: Storage::Bootstrapping(Vec::with_capacity(capacity)),
        })
    }

    /// Store a sample.
    ///
    /// Returns `Ok(true)` exactly once, on the push that triggers the conversion
    /// event. A frame whose shape differs from the first frame of the stream is
    /// rejected with [`PipelineError::ShapeMismatch`] and nothing is stored.
    pub fn push(&mut self, sample: &Sample) -> Result<bool> {
        let actual = sample.shape();
        match self.shape {
            Some(expected) if expected != actual => {
                return Err(PipelineError::ShapeMismatch { expected, actual });
            }
            Some(_) => {}
            None => self.shape = Some(actual),
        }

        match &mut self.storage {
            Storage::Bootstrapping(samples) => {
                samples.push(sample.clone());
                if samples.len() < self.capacity {
                    return Ok(false);
                }
                let ready = Self::convert(samples, actual);
                self.storage = ready;
                self.tail = self.capacity - 1;
                Ok(true)
            }
            Storage::Ready { frames, timestamps } => {
                self.tail = (self.tail + 1) % self.capacity;
                frames
                    .index_axis_mut(Axis(0), self.tail)
                    .assign(&*sample.frame);
                timestamps[self.tail] = sample.timestamp;
                Ok(false)
            }
        }
    }

    fn convert(samples: &[Sample], (height, width): (usize, usize)) -> Storage {
        let mut frames = Array3::<f64>::zeros((samples.len(), height, width));
        let mut timestamps = Vec::with_capacity(samples.len());
        for (mut slot, sample) in frames.axis_iter_mut(Axis(0)).zip(samples) {
            slot.assign(&*sample.frame);
            timestamps.push(sample.timestamp);
        }
        Storage::Ready { frames, timestamps }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> BufferPhase {
        match self.storage {
            Storage::Bootstrapping(_) => BufferPhase::Bootstrapping,
            Storage::Ready { .. } => BufferPhase::Ready,
        }
    }

    /// Whether the conversion event has happened.
    pub fn is_ready(&self) -> bool {
        self.phase() == BufferPhase::Ready
    }

    /// Number of stored samples (bootstrap count, or `capacity` once ready).
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Bootstrapping(samples) => samples.len(),
            Storage::Ready { .. } => self.capacity,
        }
    }

    /// Whether nothing has been pushed yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Window length.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Physical index of the most recently written slot.
    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Frame shape fixed by the first push, if any.
    pub fn frame_shape(&self) -> Option<(usize, usize)> {
        self.shape
    }

    /// Physical index of the slot written just before slot `index`.
    pub fn previous_index(&self, index: usize) -> usize {
        (index + self.capacity - 1) % self.capacity
    }

    fn underflow(&self) -> PipelineError {
        PipelineError::EmptyBuffer {
            len: self.len(),
            capacity: self.capacity,
        }
    }

    fn ready_parts(&self) -> Result<(&Array3<f64>, &[i64])> {
        match &self.storage {
            Storage::Ready { frames, timestamps } => Ok((frames, timestamps.as_slice())),
            Storage::Bootstrapping(_) => Err(self.underflow()),
        }
    }

    /// Timestamp stored in physical slot `index` (taken modulo capacity).
    pub fn timestamp_at(&self, index: usize) -> Result<i64> {
        let (_, timestamps) = self.ready_parts()?;
        Ok(timestamps[index % self.capacity])
    }

    /// Frame stored in physical slot `index` (taken modulo capacity).
    pub fn frame_at(&self, index: usize) -> Result<ArrayView2<'_, f64>> {
        let (frames, _) = self.ready_parts()?;
        Ok(frames.index_axis(Axis(0), index % self.capacity))
    }

    fn view_at(&self, index: usize) -> Result<SampleView<'_>> {
        Ok(SampleView {
            timestamp: self.timestamp_at(index)?,
            frame: self.frame_at(index)?,
        })
    }

    /// Most recently written sample.
    pub fn latest(&self) -> Result<SampleView<'_>> {
        self.view_at(self.tail)
    }

    /// Oldest sample still in the window (the next one to be overwritten).
    pub fn oldest(&self) -> Result<SampleView<'_>> {
        self.view_at(self.tail + 1)
    }

    /// All samples in logical order, oldest first.
    ///
    /// Independent of where `tail` physically sits. Meant for full-window reductions,
    /// not for the per-sample hot path.
    pub fn window(&self) -> Result<Vec<SampleView<'_>>> {
        self.ready_parts()?;
        (1..=self.capacity)
            .map(|offset| self.view_at(self.tail + offset))
            .collect()
    }

    /// The whole arena in physical slot order.
    ///
    /// Use for reductions that do not depend on sample order (mean, variance).
    pub fn frames(&self) -> Result<ArrayView3<'_, f64>> {
        let (frames, _) = self.ready_parts()?;
        Ok(frames.view())
    }

    /// Timestamps in physical slot order.
    pub fn timestamps(&self) -> Result<&[i64]> {
        let (_, timestamps) = self.ready_parts()?;
        Ok(timestamps)
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("phase", &self.phase())
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("tail", &self.tail)
            .field("shape", &self.shape)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: i64, value: f64) -> Sample {
        Sample::filled(ts, (2, 2), value)
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(
            RingBuffer::new(0),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_conversion_fires_on_nth_push_only() {
        for capacity in 1..8 {
            let mut rb = RingBuffer::new(capacity).unwrap();
            let mut conversions = Vec::new();
            for i in 0..(3 * capacity) {
                if rb.push(&sample(i as i64, 0.0)).unwrap() {
                    conversions.push(i);
                }
            }
            assert_eq!(conversions, vec![capacity - 1], "capacity {}", capacity);
            assert!(rb.is_ready());
        }
    }

    #[test]
    fn test_reads_before_conversion_underflow() {
        let mut rb = RingBuffer::new(3).unwrap();
        rb.push(&sample(0, 1.0)).unwrap();
        assert_eq!(rb.phase(), BufferPhase::Bootstrapping);
        assert_eq!(rb.len(), 1);
        assert!(matches!(
            rb.latest(),
            Err(PipelineError::EmptyBuffer { len: 1, capacity: 3 })
        ));
        assert!(rb.oldest().is_err());
        assert!(rb.window().is_err());
        assert!(rb.frames().is_err());
    }

    #[test]
    fn test_conversion_preserves_arrival_order() {
        let mut rb = RingBuffer::new(3).unwrap();
        for i in 0..3 {
            rb.push(&sample(i * 10, i as f64)).unwrap();
        }
        assert_eq!(rb.tail(), 2);
        assert_eq!(rb.timestamps().unwrap(), &[0, 10, 20]);
        let latest = rb.latest().unwrap();
        assert_eq!(latest.timestamp, 20);
        assert_eq!(latest.frame[[0, 0]], 2.0);
        assert_eq!(rb.oldest().unwrap().timestamp, 0);
    }

    #[test]
    fn test_tail_advances_one_slot_per_push() {
        let capacity = 4;
        let mut rb = RingBuffer::new(capacity).unwrap();
        for i in 0..capacity {
            rb.push(&sample(i as i64, 0.0)).unwrap();
        }
        let arena = rb.frames().unwrap().as_ptr();
        let mut expected = capacity - 1;
        for i in 0..25 {
            rb.push(&sample(100 + i, 0.0)).unwrap();
            expected = (expected + 1) % capacity;
            assert_eq!(rb.tail(), expected);
            assert!(rb.tail() < capacity);
            assert_eq!(rb.len(), capacity);
        }
        // Overwrites happen in place
        assert_eq!(rb.frames().unwrap().as_ptr(), arena);
    }

    #[test]
    fn test_window_is_logically_ordered() {
        let mut rb = RingBuffer::new(3).unwrap();
        for i in 0..5 {
            rb.push(&sample(i, i as f64)).unwrap();
        }
        // Physical slots: [3, 4, 2], tail = 1
        assert_eq!(rb.tail(), 1);
        let order: Vec<i64> = rb.window().unwrap().iter().map(|s| s.timestamp).collect();
        assert_eq!(order, vec![2, 3, 4]);
        assert_eq!(rb.oldest().unwrap().timestamp, 2);
        assert_eq!(rb.latest().unwrap().timestamp, 4);
    }

    #[test]
    fn test_previous_index_wraps() {
        let rb = RingBuffer::new(5).unwrap();
        assert_eq!(rb.previous_index(0), 4);
        assert_eq!(rb.previous_index(3), 2);
    }

    #[test]
    fn test_shape_mismatch_leaves_buffer_untouched() {
        let mut rb = RingBuffer::new(2).unwrap();
        rb.push(&sample(0, 1.0)).unwrap();
        let err = rb.push(&Sample::filled(1, (3, 2), 1.0)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ShapeMismatch {
                expected: (2, 2),
                actual: (3, 2)
            }
        ));
        assert_eq!(rb.len(), 1);
        assert!(rb.push(&sample(2, 1.0)).unwrap());
    }

    #[test]
    fn test_capacity_one_overwrites_same_slot() {
        let mut rb = RingBuffer::new(1).unwrap();
        assert!(rb.push(&sample(0, 1.0)).unwrap());
        assert!(!rb.push(&sample(1, 2.0)).unwrap());
        assert_eq!(rb.tail(), 0);
        assert_eq!(rb.previous_index(0), 0);
        assert_eq!(rb.latest().unwrap().frame[[1, 1]], 2.0);
    }
}
