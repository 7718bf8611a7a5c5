//! Core data types shared by every pipeline stage.
use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;
use std::sync::Arc;

/// Nanoseconds to seconds conversion factor for producer timestamps.
pub const NANOS_TO_SECONDS: f64 = 1e-9;

/// A single frame captured from the sensor.
///
/// The frame is held behind an `Arc` so that fan-out hands every consumer the same
/// immutable image without copying it. Nothing in the pipeline mutates a frame once
/// it has been wrapped in a `Sample`.
#[derive(Clone, Debug)]
pub struct Sample {
    /// Producer-assigned monotonic timestamp in nanoseconds.
    pub timestamp: i64,
    /// Intensity image.
    pub frame: Arc<Array2<f64>>,
}

impl Sample {
    /// Wrap a freshly acquired frame.
    pub fn new(timestamp: i64, frame: Array2<f64>) -> Self {
        Self {
            timestamp,
            frame: Arc::new(frame),
        }
    }

    /// A frame filled with a single value, mostly useful in tests and benches.
    pub fn filled(timestamp: i64, shape: (usize, usize), value: f64) -> Self {
        Self::new(timestamp, Array2::from_elem(shape, value))
    }

    /// `(height, width)` of the frame.
    pub fn shape(&self) -> (usize, usize) {
        self.frame.dim()
    }

    /// Timestamp converted to seconds.
    pub fn seconds(&self) -> f64 {
        self.timestamp as f64 * NANOS_TO_SECONDS
    }
}

/// Borrowed view of one ring buffer slot.
#[derive(Clone, Debug)]
pub struct SampleView<'a> {
    /// Producer-assigned timestamp in nanoseconds.
    pub timestamp: i64,
    /// Borrowed frame data.
    pub frame: ArrayView2<'a, f64>,
}

/// Payload of a reduced output.
#[derive(Clone, Debug, PartialEq)]
pub enum ReducedFrame {
    /// Real-valued image (statistics, magnitude or phase).
    Real(Array2<f64>),
    /// Raw complex demodulated envelope.
    Complex(Array2<Complex64>),
}

impl ReducedFrame {
    /// `(height, width)` of the payload.
    pub fn shape(&self) -> (usize, usize) {
        match self {
            ReducedFrame::Real(frame) => frame.dim(),
            ReducedFrame::Complex(frame) => frame.dim(),
        }
    }

    /// The real image, if this payload is real-valued.
    pub fn as_real(&self) -> Option<&Array2<f64>> {
        match self {
            ReducedFrame::Real(frame) => Some(frame),
            ReducedFrame::Complex(_) => None,
        }
    }

    /// The complex image, if this payload is complex-valued.
    pub fn as_complex(&self) -> Option<&Array2<Complex64>> {
        match self {
            ReducedFrame::Real(_) => None,
            ReducedFrame::Complex(frame) => Some(frame),
        }
    }
}

/// A reduced product published by a processing worker.
#[derive(Clone, Debug)]
pub struct ReducedOutput {
    /// Timestamp of the latest sample that contributed to this output.
    pub timestamp: i64,
    /// Reduced image.
    pub frame: ReducedFrame,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_clone_shares_frame() {
        let sample = Sample::filled(42, (4, 3), 1.5);
        let copy = sample.clone();
        assert!(Arc::ptr_eq(&sample.frame, &copy.frame));
        assert_eq!(copy.shape(), (4, 3));
    }

    #[test]
    fn sample_seconds_uses_nanoseconds() {
        let sample = Sample::filled(1_500_000_000, (1, 1), 0.0);
        assert!((sample.seconds() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn reduced_frame_accessors() {
        let real = ReducedFrame::Real(Array2::zeros((2, 2)));
        assert!(real.as_real().is_some());
        assert!(real.as_complex().is_none());

        let complex = ReducedFrame::Complex(Array2::zeros((2, 5)));
        assert_eq!(complex.shape(), (2, 5));
        assert!(complex.as_real().is_none());
    }
}
