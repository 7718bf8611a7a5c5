//! Carrier demodulation with an adaptive exponential filter.
//!
//! Each incoming frame is rotated into the demodulation frame by its own timestamp
//! phase and folded into a running complex envelope:
//!
//! ```text
//! demodulated[tail] = frame · exp(i·ω·t[tail])
//! w                 = discrete_bandwidth · (t[tail] − t[prev])
//! output            = (1 − w)·output + w·demodulated[tail]
//! ```
//!
//! Scaling the weight by the actual sample gap keeps the filter's time constant
//! (`1 / discrete_bandwidth` seconds) stable under jittery sampling. Timestamps are
//! nanoseconds and are converted to seconds, so `ω` is in rad/s and the bandwidth in
//! 1/s.
//!
//! On the conversion event the whole initial window is rotated and the filter is
//! replayed over it oldest-first, seeding `output` with the full window rather than
//! a single frame.
//!
//! Changing `ω` or the bandwidth at runtime only affects frames pushed afterwards.
//! Already rotated slots keep the phase they were computed with.

use super::{Cadence, Reducer, ReducerKind, DEFAULT_COMPUTE_PERIOD};
use crate::core::{ReducedFrame, ReducedOutput, NANOS_TO_SECONDS};
use crate::data::reconfig::{EmissionMode, ReconfigMessage, Tunable};
use crate::data::ring_buffer::RingBuffer;
use crate::error::{PipelineError, Result};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, ArrayViewMut2, Axis, Zip};
use num_complex::Complex64;
use tracing::{debug, info, trace, warn};

/// Out-of-range weights logged at `warn` once every this many occurrences.
const WEIGHT_WARN_EVERY: u64 = 1000;

#[derive(Debug, Clone)]
struct Envelope {
    demodulated: Array3<Complex64>,
    output: Array2<Complex64>,
}

/// Streaming lock-in style demodulator.
#[derive(Debug, Clone)]
pub struct DemodulationReducer {
    pulsation: f64,
    discrete_bandwidth: f64,
    emission: EmissionMode,
    cadence: Cadence,
    envelope: Option<Envelope>,
    weight_violations: u64,
}

impl DemodulationReducer {
    /// Demodulator for a carrier at `pulsation` rad/s, filtered with
    /// `discrete_bandwidth` 1/s.
    pub fn new(pulsation: f64, discrete_bandwidth: f64) -> Self {
        Self {
            pulsation,
            discrete_bandwidth,
            emission: EmissionMode::default(),
            cadence: Cadence::new(DEFAULT_COMPUTE_PERIOD),
            envelope: None,
            weight_violations: 0,
        }
    }

    /// Emit every `compute_period` pushes.
    pub fn with_compute_period(mut self, compute_period: usize) -> Self {
        self.cadence = Cadence::new(compute_period);
        self
    }

    /// Choose what is published on each slow tick.
    pub fn with_emission(mut self, emission: EmissionMode) -> Self {
        self.emission = emission;
        self
    }

    /// Carrier pulsation in rad/s.
    pub fn pulsation(&self) -> f64 {
        self.pulsation
    }

    /// Filter bandwidth in 1/s.
    pub fn discrete_bandwidth(&self) -> f64 {
        self.discrete_bandwidth
    }

    /// Current emission mode.
    pub fn emission(&self) -> EmissionMode {
        self.emission
    }

    /// Pushes between two emissions.
    pub fn compute_period(&self) -> usize {
        self.cadence.period()
    }

    /// Running complex envelope, once bootstrapped.
    pub fn output(&self) -> Option<&Array2<Complex64>> {
        self.envelope.as_ref().map(|e| &e.output)
    }

    /// Rotated frames, indexed like the ring buffer's physical slots.
    pub fn demodulated(&self) -> Option<ArrayView3<'_, Complex64>> {
        self.envelope.as_ref().map(|e| e.demodulated.view())
    }

    fn rotate(
        pulsation: f64,
        timestamp: i64,
        frame: ArrayView2<'_, f64>,
        slot: ArrayViewMut2<'_, Complex64>,
    ) {
        let phase = Complex64::from_polar(1.0, pulsation * timestamp as f64 * NANOS_TO_SECONDS);
        Zip::from(slot)
            .and(&frame)
            .for_each(|dst, &x| *dst = phase * x);
    }

    /// Filter weight for the gap ending at `index`, clamped into `[0, 1]`.
    fn weight(&mut self, buffer: &RingBuffer, index: usize) -> Result<f64> {
        let gap = buffer.timestamp_at(index)? - buffer.timestamp_at(buffer.previous_index(index))?;
        let w = self.discrete_bandwidth * gap as f64 * NANOS_TO_SECONDS;
        if (0.0..=1.0).contains(&w) {
            return Ok(w);
        }

        self.weight_violations += 1;
        if self.weight_violations == 1 || self.weight_violations % WEIGHT_WARN_EVERY == 0 {
            warn!(
                weight = w,
                gap_ns = gap,
                discrete_bandwidth = self.discrete_bandwidth,
                violations = self.weight_violations,
                "filter weight outside [0, 1]; bandwidth too large for the sample spacing"
            );
        } else {
            trace!(weight = w, gap_ns = gap, "filter weight clamped");
        }
        // NaN clamps to 0 and leaves the envelope untouched
        Ok(if w.is_nan() { 0.0 } else { w.clamp(0.0, 1.0) })
    }

    fn filter_step(&mut self, buffer: &RingBuffer, index: usize) -> Result<()> {
        let w = self.weight(buffer, index)?;
        let envelope = self.envelope.as_mut().ok_or_else(|| not_bootstrapped(buffer))?;
        let latest = envelope.demodulated.index_axis(Axis(0), index);
        Zip::from(&mut envelope.output)
            .and(&latest)
            .for_each(|out, &d| *out = *out * (1.0 - w) + d * w);
        Ok(())
    }

    fn payload(&self, output: &Array2<Complex64>) -> ReducedFrame {
        match self.emission {
            EmissionMode::Magnitude => ReducedFrame::Real(output.mapv(|c| c.norm())),
            EmissionMode::Phase => ReducedFrame::Real(output.mapv(|c| c.arg())),
            EmissionMode::Complex => ReducedFrame::Complex(output.clone()),
        }
    }
}

fn not_bootstrapped(buffer: &RingBuffer) -> PipelineError {
    PipelineError::EmptyBuffer {
        len: buffer.len(),
        capacity: buffer.capacity(),
    }
}

impl Reducer for DemodulationReducer {
    fn kind(&self) -> ReducerKind {
        ReducerKind::Demodulation
    }

    fn bootstrap(&mut self, buffer: &RingBuffer) -> Result<()> {
        let capacity = buffer.capacity();
        if capacity < 2 {
            return Err(PipelineError::InvalidConfig(
                "demodulation needs a buffer capacity of at least 2".to_string(),
            ));
        }
        let frames = buffer.frames()?;
        let timestamps = buffer.timestamps()?;
        let (_, height, width) = frames.dim();

        let mut demodulated = Array3::<Complex64>::zeros((capacity, height, width));
        for (index, slot) in demodulated.axis_iter_mut(Axis(0)).enumerate() {
            Self::rotate(
                self.pulsation,
                timestamps[index],
                frames.index_axis(Axis(0), index),
                slot,
            );
        }

        let oldest = (buffer.tail() + 1) % capacity;
        let output = demodulated.index_axis(Axis(0), oldest).to_owned();
        self.envelope = Some(Envelope {
            demodulated,
            output,
        });
        for offset in 1..capacity {
            self.filter_step(buffer, (oldest + offset) % capacity)?;
        }

        debug!(
            capacity,
            pulsation = self.pulsation,
            discrete_bandwidth = self.discrete_bandwidth,
            "demodulation envelope seeded"
        );
        Ok(())
    }

    fn fast_update(&mut self, buffer: &RingBuffer) -> Result<()> {
        let tail = buffer.tail();
        let latest = buffer.latest()?;
        let envelope = self.envelope.as_mut().ok_or_else(|| not_bootstrapped(buffer))?;
        Self::rotate(
            self.pulsation,
            latest.timestamp,
            latest.frame,
            envelope.demodulated.index_axis_mut(Axis(0), tail),
        );
        self.filter_step(buffer, tail)
    }

    fn maybe_emit(&mut self, buffer: &RingBuffer) -> Result<Option<ReducedOutput>> {
        if !self.cadence.tick() {
            return Ok(None);
        }
        let timestamp = buffer.latest()?.timestamp;
        let envelope = self.envelope.as_ref().ok_or_else(|| not_bootstrapped(buffer))?;
        Ok(Some(ReducedOutput {
            timestamp,
            frame: self.payload(&envelope.output),
        }))
    }

    fn apply(&mut self, message: &ReconfigMessage) -> Result<()> {
        message.validate_for(self.kind())?;
        for update in message.updates() {
            match *update {
                Tunable::Pulsation(value) => self.pulsation = value,
                Tunable::DiscreteBandwidth(value) => self.discrete_bandwidth = value,
                Tunable::ComputePeriod(period) => self.cadence.set_period(period),
                Tunable::Emission(mode) => self.emission = mode,
                // Rejected by validate_for above
                Tunable::Statistic(_) => {}
            }
            info!(reducer = "demodulation", %update, "parameter updated");
        }
        Ok(())
    }

    fn weight_violations(&self) -> u64 {
        self.weight_violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Sample;
    use crate::data::reducer::advance;
    use std::f64::consts::PI;
    use tracing_test::traced_test;

    const DT_NS: i64 = 10_000_000; // 10 ms

    fn cosine(ts: i64, omega: f64) -> Sample {
        let t = ts as f64 * NANOS_TO_SECONDS;
        Sample::filled(ts, (2, 2), (omega * t).cos())
    }

    fn run(reducer: &mut DemodulationReducer, buffer: &mut RingBuffer, sample: &Sample) {
        let converted = buffer.push(sample).unwrap();
        advance(reducer, buffer, converted).unwrap();
    }

    #[test]
    fn test_converges_at_carrier_pulsation() {
        let omega = 2.0 * PI;
        let mut reducer = DemodulationReducer::new(omega, 0.05);
        let mut buffer = RingBuffer::new(4).unwrap();
        for n in 0..40_000 {
            run(&mut reducer, &mut buffer, &cosine(n * DT_NS, omega));
        }
        // cos(ωt)·exp(iωt) = ½ + ½·exp(2iωt); the filter keeps the DC half
        for value in reducer.output().unwrap() {
            assert!((value.norm() - 0.5).abs() < 0.02, "|output| = {}", value.norm());
        }
        assert_eq!(reducer.weight_violations(), 0);
    }

    #[test]
    fn test_orthogonal_pulsation_decays() {
        let omega = 2.0 * PI;
        let mut reducer = DemodulationReducer::new(3.0 * omega, 0.05);
        let mut buffer = RingBuffer::new(4).unwrap();
        for n in 0..40_000 {
            run(&mut reducer, &mut buffer, &cosine(n * DT_NS, omega));
        }
        for value in reducer.output().unwrap() {
            assert!(value.norm() < 0.02, "|output| = {}", value.norm());
        }
    }

    #[test]
    fn test_bootstrap_replays_whole_window() {
        // Zero pulsation: demodulated == frame, filter is a plain EMA
        let mut reducer = DemodulationReducer::new(0.0, 50.0);
        let mut buffer = RingBuffer::new(3).unwrap();
        let values = [1.0, 2.0, 4.0];
        for (i, &v) in values.iter().enumerate() {
            run(
                &mut reducer,
                &mut buffer,
                &Sample::filled(i as i64 * DT_NS, (1, 1), v),
            );
        }
        // w = 50 · 0.01 = 0.5 for both replayed steps
        let expected = (1.0 * 0.5 + 2.0 * 0.5) * 0.5 + 4.0 * 0.5;
        let out = reducer.output().unwrap()[[0, 0]];
        assert!((out.re - expected).abs() < 1e-12);
        assert!(out.im.abs() < 1e-12);
    }

    #[test]
    fn test_emission_modes() {
        let mut reducer = DemodulationReducer::new(0.0, 10.0).with_emission(EmissionMode::Complex);
        let mut buffer = RingBuffer::new(2).unwrap();
        buffer.push(&Sample::filled(0, (2, 2), -3.0)).unwrap();
        let converted = buffer.push(&Sample::filled(DT_NS, (2, 2), -3.0)).unwrap();
        let out = advance(&mut reducer, &buffer, converted).unwrap().unwrap();
        assert_eq!(out.timestamp, DT_NS);
        assert!(out.frame.as_complex().is_some());

        reducer
            .apply(&Tunable::Emission(EmissionMode::Magnitude).into())
            .unwrap();
        let out = reducer.maybe_emit(&buffer).unwrap().unwrap();
        assert!(out.frame.as_real().unwrap().iter().all(|&m| (m - 3.0).abs() < 1e-12));

        reducer.apply(&Tunable::Emission(EmissionMode::Phase).into()).unwrap();
        let out = reducer.maybe_emit(&buffer).unwrap().unwrap();
        assert!(out.frame.as_real().unwrap().iter().all(|&p| (p.abs() - PI).abs() < 1e-12));
    }

    #[test]
    #[traced_test]
    fn test_out_of_range_weight_is_clamped_and_counted() {
        // 1000/s · 10 ms = 10, far outside [0, 1]
        let mut reducer = DemodulationReducer::new(0.0, 1000.0);
        let mut buffer = RingBuffer::new(2).unwrap();
        run(&mut reducer, &mut buffer, &Sample::filled(0, (1, 1), 1.0));
        run(&mut reducer, &mut buffer, &Sample::filled(DT_NS, (1, 1), 2.0));
        assert_eq!(reducer.weight_violations(), 1);
        assert!(logs_contain("filter weight outside [0, 1]"));
        // Clamped to 1: output follows the newest frame exactly
        assert_eq!(reducer.output().unwrap()[[0, 0]], Complex64::new(2.0, 0.0));

        // Timestamps going backwards give a negative weight, clamped to 0
        run(&mut reducer, &mut buffer, &Sample::filled(0, (1, 1), 9.0));
        assert_eq!(reducer.weight_violations(), 2);
        assert_eq!(reducer.output().unwrap()[[0, 0]], Complex64::new(2.0, 0.0));
    }

    #[test]
    fn test_capacity_one_is_rejected() {
        let mut reducer = DemodulationReducer::new(1.0, 1.0);
        let mut buffer = RingBuffer::new(1).unwrap();
        let converted = buffer.push(&Sample::filled(0, (1, 1), 1.0)).unwrap();
        assert!(matches!(
            advance(&mut reducer, &buffer, converted),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_apply_rejects_statistics_keys() {
        let mut reducer = DemodulationReducer::new(1.0, 1.0);
        let message = ReconfigMessage::from_json(r#"{"pulsation": 5.0, "statistic": "mean"}"#)
            .unwrap();
        assert!(reducer.apply(&message).is_err());
        assert_eq!(reducer.pulsation(), 1.0);
    }
}
