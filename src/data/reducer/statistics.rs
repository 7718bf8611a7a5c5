//! Full-window statistics reducer.
//!
//! Holds no accumulator: every slow tick recomputes the statistic over the whole
//! arena. Slot order is irrelevant for mean and variance, so the physical arena
//! is reduced directly along the slot axis without materializing the window.

use super::{Cadence, Reducer, ReducerKind};
use crate::core::{ReducedFrame, ReducedOutput};
use crate::data::reconfig::{ReconfigMessage, StatisticKind, Tunable};
use crate::data::ring_buffer::RingBuffer;
use crate::error::{PipelineError, Result};
use ndarray::{Array2, Axis};
use tracing::{debug, info};

/// Per-pixel mean or standard deviation over the ring buffer window.
#[derive(Debug, Clone)]
pub struct StatisticsReducer {
    statistic: StatisticKind,
    cadence: Cadence,
}

impl StatisticsReducer {
    /// Reducer emitting `statistic` every `compute_period` pushes.
    pub fn new(statistic: StatisticKind, compute_period: usize) -> Self {
        Self {
            statistic,
            cadence: Cadence::new(compute_period),
        }
    }

    /// Statistic currently computed.
    pub fn statistic(&self) -> StatisticKind {
        self.statistic
    }

    /// Pushes between two emissions.
    pub fn compute_period(&self) -> usize {
        self.cadence.period()
    }

    fn reduce(&self, buffer: &RingBuffer) -> Result<Array2<f64>> {
        let frames = buffer.frames()?;
        match self.statistic {
            StatisticKind::Mean => frames.mean_axis(Axis(0)).ok_or(PipelineError::EmptyBuffer {
                len: buffer.len(),
                capacity: buffer.capacity(),
            }),
            // Population standard deviation (ddof = 0)
            StatisticKind::StdDev => Ok(frames.std_axis(Axis(0), 0.0)),
        }
    }
}

impl Default for StatisticsReducer {
    fn default() -> Self {
        Self::new(StatisticKind::default(), super::DEFAULT_COMPUTE_PERIOD)
    }
}

impl Reducer for StatisticsReducer {
    fn kind(&self) -> ReducerKind {
        ReducerKind::Statistics
    }

    fn bootstrap(&mut self, buffer: &RingBuffer) -> Result<()> {
        debug!(
            capacity = buffer.capacity(),
            statistic = ?self.statistic,
            "statistics window filled"
        );
        Ok(())
    }

    fn fast_update(&mut self, _buffer: &RingBuffer) -> Result<()> {
        Ok(())
    }

    fn maybe_emit(&mut self, buffer: &RingBuffer) -> Result<Option<ReducedOutput>> {
        if !self.cadence.tick() {
            return Ok(None);
        }
        let timestamp = buffer.latest()?.timestamp;
        let image = self.reduce(buffer)?;
        Ok(Some(ReducedOutput {
            timestamp,
            frame: ReducedFrame::Real(image),
        }))
    }

    fn apply(&mut self, message: &ReconfigMessage) -> Result<()> {
        message.validate_for(self.kind())?;
        for update in message.updates() {
            match *update {
                Tunable::ComputePeriod(period) => self.cadence.set_period(period),
                Tunable::Statistic(statistic) => self.statistic = statistic,
                // Rejected by validate_for above
                Tunable::Pulsation(_) | Tunable::DiscreteBandwidth(_) | Tunable::Emission(_) => {}
            }
            info!(reducer = "statistics", %update, "parameter updated");
        }
        Ok(())
    }
}
