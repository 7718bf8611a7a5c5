//! Incremental reducers over a [`RingBuffer`].
//!
//! A reducer turns the stream of frames held in a ring buffer into a reduced product.
//! It is driven one push at a time by its owning processing worker:
//!
//! ```text
//! push ──▶ RingBuffer ──▶ converted?  ── yes ──▶ bootstrap()   (once)
//!                              │
//!                              └─── no ───▶ fast_update()  (every push, O(1))
//!                                                 │
//!                                          maybe_emit()  (slow tick, every
//!                                                 │       `compute_period` pushes)
//!                                                 ▼
//!                                          Option<ReducedOutput>
//! ```
//!
//! Nothing is emitted while the buffer is bootstrapping. The push that triggers the
//! conversion event counts as the first ready push, so with `compute_period = k` the
//! reducer emits on that push and then once every `k` pushes.

pub mod demodulation;
pub mod statistics;

pub use demodulation::DemodulationReducer;
pub use statistics::StatisticsReducer;

use crate::core::ReducedOutput;
use crate::data::reconfig::{EmissionMode, ReconfigMessage, StatisticKind, Tunable};
use crate::data::ring_buffer::RingBuffer;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Default number of pushes between two emissions.
pub const DEFAULT_COMPUTE_PERIOD: usize = 1;

/// The reducer variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReducerKind {
    /// Full-window mean / standard deviation.
    Statistics,
    /// Carrier demodulation with an adaptive exponential filter.
    Demodulation,
}

impl ReducerKind {
    /// Human-readable name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            ReducerKind::Statistics => "statistics",
            ReducerKind::Demodulation => "demodulation",
        }
    }

    /// Whether a reducer of this kind exposes `update`'s parameter.
    pub fn accepts(&self, update: &Tunable) -> bool {
        match (self, update) {
            (_, Tunable::ComputePeriod(_)) => true,
            (ReducerKind::Statistics, Tunable::Statistic(_)) => true,
            (
                ReducerKind::Demodulation,
                Tunable::Pulsation(_) | Tunable::DiscreteBandwidth(_) | Tunable::Emission(_),
            ) => true,
            _ => false,
        }
    }
}

/// An incremental reduction driven one push at a time.
///
/// Implementations own all their accumulator state. The ring buffer is borrowed
/// for each call and is only ever written by the worker between calls.
pub trait Reducer: Send {
    /// Which variant this is.
    fn kind(&self) -> ReducerKind;

    /// One-time warm-up over the full initial window, run on the conversion event.
    fn bootstrap(&mut self, buffer: &RingBuffer) -> Result<()>;

    /// Cheap per-sample update for the slot just written at `buffer.tail()`.
    fn fast_update(&mut self, buffer: &RingBuffer) -> Result<()>;

    /// Advance the emission cadence and, on a slow tick, produce an output.
    fn maybe_emit(&mut self, buffer: &RingBuffer) -> Result<Option<ReducedOutput>>;

    /// Apply a reconfiguration message, all-or-nothing.
    fn apply(&mut self, message: &ReconfigMessage) -> Result<()>;

    /// Number of filter weights that fell outside `[0, 1]` and were clamped.
    fn weight_violations(&self) -> u64 {
        0
    }
}

/// Run the reducer for the push that just happened.
///
/// `converted` is the value returned by [`RingBuffer::push`].
pub fn advance(
    reducer: &mut dyn Reducer,
    buffer: &RingBuffer,
    converted: bool,
) -> Result<Option<ReducedOutput>> {
    if !buffer.is_ready() {
        return Ok(None);
    }
    if converted {
        reducer.bootstrap(buffer)?;
    } else {
        reducer.fast_update(buffer)?;
    }
    reducer.maybe_emit(buffer)
}

/// Slow-tick counter: fires on the first ready push, then every `period` pushes.
#[derive(Debug, Clone)]
pub struct Cadence {
    period: usize,
    until_next: usize,
}

impl Cadence {
    /// A cadence firing every `period` ticks (a zero period is treated as one).
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            until_next: 0,
        }
    }

    /// Count one ready push; returns whether an emission is due.
    pub fn tick(&mut self) -> bool {
        if self.until_next == 0 {
            self.until_next = self.period - 1;
            true
        } else {
            self.until_next -= 1;
            false
        }
    }

    /// Current period.
    pub fn period(&self) -> usize {
        self.period
    }

    /// Change the period without losing the current position.
    pub fn set_period(&mut self, period: usize) {
        self.period = period.max(1);
        self.until_next = self.until_next.min(self.period - 1);
    }
}

fn default_compute_period() -> usize {
    DEFAULT_COMPUTE_PERIOD
}

fn default_discrete_bandwidth() -> f64 {
    1.0
}

/// Reducer selection as it appears in configuration files.
///
/// ```toml
/// [processing.reducer]
/// kind = "demodulation"
/// pulsation = 6.283185307179586   # rad/s
/// discrete_bandwidth = 0.5        # 1/s
/// compute_period = 1
/// emission = "magnitude"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReducerConfig {
    /// Full-window statistics.
    Statistics {
        /// Pushes between two emissions.
        #[serde(default = "default_compute_period")]
        compute_period: usize,
        /// Statistic to compute.
        #[serde(default)]
        statistic: StatisticKind,
    },
    /// Carrier demodulation.
    Demodulation {
        /// Carrier pulsation in rad/s.
        pulsation: f64,
        /// Filter bandwidth in 1/s.
        #[serde(default = "default_discrete_bandwidth")]
        discrete_bandwidth: f64,
        /// Pushes between two emissions.
        #[serde(default = "default_compute_period")]
        compute_period: usize,
        /// Output format.
        #[serde(default)]
        emission: EmissionMode,
    },
}

impl Default for ReducerConfig {
    fn default() -> Self {
        ReducerConfig::Statistics {
            compute_period: DEFAULT_COMPUTE_PERIOD,
            statistic: StatisticKind::default(),
        }
    }
}

impl ReducerConfig {
    /// Variant selected by this configuration.
    pub fn kind(&self) -> ReducerKind {
        match self {
            ReducerConfig::Statistics { .. } => ReducerKind::Statistics,
            ReducerConfig::Demodulation { .. } => ReducerKind::Demodulation,
        }
    }

    /// The configured values expressed as tunables.
    fn as_tunables(&self) -> Vec<Tunable> {
        match *self {
            ReducerConfig::Statistics {
                compute_period,
                statistic,
            } => vec![
                Tunable::ComputePeriod(compute_period),
                Tunable::Statistic(statistic),
            ],
            ReducerConfig::Demodulation {
                pulsation,
                discrete_bandwidth,
                compute_period,
                emission,
            } => vec![
                Tunable::Pulsation(pulsation),
                Tunable::DiscreteBandwidth(discrete_bandwidth),
                Tunable::ComputePeriod(compute_period),
                Tunable::Emission(emission),
            ],
        }
    }

    /// Check every value with the same rules as live reconfiguration.
    pub fn validate(&self) -> Result<()> {
        self.as_tunables()
            .iter()
            .try_for_each(Tunable::validate)
            .map_err(|e| PipelineError::InvalidConfig(format!("reducer: {e}")))
    }

    /// Build the configured reducer.
    pub fn build(&self) -> Result<Box<dyn Reducer>> {
        self.validate()?;
        Ok(match *self {
            ReducerConfig::Statistics {
                compute_period,
                statistic,
            } => Box::new(StatisticsReducer::new(statistic, compute_period)),
            ReducerConfig::Demodulation {
                pulsation,
                discrete_bandwidth,
                compute_period,
                emission,
            } => Box::new(
                DemodulationReducer::new(pulsation, discrete_bandwidth)
                    .with_compute_period(compute_period)
                    .with_emission(emission),
            ),
        })
    }
}
