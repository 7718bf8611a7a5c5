//! Mock Frame Sources
//!
//! Simulated sensors for running the pipeline without hardware.
//!
//! # Available Mocks
//!
//! - `SyntheticFringeSource` - Moving sinusoidal fringe pattern at a fixed frame period
//! - `ScriptedSource` - Replays a fixed list of poll results, for deterministic tests

use super::FrameSource;
use crate::config::SourceConfig;
use crate::core::Sample;
use crate::error::SourceError;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::f64::consts::TAU;
use std::time::{Duration, Instant};
use tracing::debug;

/// Side length of the square the fringe pattern is drawn over.
const GRID_EXTENT: f64 = 10.0;

// =============================================================================
// SyntheticFringeSource - Simulated Camera
// =============================================================================

/// Fringe pattern generator
///
/// Produces `height × width` frames
/// `offset + amplitude · sin(kx·x + ky·y + 2π·f·t)` over a `[0, 10]²` grid, where
/// `t` is the frame timestamp in seconds. Frames are only produced once `period`
/// has elapsed since the previous one; earlier polls return `None`.
///
/// # Example
///
/// ```rust,ignore
/// let mut source = SyntheticFringeSource::from_config(&SourceConfig::default());
/// source.configure("frequency_hz", 5.0)?;
/// while let Some(sample) = source.poll()? { /* ... */ }
/// ```
pub struct SyntheticFringeSource {
    height: usize,
    width: usize,
    period: Duration,
    frequency_hz: f64,
    amplitude: f64,
    offset: f64,
    kx: f64,
    ky: f64,
    noise: f64,
    rng: StdRng,
    started: Instant,
    last_frame: Option<Instant>,
    last_timestamp: i64,
    frames_produced: u64,
}

impl SyntheticFringeSource {
    /// Create a source from the `[source]` configuration section
    pub fn from_config(config: &SourceConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            height: config.height,
            width: config.width,
            period: Duration::from_millis(config.period_ms),
            frequency_hz: config.frequency_hz,
            amplitude: config.amplitude,
            offset: config.offset,
            kx: config.kx,
            ky: config.ky,
            noise: config.noise,
            rng,
            started: Instant::now(),
            last_frame: None,
            last_timestamp: -1,
            frames_produced: 0,
        }
    }

    /// Number of frames produced so far
    pub fn frames_produced(&self) -> u64 {
        self.frames_produced
    }

    fn coordinate(index: usize, len: usize) -> f64 {
        if len > 1 {
            GRID_EXTENT * index as f64 / (len - 1) as f64
        } else {
            0.0
        }
    }

    fn render(&mut self, seconds: f64) -> Array2<f64> {
        let carrier = TAU * self.frequency_hz * seconds;
        let (height, width) = (self.height, self.width);
        let mut frame = Array2::from_shape_fn((height, width), |(row, col)| {
            let x = Self::coordinate(col, width);
            let y = Self::coordinate(row, height);
            self.offset + self.amplitude * (self.kx * x + self.ky * y + carrier).sin()
        });
        if self.noise > 0.0 {
            let noise = self.noise;
            frame.mapv_inplace(|v| v + noise * self.rng.gen_range(-1.0..=1.0));
        }
        frame
    }
}

impl Default for SyntheticFringeSource {
    fn default() -> Self {
        Self::from_config(&SourceConfig::default())
    }
}

impl FrameSource for SyntheticFringeSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn poll(&mut self) -> Result<Option<Sample>, SourceError> {
        let now = Instant::now();
        if let Some(last) = self.last_frame {
            if now.duration_since(last) < self.period {
                return Ok(None);
            }
        }
        self.last_frame = Some(now);

        let elapsed = i64::try_from(now.duration_since(self.started).as_nanos())
            .map_err(|_| SourceError::CorruptFrame("timestamp overflow".to_string()))?;
        // Producer timestamps are strictly increasing even on coarse clocks
        let timestamp = elapsed.max(self.last_timestamp + 1);
        self.last_timestamp = timestamp;

        let frame = self.render(timestamp as f64 * crate::core::NANOS_TO_SECONDS);
        self.frames_produced += 1;
        Ok(Some(Sample::new(timestamp, frame)))
    }

    fn configure(&mut self, setting: &str, value: f64) -> Result<(), SourceError> {
        let invalid = || SourceError::InvalidSetting {
            setting: setting.to_string(),
            value,
        };
        match setting {
            "frequency_hz" if value.is_finite() => self.frequency_hz = value,
            "amplitude" if value.is_finite() => self.amplitude = value,
            "period_ms" if value.is_finite() && value >= 0.0 => {
                self.period = Duration::from_secs_f64(value / 1000.0);
            }
            "noise" if value.is_finite() && value >= 0.0 => self.noise = value,
            "frequency_hz" | "amplitude" | "period_ms" | "noise" => return Err(invalid()),
            other => return Err(SourceError::UnsupportedSetting(other.to_string())),
        }
        debug!(setting, value, "synthetic source reconfigured");
        Ok(())
    }
}

// =============================================================================
// ScriptedSource - Deterministic Replay
// =============================================================================

/// One scripted poll result
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// `poll` returns this sample
    Frame(Sample),
    /// `poll` returns `None`
    Empty,
    /// `poll` fails with this error
    Fail(SourceError),
}

/// Source replaying a fixed sequence of poll results
///
/// Once the script is exhausted every poll returns `None`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    steps: VecDeque<ScriptStep>,
    polls: u64,
}

impl ScriptedSource {
    /// Empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Script returning each sample in turn
    pub fn from_samples(samples: impl IntoIterator<Item = Sample>) -> Self {
        Self {
            steps: samples.into_iter().map(ScriptStep::Frame).collect(),
            polls: 0,
        }
    }

    /// Append a frame
    pub fn frame(mut self, sample: Sample) -> Self {
        self.steps.push_back(ScriptStep::Frame(sample));
        self
    }

    /// Append `count` empty polls
    pub fn empty(mut self, count: usize) -> Self {
        self.steps
            .extend(std::iter::repeat(ScriptStep::Empty).take(count));
        self
    }

    /// Append a fatal error
    pub fn fail(mut self, error: SourceError) -> Self {
        self.steps.push_back(ScriptStep::Fail(error));
        self
    }

    /// Steps not yet replayed
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }

    /// Number of `poll` calls so far
    pub fn polls(&self) -> u64 {
        self.polls
    }
}

impl FrameSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn poll(&mut self) -> Result<Option<Sample>, SourceError> {
        self.polls += 1;
        match self.steps.pop_front() {
            Some(ScriptStep::Frame(sample)) => Ok(Some(sample)),
            Some(ScriptStep::Empty) | None => Ok(None),
            Some(ScriptStep::Fail(error)) => Err(error),
        }
    }
}
