//! Live reconfiguration of a running reducer.
//!
//! A controlling component (UI, script, CLI) sends [`ReconfigMessage`]s to a running
//! processing worker through an unbounded lock-free queue. Each message is a list of
//! typed [`Tunable`] updates. The sender half validates a message against the
//! reducer kind and value ranges *before* queueing it, so a bad key or value is
//! reported to the caller and never reaches the worker. The worker applies each
//! message atomically between two samples.
//!
//! # Example
//!
//! ```
//! use strobe_daq::data::reconfig::{reconfig_channel, ReconfigMessage, Tunable};
//! use strobe_daq::data::reducer::ReducerKind;
//!
//! let (tx, rx) = reconfig_channel(ReducerKind::Demodulation);
//! tx.send(ReconfigMessage::from_json(r#"{"pulsation": 6.283185307179586}"#)?)?;
//! // `statistic` belongs to the statistics reducer
//! assert!(tx.send(ReconfigMessage::from_json(r#"{"statistic": "mean"}"#)?).is_err());
//! assert_eq!(rx.try_receive().map(|m| m.updates().len()), Some(1));
//! # Ok::<(), strobe_daq::error::PipelineError>(())
//! ```

use crate::data::reducer::ReducerKind;
use crate::error::{PipelineError, Result};
use crossbeam_queue::SegQueue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What a demodulation reducer publishes on each slow tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionMode {
    /// `|output|` as a real image.
    #[default]
    Magnitude,
    /// `arg(output)` in radians as a real image.
    Phase,
    /// The raw complex envelope.
    Complex,
}

impl FromStr for EmissionMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "magnitude" | "abs" => Ok(Self::Magnitude),
            "phase" | "arg" => Ok(Self::Phase),
            "complex" => Ok(Self::Complex),
            other => Err(PipelineError::invalid_parameter(
                "emission",
                format!("'{other}' is not one of magnitude, phase, complex"),
            )),
        }
    }
}

/// Full-window statistic computed by a statistics reducer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatisticKind {
    /// Per-pixel mean over the window.
    #[serde(rename = "mean")]
    Mean,
    /// Per-pixel population standard deviation over the window.
    #[default]
    #[serde(rename = "std")]
    StdDev,
}

impl FromStr for StatisticKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "std" | "stddev" => Ok(Self::StdDev),
            other => Err(PipelineError::invalid_parameter(
                "statistic",
                format!("'{other}' is not one of mean, std"),
            )),
        }
    }
}

/// One typed parameter update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tunable {
    /// Carrier pulsation in rad/s.
    Pulsation(f64),
    /// Filter bandwidth in 1/s; multiplied by the sample gap to get the weight.
    DiscreteBandwidth(f64),
    /// Pushes between two emissions.
    ComputePeriod(usize),
    /// Demodulation output format.
    Emission(EmissionMode),
    /// Statistic computed over the window.
    Statistic(StatisticKind),
}

impl Tunable {
    /// Every key a reconfiguration message may carry.
    pub const KEYS: [&'static str; 5] = [
        "pulsation",
        "discrete_bandwidth",
        "compute_period",
        "emission",
        "statistic",
    ];

    /// Key naming this parameter.
    pub fn name(&self) -> &'static str {
        match self {
            Tunable::Pulsation(_) => "pulsation",
            Tunable::DiscreteBandwidth(_) => "discrete_bandwidth",
            Tunable::ComputePeriod(_) => "compute_period",
            Tunable::Emission(_) => "emission",
            Tunable::Statistic(_) => "statistic",
        }
    }

    /// Parse a `key` / `value` pair given as text (CLI `--set key=value`).
    pub fn parse(key: &str, value: &str) -> Result<Self> {
        let key = key.trim();
        let value = value.trim();
        let float = |name: &str| {
            value
                .parse::<f64>()
                .map_err(|e| PipelineError::invalid_parameter(name, e.to_string()))
        };
        let tunable = match key {
            "pulsation" => Tunable::Pulsation(float(key)?),
            "discrete_bandwidth" => Tunable::DiscreteBandwidth(float(key)?),
            "compute_period" => Tunable::ComputePeriod(
                value
                    .parse::<usize>()
                    .map_err(|e| PipelineError::invalid_parameter(key, e.to_string()))?,
            ),
            "emission" => Tunable::Emission(value.parse()?),
            "statistic" => Tunable::Statistic(value.parse()?),
            other => return Err(PipelineError::UnknownParameter(other.to_string())),
        };
        tunable.validate()?;
        Ok(tunable)
    }

    /// Parse a JSON `key: value` entry.
    pub fn from_json(key: &str, value: &serde_json::Value) -> Result<Self> {
        let float = || {
            value
                .as_f64()
                .ok_or_else(|| PipelineError::invalid_parameter(key, "expected a number"))
        };
        let text = || {
            value
                .as_str()
                .ok_or_else(|| PipelineError::invalid_parameter(key, "expected a string"))
        };
        let tunable = match key {
            "pulsation" => Tunable::Pulsation(float()?),
            "discrete_bandwidth" => Tunable::DiscreteBandwidth(float()?),
            "compute_period" => {
                let period = value.as_u64().ok_or_else(|| {
                    PipelineError::invalid_parameter(key, "expected a positive integer")
                })?;
                Tunable::ComputePeriod(usize::try_from(period).map_err(|e| {
                    PipelineError::invalid_parameter(key, e.to_string())
                })?)
            }
            "emission" => Tunable::Emission(text()?.parse()?),
            "statistic" => Tunable::Statistic(text()?.parse()?),
            other => return Err(PipelineError::UnknownParameter(other.to_string())),
        };
        tunable.validate()?;
        Ok(tunable)
    }

    /// Check the value range, independent of the reducer kind.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Tunable::Pulsation(value) if !value.is_finite() => Err(
                PipelineError::invalid_parameter(self.name(), "must be a finite number"),
            ),
            Tunable::DiscreteBandwidth(value) if !value.is_finite() || value < 0.0 => {
                Err(PipelineError::invalid_parameter(
                    self.name(),
                    format!("{value} is not a finite, non-negative bandwidth"),
                ))
            }
            Tunable::ComputePeriod(0) => Err(PipelineError::invalid_parameter(
                self.name(),
                "must be at least 1",
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Tunable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tunable::Pulsation(v) => write!(f, "pulsation={v}"),
            Tunable::DiscreteBandwidth(v) => write!(f, "discrete_bandwidth={v}"),
            Tunable::ComputePeriod(v) => write!(f, "compute_period={v}"),
            Tunable::Emission(v) => write!(f, "emission={v:?}"),
            Tunable::Statistic(v) => write!(f, "statistic={v:?}"),
        }
    }
}

/// A set of parameter updates applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconfigMessage {
    updates: Vec<Tunable>,
}

impl ReconfigMessage {
    /// Empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an update (builder style).
    pub fn with(mut self, update: Tunable) -> Self {
        self.updates.push(update);
        self
    }

    /// Updates in the order they will be applied.
    pub fn updates(&self) -> &[Tunable] {
        &self.updates
    }

    /// Whether the message carries no update.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Parse a JSON object such as `{"pulsation": 6.28, "discrete_bandwidth": 0.5}`.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| PipelineError::invalid_parameter("message", e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| PipelineError::invalid_parameter("message", "expected a JSON object"))?;
        let updates = object
            .iter()
            .map(|(key, value)| Tunable::from_json(key, value))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { updates })
    }

    /// Parse `key=value` strings.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let updates = pairs
            .into_iter()
            .map(|pair| {
                let pair = pair.as_ref();
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    PipelineError::invalid_parameter(pair, "expected key=value")
                })?;
                Tunable::parse(key, value)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { updates })
    }

    /// Check every update against the reducer kind that will receive it.
    pub fn validate_for(&self, kind: ReducerKind) -> Result<()> {
        for update in &self.updates {
            update.validate()?;
            if !kind.accepts(update) {
                return Err(PipelineError::UnsupportedParameter {
                    parameter: update.name().to_string(),
                    reducer: kind.name(),
                });
            }
        }
        Ok(())
    }
}

impl From<Tunable> for ReconfigMessage {
    fn from(update: Tunable) -> Self {
        Self::new().with(update)
    }
}

/// Create the sending and receiving halves of a reconfiguration queue.
pub fn reconfig_channel(kind: ReducerKind) -> (ReconfigSender, ReconfigReceiver) {
    let queue = Arc::new(SegQueue::new());
    let sender = ReconfigSender {
        kind,
        queue: Arc::clone(&queue),
        sent: Arc::new(AtomicU64::new(0)),
    };
    (sender, ReconfigReceiver { queue })
}

/// Controller-side handle; validates before queueing.
#[derive(Clone)]
pub struct ReconfigSender {
    kind: ReducerKind,
    queue: Arc<SegQueue<ReconfigMessage>>,
    sent: Arc<AtomicU64>,
}

impl ReconfigSender {
    /// Validate and queue a message.
    ///
    /// Returns the validation error to the caller; the running reducer is not
    /// affected by a rejected message.
    pub fn send(&self, message: impl Into<ReconfigMessage>) -> Result<()> {
        let message = message.into();
        message.validate_for(self.kind)?;
        self.queue.push(message);
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Kind of the reducer on the other end.
    pub fn kind(&self) -> ReducerKind {
        self.kind
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for ReconfigSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconfigSender")
            .field("kind", &self.kind)
            .field("pending", &self.queue.len())
            .finish()
    }
}

/// Worker-side handle.
pub struct ReconfigReceiver {
    queue: Arc<SegQueue<ReconfigMessage>>,
}

impl ReconfigReceiver {
    /// Next pending message, if any.
    pub fn try_receive(&self) -> Option<ReconfigMessage> {
        self.queue.pop()
    }

    /// Whether no message is pending.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Discard every pending message.
    pub fn drain(&self) -> usize {
        let mut drained = 0;
        while self.queue.pop().is_some() {
            drained += 1;
        }
        drained
    }
}
