//! # strobe_daq
//!
//! Acquisition-to-processing streaming core for frame-based sensors. Frames are
//! polled from a source, fanned out to independent bounded channels, and reduced
//! incrementally over a fixed-size ring buffer into running statistics or a
//! demodulated complex envelope. No stage ever blocks the producer, memory stays
//! bounded, and the reducer can be retuned while it runs.
//!
//! ## Crate Structure
//!
//! - **`core`**: `Sample`, `ReducedOutput` and the other values that cross stage
//!   boundaries.
//! - **`data`**: the data path. `channel` (bounded reject-on-full hand-off),
//!   `ring_buffer` (two-phase circular store), `reducer` (statistics and
//!   demodulation) and `reconfig` (typed live parameter updates).
//! - **`hardware`**: the `FrameSource` trait and mock sources.
//! - **`worker`**: acquisition and processing loops on dedicated threads.
//! - **`pipeline`**: assembles workers and channels from a `PipelineConfig`.
//! - **`stats`**: lock-free counters shared between workers and supervisors.
//! - **`config`**: figment-based TOML + environment configuration.
//! - **`logging`**: tracing subscriber setup.
//! - **`error`**: the `PipelineError` taxonomy.

pub mod config;
pub mod core;
pub mod data;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod pipeline;
pub mod stats;
pub mod worker;

pub use crate::core::{ReducedFrame, ReducedOutput, Sample};
pub use crate::error::{PipelineError, Result, SourceError};
pub use crate::pipeline::Pipeline;
