//! Frame sources.
//!
//! The pipeline talks to a sensor only through [`FrameSource`]: a non-blocking poll
//! for the next frame, plus a side channel for driver settings. Real drivers live
//! outside this crate; [`mock`] provides a synthetic fringe generator and a scripted
//! replay source for tests.

pub mod mock;

pub use mock::{ScriptStep, ScriptedSource, SyntheticFringeSource};

use crate::core::Sample;
use crate::error::SourceError;

/// A sensor the acquisition worker can drain.
pub trait FrameSource: Send {
    /// Short name used in logs and thread names.
    fn name(&self) -> &str {
        "source"
    }

    /// Return the next frame if one is ready, without blocking.
    ///
    /// `Ok(None)` means nothing new yet. An `Err` is fatal: the acquisition worker
    /// stops and does not poll again.
    fn poll(&mut self) -> Result<Option<Sample>, SourceError>;

    /// Change a driver setting (exposure, trigger, rate...).
    fn configure(&mut self, setting: &str, value: f64) -> Result<(), SourceError> {
        let _ = value;
        Err(SourceError::UnsupportedSetting(setting.to_string()))
    }
}
