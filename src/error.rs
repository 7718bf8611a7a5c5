//! Custom error types for the pipeline.
//!
//! This module defines the primary error type, `PipelineError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of errors that can occur between the frame source and the
//! reduced output channel.
//!
//! ## Error Hierarchy
//!
//! `PipelineError` consolidates the failure modes of the streaming core:
//!
//! - **`EmptyBuffer`**: A ring buffer was read before its conversion event. This is a
//!   call-ordering bug, not a load condition, and is kept distinct from drops.
//! - **`ShapeMismatch`**: A frame arrived whose shape differs from the one fixed at
//!   stream start. The frame is rejected and the buffer left untouched.
//! - **`UnknownParameter`**, **`UnsupportedParameter`**, **`InvalidParameter`**: A
//!   reconfiguration message was rejected at the boundary. The running reducer keeps
//!   its current state.
//! - **`InvalidConfig`** / **`Config`**: Semantic and parsing errors in the
//!   configuration file.
//! - **`Source`**: Wraps a fatal [`SourceError`] raised by a frame source.
//!
//! Transient drops (full channels) are deliberately *not* errors. They are counted
//! by the channel and the workers and never propagated.

use thiserror::Error;

/// Convenience alias for results using the pipeline error type.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised by the streaming pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The ring buffer has not reached its conversion event yet.
    #[error("Ring buffer is still bootstrapping ({len}/{capacity} samples)")]
    EmptyBuffer {
        /// Samples collected so far.
        len: usize,
        /// Target capacity of the buffer.
        capacity: usize,
    },

    /// A frame did not match the stream's fixed shape.
    #[error("Frame shape {actual:?} does not match stream shape {expected:?}")]
    ShapeMismatch {
        /// Shape fixed by the first frame of the stream.
        expected: (usize, usize),
        /// Shape of the rejected frame.
        actual: (usize, usize),
    },

    /// A reconfiguration key that no reducer knows.
    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),

    /// A known reconfiguration key that the running reducer does not expose.
    #[error("Parameter '{parameter}' is not tunable on a {reducer} reducer")]
    UnsupportedParameter {
        /// The rejected key.
        parameter: String,
        /// Kind of the reducer that rejected it.
        reducer: &'static str,
    },

    /// A known parameter with an out-of-range or malformed value.
    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidParameter {
        /// The rejected key.
        parameter: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Semantic configuration error caught by validation.
    #[error("Configuration validation error: {0}")]
    InvalidConfig(String),

    /// Configuration could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// A frame source failed; fatal to the acquisition worker.
    #[error("Frame source error: {0}")]
    Source(#[from] SourceError),

    /// Worker thread could not be spawned or joined.
    #[error("Worker '{name}' failed: {reason}")]
    Worker {
        /// Thread name of the worker.
        name: String,
        /// Failure description.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Shorthand for an [`PipelineError::InvalidParameter`].
    pub fn invalid_parameter(parameter: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a reconfiguration rejection.
    ///
    /// Configuration errors are reported back to the sender and never affect the
    /// running pipeline.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownParameter(_)
                | Self::UnsupportedParameter { .. }
                | Self::InvalidParameter { .. }
                | Self::InvalidConfig(_)
                | Self::Config(_)
        )
    }
}

impl From<figment::Error> for PipelineError {
    fn from(value: figment::Error) -> Self {
        Self::Config(Box::new(value))
    }
}

/// Fatal errors raised by a [`FrameSource`](crate::hardware::FrameSource).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// The sensor stopped responding or reported a hardware fault.
    #[error("Sensor disconnected: {0}")]
    Disconnected(String),

    /// The sensor produced a frame the driver could not decode.
    #[error("Corrupt frame: {0}")]
    CorruptFrame(String),

    /// A `configure` call named a setting the source does not have.
    #[error("Unsupported source setting '{0}'")]
    UnsupportedSetting(String),

    /// A `configure` call carried an invalid value.
    #[error("Invalid value {value} for source setting '{setting}'")]
    InvalidSetting {
        /// Setting name.
        setting: String,
        /// Rejected value.
        value: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_classified() {
        assert!(PipelineError::UnknownParameter("gain".into()).is_configuration_error());
        assert!(PipelineError::invalid_parameter("pulsation", "not finite").is_configuration_error());
        assert!(!PipelineError::EmptyBuffer { len: 1, capacity: 3 }.is_configuration_error());
    }

    #[test]
    fn source_error_converts_into_pipeline_error() {
        let err: PipelineError = SourceError::Disconnected("usb reset".into()).into();
        match err {
            PipelineError::Source(SourceError::Disconnected(msg)) => assert_eq!(msg, "usb reset"),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn empty_buffer_message_reports_progress() {
        let err = PipelineError::EmptyBuffer { len: 2, capacity: 10 };
        assert!(err.to_string().contains("2/10"));
    }
}
