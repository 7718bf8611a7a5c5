//! Pipeline configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/strobe_daq.toml` by default)
//! 2. environment variables prefixed with `STROBE_DAQ_`, nested with `__`
//!
//! Every field has a default, so a missing file or an empty table yields a runnable
//! configuration.
//!
//! # Example
//! ```no_run
//! use strobe_daq::config::PipelineConfig;
//!
//! // STROBE_DAQ_PROCESSING__BUFFER_CAPACITY=128 overrides the file
//! let config = PipelineConfig::load()?;
//! config.validate()?;
//! println!("buffer capacity: {}", config.processing.buffer_capacity);
//! # Ok::<(), strobe_daq::error::PipelineError>(())
//! ```

use crate::data::channel::DEFAULT_CHANNEL_CAPACITY;
use crate::data::reducer::{ReducerConfig, ReducerKind};
use crate::error::{PipelineError, Result};
use crate::logging::OutputFormat;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/strobe_daq.toml";

/// Prefix of overriding environment variables.
pub const ENV_PREFIX: &str = "STROBE_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Acquisition worker settings
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Processing worker settings
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// Synthetic source settings
    #[serde(default)]
    pub source: SourceConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: OutputFormat,
}

/// Acquisition worker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Sleep between polls that returned no frame, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Capacity of the display hand-off channel
    #[serde(default = "default_channel_capacity")]
    pub display_capacity: usize,
    /// Capacity of the processing hand-off channel
    #[serde(default = "default_channel_capacity")]
    pub processing_capacity: usize,
}

/// Processing worker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Ring buffer window length
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Sleep when the input channel is empty, in milliseconds
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
    /// Capacity of the reduced output channel
    #[serde(default = "default_channel_capacity")]
    pub output_capacity: usize,
    /// Reducer selection and its parameters
    #[serde(default)]
    pub reducer: ReducerConfig,
}

/// Synthetic fringe source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Frame height in pixels
    #[serde(default = "default_frame_side")]
    pub height: usize,
    /// Frame width in pixels
    #[serde(default = "default_frame_side")]
    pub width: usize,
    /// Minimum time between two frames, in milliseconds
    #[serde(default = "default_frame_period_ms")]
    pub period_ms: u64,
    /// Fringe modulation frequency in Hz
    #[serde(default = "default_one")]
    pub frequency_hz: f64,
    /// Fringe amplitude
    #[serde(default = "default_one")]
    pub amplitude: f64,
    /// Constant background
    #[serde(default = "default_one")]
    pub offset: f64,
    /// Spatial frequency along x (rad per grid unit)
    #[serde(default = "default_one")]
    pub kx: f64,
    /// Spatial frequency along y (rad per grid unit)
    #[serde(default)]
    pub ky: f64,
    /// Half-width of the additive uniform noise
    #[serde(default)]
    pub noise: f64,
    /// Noise generator seed; random when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

// Default value functions
fn default_name() -> String {
    "strobe_daq".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_buffer_capacity() -> usize {
    64
}

fn default_idle_interval_ms() -> u64 {
    1
}

fn default_frame_side() -> usize {
    64
}

fn default_frame_period_ms() -> u64 {
    10
}

fn default_one() -> f64 {
    1.0
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: OutputFormat::default(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            display_capacity: default_channel_capacity(),
            processing_capacity: default_channel_capacity(),
        }
    }
}

impl AcquisitionConfig {
    /// Idle sleep of the poll loop
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            idle_interval_ms: default_idle_interval_ms(),
            output_capacity: default_channel_capacity(),
            reducer: ReducerConfig::default(),
        }
    }
}

impl ProcessingConfig {
    /// Idle sleep of the processing loop
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            height: default_frame_side(),
            width: default_frame_side(),
            period_ms: default_frame_period_ms(),
            frequency_hz: default_one(),
            amplitude: default_one(),
            offset: default_one(),
            kx: default_one(),
            ky: 0.0,
            noise: 0.0,
            seed: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment overrides apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// Provider chain used by [`load_from`](Self::load_from)
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let channels = [
            ("acquisition.display_capacity", self.acquisition.display_capacity),
            ("acquisition.processing_capacity", self.acquisition.processing_capacity),
            ("processing.output_capacity", self.processing.output_capacity),
        ];
        for (name, capacity) in channels {
            if capacity == 0 {
                return invalid(format!("{name} must be at least 1"));
            }
        }

        let min_buffer = match self.processing.reducer.kind() {
            ReducerKind::Statistics => 1,
            // The filter needs the previous slot to still hold the previous sample
            ReducerKind::Demodulation => 2,
        };
        if self.processing.buffer_capacity < min_buffer {
            return invalid(format!(
                "processing.buffer_capacity {} is too small for a {} reducer (minimum {})",
                self.processing.buffer_capacity,
                self.processing.reducer.kind().name(),
                min_buffer
            ));
        }
        self.processing.reducer.validate()?;

        if self.source.height == 0 || self.source.width == 0 {
            return invalid(format!(
                "source frame shape {}x{} must be non-empty",
                self.source.height, self.source.width
            ));
        }
        let finite = [
            ("frequency_hz", self.source.frequency_hz),
            ("amplitude", self.source.amplitude),
            ("offset", self.source.offset),
            ("kx", self.source.kx),
            ("ky", self.source.ky),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return invalid(format!("source.{name} must be finite"));
            }
        }
        if !self.source.noise.is_finite() || self.source.noise < 0.0 {
            return invalid(format!(
                "source.noise {} must be finite and non-negative",
                self.source.noise
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::reconfig::{EmissionMode, StatisticKind};
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.acquisition.display_capacity, 2);
        assert_eq!(
            config.processing.reducer,
            ReducerConfig::Statistics {
                compute_period: 1,
                statistic: StatisticKind::StdDev
            }
        );
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.processing.buffer_capacity, 64);
    }

    #[test]
    fn test_load_demodulation_config() {
        let file = write_config(
            r#"
            [application]
            log_level = "debug"
            log_format = "json"

            [processing]
            buffer_capacity = 16

            [processing.reducer]
            kind = "demodulation"
            pulsation = 6.283185307179586
            discrete_bandwidth = 0.5
            emission = "phase"
            "#,
        );
        let config = PipelineConfig::load_from(file.path()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.application.log_format, OutputFormat::Json);
        assert_eq!(config.processing.buffer_capacity, 16);
        assert!(matches!(
            config.processing.reducer,
            ReducerConfig::Demodulation {
                emission: EmissionMode::Phase,
                compute_period: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_reducer_kind_fails_to_load() {
        let file = write_config(
            r#"
            [processing.reducer]
            kind = "median"
            "#,
        );
        assert!(matches!(
            PipelineConfig::load_from(file.path()),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = PipelineConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_demodulation_needs_two_slots() {
        let mut config = PipelineConfig::default();
        config.processing.buffer_capacity = 1;
        assert!(config.validate().is_ok());

        config.processing.reducer = ReducerConfig::Demodulation {
            pulsation: 1.0,
            discrete_bandwidth: 1.0,
            compute_period: 1,
            emission: EmissionMode::Magnitude,
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_channel_capacity_is_rejected() {
        let mut config = PipelineConfig::default();
        config.processing.output_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_bandwidth_is_rejected() {
        let mut config = PipelineConfig::default();
        config.processing.reducer = ReducerConfig::Demodulation {
            pulsation: 1.0,
            discrete_bandwidth: -0.1,
            compute_period: 1,
            emission: EmissionMode::Magnitude,
        };
        assert!(config.validate().is_err());
    }
}
