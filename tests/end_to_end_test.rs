//! End-to-end runs through `Pipeline` with scripted and synthetic sources.

use std::f64::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};
use strobe_daq::config::{PipelineConfig, SourceConfig};
use strobe_daq::core::{ReducedOutput, Sample};
use strobe_daq::data::reconfig::{EmissionMode, StatisticKind};
use strobe_daq::data::reducer::ReducerConfig;
use strobe_daq::hardware::{ScriptedSource, SyntheticFringeSource};
use strobe_daq::stats::AcquisitionStatus;
use strobe_daq::{Pipeline, SourceError};

const TIMEOUT: Duration = Duration::from_secs(5);

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

fn statistics_config(buffer_capacity: usize) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.acquisition.display_capacity = 16;
    config.acquisition.processing_capacity = 16;
    config.processing.buffer_capacity = buffer_capacity;
    config.processing.output_capacity = 16;
    config.processing.reducer = ReducerConfig::Statistics {
        compute_period: 1,
        statistic: StatisticKind::StdDev,
    };
    config
}

fn collect_outputs(pipeline: &Pipeline) -> Vec<ReducedOutput> {
    std::iter::from_fn(|| pipeline.output().try_receive()).collect()
}

#[test]
fn test_window_std_follows_overwrites() {
    let source = ScriptedSource::new()
        .frame(Sample::filled(0, (4, 4), 5.0))
        .frame(Sample::filled(1, (4, 4), 5.0))
        .frame(Sample::filled(2, (4, 4), 5.0))
        .frame(Sample::filled(3, (4, 4), 10.0));
    let mut pipeline = Pipeline::start(&statistics_config(3), Box::new(source)).unwrap();

    assert!(wait_for(|| pipeline.processing_stats().outputs_emitted == 2));
    let outputs = collect_outputs(&pipeline);
    assert_eq!(outputs.len(), 2);

    assert_eq!(outputs[0].timestamp, 2);
    assert!(outputs[0].frame.as_real().unwrap().iter().all(|&v| v == 0.0));

    assert_eq!(outputs[1].timestamp, 3);
    let reference = (50.0f64 / 9.0).sqrt();
    for &v in outputs[1].frame.as_real().unwrap() {
        assert!((v - reference).abs() < 1e-12);
    }

    let stats = pipeline.processing_stats();
    assert_eq!(stats.samples_processed, 4);
    assert_eq!(stats.outputs_dropped, 0);

    pipeline.shutdown().unwrap();
    assert_eq!(pipeline.acquisition_status(), AcquisitionStatus::Stopped);
}

#[test]
fn test_display_receives_every_frame_in_order() {
    let source = ScriptedSource::from_samples((0..8).map(|ts| Sample::filled(ts, (2, 2), ts as f64)));
    let mut pipeline = Pipeline::start(&statistics_config(2), Box::new(source)).unwrap();

    assert!(wait_for(|| pipeline.display().len() == 8));
    let timestamps: Vec<i64> = std::iter::from_fn(|| pipeline.display().try_receive())
        .map(|s| s.timestamp)
        .collect();
    assert_eq!(timestamps, (0..8).collect::<Vec<_>>());

    pipeline.shutdown().unwrap();
}

#[test]
fn test_demodulation_of_synthetic_fringes() {
    let mut config = PipelineConfig::default();
    config.source = SourceConfig {
        height: 8,
        width: 8,
        period_ms: 1,
        frequency_hz: 5.0,
        seed: Some(7),
        ..SourceConfig::default()
    };
    config.acquisition.processing_capacity = 64;
    config.processing.buffer_capacity = 4;
    config.processing.output_capacity = 64;
    config.processing.reducer = ReducerConfig::Demodulation {
        pulsation: TAU * 5.0,
        discrete_bandwidth: 1.0,
        compute_period: 1,
        emission: EmissionMode::Magnitude,
    };

    let source = SyntheticFringeSource::from_config(&config.source);
    let mut pipeline = Pipeline::start(&config, Box::new(source)).unwrap();

    assert!(wait_for(|| pipeline.processing_stats().outputs_emitted >= 5));
    pipeline.shutdown().unwrap();

    let stats = pipeline.processing_stats();
    assert!(stats.samples_processed >= 4);
    assert_eq!(stats.shape_rejections, 0);
}

#[test]
fn test_demodulation_outputs_are_finite_magnitudes() {
    let mut config = PipelineConfig::default();
    config.acquisition.processing_capacity = 64;
    config.processing.buffer_capacity = 3;
    config.processing.output_capacity = 64;
    config.processing.reducer = ReducerConfig::Demodulation {
        pulsation: TAU,
        discrete_bandwidth: 0.5,
        compute_period: 2,
        emission: EmissionMode::Magnitude,
    };

    // 100 ms spacing keeps the weight at 0.05
    let source = ScriptedSource::from_samples(
        (0..10).map(|i| Sample::filled(i * 100_000_000, (3, 5), 1.0)),
    );
    let mut pipeline = Pipeline::start(&config, Box::new(source)).unwrap();

    // Ready from the 3rd sample: 8 ready pushes, one emission every 2
    assert!(wait_for(|| pipeline.processing_stats().outputs_emitted == 4));
    assert_eq!(pipeline.processing_stats().samples_processed, 10);
    let outputs = collect_outputs(&pipeline);
    assert_eq!(outputs.len(), 4);
    for output in &outputs {
        let image = output.frame.as_real().unwrap();
        assert_eq!(image.dim(), (3, 5));
        assert!(image.iter().all(|v| v.is_finite() && *v >= 0.0 && *v <= 1.0 + 1e-12));
    }
    assert_eq!(pipeline.processing_stats().weight_violations, 0);

    pipeline.shutdown().unwrap();
}

#[test]
fn test_source_failure_stops_acquisition() {
    let source = ScriptedSource::new()
        .frame(Sample::filled(0, (2, 2), 1.0))
        .frame(Sample::filled(1, (2, 2), 1.0))
        .fail(SourceError::Disconnected("link down".into()));
    let mut pipeline = Pipeline::start(&statistics_config(2), Box::new(source)).unwrap();

    assert!(wait_for(|| pipeline.acquisition_status().is_terminal()));
    assert_eq!(
        pipeline.acquisition_status(),
        AcquisitionStatus::Failed("Sensor disconnected: link down".into())
    );

    // Frames acquired before the failure still reach processing
    assert!(wait_for(|| pipeline.processing_stats().samples_processed == 2));
    pipeline.shutdown().unwrap();
    assert!(matches!(
        pipeline.acquisition_status(),
        AcquisitionStatus::Failed(_)
    ));
}

#[test]
fn test_invalid_config_is_rejected_at_start() {
    let mut config = PipelineConfig::default();
    config.processing.buffer_capacity = 1;
    config.processing.reducer = ReducerConfig::Demodulation {
        pulsation: TAU,
        discrete_bandwidth: 1.0,
        compute_period: 1,
        emission: EmissionMode::Magnitude,
    };
    assert!(Pipeline::start(&config, Box::new(ScriptedSource::new())).is_err());
}
