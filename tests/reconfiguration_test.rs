//! Live reconfiguration of running reducers.

use num_complex::Complex64;
use std::f64::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};
use strobe_daq::config::PipelineConfig;
use strobe_daq::core::Sample;
use strobe_daq::data::reconfig::{EmissionMode, ReconfigMessage, StatisticKind, Tunable};
use strobe_daq::data::reducer::{advance, DemodulationReducer, Reducer, ReducerConfig};
use strobe_daq::data::ring_buffer::RingBuffer;
use strobe_daq::hardware::ScriptedSource;
use strobe_daq::{Pipeline, PipelineError};

const QUARTER_SECOND: i64 = 250_000_000;

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

fn demodulation_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.processing.buffer_capacity = 3;
    config.processing.reducer = ReducerConfig::Demodulation {
        pulsation: 0.0,
        discrete_bandwidth: 0.5,
        compute_period: 1,
        emission: EmissionMode::Magnitude,
    };
    config
}

#[test]
fn test_pulsation_change_only_affects_new_slots() {
    let mut buffer = RingBuffer::new(3).unwrap();
    let mut reducer = DemodulationReducer::new(0.0, 0.5);

    for i in 0..3 {
        let sample = Sample::filled(i * QUARTER_SECOND, (2, 2), 1.0);
        let converted = buffer.push(&sample).unwrap();
        advance(&mut reducer, &buffer, converted).unwrap();
    }
    let before = reducer.demodulated().unwrap().to_owned();
    assert!(before.iter().all(|&c| c == Complex64::new(1.0, 0.0)));

    reducer
        .apply(&Tunable::Pulsation(TAU).into())
        .unwrap();
    assert_eq!(reducer.pulsation(), TAU);

    let converted = buffer
        .push(&Sample::filled(3 * QUARTER_SECOND, (2, 2), 1.0))
        .unwrap();
    assert!(!converted);
    advance(&mut reducer, &buffer, converted).unwrap();

    let after = reducer.demodulated().unwrap();
    let tail = buffer.tail();
    let expected = Complex64::from_polar(1.0, TAU * 0.75);
    for (slot, (old, new)) in before.outer_iter().zip(after.outer_iter()).enumerate() {
        if slot == tail {
            assert!(new.iter().all(|&c| (c - expected).norm() < 1e-12));
        } else {
            assert_eq!(old, new);
        }
    }
}

#[test]
fn test_unknown_and_unsupported_keys_are_rejected() {
    let mut pipeline =
        Pipeline::start(&demodulation_config(), Box::new(ScriptedSource::new())).unwrap();

    assert!(matches!(
        ReconfigMessage::from_pairs(["gain=2.0"]),
        Err(PipelineError::UnknownParameter(_))
    ));
    assert!(matches!(
        pipeline
            .reconfig()
            .send(Tunable::Statistic(StatisticKind::Mean)),
        Err(PipelineError::UnsupportedParameter { .. })
    ));
    assert!(matches!(
        pipeline.reconfig().send(Tunable::DiscreteBandwidth(-1.0)),
        Err(PipelineError::InvalidParameter { .. })
    ));
    assert_eq!(pipeline.reconfig().sent(), 0);

    pipeline.shutdown().unwrap();
    assert_eq!(pipeline.processing_stats().reconfig_applied, 0);
}

#[test]
fn test_accepted_message_reaches_idle_worker() {
    let mut pipeline =
        Pipeline::start(&demodulation_config(), Box::new(ScriptedSource::new())).unwrap();

    let message = ReconfigMessage::from_json(r#"{"pulsation": 6.28, "emission": "phase"}"#).unwrap();
    pipeline.reconfig().send(message).unwrap();
    assert_eq!(pipeline.reconfig().sent(), 1);

    assert!(wait_for(|| pipeline.processing_stats().reconfig_applied == 1));
    assert_eq!(pipeline.processing_stats().reconfig_rejected, 0);
    pipeline.shutdown().unwrap();
}

#[test]
fn test_compute_period_change_mid_stream() {
    let mut config = PipelineConfig::default();
    config.acquisition.processing_capacity = 64;
    config.processing.buffer_capacity = 2;
    config.processing.output_capacity = 64;
    config.processing.reducer = ReducerConfig::Statistics {
        compute_period: 1,
        statistic: StatisticKind::Mean,
    };

    let first = ScriptedSource::from_samples((0..4).map(|ts| Sample::filled(ts, (2, 2), 1.0)));
    let mut pipeline = Pipeline::start(&config, Box::new(first)).unwrap();

    // Ready from the 2nd sample: 3 emissions at period 1
    assert!(wait_for(|| pipeline.processing_stats().outputs_emitted == 3));
    assert_eq!(pipeline.processing_stats().samples_processed, 4);

    pipeline.reconfig().send(Tunable::ComputePeriod(10)).unwrap();
    assert!(wait_for(|| pipeline.processing_stats().reconfig_applied == 1));
    pipeline.shutdown().unwrap();
}
