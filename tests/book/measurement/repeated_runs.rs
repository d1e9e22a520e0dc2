//! Repeated measurement examples from the book

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use medidor::measurement::{CancelToken, MeasurementConfig, RepeatedMeasurement};
use medidor::sampler::{
    ExecutionSample, OutputCapture, ProcessOutput, SampleOutcome, Sampler, TargetCommand,
};
use medidor::Error;

/// Returns the next scripted reading on every call
struct ScriptedSampler {
    readings: Vec<medidor::Result<(f64, f64, f64, f64)>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSampler {
    fn new(readings: Vec<medidor::Result<(f64, f64, f64, f64)>>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                readings,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl Sampler for ScriptedSampler {
    fn sample(&self, _: &TargetCommand, _: Option<Duration>) -> medidor::Result<SampleOutcome> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.readings[index % self.readings.len()] {
            Ok((real, user, sys, kb)) => Ok(SampleOutcome {
                sample: ExecutionSample::new(*real, *user, *sys, *kb)?,
                exit_code: Some(0),
            }),
            Err(e) => Err(Error::TelemetryParse {
                source_name: "scripted".to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// Prints the repetition number as an invocation marker
struct NumberedCapture {
    runs: AtomicUsize,
}

impl OutputCapture for NumberedCapture {
    fn capture(&self, _: &TargetCommand, _: Option<Duration>) -> medidor::Result<ProcessOutput> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(ProcessOutput {
            stdout: format!("m0({run})\n"),
            stderr: String::new(),
            exit_code: Some(0),
            duration_ms: 0,
        })
    }
}

fn missing_record() -> Error {
    Error::Analysis("no elapsed time record".to_string())
}

#[test]
fn test_means_of_repeated_runs_example() {
    crate::init_logging();
    let (sampler, calls) = ScriptedSampler::new(vec![
        Ok((1.0, 0.8, 0.1, 1000.0)),
        Ok((3.0, 1.2, 0.3, 3000.0)),
    ]);
    let driver = RepeatedMeasurement::new().with_sampler(Box::new(sampler));

    let config = MeasurementConfig::new("notification_service/plain").repetitions(4);
    let summary = driver
        .run(&config, &TargetCommand::new("gen/erl/run"))
        .expect("measurement succeeds");

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(summary.sample_count, 4);
    assert_eq!(summary.mean_real_time_seconds, 2.0);
    assert!((summary.mean_user_time_seconds - 1.0).abs() < 1e-12);
    assert!((summary.mean_sys_time_seconds - 0.2).abs() < 1e-12);
    assert_eq!(summary.mean_peak_resident_kb, 2000.0);
    assert!(summary.captured_outputs.is_none());
}

#[test]
fn test_failing_third_repetition_discards_configuration() {
    crate::init_logging();
    let (sampler, calls) = ScriptedSampler::new(vec![
        Ok((1.0, 1.0, 0.0, 10.0)),
        Ok((1.0, 1.0, 0.0, 10.0)),
        Err(missing_record()),
        Ok((1.0, 1.0, 0.0, 10.0)),
        Ok((1.0, 1.0, 0.0, 10.0)),
    ]);
    let driver = RepeatedMeasurement::new().with_sampler(Box::new(sampler));
    let config = MeasurementConfig::new("consecutive_calls/enforced").repetitions(5);

    let err = driver
        .run(&config, &TargetCommand::new("gen/erl/run"))
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match &err {
        Error::Measurement {
            configuration,
            repetition,
            total,
            ..
        } => {
            assert_eq!(configuration, "consecutive_calls/enforced");
            assert_eq!(*repetition, 3);
            assert_eq!(*total, 5);
        }
        other => panic!("expected a measurement failure, got {other:?}"),
    }
    assert!(err.is_telemetry_parse());
}

#[test]
fn test_trace_capture_keeps_run_order_example() {
    let (sampler, _) = ScriptedSampler::new(vec![Ok((1.0, 1.0, 0.0, 10.0))]);
    let driver = RepeatedMeasurement::new()
        .with_sampler(Box::new(sampler))
        .with_capture(Box::new(NumberedCapture {
            runs: AtomicUsize::new(0),
        }));
    let config = MeasurementConfig::new("traces").repetitions(3).with_traces(true);

    let summary = driver
        .run(&config, &TargetCommand::new("gen/erl/run"))
        .expect("measurement succeeds");

    assert_eq!(summary.traces(), ["m0(0)\n", "m0(1)\n", "m0(2)\n"]);
}

#[test]
fn test_cancellation_between_repetitions_example() {
    let (sampler, calls) = ScriptedSampler::new(vec![Ok((1.0, 1.0, 0.0, 10.0))]);
    let token = CancelToken::new();
    let driver = RepeatedMeasurement::new()
        .with_sampler(Box::new(sampler))
        .with_cancel_token(token.clone());

    token.cancel();
    let err = driver
        .run(&MeasurementConfig::new("cancelled"), &TargetCommand::new("x"))
        .unwrap_err();

    match &err {
        Error::Cancelled {
            configuration,
            repetition,
        } => {
            assert_eq!(configuration, "cancelled");
            assert_eq!(*repetition, 1);
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert!(err.to_string().contains("'cancelled'"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_zero_repetitions_rejected() {
    let err = RepeatedMeasurement::new()
        .run(
            &MeasurementConfig::new("empty").repetitions(0),
            &TargetCommand::new("x"),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}
