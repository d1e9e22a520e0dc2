//! Measuring real child processes

use std::time::Duration;

use medidor::measurement::{MeasurementConfig, RepeatedMeasurement};
use medidor::sampler::{
    ExecutionSample, GnuTimeSource, ProcessSampler, SampleOutcome, Sampler, TargetCommand,
};
use medidor::trace::extract_invocations;
use medidor::Error;

/// Constant readings, so only output capture touches real processes
struct ConstantSampler;

impl Sampler for ConstantSampler {
    fn sample(&self, _: &TargetCommand, _: Option<Duration>) -> medidor::Result<SampleOutcome> {
        Ok(SampleOutcome {
            sample: ExecutionSample::new(0.1, 0.05, 0.01, 512.0)?,
            exit_code: Some(0),
        })
    }
}

fn shell(script: &str) -> TargetCommand {
    TargetCommand::new("sh").arg("-c").arg(script)
}

#[test]
fn test_plain_capture_of_shell_target() {
    if !crate::has_shell() {
        eprintln!("sh not available, skipping test");
        return;
    }
    crate::init_logging();

    let driver = RepeatedMeasurement::new().with_sampler(Box::new(ConstantSampler));
    let config = MeasurementConfig::new("shell").repetitions(2).with_traces(true);
    let summary = driver
        .run(&config, &shell("echo 'noise m0(0)'; echo m1\\(0\\) >&2; echo 'm1(0)'"))
        .expect("measurement succeeds");

    assert_eq!(summary.traces().len(), 2);
    for trace in summary.traces() {
        let tokens = extract_invocations(trace);
        assert_eq!(tokens.len(), 2, "stderr must not be captured: {trace:?}");
    }
}

#[test]
fn test_hung_target_times_out() {
    if !crate::has_shell() {
        eprintln!("sh not available, skipping test");
        return;
    }

    let driver = RepeatedMeasurement::new().with_sampler(Box::new(ConstantSampler));
    let config = MeasurementConfig::new("hung")
        .repetitions(3)
        .with_traces(true)
        .with_timeout(Duration::from_millis(200));

    let started = std::time::Instant::now();
    let err = driver.run(&config, &shell("sleep 10")).unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(matches!(err, Error::Measurement { repetition: 1, .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_gnu_time_as_both_sources() {
    let time = GnuTimeSource::new();
    if !time.is_available() {
        eprintln!("/usr/bin/time not available, skipping test");
        return;
    }
    crate::init_logging();

    let sampler = ProcessSampler::new().with_timing_source(Box::new(GnuTimeSource::new()));
    match sampler.sample(&TargetCommand::new("true"), Some(Duration::from_secs(30))) {
        Ok(outcome) => {
            assert!(outcome.success());
            assert!(outcome.sample.peak_resident_kb() > 0.0);
            assert!(outcome.sample.real_time_seconds() >= 0.0);
        }
        // A BSD or busybox `time` does not understand the format string
        Err(e) => assert!(e.is_telemetry_parse(), "unexpected error: {e}"),
    }
}

#[test]
fn test_nonzero_exit_is_counted_not_fatal() {
    let time = GnuTimeSource::new();
    if !time.is_available() || !crate::has_shell() {
        eprintln!("/usr/bin/time or sh not available, skipping test");
        return;
    }

    let sampler = ProcessSampler::new().with_timing_source(Box::new(GnuTimeSource::new()));
    let driver = RepeatedMeasurement::new().with_sampler(Box::new(sampler));
    let config = MeasurementConfig::new("exit").repetitions(2);

    match driver.run(&config, &shell("exit 3")) {
        Ok(summary) => assert_eq!(summary.nonzero_exit_count, 2),
        Err(e) => assert!(e.is_telemetry_parse(), "unexpected error: {e}"),
    }

    let strict = config.fail_on_nonzero_exit(true);
    let driver = RepeatedMeasurement::new().with_sampler(Box::new(
        ProcessSampler::new().with_timing_source(Box::new(GnuTimeSource::new())),
    ));
    match driver.run(&strict, &shell("exit 3")) {
        Ok(_) => panic!("non-zero exit must fail a strict measurement"),
        Err(e) => assert!(
            matches!(e, Error::Measurement { repetition: 1, .. }),
            "unexpected error: {e}"
        ),
    }
}
