//! Parameter sweep examples from the book

use std::time::Duration;

use medidor::measurement::{MeasurementConfig, RepeatedMeasurement};
use medidor::sampler::{ExecutionSample, SampleOutcome, Sampler, TargetCommand};
use medidor::sweep::{FailurePolicy, ShellBuilder, Sweep, SweepConfig};
use medidor::Variant;

/// Same telemetry for both variants; only the traces differ
struct FixedSampler;

impl Sampler for FixedSampler {
    fn sample(&self, _: &TargetCommand, _: Option<Duration>) -> medidor::Result<SampleOutcome> {
        Ok(SampleOutcome {
            sample: ExecutionSample::new(0.2, 0.1, 0.02, 4096.0)?,
            exit_code: Some(0),
        })
    }
}

/// Writes `run.sh`, printing methods in protocol order only when enforced
const BUILD_SCRIPT: &str = r#"
if [ "$MEDIDOR_VARIANT" = enforced ]; then order="0 1"; else order="1 0"; fi
{
  echo '#!/bin/sh'
  i=0
  while [ "$i" -lt "$MEDIDOR_PARAMETER" ]; do
    for m in $order; do echo "echo m$m\\($i\\)"; done
    i=$((i + 1))
  done
} > run.sh
"#;

#[test]
fn test_sweep_over_generated_variants_example() {
    if !crate::has_shell() {
        eprintln!("sh not available, skipping test");
        return;
    }
    crate::init_logging();

    let dir = tempfile::tempdir().expect("tempdir");
    let builder = ShellBuilder::new(BUILD_SCRIPT).current_dir(dir.path());
    let driver = RepeatedMeasurement::new().with_sampler(Box::new(FixedSampler));
    let sweep = Sweep::new(Box::new(builder)).with_measurement(driver);

    let config = SweepConfig::new()
        .with_parameters(vec![1, 2, 5])
        .with_measurement(MeasurementConfig::new("consecutive_calls").repetitions(2))
        .with_methods(2);
    let target = TargetCommand::new("sh").arg("run.sh").current_dir(dir.path());

    let outcome = sweep.run(&config, &target).expect("sweep succeeds");

    assert_eq!(outcome.rows.len(), 3);
    for row in &outcome.rows {
        let plain = row.plain.fidelity.as_ref().expect("plain fidelity");
        let enforced = row.enforced.fidelity.as_ref().expect("enforced fidelity");
        assert_eq!(enforced.mean_edit_distance, 0.0, "parameter {}", row.parameter);
        assert!(plain.mean_edit_distance > 0.0, "parameter {}", row.parameter);
        assert_eq!(plain.reference_length as u64, row.parameter * 2);
        assert!(row.comparison().edit_reduction().unwrap_or_default() > 0.0);
    }
}

#[test]
fn test_sweep_skips_failed_builds_example() {
    if !crate::has_shell() {
        eprintln!("sh not available, skipping test");
        return;
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let script = r#"[ "$MEDIDOR_PARAMETER" != 5 ] || { echo "template error" >&2; exit 1; }
echo 'echo m0\(0\)' > run.sh"#;
    let builder = ShellBuilder::new(script).current_dir(dir.path());
    let driver = RepeatedMeasurement::new().with_sampler(Box::new(FixedSampler));
    let sweep = Sweep::new(Box::new(builder)).with_measurement(driver);

    let config = SweepConfig::new()
        .with_parameters(vec![1, 5, 10])
        .with_measurement(MeasurementConfig::new("skips").repetitions(1).with_traces(true))
        .with_failure_policy(FailurePolicy::Skip);
    let target = TargetCommand::new("sh").arg("run.sh").current_dir(dir.path());

    let outcome = sweep.run(&config, &target).expect("sweep continues");
    let parameters: Vec<u64> = outcome.rows.iter().map(|r| r.parameter).collect();
    assert_eq!(parameters, [1, 10]);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].variant, Variant::Plain);
    assert!(outcome.failures[0].message.contains("template error"));

    let aborting = config.with_failure_policy(FailurePolicy::Abort);
    assert!(sweep.run(&aborting, &target).is_err());
}
