//! Report examples from the book

use std::time::Duration;

use medidor::measurement::{MeasurementConfig, RepeatedMeasurement};
use medidor::report::{self, ReportFormat};
use medidor::sampler::{
    ExecutionSample, OutputCapture, ProcessOutput, SampleOutcome, Sampler, TargetCommand,
};
use medidor::sweep::{Sweep, SweepConfig, VariantBuilder};
use medidor::Variant;

struct NoBuild;

impl VariantBuilder for NoBuild {
    fn name(&self) -> &str {
        "prebuilt"
    }

    fn prepare(&self, _: u64, _: Variant) -> medidor::Result<()> {
        Ok(())
    }
}

struct FixedSampler;

impl Sampler for FixedSampler {
    fn sample(&self, _: &TargetCommand, _: Option<Duration>) -> medidor::Result<SampleOutcome> {
        Ok(SampleOutcome {
            sample: ExecutionSample::new(0.5, 0.4, 0.05, 20_000.0)?,
            exit_code: Some(0),
        })
    }
}

struct OneCall;

impl OutputCapture for OneCall {
    fn capture(&self, _: &TargetCommand, _: Option<Duration>) -> medidor::Result<ProcessOutput> {
        Ok(ProcessOutput {
            stdout: "m0(0)\n".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            duration_ms: 0,
        })
    }
}

fn sweep_records() -> Vec<report::SweepRecord> {
    let driver = RepeatedMeasurement::new()
        .with_sampler(Box::new(FixedSampler))
        .with_capture(Box::new(OneCall));
    let sweep = Sweep::new(Box::new(NoBuild)).with_measurement(driver);
    let config = SweepConfig::new()
        .with_parameters(vec![1, 5, 10])
        .with_measurement(MeasurementConfig::new("report").repetitions(2))
        .with_methods(1);
    let outcome = sweep
        .run(&config, &TargetCommand::new("gen/erl/run"))
        .expect("sweep succeeds");
    report::records(&outcome)
}

#[test]
fn test_jsonl_hand_off_example() {
    let records = sweep_records();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.run_id == records[0].run_id));

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sweep.jsonl");
    report::export(&records, &path, ReportFormat::Jsonl).expect("export");

    let text = std::fs::read_to_string(&path).expect("read");
    assert_eq!(text.lines().count(), 3);

    let loaded = report::load(&path).expect("load");
    assert_eq!(loaded, records);
    assert_eq!(loaded[2].enforced.mean_edit_distance, Some(9.0));
    assert_eq!(loaded[0].relative_increase.user_time, Some(0.0));
}

#[test]
fn test_table_example() {
    let records = sweep_records();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sweep.txt");
    report::export(&records, &path, ReportFormat::Table).expect("export");

    let table = std::fs::read_to_string(&path).expect("read");
    assert_eq!(table.lines().count(), 4);
    assert!(table.contains("parameter"));
}
