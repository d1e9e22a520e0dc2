//! Scheduler log examples from the book

use std::collections::BTreeSet;

use medidor::trace::{parse_scheduler_log, SchedulerEvent, SchedulerLog, SchedulerLogSummary};

const RUN: &str = "\
Booting model
[SessionTypeABS] Scheduler of class NS.Service could not find a viable activation.
m0(0)
[SessionTypeABS] Scheduler of class NS.Service has been called.
[SessionTypeABS] Scheduler of class NS.Producer could not find a viable activation.
m1(0)
[SessionTypeABS] Scheduler of class NS.Service has been called.
m0(1)
[SessionTypeABS] Scheduler of class NS.Service could not find a viable activation.
m1(1)
";

#[test]
fn test_parse_interleaved_events_example() {
    let events = parse_scheduler_log(RUN);

    assert_eq!(events.len(), 5);
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| if e.is_delay() { "delay" } else { "call" })
        .collect();
    assert_eq!(kinds, ["delay", "call", "delay", "call", "delay"]);
    assert_eq!(events[2].subject(), "NS.Producer");
    assert_eq!(events[0].line(), 2);
}

#[test]
fn test_group_by_kind_example() {
    let log = SchedulerLog::parse(RUN);
    let delays: Vec<&SchedulerEvent> = log.delays().collect();
    assert_eq!(delays.len(), 3);
    assert_eq!(log.call_count(), 2);
}

#[test]
fn test_disabled_enforcement_logs_nothing() {
    assert!(parse_scheduler_log("m0(0)\nm1(0)\n").is_empty());
}

#[test]
fn test_summary_for_watched_subject_example() {
    crate::init_logging();
    let subjects: BTreeSet<String> = ["NS.Service".to_string()].into();
    let outputs = vec![RUN.to_string(), RUN.to_string()];

    let summary = SchedulerLogSummary::from_outputs(&outputs, &subjects);
    assert_eq!(summary.runs, 2);
    assert_eq!(summary.total_delays, 4);
    assert_eq!(summary.total_calls, 4);
    assert_eq!(summary.mean_delays, 2.0);
}
