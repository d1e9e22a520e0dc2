//! Scheduler event log parsing
//!
//! When a class is compiled with scheduler logging, its generated scheduler
//! prints one line per decision to standard output:
//!
//! ```text
//! [SessionTypeABS] Scheduler of class Service.NotificationService has been called.
//! [SessionTypeABS] Scheduler of class Service.MailServer could not find a viable activation.
//! ```
//!
//! A *call* line is printed every time the scheduler runs. A *delay* line is
//! printed when the protocol allowed none of the queued processes to run, so
//! activation had to be postponed. These lines are interleaved with whatever
//! else the program prints.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

const RECORD_PREFIX: &str = "[SessionTypeABS] Scheduler of class ";
const DELAY_SUFFIX: &str = " could not find a viable activation.";
const CALL_SUFFIX: &str = " has been called.";

/// One logged scheduler decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchedulerEvent {
    /// No queued process was allowed to run
    Delay {
        /// Qualified class name of the scheduled object
        subject: String,
        /// 1-based line number in the parsed text
        line: usize,
    },
    /// The scheduler was invoked
    Call {
        /// Qualified class name of the scheduled object
        subject: String,
        /// 1-based line number in the parsed text
        line: usize,
    },
}

impl SchedulerEvent {
    /// Qualified class name the event belongs to
    #[must_use]
    pub fn subject(&self) -> &str {
        match self {
            Self::Delay { subject, .. } | Self::Call { subject, .. } => subject,
        }
    }

    /// Line the event was read from
    #[must_use]
    pub fn line(&self) -> usize {
        match self {
            Self::Delay { line, .. } | Self::Call { line, .. } => *line,
        }
    }

    /// Whether this is a delay event
    #[must_use]
    pub fn is_delay(&self) -> bool {
        matches!(self, Self::Delay { .. })
    }

    /// Whether this is a call event
    #[must_use]
    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call { .. })
    }
}

impl fmt::Display for SchedulerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = if self.is_delay() {
            DELAY_SUFFIX
        } else {
            CALL_SUFFIX
        };
        write!(f, "{RECORD_PREFIX}{}{suffix}", self.subject())
    }
}

/// Scheduler events of one run, in emission order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerLog {
    /// Recognized events
    pub events: Vec<SchedulerEvent>,
    /// Lines tagged as scheduler records that matched neither shape
    pub malformed_lines: usize,
}

impl SchedulerLog {
    /// Parse the captured output of one run
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut log = Self::default();

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let Some(start) = raw.find(RECORD_PREFIX) else {
                continue;
            };
            let record = raw[start + RECORD_PREFIX.len()..].trim_end();

            match classify(record, line) {
                Some(event) => log.events.push(event),
                None => {
                    log.malformed_lines += 1;
                    tracing::warn!(line, content = %raw, "skipping malformed scheduler record");
                }
            }
        }

        log
    }

    /// All delay events, in order
    pub fn delays(&self) -> impl Iterator<Item = &SchedulerEvent> {
        self.events.iter().filter(|e| e.is_delay())
    }

    /// All call events, in order
    pub fn calls(&self) -> impl Iterator<Item = &SchedulerEvent> {
        self.events.iter().filter(|e| e.is_call())
    }

    /// Number of delay events
    #[must_use]
    pub fn delay_count(&self) -> usize {
        self.delays().count()
    }

    /// Number of call events
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls().count()
    }

    /// Keep only events of the given subjects; an empty set keeps everything
    #[must_use]
    pub fn retain_subjects(mut self, subjects: &BTreeSet<String>) -> Self {
        if !subjects.is_empty() {
            self.events.retain(|e| subjects.contains(e.subject()));
        }
        self
    }
}

/// Parse one run's output into scheduler events, preserving emission order
///
/// Lines that are not scheduler records are ignored. An output without any
/// record yields an empty list.
#[must_use]
pub fn parse_scheduler_log(text: &str) -> Vec<SchedulerEvent> {
    SchedulerLog::parse(text).events
}

fn classify(record: &str, line: usize) -> Option<SchedulerEvent> {
    if let Some(subject) = record.strip_suffix(DELAY_SUFFIX) {
        return valid_subject(subject).map(|subject| SchedulerEvent::Delay { subject, line });
    }
    if let Some(subject) = record.strip_suffix(CALL_SUFFIX) {
        return valid_subject(subject).map(|subject| SchedulerEvent::Call { subject, line });
    }
    None
}

fn valid_subject(subject: &str) -> Option<String> {
    (!subject.is_empty() && !subject.contains(char::is_whitespace)).then(|| subject.to_string())
}

/// Scheduler activity of one configuration across its repetitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerLogSummary {
    /// Number of runs analysed
    pub runs: usize,
    /// Delay events over all runs
    pub total_delays: usize,
    /// Call events over all runs
    pub total_calls: usize,
    /// Mean delay events per run
    pub mean_delays: f64,
    /// Mean call events per run
    pub mean_calls: f64,
    /// Malformed scheduler lines over all runs
    pub malformed_lines: usize,
}

impl SchedulerLogSummary {
    /// Summarize captured outputs, optionally restricted to some subjects
    #[must_use]
    pub fn from_outputs(outputs: &[String], subjects: &BTreeSet<String>) -> Self {
        let mut summary = Self {
            runs: outputs.len(),
            ..Self::default()
        };

        for output in outputs {
            let log = SchedulerLog::parse(output);
            summary.malformed_lines += log.malformed_lines;
            let log = log.retain_subjects(subjects);
            summary.total_delays += log.delay_count();
            summary.total_calls += log.call_count();
        }

        if summary.runs > 0 {
            let runs = summary.runs as f64;
            summary.mean_delays = summary.total_delays as f64 / runs;
            summary.mean_calls = summary.total_calls as f64 / runs;
        }
        summary
    }
}
