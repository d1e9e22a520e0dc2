//! Medidor CLI - Overhead and Fidelity Measurement for Protocol Enforcement
//!
//! Measure a built program, score captured traces, and sweep both variants.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use medidor::fidelity::{FidelityAnalyzer, OrderCheck};
use medidor::measurement::{MeasurementConfig, MeasurementSummary, RepeatedMeasurement};
use medidor::report::{self, ReportFormat};
use medidor::sampler::{GnuTimeSource, ProcessSampler, TargetCommand};
use medidor::sweep::{FailurePolicy, ShellBuilder, Sweep, SweepConfig};
use medidor::trace::{SchedulerLog, SchedulerLogSummary, SequenceShape};
use medidor::{Error, Result};
use tracing::Level;

/// Medidor - Overhead and Fidelity Measurement for Protocol Enforcement
#[derive(Parser)]
#[command(name = "medidor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure one built program repeatedly
    Measure {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        measurement: MeasurementArgs,

        /// Label for logs and output
        #[arg(short, long, default_value = "measurement")]
        label: String,

        /// Score captured traces against this many methods per iteration
        #[arg(long, requires = "iterations")]
        methods: Option<usize>,

        /// Iterations of the expected invocation sequence
        #[arg(long, requires = "methods")]
        iterations: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: String,
    },

    /// Score captured outputs against the expected invocation sequence
    Fidelity {
        /// Files holding one captured run each
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Iterations of the expected sequence
        #[arg(short, long)]
        iterations: usize,

        /// Methods called per iteration
        #[arg(short, long)]
        methods: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: String,
    },

    /// Summarize scheduler delays and calls in captured outputs
    SchedulerLog {
        /// Files holding one captured run each
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Only count events of these classes
        #[arg(short, long)]
        subject: Vec<String>,

        /// Print every event
        #[arg(long)]
        events: bool,
    },

    /// Check that one marker is printed before another in every run
    Order {
        /// Files holding one captured run each
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Marker expected first
        #[arg(long)]
        first: String,

        /// Marker expected second
        #[arg(long)]
        then: String,
    },

    /// Build and measure both variants for a list of parameters
    Sweep {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        measurement: MeasurementArgs,

        /// Shell command preparing a variant (sees MEDIDOR_PARAMETER, MEDIDOR_VARIANT)
        #[arg(short, long)]
        build: String,

        /// Parameters to sweep (comma-separated)
        #[arg(short, long, value_delimiter = ',', default_value = "1,5,10,50,100,300,500")]
        parameters: Vec<u64>,

        /// Methods per iteration; the parameter becomes the iteration count
        #[arg(long)]
        methods: Option<usize>,

        /// Label prefix for each configuration
        #[arg(short, long, default_value = "sweep")]
        label: String,

        /// Record failed configurations and continue
        #[arg(long)]
        skip_failures: bool,

        /// Write records to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Record format (json, jsonl, table)
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Show a progress bar
        #[arg(long)]
        progress: bool,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Program to run
    program: String,

    /// Arguments passed to the program (after `--`)
    #[arg(last = true)]
    args: Vec<String>,

    /// Working directory of the program
    #[arg(short = 'C', long)]
    dir: Option<PathBuf>,
}

impl TargetArgs {
    fn command(&self) -> TargetCommand {
        let command = TargetCommand::new(&self.program).args(&self.args);
        match &self.dir {
            Some(dir) => command.current_dir(dir),
            None => command,
        }
    }
}

#[derive(Args)]
struct MeasurementArgs {
    /// Repetitions per configuration
    #[arg(short, long, default_value = "20")]
    repetitions: usize,

    /// Keep the output of every repetition
    #[arg(long)]
    traces: bool,

    /// Classes whose scheduler decisions are counted
    #[arg(short, long)]
    subject: Vec<String>,

    /// Per-run timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Treat a non-zero exit status of the program as a failure
    #[arg(long)]
    fail_on_nonzero_exit: bool,

    /// Timing source (perf, time)
    #[arg(long, default_value = "perf")]
    timing: String,
}

impl MeasurementArgs {
    fn config(&self, label: &str) -> Result<MeasurementConfig> {
        let mut config = MeasurementConfig::new(label)
            .repetitions(self.repetitions)
            .with_traces(self.traces)
            .fail_on_nonzero_exit(self.fail_on_nonzero_exit);
        for subject in &self.subject {
            config = config.log_subject(subject);
        }
        if let Some(seconds) = self.timeout {
            let timeout = Duration::try_from_secs_f64(seconds)
                .map_err(|e| Error::Configuration(format!("invalid timeout {seconds}: {e}")))?;
            config = config.with_timeout(timeout);
        }
        Ok(config)
    }

    fn driver(&self) -> Result<RepeatedMeasurement> {
        let sampler = match self.timing.as_str() {
            "perf" => ProcessSampler::new(),
            "time" => ProcessSampler::new().with_timing_source(Box::new(GnuTimeSource::new())),
            other => {
                return Err(Error::Configuration(format!(
                    "unknown timing source '{other}' (expected perf or time)"
                )))
            }
        };
        Ok(RepeatedMeasurement::new().with_sampler(Box::new(sampler)))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::too_many_lines)]
fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Measure {
            target,
            measurement,
            label,
            methods,
            iterations,
            output,
        } => {
            let shape = methods
                .zip(iterations)
                .map(|(methods, iterations)| SequenceShape::new(iterations, methods));
            let config = measurement.config(&label)?.with_traces(measurement.traces || shape.is_some());
            let summary = measurement.driver()?.run(&config, &target.command())?;

            let fidelity = shape
                .map(|shape| FidelityAnalyzer::new(shape)?.report(summary.traces()))
                .transpose()?;
            let scheduler = summary
                .captured_outputs
                .as_ref()
                .map(|outputs| SchedulerLogSummary::from_outputs(outputs, &config.logged_subjects));

            if output == "json" {
                let value = serde_json::json!({
                    "summary": without_outputs(&summary),
                    "fidelity": fidelity,
                    "scheduler": scheduler,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_summary(&summary);
                if let Some(report) = &fidelity {
                    println!("  Mean edit distance:  {:.2}", report.mean_edit_distance);
                    println!("  Mean relative edits: {:.4}", report.mean_relative_edit_rate);
                    println!("  Exact runs:          {}/{}", report.exact_runs(), report.runs);
                }
                if let Some(scheduler) = &scheduler {
                    println!("  Mean delays/run:     {:.2}", scheduler.mean_delays);
                    println!("  Mean calls/run:      {:.2}", scheduler.mean_calls);
                }
            }
        }

        Commands::Fidelity {
            files,
            iterations,
            methods,
            output,
        } => {
            let outputs = read_all(&files)?;
            let analyzer = FidelityAnalyzer::new(SequenceShape::new(iterations, methods))?;
            let report = analyzer.report(&outputs)?;

            if output == "json" {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Fidelity ({iterations} iterations × {methods} methods)");
                for (file, score) in files.iter().zip(&report.scores) {
                    println!(
                        "  {}: {} edits ({:.4})",
                        file.display(),
                        score.edit_distance,
                        score.relative_edit_rate
                    );
                }
                println!("  Mean edit distance:  {:.2}", report.mean_edit_distance);
                println!("  Mean relative edits: {:.4}", report.mean_relative_edit_rate);
            }
        }

        Commands::SchedulerLog {
            files,
            subject,
            events,
        } => {
            let subjects: BTreeSet<String> = subject.into_iter().collect();
            let outputs = read_all(&files)?;

            if events {
                for (file, text) in files.iter().zip(&outputs) {
                    let log = SchedulerLog::parse(text).retain_subjects(&subjects);
                    for event in &log.events {
                        println!("{}:{}: {event}", file.display(), event.line());
                    }
                }
            }

            let summary = SchedulerLogSummary::from_outputs(&outputs, &subjects);
            println!("Scheduler activity over {} runs", summary.runs);
            println!("  Delays: {} ({:.2}/run)", summary.total_delays, summary.mean_delays);
            println!("  Calls:  {} ({:.2}/run)", summary.total_calls, summary.mean_calls);
            if summary.malformed_lines > 0 {
                println!("  Malformed lines skipped: {}", summary.malformed_lines);
            }
        }

        Commands::Order { files, first, then } => {
            let check = OrderCheck::new(first, then)?;
            let tally = check.tally(&read_all(&files)?);
            println!(
                "Invocation order failed {} out of {} times.",
                tally.violated,
                tally.total()
            );
            if tally.missing > 0 {
                println!("  {} runs did not print both markers", tally.missing);
            }
        }

        Commands::Sweep {
            target,
            measurement,
            build,
            parameters,
            methods,
            label,
            skip_failures,
            output,
            format,
            progress,
        } => {
            let format: ReportFormat = format.parse()?;
            let mut config = SweepConfig::new()
                .with_parameters(parameters)
                .with_measurement(measurement.config(&label)?)
                .with_failure_policy(if skip_failures {
                    FailurePolicy::Skip
                } else {
                    FailurePolicy::Abort
                })
                .with_progress(progress);
            if let Some(methods) = methods {
                config = config.with_methods(methods);
            }

            let mut builder = ShellBuilder::new(build);
            if let Some(dir) = &target.dir {
                builder = builder.current_dir(dir);
            }
            let sweep = Sweep::new(Box::new(builder)).with_measurement(measurement.driver()?);
            let outcome = sweep.run(&config, &target.command())?;
            let records = report::records(&outcome);

            match &output {
                Some(path) => report::export(&records, path, format)?,
                None => match format {
                    ReportFormat::Table => print!("{}", report::format_table(&records)),
                    ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                    ReportFormat::Jsonl => report::write_jsonl(std::io::stdout().lock(), &records)?,
                },
            }

            for failure in &outcome.failures {
                eprintln!(
                    "Skipped parameter {} ({}): {}",
                    failure.parameter, failure.variant, failure.message
                );
            }
        }
    }

    Ok(())
}

fn read_all(files: &[PathBuf]) -> Result<Vec<String>> {
    files.iter().map(PathBuf::as_path).map(read_file).collect()
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })
}

fn without_outputs(summary: &MeasurementSummary) -> MeasurementSummary {
    let mut summary = summary.clone();
    summary.captured_outputs = None;
    summary
}

fn print_summary(summary: &MeasurementSummary) {
    println!("Measurement '{}' ({} runs)", summary.label, summary.sample_count);
    println!("  Mean real time:      {:.4}s", summary.mean_real_time_seconds);
    println!("  Mean user time:      {:.4}s", summary.mean_user_time_seconds);
    println!("  Mean sys time:       {:.4}s", summary.mean_sys_time_seconds);
    println!("  Mean peak RSS:       {:.0} KB", summary.mean_peak_resident_kb);
    if summary.nonzero_exit_count > 0 {
        println!("  Unsuccessful exits:  {}", summary.nonzero_exit_count);
    }
}
