mod real_processes;
mod repeated_runs;
