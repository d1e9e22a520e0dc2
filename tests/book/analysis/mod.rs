mod fidelity;
mod scheduler_logs;
