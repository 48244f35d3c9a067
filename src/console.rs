/// Terminal rendering of runs: header, live timeline, stop notices and the
/// final status line.
use crate::milestone::Phase;
use crate::report::{format_event_line, format_milestone_line, OutputEvent, RunOutcome, RunReport};
use crate::run_spec::RunSpec;
use crate::supervisor::{RunObserver, StopReason};

pub const RED: &str = "\x1b[0;31m";
pub const GREEN: &str = "\x1b[0;32m";
pub const YELLOW: &str = "\x1b[0;33m";
pub const NC: &str = "\x1b[0m";

/// Streams each run to stdout as it happens.
pub struct ConsoleObserver {
    quiet: bool,
}

impl ConsoleObserver {
    /// `quiet` hides the header and per-line output; stop notices still print.
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl RunObserver for ConsoleObserver {
    fn on_start(&mut self, spec: &RunSpec, pid: Option<u32>) {
        if self.quiet {
            return;
        }
        println!("Command: {}", spec.command_line());
        if let Some(pid) = pid {
            println!("PID: {pid}");
        }
        println!(
            "Stall timeout: {}s of silence",
            spec.stall_timeout().as_secs_f64()
        );
        println!("{}", "-".repeat(50));
    }

    fn on_output(&mut self, event: &OutputEvent, phase: Option<Phase>) {
        if self.quiet {
            return;
        }
        println!("{}", format_event_line(event));
        if let Some(phase) = phase {
            println!("{YELLOW}{}{NC}", format_milestone_line(phase, &event.text));
        }
    }

    fn on_stop(&mut self, reason: &StopReason) {
        match reason {
            StopReason::Stalled { age } => println!(
                "\n{RED}!!! TIMEOUT: no output for {:.1}s, stopping job !!!{NC}",
                age.as_secs_f64()
            ),
            StopReason::Interrupted => println!("\n{RED}Interrupted. Stopping job...{NC}"),
            StopReason::StreamFailed { reason } => {
                println!("\n{RED}Output stream failed ({reason}). Stopping job...{NC}")
            }
        }
    }
}

pub fn print_run_banner(index: usize, total: usize, size: u32) {
    println!("\n{GREEN}=== Run {}/{}: size {size} ==={NC}", index + 1, total);
}

/// Colored final status line for a sealed report.
pub fn print_status(report: &RunReport) {
    let color = match report.outcome() {
        Some(RunOutcome::Completed { exit_code: 0 }) => GREEN,
        Some(RunOutcome::Completed { .. }) => YELLOW,
        _ => RED,
    };
    println!("\n{color}{}{NC}", report.summary_line());
    if report.milestone_count() > 0 {
        let phases: Vec<String> = report
            .milestones()
            .iter()
            .map(|m| m.phase.to_string())
            .collect();
        println!(
            "Milestones reached: {} ({})",
            report.milestone_count(),
            phases.join(", ")
        );
    }
}

/// Full rendered timeline of one run, with its command and wall-clock span.
pub fn print_timeline(size: u32, report: &RunReport) {
    println!("\n{GREEN}=== Timeline: size {size} ==={NC}");
    println!("Command: {}", report.command());
    if let Some(pid) = report.pid() {
        println!("PID: {pid}");
    }
    let ended = report
        .ended_at()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    println!("Started: {}  Ended: {ended}", report.started_at().to_rfc3339());
    print!("{}", report.render_timeline());
}
