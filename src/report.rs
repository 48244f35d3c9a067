/// Per-run record: every output line with its timing, the milestones it
/// triggered, and the terminal outcome.
///
/// A report is appended to while the run is live and sealed exactly once
/// when the run ends. Appending to, or re-sealing, a sealed report is a
/// contract violation and returns [`ReportError`].
use crate::escalation::EscalationRecord;
use crate::milestone::Phase;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::time::Duration;

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// One observed line of child output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputEvent {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(serialize_with = "as_secs")]
    pub elapsed: Duration,
    #[serde(serialize_with = "as_secs")]
    pub since_previous: Duration,
}

/// A recognized phase boundary and the line that triggered it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Milestone {
    pub phase: Phase,
    pub event_index: usize,
    pub event: OutputEvent,
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The child exited on its own. Signal deaths report `128 + signal`.
    Completed { exit_code: i32 },
    /// No output for longer than the stall timeout; the child was terminated.
    TimedOut {
        #[serde(serialize_with = "as_secs")]
        last_output_age: Duration,
    },
    /// An external interrupt ended the run; the child was terminated.
    Interrupted,
    /// The output stream failed and no exit code could be obtained.
    Errored { reason: String },
}

impl RunOutcome {
    /// Only a zero exit code counts as success.
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed { exit_code: 0 })
    }
}

/// Misuse of a report after it was sealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    /// An output line arrived after the outcome was set.
    AppendAfterSeal,
    /// The outcome was already set.
    AlreadySealed,
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::AppendAfterSeal => {
                write!(f, "invalid state: cannot append output to a sealed run report")
            }
            ReportError::AlreadySealed => {
                write!(f, "invalid state: run report outcome is already set")
            }
        }
    }
}

impl std::error::Error for ReportError {}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    command: String,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    #[serde(serialize_with = "as_secs")]
    total_elapsed: Duration,
    events: Vec<OutputEvent>,
    milestones: Vec<Milestone>,
    outcome: Option<RunOutcome>,
    escalation: Option<EscalationRecord>,
}

impl RunReport {
    pub fn new(command: impl Into<String>, pid: Option<u32>, started_at: DateTime<Utc>) -> Self {
        Self {
            command: command.into(),
            pid,
            started_at,
            ended_at: None,
            total_elapsed: Duration::ZERO,
            events: Vec::new(),
            milestones: Vec::new(),
            outcome: None,
            escalation: None,
        }
    }

    /// Append one output line observed `elapsed` after the run started.
    ///
    /// Elapsed values are clamped so they never decrease; `since_previous`
    /// is always the difference of consecutive elapsed values (the first
    /// event measures from the run start).
    pub fn push_line(
        &mut self,
        text: impl Into<String>,
        elapsed: Duration,
        phase: Option<Phase>,
    ) -> Result<&OutputEvent, ReportError> {
        if self.is_sealed() {
            return Err(ReportError::AppendAfterSeal);
        }

        let previous = self.events.last().map(|e| e.elapsed).unwrap_or(Duration::ZERO);
        let elapsed = elapsed.max(previous);
        let event = OutputEvent {
            text: text.into(),
            timestamp: self.timestamp_at(elapsed),
            elapsed,
            since_previous: elapsed - previous,
        };

        let index = self.events.len();
        if let Some(phase) = phase {
            self.milestones.push(Milestone {
                phase,
                event_index: index,
                event: event.clone(),
            });
        }
        self.events.push(event);
        Ok(&self.events[index])
    }

    /// Record which termination signals were sent. Must precede sealing.
    pub fn attach_escalation(&mut self, record: EscalationRecord) -> Result<(), ReportError> {
        if self.is_sealed() {
            return Err(ReportError::AlreadySealed);
        }
        self.escalation = Some(record);
        Ok(())
    }

    /// Set the outcome. One-way; a second call fails.
    pub fn seal(&mut self, outcome: RunOutcome, elapsed: Duration) -> Result<(), ReportError> {
        if self.is_sealed() {
            return Err(ReportError::AlreadySealed);
        }
        let last = self.events.last().map(|e| e.elapsed).unwrap_or(Duration::ZERO);
        let elapsed = elapsed.max(last);
        self.total_elapsed = elapsed;
        self.ended_at = Some(self.timestamp_at(elapsed));
        self.outcome = Some(outcome);
        Ok(())
    }

    fn timestamp_at(&self, elapsed: Duration) -> DateTime<Utc> {
        let offset = chrono::Duration::from_std(elapsed).unwrap_or(chrono::Duration::zero());
        self.started_at + offset
    }

    pub fn is_sealed(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn total_elapsed(&self) -> Duration {
        self.total_elapsed
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    pub fn events(&self) -> &[OutputEvent] {
        &self.events
    }

    pub fn milestones(&self) -> &[Milestone] {
        &self.milestones
    }

    pub fn milestone_count(&self) -> usize {
        self.milestones.len()
    }

    pub fn escalation(&self) -> Option<&EscalationRecord> {
        self.escalation.as_ref()
    }

    /// True when sealed with `Completed { exit_code: 0 }`.
    pub fn succeeded(&self) -> bool {
        self.outcome.as_ref().is_some_and(RunOutcome::is_success)
    }

    /// Final status line. A stall reads differently from a failed exit.
    pub fn summary_line(&self) -> String {
        let total = self.total_elapsed.as_secs_f64();
        match &self.outcome {
            None => format!("RUNNING: {} lines so far", self.events.len()),
            Some(RunOutcome::Completed { exit_code }) => {
                format!("Process completed with exit code: {exit_code} (total {total:.1}s)")
            }
            Some(RunOutcome::TimedOut { last_output_age }) => {
                let last_at = self
                    .events
                    .last()
                    .map(|e| e.elapsed.as_secs_f64())
                    .unwrap_or(0.0);
                format!(
                    "TIMEOUT: no output for {:.1}s (total runtime {total:.1}s, last output at {last_at:.1}s)",
                    last_output_age.as_secs_f64()
                )
            }
            Some(RunOutcome::Interrupted) => format!("INTERRUPTED after {total:.1}s"),
            Some(RunOutcome::Errored { reason }) => {
                format!("ERROR: {reason} (after {total:.1}s)")
            }
        }
    }

    /// Chronological timeline with milestone annotations and the status line.
    pub fn render_timeline(&self) -> String {
        let mut out = String::new();
        let mut milestones = self.milestones.iter().peekable();
        for (index, event) in self.events.iter().enumerate() {
            out.push_str(&format_event_line(event));
            out.push('\n');
            while let Some(m) = milestones.next_if(|m| m.event_index == index) {
                out.push_str(&format_milestone_line(m.phase, &event.text));
                out.push('\n');
            }
        }
        out.push_str(&self.summary_line());
        out.push('\n');
        out
    }
}

/// `[  12.3s] (+ 0.4s) text`
pub fn format_event_line(event: &OutputEvent) -> String {
    format!(
        "[{:6.1}s] (+{:4.1}s) {}",
        event.elapsed.as_secs_f64(),
        event.since_previous.as_secs_f64(),
        event.text
    )
}

pub fn format_milestone_line(phase: Phase, line: &str) -> String {
    format!("    >> {}", phase.banner(line))
}
