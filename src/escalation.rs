/// Graceful-then-forceful termination as an explicit state machine.
///
/// ```text
/// Running -> TerminateRequested -> KillRequested -> Exited
///                                              \-> Unresponsive
/// ```
///
/// The machine only decides; the supervisor performs the signal sends and
/// feeds back whether the child has exited. Time comes from the caller, so
/// the grace period can be driven by a virtual clock.
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationState {
    Running,
    TerminateRequested { at: Instant },
    KillRequested { at: Instant },
    Exited,
    /// Kill was sent but the exit was never observed within the grace period.
    Unresponsive,
}

/// What the driver should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationAction {
    SendTerminate,
    SendKill,
    Wait,
    Done,
}

/// What escalation actually did, kept on the run report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EscalationRecord {
    pub terminate_sent: bool,
    pub kill_sent: bool,
    pub exit_confirmed: bool,
    /// Signal send failures. Logged and kept, never fatal.
    pub failures: Vec<String>,
}

#[derive(Debug)]
pub struct Escalation {
    state: EscalationState,
    grace_period: Duration,
    record: EscalationRecord,
}

impl Escalation {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            state: EscalationState::Running,
            grace_period,
            record: EscalationRecord::default(),
        }
    }

    pub fn state(&self) -> EscalationState {
        self.state
    }

    /// Step the machine given the current time and whether the child is gone.
    pub fn advance(&mut self, now: Instant, child_exited: bool) -> EscalationAction {
        if matches!(
            self.state,
            EscalationState::Exited | EscalationState::Unresponsive
        ) {
            return EscalationAction::Done;
        }
        if child_exited {
            self.state = EscalationState::Exited;
            self.record.exit_confirmed = true;
            return EscalationAction::Done;
        }

        match self.state {
            EscalationState::Running => {
                self.state = EscalationState::TerminateRequested { at: now };
                self.record.terminate_sent = true;
                EscalationAction::SendTerminate
            }
            EscalationState::TerminateRequested { at } => {
                if now.saturating_duration_since(at) >= self.grace_period {
                    self.state = EscalationState::KillRequested { at: now };
                    self.record.kill_sent = true;
                    EscalationAction::SendKill
                } else {
                    EscalationAction::Wait
                }
            }
            EscalationState::KillRequested { at } => {
                if now.saturating_duration_since(at) >= self.grace_period {
                    self.state = EscalationState::Unresponsive;
                    EscalationAction::Done
                } else {
                    EscalationAction::Wait
                }
            }
            EscalationState::Exited | EscalationState::Unresponsive => EscalationAction::Done,
        }
    }

    pub fn record_failure(&mut self, failure: impl Into<String>) {
        self.record.failures.push(failure.into());
    }

    pub fn into_record(self) -> EscalationRecord {
        self.record
    }
}
