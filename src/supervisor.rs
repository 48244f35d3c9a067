/// Supervised run: spawn the job, drain its merged output, watch for
/// stalls and interrupts, and escalate termination when needed.
///
/// One `Supervisor` drives exactly one run. It owns the child, its output
/// stream and the report for the whole run, and always returns a sealed
/// report with the child no longer running.
use crate::clock::{Clock, SystemClock};
use crate::escalation::{Escalation, EscalationAction, EscalationState};
use crate::milestone::{self, Phase};
use crate::report::{OutputEvent, ReportError, RunOutcome, RunReport};
use crate::run_spec::RunSpec;
use crate::session::{ChildProcess, DrainEnd, LineRead, SessionError};
use crate::signals::Interrupt;
use crate::watchdog::StallDetector;
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Timing knobs shared by every run of a harness invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Sleep between polls when no output is pending.
    pub poll_interval: Duration,
    /// Wait between SIGTERM and SIGKILL.
    pub grace_period: Duration,
    /// How long to wait for trailing output after the child exits.
    pub drain_timeout: Duration,
    /// How long to wait for the kernel to reap a SIGKILLed child.
    pub reap_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            grace_period: Duration::from_secs(2),
            drain_timeout: Duration::from_secs(5),
            reap_timeout: Duration::from_secs(5),
        }
    }
}

/// Why the supervisor decided to stop a still-running child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Stalled { age: Duration },
    Interrupted,
    StreamFailed { reason: String },
}

/// Hooks for streaming a run as it happens. All methods default to no-ops.
pub trait RunObserver {
    fn on_start(&mut self, _spec: &RunSpec, _pid: Option<u32>) {}
    fn on_output(&mut self, _event: &OutputEvent, _phase: Option<Phase>) {}
    fn on_stop(&mut self, _reason: &StopReason) {}
}

/// Observer that ignores everything.
#[cfg(test)]
pub struct NullObserver;

#[cfg(test)]
impl RunObserver for NullObserver {}

/// Errors reported directly to the caller instead of captured in the report.
#[derive(Debug)]
pub enum SupervisorError {
    /// The RunSpec violates a precondition (e.g. zero stall timeout).
    InvalidSpec(String),
    /// Contract misuse: a second run on one supervisor, or a report
    /// mutated after sealing.
    InvalidState(String),
    /// The job could not be launched.
    Spawn(SessionError),
}

impl std::fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorError::InvalidSpec(msg) => write!(f, "invalid run spec: {}", msg),
            SupervisorError::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            SupervisorError::Spawn(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SupervisorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SupervisorError::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SessionError> for SupervisorError {
    fn from(e: SessionError) -> Self {
        SupervisorError::Spawn(e)
    }
}

impl From<ReportError> for SupervisorError {
    fn from(e: ReportError) -> Self {
        SupervisorError::InvalidState(e.to_string())
    }
}

pub struct Supervisor<C: Clock = SystemClock> {
    clock: C,
    settings: SupervisorSettings,
    interrupt: Interrupt,
    used: bool,
}

impl Supervisor<SystemClock> {
    pub fn new(settings: SupervisorSettings, interrupt: Interrupt) -> Self {
        Self::with_clock(SystemClock, settings, interrupt)
    }
}

impl<C: Clock> Supervisor<C> {
    pub fn with_clock(clock: C, settings: SupervisorSettings, interrupt: Interrupt) -> Self {
        Self {
            clock,
            settings,
            interrupt,
            used: false,
        }
    }

    /// Run the job described by `spec` to a sealed report.
    ///
    /// Spawn failures and contract violations are returned as errors; every
    /// other ending (exit, stall, interrupt, stream failure) is captured in
    /// the report's outcome.
    pub async fn run(
        &mut self,
        spec: &RunSpec,
        observer: &mut dyn RunObserver,
    ) -> Result<RunReport, SupervisorError> {
        if self.used {
            return Err(SupervisorError::InvalidState(
                "supervisor already ran; use one supervisor per run".to_string(),
            ));
        }
        if spec.executable().is_empty() {
            return Err(SupervisorError::InvalidSpec("executable is empty".to_string()));
        }
        if spec.stall_timeout().is_zero() {
            return Err(SupervisorError::InvalidSpec(
                "stall timeout must be greater than zero".to_string(),
            ));
        }
        self.used = true;

        let mut child = ChildProcess::spawn(spec)?;
        let start = self.clock.now();
        let mut report = RunReport::new(spec.command_line(), child.pid(), Utc::now());
        let mut detector = StallDetector::new(spec.stall_timeout(), start);
        let mut stream_open = true;
        observer.on_start(spec, child.pid());

        let outcome = loop {
            match child.try_wait() {
                Ok(Some(exit_code)) => {
                    self.drain_remaining(
                        &mut child,
                        &mut report,
                        &mut detector,
                        start,
                        true,
                        observer,
                    )
                    .await?;
                    info!(pid = ?child.pid(), exit_code, "job exited");
                    break RunOutcome::Completed { exit_code };
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(pid = ?child.pid(), error = %e, "failed to query job status");
                    let reason = format!("failed to query job status: {e}");
                    observer.on_stop(&StopReason::StreamFailed {
                        reason: reason.clone(),
                    });
                    self.escalate(&mut child, &mut report).await?;
                    break RunOutcome::Errored { reason };
                }
            }

            if self.interrupt.is_triggered() {
                warn!(pid = ?child.pid(), "interrupt received, stopping job");
                observer.on_stop(&StopReason::Interrupted);
                self.escalate(&mut child, &mut report).await?;
                self.drain_remaining(
                    &mut child,
                    &mut report,
                    &mut detector,
                    start,
                    false,
                    observer,
                )
                .await?;
                break RunOutcome::Interrupted;
            }

            if stream_open {
                match child.try_read_line() {
                    LineRead::Line(line) => {
                        self.record_line(&mut report, &mut detector, start, line, observer)?;
                        continue;
                    }
                    LineRead::Pending => {}
                    LineRead::Closed => {
                        debug!(pid = ?child.pid(), "output stream closed, waiting for exit");
                        stream_open = false;
                    }
                    LineRead::Failed(e) => {
                        break self
                            .degraded_completion(&mut child, &mut report, e, observer)
                            .await?;
                    }
                }
            }

            let now = self.clock.now();
            if let Some(age) = detector.stalled_for(now) {
                warn!(
                    pid = ?child.pid(),
                    age_ms = age.as_millis() as u64,
                    threshold_ms = detector.threshold().as_millis() as u64,
                    "no output within stall timeout, stopping job"
                );
                observer.on_stop(&StopReason::Stalled { age });
                self.escalate(&mut child, &mut report).await?;
                self.drain_remaining(
                    &mut child,
                    &mut report,
                    &mut detector,
                    start,
                    true,
                    observer,
                )
                .await?;
                break RunOutcome::TimedOut {
                    last_output_age: age,
                };
            }

            self.clock.sleep(self.settings.poll_interval).await;
        };

        let elapsed = self.clock.now().saturating_duration_since(start);
        report.seal(outcome, elapsed)?;
        info!(
            lines = report.events().len(),
            milestones = report.milestone_count(),
            elapsed_secs = report.total_elapsed().as_secs_f64(),
            "{}",
            report.summary_line()
        );
        Ok(report)
    }

    fn record_line(
        &self,
        report: &mut RunReport,
        detector: &mut StallDetector,
        start: Instant,
        line: String,
        observer: &mut dyn RunObserver,
    ) -> Result<(), ReportError> {
        let now = self.clock.now();
        detector.record_output(now);
        let phase = milestone::classify(&line);
        let event = report.push_line(line, now.saturating_duration_since(start), phase)?;
        if let Some(phase) = phase {
            info!(%phase, elapsed_secs = event.elapsed.as_secs_f64(), "milestone reached");
        }
        observer.on_output(event, phase);
        Ok(())
    }

    /// Record output still in the pipe once the child is gone.
    ///
    /// With `stop_on_interrupt` the wait ends as soon as an interrupt
    /// arrives. If the pipe is still held open afterwards, whatever remains
    /// of the job's process group is killed.
    async fn drain_remaining(
        &self,
        child: &mut ChildProcess,
        report: &mut RunReport,
        detector: &mut StallDetector,
        start: Instant,
        stop_on_interrupt: bool,
        observer: &mut dyn RunObserver,
    ) -> Result<(), ReportError> {
        let interrupt = &self.interrupt;
        let (lines, end) = child
            .drain(self.settings.drain_timeout, || {
                stop_on_interrupt && interrupt.is_triggered()
            })
            .await;
        for line in lines {
            self.record_line(report, detector, start, line, observer)?;
        }
        if end == DrainEnd::Cancelled {
            warn!(pid = ?child.pid(), "interrupt received while collecting trailing output");
        }
        if end.pipe_still_held() {
            if let Err(e) = child.kill_leftover_group() {
                warn!(pid = ?child.pid(), error = %e, "failed to kill leftover job processes");
            }
        }
        Ok(())
    }

    /// SIGTERM, wait up to the grace period, then SIGKILL.
    ///
    /// Signal failures are logged and recorded; they never abort the run.
    async fn escalate(
        &self,
        child: &mut ChildProcess,
        report: &mut RunReport,
    ) -> Result<(), ReportError> {
        let mut escalation = Escalation::new(self.settings.grace_period);
        loop {
            let exited = match child.try_wait() {
                Ok(status) => status.is_some(),
                Err(e) => {
                    warn!(pid = ?child.pid(), error = %e, "status check failed during escalation");
                    escalation.record_failure(format!("status check: {e}"));
                    false
                }
            };
            match escalation.advance(self.clock.now(), exited) {
                EscalationAction::SendTerminate => {
                    if let Err(e) = child.terminate() {
                        warn!(pid = ?child.pid(), error = %e, "failed to send SIGTERM");
                        escalation.record_failure(format!("SIGTERM: {e}"));
                    }
                }
                EscalationAction::SendKill => {
                    warn!(
                        pid = ?child.pid(),
                        grace_ms = self.settings.grace_period.as_millis() as u64,
                        "job still running after grace period, sending SIGKILL"
                    );
                    if let Err(e) = child.kill(self.settings.reap_timeout).await {
                        warn!(pid = ?child.pid(), error = %e, "failed to send SIGKILL");
                        escalation.record_failure(format!("SIGKILL: {e}"));
                    }
                }
                EscalationAction::Wait => self.clock.sleep(self.settings.poll_interval).await,
                EscalationAction::Done => break,
            }
        }
        if escalation.state() == EscalationState::Unresponsive {
            error!(pid = ?child.pid(), "job exit not confirmed after SIGKILL");
        }
        report.attach_escalation(escalation.into_record())
    }

    /// The output stream broke before the child exited. Prefer a real exit
    /// code if one shows up within the grace period.
    async fn degraded_completion(
        &self,
        child: &mut ChildProcess,
        report: &mut RunReport,
        cause: std::io::Error,
        observer: &mut dyn RunObserver,
    ) -> Result<RunOutcome, ReportError> {
        warn!(pid = ?child.pid(), error = %cause, "output stream failed before job exit");
        let deadline = self.clock.now() + self.settings.grace_period;
        loop {
            match child.try_wait() {
                Ok(Some(exit_code)) => return Ok(RunOutcome::Completed { exit_code }),
                Ok(None) => {}
                Err(e) => {
                    warn!(pid = ?child.pid(), error = %e, "failed to query job status");
                    break;
                }
            }
            if self.clock.now() >= deadline {
                break;
            }
            self.clock.sleep(self.settings.poll_interval).await;
        }

        let reason = format!("output stream failed: {cause}");
        observer.on_stop(&StopReason::StreamFailed {
            reason: reason.clone(),
        });
        self.escalate(child, report).await?;
        Ok(RunOutcome::Errored { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    fn fast_settings() -> SupervisorSettings {
        SupervisorSettings {
            poll_interval: Duration::from_millis(20),
            grace_period: Duration::from_millis(300),
            drain_timeout: Duration::from_secs(2),
            reap_timeout: Duration::from_secs(5),
        }
    }

    fn sh(script: &str, stall: Duration) -> RunSpec {
        RunSpec::new("sh", stall).args(["-c", script])
    }

    fn assert_not_running(pid: u32) {
        assert_eq!(kill(Pid::from_raw(pid as i32), None), Err(Errno::ESRCH));
    }

    /// Wait until an orphaned process has exited. A zombie still waiting for
    /// its new parent to reap it counts as gone.
    async fn wait_gone(pid: u32) {
        for _ in 0..200 {
            match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
                Err(_) => return,
                Ok(stat) => {
                    let state = stat.rsplit(')').next().and_then(|rest| rest.trim().chars().next());
                    if state == Some('Z') {
                        return;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("process {pid} still running");
    }

    #[derive(Default)]
    struct Recorder {
        started: bool,
        lines: Vec<(String, Option<Phase>)>,
        stops: Vec<StopReason>,
    }

    impl RunObserver for Recorder {
        fn on_start(&mut self, _spec: &RunSpec, _pid: Option<u32>) {
            self.started = true;
        }
        fn on_output(&mut self, event: &OutputEvent, phase: Option<Phase>) {
            self.lines.push((event.text.clone(), phase));
        }
        fn on_stop(&mut self, reason: &StopReason) {
            self.stops.push(reason.clone());
        }
    }

    #[tokio::test]
    async fn test_single_milestone_line_then_exit_zero() {
        let spec = sh("echo 'starting db query'", Duration::from_secs(30));
        let mut supervisor = Supervisor::new(fast_settings(), Interrupt::new());
        let report = supervisor.run(&spec, &mut NullObserver).await.unwrap();

        assert_eq!(report.outcome(), Some(&RunOutcome::Completed { exit_code: 0 }));
        assert_eq!(report.events().len(), 1);
        assert_eq!(report.events()[0].text, "starting db query");
        assert_eq!(report.milestone_count(), 1);
        assert_eq!(report.milestones()[0].phase, Phase::QueryStarted);
        assert!(report.escalation().is_none());
        assert!(report.succeeded());
    }

    #[tokio::test]
    async fn test_silent_exit_two() {
        let spec = sh("exit 2", Duration::from_secs(30));
        let mut supervisor = Supervisor::new(fast_settings(), Interrupt::new());
        let report = supervisor.run(&spec, &mut NullObserver).await.unwrap();

        assert_eq!(report.outcome(), Some(&RunOutcome::Completed { exit_code: 2 }));
        assert!(report.events().is_empty());
        assert_eq!(report.milestone_count(), 0);
        assert!(!report.succeeded());
    }

    #[tokio::test]
    async fn test_silent_hung_child_times_out_on_virtual_clock() {
        let clock = ManualClock::new();
        let spec = RunSpec::new("sleep", Duration::from_secs(30)).args(["1000"]);
        let mut supervisor =
            Supervisor::with_clock(clock.clone(), SupervisorSettings::default(), Interrupt::new());
        let report = supervisor.run(&spec, &mut NullObserver).await.unwrap();

        match report.outcome() {
            Some(RunOutcome::TimedOut { last_output_age }) => {
                assert!(*last_output_age > Duration::from_secs(30));
                assert!(*last_output_age <= Duration::from_millis(30_100));
            }
            other => panic!("expected TimedOut, got {other:?}"),
        }
        assert!(clock.elapsed() > Duration::from_secs(30));
        let escalation = report.escalation().unwrap();
        assert!(escalation.terminate_sent);
        assert!(escalation.exit_confirmed);
        assert!(report.events().is_empty());
        assert_not_running(report.pid().unwrap());
    }

    #[tokio::test]
    async fn test_sigterm_ignoring_child_is_killed_after_grace() {
        let spec = sh(
            "trap '' TERM; echo ready; sleep 30",
            Duration::from_millis(400),
        );
        let mut supervisor = Supervisor::new(fast_settings(), Interrupt::new());
        let mut recorder = Recorder::default();
        let report = supervisor.run(&spec, &mut recorder).await.unwrap();

        assert!(matches!(
            report.outcome(),
            Some(RunOutcome::TimedOut { .. })
        ));
        let escalation = report.escalation().unwrap();
        assert!(escalation.terminate_sent);
        assert!(escalation.kill_sent);
        assert!(escalation.exit_confirmed);
        assert!(escalation.failures.is_empty());
        assert_eq!(report.events().len(), 1);
        assert!(matches!(
            recorder.stops.as_slice(),
            [StopReason::Stalled { .. }]
        ));
        assert!(report.summary_line().starts_with("TIMEOUT: no output for"));
        assert_not_running(report.pid().unwrap());
    }

    #[tokio::test]
    async fn test_interrupt_stops_running_child() {
        let interrupt = Interrupt::new();
        let trigger = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.trigger();
        });

        let spec = RunSpec::new("sleep", Duration::from_secs(30)).args(["30"]);
        let mut supervisor = Supervisor::new(fast_settings(), interrupt);
        let mut recorder = Recorder::default();
        let report = supervisor.run(&spec, &mut recorder).await.unwrap();

        assert_eq!(report.outcome(), Some(&RunOutcome::Interrupted));
        assert_eq!(recorder.stops, vec![StopReason::Interrupted]);
        assert!(report.escalation().unwrap().exit_confirmed);
        assert!(report.total_elapsed() < Duration::from_secs(5));
        assert_not_running(report.pid().unwrap());
    }

    #[tokio::test]
    async fn test_output_resets_stall_clock() {
        // Total runtime exceeds the stall timeout, but no single gap does.
        let spec = sh(
            "for i in 1 2 3 4 5; do echo tick $i; sleep 0.1; done",
            Duration::from_millis(400),
        );
        let mut supervisor = Supervisor::new(fast_settings(), Interrupt::new());
        let report = supervisor.run(&spec, &mut NullObserver).await.unwrap();
        assert_eq!(report.outcome(), Some(&RunOutcome::Completed { exit_code: 0 }));
        assert_eq!(report.events().len(), 5);
    }

    #[tokio::test]
    async fn test_carriage_return_progress_counts_as_output() {
        // Progress redrawn with bare `\r` every 0.2s; no newline until the end.
        let spec = sh(
            "for i in 1 2 3 4 5 6 7 8; do printf '\\rprogress %d' $i; sleep 0.2; done; echo",
            Duration::from_millis(600),
        );
        let mut supervisor = Supervisor::new(fast_settings(), Interrupt::new());
        let report = supervisor.run(&spec, &mut NullObserver).await.unwrap();

        assert_eq!(report.outcome(), Some(&RunOutcome::Completed { exit_code: 0 }));
        let texts: Vec<&str> = report.events().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts.first(), Some(&""));
        assert_eq!(texts.last(), Some(&"progress 8"));
        assert_eq!(texts.len(), 9);
    }

    #[tokio::test]
    async fn test_background_descendant_killed_after_drain_timeout() {
        let spec = sh("sleep 60 & echo $!", Duration::from_secs(30));
        let mut supervisor = Supervisor::new(fast_settings(), Interrupt::new());
        let started = std::time::Instant::now();
        let report = supervisor.run(&spec, &mut NullObserver).await.unwrap();

        assert_eq!(report.outcome(), Some(&RunOutcome::Completed { exit_code: 0 }));
        assert!(started.elapsed() < Duration::from_secs(10));
        let background: u32 = report.events()[0].text.parse().unwrap();
        wait_gone(background).await;
    }

    #[tokio::test]
    async fn test_interrupt_ends_drain_after_exit() {
        let interrupt = Interrupt::new();
        let trigger = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.trigger();
        });

        let spec = sh("sleep 60 & echo $!", Duration::from_secs(30));
        let settings = SupervisorSettings {
            drain_timeout: Duration::from_secs(30),
            ..fast_settings()
        };
        let mut supervisor = Supervisor::new(settings, interrupt);
        let started = std::time::Instant::now();
        let report = supervisor.run(&spec, &mut NullObserver).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.outcome(), Some(&RunOutcome::Completed { exit_code: 0 }));
        let background: u32 = report.events()[0].text.parse().unwrap();
        wait_gone(background).await;
    }

    #[tokio::test]
    async fn test_milestones_stream_in_order() {
        let script = "echo 'Building data from scratch'; \
                      echo 'Starting db query'; \
                      echo 'rows fetched'; \
                      echo 'DB query finished'; \
                      echo 'loaded static_data'; \
                      echo 'Extracting vitals' >&2";
        let spec = sh(script, Duration::from_secs(30));
        let mut supervisor = Supervisor::new(fast_settings(), Interrupt::new());
        let mut recorder = Recorder::default();
        let report = supervisor.run(&spec, &mut recorder).await.unwrap();

        assert!(recorder.started);
        let phases: Vec<Phase> = report.milestones().iter().map(|m| m.phase).collect();
        assert_eq!(
            phases,
            vec![
                Phase::BuildStarted,
                Phase::QueryStarted,
                Phase::QueryFinished,
                Phase::StaticDataLoaded,
                Phase::ExtractionPhase,
            ]
        );
        assert_eq!(report.events().len(), 6);
        assert_eq!(recorder.lines.len(), 6);
        assert_eq!(recorder.lines[2], ("rows fetched".to_string(), None));
        for pair in report.events().windows(2) {
            assert_eq!(pair[1].since_previous, pair[1].elapsed - pair[0].elapsed);
        }
    }

    #[tokio::test]
    async fn test_second_run_is_invalid_state() {
        let spec = sh("exit 0", Duration::from_secs(30));
        let mut supervisor = Supervisor::new(fast_settings(), Interrupt::new());
        supervisor.run(&spec, &mut NullObserver).await.unwrap();
        let err = supervisor.run(&spec, &mut NullObserver).await.unwrap_err();
        assert!(matches!(err, SupervisorError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_zero_stall_timeout_rejected() {
        let spec = sh("exit 0", Duration::ZERO);
        let mut supervisor = Supervisor::new(fast_settings(), Interrupt::new());
        let err = supervisor.run(&spec, &mut NullObserver).await.unwrap_err();
        assert!(matches!(err, SupervisorError::InvalidSpec(_)));
        assert!(err.to_string().contains("stall timeout"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_returned() {
        let spec = RunSpec::new("nonexistent-binary-xyz", Duration::from_secs(1));
        let mut supervisor = Supervisor::new(fast_settings(), Interrupt::new());
        let err = supervisor.run(&spec, &mut NullObserver).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn(SessionError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_env_overrides_do_not_touch_own_environment() {
        let spec = sh("echo $STALLWATCH_TEST_ONLY", Duration::from_secs(30))
            .env("STALLWATCH_TEST_ONLY", "child-only");
        let mut supervisor = Supervisor::new(fast_settings(), Interrupt::new());
        let report = supervisor.run(&spec, &mut NullObserver).await.unwrap();
        assert_eq!(report.events()[0].text, "child-only");
        assert!(std::env::var("STALLWATCH_TEST_ONLY").is_err());
    }

    #[tokio::test]
    async fn test_concurrent_supervisors_are_independent() {
        let a = sh("echo a; exit 3", Duration::from_secs(30));
        let b = sh("echo b; echo extracting b", Duration::from_secs(30));
        let mut sup_a = Supervisor::new(fast_settings(), Interrupt::new());
        let mut sup_b = Supervisor::new(fast_settings(), Interrupt::new());
        let (mut obs_a, mut obs_b) = (NullObserver, NullObserver);
        let (ra, rb) = tokio::join!(sup_a.run(&a, &mut obs_a), sup_b.run(&b, &mut obs_b));
        let (ra, rb) = (ra.unwrap(), rb.unwrap());

        assert_eq!(ra.outcome(), Some(&RunOutcome::Completed { exit_code: 3 }));
        assert_eq!(ra.events().len(), 1);
        assert_eq!(rb.outcome(), Some(&RunOutcome::Completed { exit_code: 0 }));
        assert_eq!(rb.events().len(), 2);
        assert_eq!(rb.milestone_count(), 1);
    }
}
