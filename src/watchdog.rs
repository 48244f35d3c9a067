/// Output-silence monitor for supervised runs.
///
/// Runs inside the supervisor's polling loop. The supervisor records every
/// output line; if no line is seen for longer than the per-run threshold the
/// run is considered stalled.
use std::time::{Duration, Instant};

/// Returns `true` when strictly more than `threshold` has passed since
/// `last_output`. Exactly `threshold` of silence is not a stall.
pub fn is_stalled(now: Instant, last_output: Instant, threshold: Duration) -> bool {
    now.saturating_duration_since(last_output) > threshold
}

#[derive(Debug, Clone)]
pub struct StallDetector {
    threshold: Duration,
    last_output: Instant,
}

impl StallDetector {
    /// Start watching from `started` (the run start counts as output).
    pub fn new(threshold: Duration, started: Instant) -> Self {
        Self {
            threshold,
            last_output: started,
        }
    }

    /// Reset the silence clock.
    pub fn record_output(&mut self, at: Instant) {
        if at > self.last_output {
            self.last_output = at;
        }
    }

    /// Age of the last output if the run is stalled, `None` otherwise.
    pub fn stalled_for(&self, now: Instant) -> Option<Duration> {
        if is_stalled(now, self.last_output, self.threshold) {
            Some(now.saturating_duration_since(self.last_output))
        } else {
            None
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}
