/// Single child lifecycle: spawn the job subprocess with stdout and stderr
/// merged into one pipe, forward its output line by line, and deliver
/// termination signals to its process group.
use crate::run_spec::RunSpec;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;

/// Lines buffered between the pump task and the polling loop.
const LINE_CHANNEL_CAPACITY: usize = 1024;

/// How often a pending drain re-checks its cancel condition.
const DRAIN_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Errors that can occur while starting a child.
#[derive(Debug)]
pub enum SessionError {
    /// Failed to create or configure the merged output pipe.
    Pipe { source: std::io::Error },
    /// Failed to spawn the job subprocess.
    Spawn {
        command: String,
        source: std::io::Error,
    },
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Pipe { source } => {
                write!(f, "failed to set up output pipe: {}", source)
            }
            SessionError::Spawn { command, source } => {
                write!(f, "failed to spawn {}: {}", command, source)
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Pipe { source } => Some(source),
            SessionError::Spawn { source, .. } => Some(source),
        }
    }
}

/// Result of one non-blocking read attempt.
#[derive(Debug)]
pub enum LineRead {
    Line(String),
    /// Nothing buffered right now.
    Pending,
    /// Every writer closed the pipe (EOF).
    Closed,
    /// The read itself failed; no further lines will arrive.
    Failed(std::io::Error),
}

/// How a drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainEnd {
    /// Every writer closed the pipe.
    Eof,
    /// The stream reported a read error.
    Failed,
    /// Something still held the pipe open when the limit ran out.
    TimedOut,
    /// The caller's cancel condition fired before EOF.
    Cancelled,
}

impl DrainEnd {
    /// True when a process other than the reaped child may still be holding
    /// the pipe open.
    pub fn pipe_still_held(self) -> bool {
        matches!(self, DrainEnd::TimedOut | DrainEnd::Cancelled)
    }
}

/// Exit code of a finished child. Signal deaths map to `128 + signal`.
pub fn exit_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}

/// A spawned job and the receiving side of its merged output.
pub struct ChildProcess {
    child: Child,
    pid: Option<u32>,
    lines: mpsc::Receiver<std::io::Result<String>>,
    pump: JoinHandle<()>,
}

impl ChildProcess {
    /// Spawn the child described by `spec`.
    ///
    /// The subprocess is placed in its own process group (via
    /// `process_group(0)`) so termination signals reach anything it forks.
    pub fn spawn(spec: &RunSpec) -> Result<Self, SessionError> {
        // Both ends are close-on-exec from creation, so a child spawned
        // concurrently by another supervisor never inherits this pipe.
        let (read_end, write_end) = nix::unistd::pipe2(OFlag::O_CLOEXEC)
            .map_err(|e| SessionError::Pipe { source: e.into() })?;
        // Second handle for stderr: both descriptors feed the same pipe
        let write_end_stderr = write_end
            .try_clone()
            .map_err(|e| SessionError::Pipe { source: e })?;
        let receiver =
            pipe::Receiver::from_owned_fd(read_end).map_err(|e| SessionError::Pipe { source: e })?;

        tracing::info!(
            command = %spec.executable(),
            args = ?spec.arguments(),
            env = ?spec.env_overrides().keys().collect::<Vec<_>>(),
            cwd = ?spec.cwd(),
            "spawning job"
        );

        let child = {
            let mut command = Command::new(spec.executable());
            command
                .args(spec.arguments())
                .envs(spec.env_overrides())
                .stdin(Stdio::null())
                .stdout(Stdio::from(write_end))
                .stderr(Stdio::from(write_end_stderr))
                .process_group(0) // New process group for clean kill
                .kill_on_drop(true);
            if let Some(dir) = spec.cwd() {
                command.current_dir(dir);
            }
            command.spawn().map_err(|e| SessionError::Spawn {
                command: spec.executable().to_string(),
                source: e,
            })?
            // Dropping `command` closes the parent's copies of the write end,
            // so EOF arrives once the child and its descendants exit.
        };

        let pid = child.id();
        tracing::info!(pid = ?pid, "job subprocess started");

        let (tx, lines) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let pump = tokio::spawn(pump_lines(receiver, tx));

        Ok(Self {
            child,
            pid,
            lines,
            pump,
        })
    }

    /// Pid at spawn time (for logging and reports).
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take one buffered line without waiting.
    pub fn try_read_line(&mut self) -> LineRead {
        match self.lines.try_recv() {
            Ok(Ok(line)) => LineRead::Line(line),
            Ok(Err(e)) => LineRead::Failed(e),
            Err(TryRecvError::Empty) => LineRead::Pending,
            Err(TryRecvError::Disconnected) => LineRead::Closed,
        }
    }

    /// Collect output still in flight after the child exited.
    ///
    /// Waits for EOF up to `limit`, giving up early once `cancelled` returns
    /// true. A descendant holding the pipe open only costs the wait, after
    /// which whatever is already buffered is taken.
    pub async fn drain(
        &mut self,
        limit: Duration,
        cancelled: impl Fn() -> bool,
    ) -> (Vec<String>, DrainEnd) {
        let mut drained = Vec::new();
        let deadline = tokio::time::Instant::now() + limit;
        let end = loop {
            if cancelled() {
                tracing::debug!("drain cancelled, taking buffered lines");
                break DrainEnd::Cancelled;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                tracing::debug!(
                    limit_ms = limit.as_millis() as u64,
                    "output pipe still open after exit, taking buffered lines"
                );
                break DrainEnd::TimedOut;
            }
            let step = (deadline - now).min(DRAIN_CHECK_INTERVAL);
            match tokio::time::timeout(step, self.lines.recv()).await {
                Ok(Some(Ok(line))) => drained.push(line),
                Ok(Some(Err(e))) => {
                    tracing::warn!(error = %e, "output stream failed while draining");
                    break DrainEnd::Failed;
                }
                Ok(None) => return (drained, DrainEnd::Eof),
                Err(_) => {}
            }
        };
        while let Ok(Ok(line)) = self.lines.try_recv() {
            drained.push(line);
        }
        (drained, end)
    }

    /// Non-blocking exit check.
    pub fn try_wait(&mut self) -> std::io::Result<Option<i32>> {
        Ok(self.child.try_wait()?.map(exit_code))
    }

    /// Send SIGTERM to the child's process group.
    pub fn terminate(&mut self) -> Result<(), Errno> {
        self.signal_group(Signal::SIGTERM)
    }

    /// Send SIGKILL to the process group and reap the child, waiting at most
    /// `reap_timeout`. Returns the exit code if the child was reaped.
    pub async fn kill(&mut self, reap_timeout: Duration) -> Result<Option<i32>, Errno> {
        self.signal_group(Signal::SIGKILL)?;
        match tokio::time::timeout(reap_timeout, self.child.wait()).await {
            Ok(Ok(status)) => Ok(Some(exit_code(status))),
            Ok(Err(e)) => {
                tracing::warn!(pid = ?self.pid, error = %e, "failed to reap killed job");
                Ok(None)
            }
            Err(_) => {
                tracing::warn!(pid = ?self.pid, "killed job not reaped in time");
                Ok(None)
            }
        }
    }

    /// SIGKILL whatever is left in the process group after the child itself
    /// was reaped, e.g. a background descendant still holding the pipe.
    ///
    /// The group id stays reserved while any member is alive, so the
    /// spawn-time pid is safe to use here.
    pub fn kill_leftover_group(&mut self) -> Result<(), Errno> {
        let Some(pgid) = self.pid else {
            return Ok(());
        };
        match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
            Ok(()) => {
                tracing::warn!(pgid, "killed leftover processes in job group");
                Ok(())
            }
            Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn signal_group(&mut self, signal: Signal) -> Result<(), Errno> {
        // `id()` is None once the child has been reaped; its pid may be reused.
        let Some(pid) = self.child.id() else {
            tracing::debug!(%signal, "child already reaped, not signalling");
            return Ok(());
        };
        match killpg(Pid::from_raw(pid as i32), signal) {
            Ok(()) => {
                tracing::info!(pid, %signal, "signalled job process group");
                Ok(())
            }
            Err(Errno::ESRCH) => {
                tracing::debug!(pid, %signal, "process group already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Forward the pipe line by line until EOF or a read error.
///
/// A line ends at `\n`, `\r\n` or a lone `\r`, so carriage-return progress
/// bars count as output as they are drawn. A trailing unterminated line is
/// sent at EOF. Bytes are decoded lossily so a stray non-UTF-8 byte does not
/// end the stream.
async fn pump_lines(receiver: pipe::Receiver, tx: mpsc::Sender<std::io::Result<String>>) {
    let mut reader = BufReader::new(receiver);
    let mut line = Vec::new();
    // Last byte seen was `\r`; a following `\n` belongs to the same line end.
    let mut after_cr = false;
    loop {
        let mut finished = Vec::new();
        let consumed = match reader.fill_buf().await {
            Ok([]) => {
                if !line.is_empty() {
                    let _ = tx.send(Ok(String::from_utf8_lossy(&line).into_owned())).await;
                }
                return;
            }
            Ok(chunk) => {
                for &byte in chunk {
                    if std::mem::take(&mut after_cr) && byte == b'\n' {
                        continue;
                    }
                    match byte {
                        b'\n' | b'\r' => {
                            finished.push(String::from_utf8_lossy(&line).into_owned());
                            line.clear();
                            after_cr = byte == b'\r';
                        }
                        _ => line.push(byte),
                    }
                }
                chunk.len()
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };
        reader.consume(consumed);
        for text in finished {
            if tx.send(Ok(text)).await.is_err() {
                return;
            }
        }
    }
}
