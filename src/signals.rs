/// Signal handling for operator aborts.
///
/// SIGINT (Ctrl-C) and SIGTERM set a shared interrupt flag. The supervisor
/// checks the flag on every poll iteration and escalates the running child
/// the same way it does for a stall; the harness then stops scheduling runs.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    /// A flag that is only set by calling [`Interrupt::trigger`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Install SIGINT/SIGTERM listeners that set the returned flag.
    pub fn install() -> std::io::Result<Self> {
        let interrupt = Self::new();
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        let handle = interrupt.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(e) = res {
                            tracing::warn!(error = %e, "failed to listen for SIGINT");
                            return;
                        }
                        tracing::warn!("SIGINT received, stopping current run");
                    }
                    received = sigterm.recv() => {
                        if received.is_none() {
                            return;
                        }
                        tracing::warn!("SIGTERM received, stopping current run");
                    }
                }
                handle.trigger();
            }
        });
        Ok(interrupt)
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
