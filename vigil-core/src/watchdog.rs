//! Ideal-duration watchdog with cooperative pause and resume
//!
//! The watchdog measures active time against a budget on its own tokio task.
//! Pausing stops the measurement without tearing the task down; resuming
//! picks up where it left off. The callback fires at most once, when active
//! time reaches the budget.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::TimerError;
use crate::timer::{ExpiryHandler, invoke};

/// Where the watchdog is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogPhase {
    Running,
    Paused,
    Fired,
    Cancelled,
}

#[derive(Debug)]
struct Progress {
    phase: WatchdogPhase,
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl Progress {
    fn elapsed(&self, now: Instant) -> Duration {
        let open = self
            .running_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        self.accumulated + open
    }

    fn halt(&mut self, now: Instant, phase: WatchdogPhase) {
        self.accumulated = self.elapsed(now);
        self.running_since = None;
        self.phase = phase;
    }
}

fn lock(progress: &Mutex<Progress>) -> std::sync::MutexGuard<'_, Progress> {
    progress
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Background watchdog over a duration budget
pub struct DurationWatchdog {
    name: String,
    budget: Duration,
    progress: Arc<Mutex<Progress>>,
    control: watch::Sender<WatchdogPhase>,
    shutdown: CancellationToken,
}

impl DurationWatchdog {
    /// Start measuring immediately on the current tokio runtime.
    pub fn start(
        name: impl Into<String>,
        budget: Duration,
        handler: impl ExpiryHandler<()>,
    ) -> Result<Self, TimerError> {
        let runtime = Handle::try_current().map_err(|_| TimerError::NoRuntime)?;
        let name = name.into();
        let progress = Arc::new(Mutex::new(Progress {
            phase: WatchdogPhase::Running,
            accumulated: Duration::ZERO,
            running_since: Some(Instant::now()),
        }));
        let (control, rx) = watch::channel(WatchdogPhase::Running);
        let shutdown = CancellationToken::new();

        runtime.spawn(run_watchdog(
            name.clone(),
            budget,
            Arc::clone(&progress),
            rx,
            shutdown.clone(),
            Arc::new(handler),
        ));
        debug!(watchdog = %name, ?budget, "watchdog started");

        Ok(Self {
            name,
            budget,
            progress,
            control,
            shutdown,
        })
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn phase(&self) -> WatchdogPhase {
        lock(&self.progress).phase
    }

    pub fn has_fired(&self) -> bool {
        self.phase() == WatchdogPhase::Fired
    }

    /// Active time measured so far.
    pub fn elapsed(&self) -> Duration {
        lock(&self.progress).elapsed(Instant::now())
    }

    /// Stop measuring. Returns false unless the watchdog was running.
    pub fn pause(&self) -> bool {
        let mut progress = lock(&self.progress);
        if progress.phase != WatchdogPhase::Running {
            return false;
        }
        progress.halt(Instant::now(), WatchdogPhase::Paused);
        self.control.send_replace(WatchdogPhase::Paused);
        debug!(watchdog = %self.name, elapsed = ?progress.accumulated, "watchdog paused");
        true
    }

    /// Continue measuring. Returns false unless the watchdog was paused.
    pub fn resume(&self) -> bool {
        let mut progress = lock(&self.progress);
        if progress.phase != WatchdogPhase::Paused {
            return false;
        }
        progress.phase = WatchdogPhase::Running;
        progress.running_since = Some(Instant::now());
        self.control.send_replace(WatchdogPhase::Running);
        debug!(watchdog = %self.name, "watchdog resumed");
        true
    }

    /// Stop for good. Returns false if it had already fired or been cancelled.
    pub fn cancel(&self) -> bool {
        let mut progress = lock(&self.progress);
        match progress.phase {
            WatchdogPhase::Running | WatchdogPhase::Paused => {
                progress.halt(Instant::now(), WatchdogPhase::Cancelled);
                self.shutdown.cancel();
                true
            }
            WatchdogPhase::Fired | WatchdogPhase::Cancelled => false,
        }
    }
}

impl Drop for DurationWatchdog {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for DurationWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurationWatchdog")
            .field("name", &self.name)
            .field("budget", &self.budget)
            .field("phase", &self.phase())
            .finish()
    }
}

async fn run_watchdog(
    name: String,
    budget: Duration,
    progress: Arc<Mutex<Progress>>,
    mut control: watch::Receiver<WatchdogPhase>,
    shutdown: CancellationToken,
    handler: Arc<dyn ExpiryHandler<()>>,
) {
    loop {
        let remaining = {
            let progress = lock(&progress);
            match progress.phase {
                WatchdogPhase::Running => {
                    Some(budget.saturating_sub(progress.elapsed(Instant::now())))
                }
                WatchdogPhase::Paused => None,
                WatchdogPhase::Fired | WatchdogPhase::Cancelled => break,
            }
        };

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            changed = control.changed() => {
                if changed.is_err() {
                    break;
                }
            }

            _ = async {
                match remaining {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                let expired = {
                    let mut progress = lock(&progress);
                    let now = Instant::now();
                    if progress.phase == WatchdogPhase::Running && progress.elapsed(now) >= budget {
                        progress.halt(now, WatchdogPhase::Fired);
                        true
                    } else {
                        false
                    }
                };

                if expired {
                    info!(watchdog = %name, ?budget, "duration budget exceeded");
                    invoke(&name, handler.as_ref(), ());
                    break;
                }
            }
        }
    }

    debug!(watchdog = %name, "watchdog worker stopped");
}
