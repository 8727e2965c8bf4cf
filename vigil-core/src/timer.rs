//! Single-slot timer that can be cancelled and rescheduled
//!
//! A [`RescheduleableTimer`] holds at most one pending task. Scheduling while
//! a task is pending cancels that task first and reports it, which lets
//! callers treat "cancelled before firing" as a signal (a learner leaving a
//! slide before its minimum dwell time, for instance).
//!
//! Each timer owns exactly one worker task on the tokio runtime, reused for
//! every reschedule. Cancellation and firing race on the slot mutex: whoever
//! takes the pending task first wins, so a task is either reported as
//! cancelled or its callback runs, never both and never twice.
//!
//! ```text
//! schedule(d, k) ──► slot.pending = (ticket, k) ──► worker: sleep_until(now + d)
//!                                                        │
//!                          ticket still pending? ◄───────┘
//!                               │ yes
//!                               ▼
//!                        handler.on_expire(k)
//! ```

use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, trace};

use crate::error::TimerError;

/// Callback invoked when a scheduled task fires
pub trait ExpiryHandler<K>: Send + Sync + 'static {
    fn on_expire(&self, key: K) -> Result<(), TimerError>;
}

impl<K, F> ExpiryHandler<K> for F
where
    F: Fn(K) -> Result<(), TimerError> + Send + Sync + 'static,
{
    fn on_expire(&self, key: K) -> Result<(), TimerError> {
        self(key)
    }
}

struct Pending<K> {
    ticket: u64,
    key: K,
}

struct Slot<K> {
    pending: Option<Pending<K>>,
    next_ticket: u64,
}

enum Command {
    Arm { ticket: u64, deadline: Instant },
    Disarm,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Timer with a single cancellable, rescheduleable slot
pub struct RescheduleableTimer<K> {
    name: String,
    slot: Arc<Mutex<Slot<K>>>,
    commands: mpsc::UnboundedSender<Command>,
}

impl<K> RescheduleableTimer<K>
where
    K: Clone + Debug + Send + 'static,
{
    /// Create the timer and spawn its worker on the current tokio runtime.
    pub fn new(name: impl Into<String>, handler: impl ExpiryHandler<K>) -> Result<Self, TimerError> {
        let runtime = Handle::try_current().map_err(|_| TimerError::NoRuntime)?;
        let name = name.into();
        let slot = Arc::new(Mutex::new(Slot {
            pending: None,
            next_ticket: 0,
        }));
        let (commands, rx) = mpsc::unbounded_channel();

        runtime.spawn(run_worker(
            name.clone(),
            Arc::clone(&slot),
            rx,
            Arc::new(handler),
        ));

        Ok(Self {
            name,
            slot,
            commands,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schedule a task for `key` after `delay`.
    ///
    /// Returns true iff a not-yet-fired task was pending and got cancelled.
    /// A zero delay only clears the slot.
    pub fn schedule(&self, delay: Duration, key: K) -> bool {
        self.reschedule(delay, key).is_some()
    }

    /// Like [`schedule`](Self::schedule), returning the key of the cancelled task.
    pub fn reschedule(&self, delay: Duration, key: K) -> Option<K> {
        let mut slot = lock(&self.slot);
        let cancelled = slot.pending.take().map(|p| p.key);

        if delay.is_zero() {
            let _ = self.commands.send(Command::Disarm);
            trace!(timer = %self.name, ?cancelled, "timer cleared");
            return cancelled;
        }

        slot.next_ticket += 1;
        let ticket = slot.next_ticket;
        let deadline = Instant::now() + delay;
        trace!(timer = %self.name, ?key, ?delay, ?cancelled, "timer scheduled");
        slot.pending = Some(Pending { ticket, key });
        let _ = self.commands.send(Command::Arm { ticket, deadline });

        cancelled
    }

    /// Cancel the pending task, returning its key if one was pending.
    pub fn cancel(&self) -> Option<K> {
        let mut slot = lock(&self.slot);
        let cancelled = slot.pending.take().map(|p| p.key);
        let _ = self.commands.send(Command::Disarm);
        cancelled
    }

    /// Whether a task is pending and has not fired.
    pub fn is_scheduled(&self) -> bool {
        lock(&self.slot).pending.is_some()
    }

    /// Key of the pending task.
    pub fn pending_key(&self) -> Option<K> {
        lock(&self.slot).pending.as_ref().map(|p| p.key.clone())
    }
}

impl<K> std::fmt::Debug for RescheduleableTimer<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RescheduleableTimer")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

async fn run_worker<K>(
    name: String,
    slot: Arc<Mutex<Slot<K>>>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    handler: Arc<dyn ExpiryHandler<K>>,
) where
    K: Send + 'static,
{
    let mut armed: Option<(u64, Instant)> = None;

    loop {
        let command = match armed {
            Some((ticket, deadline)) => {
                tokio::select! {
                    command = rx.recv() => command,
                    _ = tokio::time::sleep_until(deadline) => {
                        armed = None;
                        fire(&name, &slot, ticket, handler.as_ref());
                        continue;
                    }
                }
            }
            None => rx.recv().await,
        };

        match command {
            Some(Command::Arm { ticket, deadline }) => armed = Some((ticket, deadline)),
            Some(Command::Disarm) => armed = None,
            None => break,
        }
    }

    debug!(timer = %name, "timer worker stopped");
}

fn fire<K: 'static>(name: &str, slot: &Mutex<Slot<K>>, ticket: u64, handler: &dyn ExpiryHandler<K>) {
    let key = {
        let mut slot = lock(slot);
        match slot.pending.as_ref() {
            Some(pending) if pending.ticket == ticket => slot.pending.take().map(|p| p.key),
            _ => None,
        }
    };

    // Cancelled or replaced between the deadline and now.
    let Some(key) = key else {
        return;
    };

    invoke(name, handler, key);
}

/// Run an expiry callback, containing failures and panics.
pub(crate) fn invoke<K: 'static>(name: &str, handler: &dyn ExpiryHandler<K>, key: K) {
    match std::panic::catch_unwind(AssertUnwindSafe(|| handler.on_expire(key))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(timer = %name, error = %e, "timer callback failed"),
        Err(_) => error!(timer = %name, "timer callback panicked"),
    }
}
