//! Cancellable periodic driver for automatic ticking.
//!
//! Each [`AutoAdvanceScheduler::start`] spawns one [`PeriodicWorker`] thread
//! that waits on a [`crossbeam_channel::tick`] timer and a stop channel.
//! Starting again or stopping joins the previous worker first, so at most one
//! tick stream ever exists and no tick begins once `stop` has returned.
//!
//! A tick may call `stop` on its own scheduler, but must not block on another
//! thread that is itself starting or stopping the same scheduler.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, select, tick, Sender, TryRecvError};

use crate::{MalaError, Result};

/// Shared "auto-advance is running" flag.
///
/// The scheduler is the only writer; the counter reads it to suppress manual
/// input while automatic pacing is active.
#[derive(Debug, Clone, Default)]
pub struct RunningFlag(Arc<AtomicBool>);

impl RunningFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self, value: bool) {
        self.0.store(value, Ordering::SeqCst);
    }
}

/// Background thread that runs a callback on a fixed cadence until shut down.
pub(crate) struct PeriodicWorker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl PeriodicWorker {
    pub(crate) fn spawn<F>(name: &str, interval: Duration, mut on_tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticker = tick(interval);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => {
                        // `select!` picks randomly among ready arms; stop wins.
                        if !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty)) {
                            break;
                        }
                        on_tick();
                    }
                }
            })?;
        Ok(Self { stop_tx, handle })
    }

    /// Signals the thread and waits for it, unless called from the worker
    /// itself, in which case the loop exits once the current tick returns.
    pub(crate) fn shutdown(self) {
        // A closed channel wakes the worker just like an explicit signal.
        drop(self.stop_tx);
        if self.handle.thread().id() == thread::current().id() {
            return;
        }
        if self.handle.join().is_err() {
            tracing::warn!("periodic worker panicked");
        }
    }
}

/// Timer that invokes a tick callback at a fixed interval until stopped.
pub struct AutoAdvanceScheduler {
    running: RunningFlag,
    interval: Mutex<Option<Duration>>,
    worker: Mutex<Option<PeriodicWorker>>,
}

impl AutoAdvanceScheduler {
    /// Creates an idle scheduler that publishes its state through `running`.
    pub fn new(running: RunningFlag) -> Self {
        Self {
            running,
            interval: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Installs a new periodic timer, replacing (and fully stopping) any timer
    /// that is already running.
    pub fn start<F>(&self, interval: Duration, on_tick: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        if interval.is_zero() {
            return Err(MalaError::InvalidConfig(
                "auto-advance interval must be positive".to_string(),
            ));
        }

        let mut slot = self.lock_worker()?;
        if let Some(previous) = slot.take() {
            tracing::debug!("replacing running auto-advance timer");
            previous.shutdown();
        }

        self.running.set(true);
        let worker = PeriodicWorker::spawn("auto-advance", interval, on_tick).map_err(|err| {
            self.running.set(false);
            err
        })?;

        *slot = Some(worker);
        *self.lock_interval()? = Some(interval);
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(interval_ms, "auto-advance started");
        Ok(())
    }

    /// Stops the timer. Safe to call when nothing is running. Once this
    /// returns no further tick will begin; a tick already in progress is
    /// allowed to finish first.
    pub fn stop(&self) -> Result<()> {
        let mut slot = self.lock_worker()?;
        if let Some(worker) = slot.take() {
            worker.shutdown();
            tracing::debug!("auto-advance stopped");
        }
        *self.lock_interval()? = None;
        self.running.set(false);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.is_set()
    }

    /// Interval of the active timer, if any.
    pub fn interval(&self) -> Option<Duration> {
        self.interval.lock().ok().and_then(|interval| *interval)
    }

    fn lock_worker(&self) -> Result<MutexGuard<'_, Option<PeriodicWorker>>> {
        self.worker
            .lock()
            .map_err(|_| MalaError::msg("auto-advance worker slot has been poisoned"))
    }

    fn lock_interval(&self) -> Result<MutexGuard<'_, Option<Duration>>> {
        self.interval
            .lock()
            .map_err(|_| MalaError::msg("auto-advance interval has been poisoned"))
    }
}

impl Drop for AutoAdvanceScheduler {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!(%err, "failed to stop auto-advance on drop");
        }
    }
}

impl fmt::Debug for AutoAdvanceScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoAdvanceScheduler")
            .field("running", &self.is_running())
            .field("interval", &self.interval())
            .finish()
    }
}
