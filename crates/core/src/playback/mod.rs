//! Polls an audio position and keeps the highlighted word in step with it.

use std::{
    fmt,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::{Duration, Instant},
};

use crate::{
    clock::{Clock, MonotonicClock},
    scheduler::PeriodicWorker,
    sync::AudioWordSynchronizer,
    MalaError, Result,
};

/// Reports the playback position of an audio player.
pub trait PositionSource: Send + Sync {
    /// Milliseconds since the start of the current loop, or `None` while
    /// nothing is playing.
    fn position_ms(&self) -> Option<u64>;
}

/// Looping position source for hosts without an audio backend. One loop
/// lasts `cycle`, matching one recitation of the mantra.
pub struct SimulatedPlayback {
    clock: Arc<dyn Clock>,
    started: Instant,
    cycle: Duration,
}

impl SimulatedPlayback {
    pub fn new(cycle: Duration) -> Self {
        Self::with_clock(cycle, Arc::new(MonotonicClock))
    }

    pub fn with_clock(cycle: Duration, clock: Arc<dyn Clock>) -> Self {
        let started = clock.now();
        Self {
            clock,
            started,
            cycle,
        }
    }
}

impl PositionSource for SimulatedPlayback {
    fn position_ms(&self) -> Option<u64> {
        let cycle = self.cycle.as_millis();
        if cycle == 0 {
            return None;
        }
        let elapsed = self.clock.now().saturating_duration_since(self.started);
        u64::try_from(elapsed.as_millis() % cycle).ok()
    }
}

impl fmt::Debug for SimulatedPlayback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedPlayback")
            .field("cycle", &self.cycle)
            .finish()
    }
}

/// Word index currently highlighted, `-1` when nothing is.
#[derive(Debug, Clone)]
struct WordCursor(Arc<AtomicI32>);

impl WordCursor {
    const NONE: i32 = -1;

    fn new() -> Self {
        Self(Arc::new(AtomicI32::new(Self::NONE)))
    }

    fn current(&self) -> i32 {
        self.0.load(Ordering::Acquire)
    }

    fn store(&self, word: Option<usize>) {
        let value = word
            .and_then(|index| i32::try_from(index).ok())
            .unwrap_or(Self::NONE);
        self.0.store(value, Ordering::Release);
    }
}

pub type CycleCallback = Box<dyn FnMut() + Send>;

/// Periodic poller that feeds positions into an [`AudioWordSynchronizer`].
pub struct PlaybackMonitor {
    synchronizer: Arc<AudioWordSynchronizer>,
    cursor: WordCursor,
    worker: Mutex<Option<PeriodicWorker>>,
}

impl PlaybackMonitor {
    pub fn new(synchronizer: Arc<AudioWordSynchronizer>) -> Self {
        Self {
            synchronizer,
            cursor: WordCursor::new(),
            worker: Mutex::new(None),
        }
    }

    /// Starts polling `source` every `poll_interval`, replacing any previous
    /// poller. `on_cycle` runs each time the position wraps back towards the
    /// start of the track.
    pub fn start(
        &self,
        source: Arc<dyn PositionSource>,
        poll_interval: Duration,
        on_cycle: Option<CycleCallback>,
    ) -> Result<()> {
        if poll_interval.is_zero() {
            return Err(MalaError::InvalidConfig(
                "poll interval must be positive".to_string(),
            ));
        }

        let mut slot = self.lock_worker()?;
        if let Some(previous) = slot.take() {
            previous.shutdown();
        }

        let synchronizer = self.synchronizer.clone();
        let cursor = self.cursor.clone();
        let mut last_position = 0_u64;
        let mut on_cycle = on_cycle;
        cursor.store(synchronizer.word_index_at(0));

        let worker = PeriodicWorker::spawn("playback-monitor", poll_interval, move || {
            let Some(position) = source.position_ms() else {
                cursor.store(None);
                return;
            };
            let previous = std::mem::replace(&mut last_position, position);
            if position < previous {
                tracing::debug!(previous, position, "playback looped");
                if let Some(callback) = on_cycle.as_mut() {
                    callback();
                }
            }
            cursor.store(synchronizer.word_index_at(position));
        })?;

        *slot = Some(worker);
        let poll_ms = u64::try_from(poll_interval.as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(poll_ms, "playback monitor started");
        Ok(())
    }

    /// Stops polling and clears the highlight.
    pub fn stop(&self) -> Result<()> {
        let mut slot = self.lock_worker()?;
        if let Some(worker) = slot.take() {
            worker.shutdown();
            tracing::debug!("playback monitor stopped");
        }
        self.cursor.store(None);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    pub fn current_word_index(&self) -> i32 {
        self.cursor.current()
    }

    fn lock_worker(&self) -> Result<MutexGuard<'_, Option<PeriodicWorker>>> {
        self.worker
            .lock()
            .map_err(|_| MalaError::msg("playback monitor has been poisoned"))
    }
}

impl Drop for PlaybackMonitor {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!(%err, "failed to stop playback monitor on drop");
        }
    }
}

impl fmt::Debug for PlaybackMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackMonitor")
            .field("running", &self.is_running())
            .field("word", &self.current_word_index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, AtomicU64, AtomicUsize},
        thread,
    };

    use super::*;
    use crate::{clock::ManualClock, sync::TimingEntry};

    struct FixedPosition {
        position: AtomicU64,
        playing: AtomicBool,
    }

    impl FixedPosition {
        fn at(position: u64) -> Arc<Self> {
            Arc::new(Self {
                position: AtomicU64::new(position),
                playing: AtomicBool::new(true),
            })
        }

        fn seek(&self, position: u64) {
            self.position.store(position, Ordering::SeqCst);
        }
    }

    impl PositionSource for FixedPosition {
        fn position_ms(&self) -> Option<u64> {
            self.playing
                .load(Ordering::SeqCst)
                .then(|| self.position.load(Ordering::SeqCst))
        }
    }

    fn loaded_synchronizer() -> Arc<AudioWordSynchronizer> {
        let sync = Arc::new(AudioWordSynchronizer::new());
        sync.load(vec![
            TimingEntry::new(0, 0),
            TimingEntry::new(450, 1),
            TimingEntry::new(900, 2),
        ]);
        sync
    }

    fn settle() {
        thread::sleep(Duration::from_millis(40));
    }

    #[test]
    fn cursor_follows_position_and_clears_on_stop() {
        let monitor = PlaybackMonitor::new(loaded_synchronizer());
        let source = FixedPosition::at(500);
        assert_eq!(monitor.current_word_index(), -1);

        monitor
            .start(source.clone(), Duration::from_millis(2), None)
            .unwrap();
        settle();
        assert_eq!(monitor.current_word_index(), 1);

        source.seek(1_000);
        settle();
        assert_eq!(monitor.current_word_index(), 2);

        monitor.stop().unwrap();
        assert_eq!(monitor.current_word_index(), -1);
        assert!(!monitor.is_running());
    }

    #[test]
    fn paused_source_clears_highlight() {
        let monitor = PlaybackMonitor::new(loaded_synchronizer());
        let source = FixedPosition::at(900);
        monitor
            .start(source.clone(), Duration::from_millis(2), None)
            .unwrap();
        settle();
        assert_eq!(monitor.current_word_index(), 2);

        source.playing.store(false, Ordering::SeqCst);
        settle();
        assert_eq!(monitor.current_word_index(), -1);
    }

    #[test]
    fn wrapping_position_fires_cycle_callback() {
        let monitor = PlaybackMonitor::new(loaded_synchronizer());
        let source = FixedPosition::at(800);
        let cycles = Arc::new(AtomicUsize::new(0));

        let seen = cycles.clone();
        monitor
            .start(
                source.clone(),
                Duration::from_millis(2),
                Some(Box::new(move || {
                    seen.fetch_add(1, Ordering::SeqCst);
                }) as CycleCallback),
            )
            .unwrap();
        settle();
        assert_eq!(cycles.load(Ordering::SeqCst), 0);

        source.seek(100);
        settle();
        monitor.stop().unwrap();
        assert_eq!(cycles.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn simulated_playback_loops() {
        let clock = ManualClock::new();
        let playback =
            SimulatedPlayback::with_clock(Duration::from_millis(1_000), Arc::new(clock.clone()));

        assert_eq!(playback.position_ms(), Some(0));
        clock.advance_millis(750);
        assert_eq!(playback.position_ms(), Some(750));
        clock.advance_millis(500);
        assert_eq!(playback.position_ms(), Some(250));
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let monitor = PlaybackMonitor::new(loaded_synchronizer());
        let source = FixedPosition::at(0);
        assert!(monitor.start(source, Duration::ZERO, None).is_err());
    }
}
