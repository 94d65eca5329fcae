//! One chanting session: counter, auto-advance timer, word highlighting and
//! event reporting wired together.

use std::{fmt, sync::Arc, time::Duration};

use crate::{
    clock::{Clock, MonotonicClock},
    config::AppConfig,
    counter::{AdvanceOutcome, ChantCounter, CounterSnapshot, RetreatOutcome, TickSource},
    events::{EventSink, SessionEvent, TapDirection, TracingSink},
    playback::{CycleCallback, PlaybackMonitor, PositionSource},
    scheduler::AutoAdvanceScheduler,
    sync::{AudioWordSynchronizer, TimingTrack, MANTRA_WORDS},
    track, Result,
};

pub struct MalaSession {
    config: AppConfig,
    counter: Arc<ChantCounter>,
    scheduler: AutoAdvanceScheduler,
    synchronizer: Arc<AudioWordSynchronizer>,
    monitor: PlaybackMonitor,
    events: Arc<dyn EventSink>,
}

impl MalaSession {
    /// Session on the monotonic clock that reports events through `tracing`.
    pub fn new(config: AppConfig) -> Result<Self> {
        Self::with_parts(config, Arc::new(MonotonicClock), Arc::new(TracingSink))
    }

    pub fn with_parts(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        let counter = Arc::new(ChantCounter::with_clock(&config.counter, clock)?);
        let scheduler = AutoAdvanceScheduler::new(counter.auto_advance_flag());
        let synchronizer = Arc::new(AudioWordSynchronizer::new());
        let monitor = PlaybackMonitor::new(synchronizer.clone());

        Ok(Self {
            config,
            counter,
            scheduler,
            synchronizer,
            monitor,
            events,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn counter(&self) -> &Arc<ChantCounter> {
        &self.counter
    }

    pub fn snapshot(&self) -> Arc<CounterSnapshot> {
        self.counter.snapshot()
    }

    /// Manual tap forward. Suppressed taps produce no event.
    pub fn tap_forward(&self) -> Result<AdvanceOutcome> {
        let outcome = self.counter.advance(TickSource::Manual)?;
        if !outcome.is_suppressed() {
            self.events.emit(&SessionEvent::ManualTick {
                direction: TapDirection::Forward,
            });
        }
        if let Some(log) = outcome.completed() {
            self.events.emit(&SessionEvent::round_completed(log));
        }
        Ok(outcome)
    }

    /// Manual tap back.
    pub fn tap_back(&self) -> Result<RetreatOutcome> {
        let outcome = self.counter.retreat(TickSource::Manual)?;
        if outcome != RetreatOutcome::Suppressed {
            self.events.emit(&SessionEvent::ManualTick {
                direction: TapDirection::Back,
            });
        }
        Ok(outcome)
    }

    /// Flips auto-advance and returns the new state.
    pub fn toggle_auto_advance(&self) -> Result<bool> {
        if self.is_auto_advance_running() {
            self.stop_auto_advance()?;
            Ok(false)
        } else {
            self.start_auto_advance()?;
            Ok(true)
        }
    }

    /// Starts ticking at the configured interval, restarting the timer when
    /// it is already running.
    pub fn start_auto_advance(&self) -> Result<()> {
        let was_running = self.scheduler.is_running();
        let interval = self.config.auto_advance.interval();
        self.counter.reseed_tick_timer()?;

        let counter = self.counter.clone();
        let events = self.events.clone();
        self.scheduler
            .start(interval, move || auto_tick(&counter, events.as_ref()))?;

        if !was_running {
            tracing::info!(interval_ms = self.config.auto_advance.interval_ms, "auto-advance on");
            self.events
                .emit(&SessionEvent::AutoAdvanceToggled { enabled: true });
        }
        Ok(())
    }

    /// Stops ticking. Recorded rounds are kept. Does nothing when already
    /// stopped.
    pub fn stop_auto_advance(&self) -> Result<()> {
        let was_running = self.scheduler.is_running();
        self.scheduler.stop()?;
        if was_running {
            tracing::info!("auto-advance off");
            self.events
                .emit(&SessionEvent::AutoAdvanceToggled { enabled: false });
        }
        Ok(())
    }

    pub fn is_auto_advance_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn synchronizer(&self) -> &Arc<AudioWordSynchronizer> {
        &self.synchronizer
    }

    /// Installs the configured timing track, or the synthetic table for the
    /// default mantra when it is unavailable.
    pub fn load_timing_track(&self) -> Arc<TimingTrack> {
        let track = Arc::new(track::load_or_synthesize(
            self.config.sync.track_path.as_deref(),
            MANTRA_WORDS.len(),
            Duration::from_millis(self.config.sync.word_duration_ms),
        ));
        self.synchronizer.install(track.clone());
        track
    }

    /// Starts highlighting words from `source`. With `advance_per_cycle`
    /// every completed loop of the audio advances the counter by one bead.
    pub fn start_playback(
        &self,
        source: Arc<dyn PositionSource>,
        advance_per_cycle: bool,
    ) -> Result<()> {
        if !self.synchronizer.is_loaded() {
            self.load_timing_track();
        }

        let on_cycle = advance_per_cycle.then(|| {
            let counter = self.counter.clone();
            let events = self.events.clone();
            Box::new(move || auto_tick(&counter, events.as_ref())) as CycleCallback
        });

        self.monitor
            .start(source, self.config.sync.poll_interval(), on_cycle)
    }

    pub fn stop_playback(&self) -> Result<()> {
        self.monitor.stop()
    }

    /// Highlighted word, `-1` when nothing is playing.
    pub fn current_word_index(&self) -> i32 {
        self.monitor.current_word_index()
    }
}

fn auto_tick(counter: &ChantCounter, events: &dyn EventSink) {
    match counter.advance(TickSource::Auto) {
        Ok(outcome) => {
            if let Some(log) = outcome.completed() {
                events.emit(&SessionEvent::round_completed(log));
            }
        }
        Err(err) => tracing::error!(%err, "automatic tick failed"),
    }
}

impl Drop for MalaSession {
    fn drop(&mut self) {
        if let Err(err) = self.stop_auto_advance() {
            tracing::warn!(%err, "failed to stop auto-advance on session end");
        }
    }
}

impl fmt::Debug for MalaSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MalaSession")
            .field("counter", &self.counter)
            .field("auto_advance", &self.scheduler)
            .field("playback", &self.monitor)
            .finish()
    }
}
