//! Round and pacing state machine.
//!
//! All mutation goes through a single session mutex. After every successful
//! mutation an immutable [`CounterSnapshot`] is published, so readers never
//! observe a half-updated round (for example a new log entry without the
//! matching mala number).

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::{
    clock::{signed_millis_between, Clock, MonotonicClock},
    config::CounterConfig,
    scheduler::RunningFlag,
    speed::{classify, Classification},
    MalaError, Result,
};

/// Where a tick request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickSource {
    /// A tap by the chanter. Ignored while auto-advance is running.
    Manual,
    /// The auto-advance timer (or another automatic driver).
    Auto,
}

/// One completed round, appended exactly once per mala.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChantLog {
    pub mala_number: u32,
    pub round_duration: Duration,
    pub cumulative_time: Duration,
}

impl fmt::Display for ChantLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Mala {}: {} (total {})",
            self.mala_number,
            format_duration(self.round_duration),
            format_duration(self.cumulative_time)
        )
    }
}

/// Details of an applied advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance {
    /// Bead count after the tick. Zero when the tick completed a round.
    pub count: u32,
    /// Present when this tick completed a round.
    pub completed: Option<ChantLog>,
    /// Feedback now shown to the chanter.
    pub classification: Classification,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Manual input while auto-advance is running; nothing changed.
    Suppressed,
    Advanced(Advance),
}

impl AdvanceOutcome {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, AdvanceOutcome::Suppressed)
    }

    pub fn completed(&self) -> Option<&ChantLog> {
        match self {
            AdvanceOutcome::Advanced(advance) => advance.completed.as_ref(),
            AdvanceOutcome::Suppressed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetreatOutcome {
    Suppressed,
    /// Count was already zero.
    AtStart,
    Retreated { count: u32 },
}

/// Atomically published read view of the counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub count: u32,
    pub round_length: u32,
    pub mala_number: u32,
    pub classification: Classification,
    pub cumulative_time: Duration,
    /// Elapsed time used for the latest classification.
    pub last_tick_ms: i64,
    pub logs: Arc<[ChantLog]>,
}

struct SessionState {
    count: u32,
    mala_number: u32,
    round_start: Instant,
    last_tick: Instant,
    cumulative_time: Duration,
    classification: Classification,
    last_tick_ms: i64,
    logs: Arc<[ChantLog]>,
}

impl SessionState {
    fn snapshot(&self, round_length: u32) -> CounterSnapshot {
        CounterSnapshot {
            count: self.count,
            round_length,
            mala_number: self.mala_number,
            classification: self.classification,
            cumulative_time: self.cumulative_time,
            last_tick_ms: self.last_tick_ms,
            logs: self.logs.clone(),
        }
    }
}

/// Bead counter for one chanting session.
pub struct ChantCounter {
    round_length: u32,
    idle_tick: Duration,
    clock: Arc<dyn Clock>,
    auto_running: RunningFlag,
    state: Mutex<SessionState>,
    published: RwLock<Arc<CounterSnapshot>>,
}

impl ChantCounter {
    /// Creates a counter driven by the monotonic system clock.
    pub fn new(config: &CounterConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(MonotonicClock))
    }

    pub fn with_clock(config: &CounterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        if config.round_length == 0 {
            return Err(MalaError::InvalidConfig(
                "round length must be at least 1".to_string(),
            ));
        }

        let now = clock.now();
        let idle_tick_ms = i64::try_from(config.idle_tick_ms).unwrap_or(i64::MAX);
        let state = SessionState {
            count: 0,
            mala_number: 0,
            round_start: now,
            last_tick: now,
            cumulative_time: Duration::ZERO,
            classification: Classification::begin(),
            last_tick_ms: idle_tick_ms,
            logs: Arc::from(Vec::new()),
        };
        let published = RwLock::new(Arc::new(state.snapshot(config.round_length)));

        Ok(Self {
            round_length: config.round_length,
            idle_tick: config.idle_tick(),
            clock,
            auto_running: RunningFlag::new(),
            state: Mutex::new(state),
            published,
        })
    }

    /// Flag shared with the [`AutoAdvanceScheduler`](crate::AutoAdvanceScheduler)
    /// that drives this counter.
    pub fn auto_advance_flag(&self) -> RunningFlag {
        self.auto_running.clone()
    }

    pub fn is_auto_advance_running(&self) -> bool {
        self.auto_running.is_set()
    }

    pub fn round_length(&self) -> u32 {
        self.round_length
    }

    /// Moves one bead forward, completing the round when the last bead is
    /// reached.
    pub fn advance(&self, source: TickSource) -> Result<AdvanceOutcome> {
        let mut state = self.lock_state()?;
        if self.is_suppressed(source) {
            tracing::trace!("manual advance suppressed during auto-advance");
            return Ok(AdvanceOutcome::Suppressed);
        }

        let now = self.clock.now();
        let elapsed_ms = if state.count == 0 {
            duration_millis(self.idle_tick)
        } else {
            signed_millis_between(state.last_tick, now)
        };
        let classification = classify(elapsed_ms)?;

        // Validate the round duration before touching any state.
        let completes_round = state.count == self.round_length - 1;
        let round_duration = if completes_round {
            let millis = signed_millis_between(state.round_start, now);
            if millis < 0 {
                return Err(MalaError::InvalidDuration { millis });
            }
            Some(now.duration_since(state.round_start))
        } else {
            None
        };

        state.last_tick = now;
        state.last_tick_ms = elapsed_ms;

        let completed = match round_duration {
            Some(round_duration) => {
                state.mala_number += 1;
                state.cumulative_time += round_duration;
                let log = ChantLog {
                    mala_number: state.mala_number,
                    round_duration,
                    cumulative_time: state.cumulative_time,
                };
                let mut logs = state.logs.to_vec();
                logs.push(log);
                state.logs = Arc::from(logs);
                state.count = 0;
                state.classification = Classification::begin();
                tracing::info!(
                    mala = log.mala_number,
                    round = %format_duration(round_duration),
                    total = %format_duration(log.cumulative_time),
                    "mala completed"
                );
                Some(log)
            }
            None => {
                state.count += 1;
                state.classification = classification;
                None
            }
        };

        if state.count == 0 {
            state.round_start = now;
            state.last_tick_ms = duration_millis(self.idle_tick);
        }

        tracing::debug!(
            count = state.count,
            elapsed_ms,
            feedback = %classification.feedback,
            ?source,
            "bead advanced"
        );

        let advance = Advance {
            count: state.count,
            completed,
            classification: state.classification,
        };
        self.publish(&state);
        Ok(AdvanceOutcome::Advanced(advance))
    }

    /// Moves one bead back. Never crosses a round boundary and never touches
    /// the logs, the mala number or the pace feedback.
    pub fn retreat(&self, source: TickSource) -> Result<RetreatOutcome> {
        let mut state = self.lock_state()?;
        if self.is_suppressed(source) {
            tracing::trace!("manual retreat suppressed during auto-advance");
            return Ok(RetreatOutcome::Suppressed);
        }
        if state.count == 0 {
            return Ok(RetreatOutcome::AtStart);
        }

        state.count -= 1;
        tracing::debug!(count = state.count, ?source, "bead retreated");
        let count = state.count;
        self.publish(&state);
        Ok(RetreatOutcome::Retreated { count })
    }

    /// Restarts per-bead timing from now, so the next tick measures a fresh
    /// interval instead of the idle gap before it.
    pub fn reseed_tick_timer(&self) -> Result<()> {
        let mut state = self.lock_state()?;
        state.last_tick = self.clock.now();
        Ok(())
    }

    /// Latest consistent view of the counter.
    pub fn snapshot(&self) -> Arc<CounterSnapshot> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> u32 {
        self.snapshot().count
    }

    pub fn mala_number(&self) -> u32 {
        self.snapshot().mala_number
    }

    pub fn classification(&self) -> Classification {
        self.snapshot().classification
    }

    pub fn logs(&self) -> Arc<[ChantLog]> {
        self.snapshot().logs.clone()
    }

    fn is_suppressed(&self, source: TickSource) -> bool {
        source == TickSource::Manual && self.auto_running.is_set()
    }

    fn publish(&self, state: &SessionState) {
        let snapshot = Arc::new(state.snapshot(self.round_length));
        *self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, SessionState>> {
        self.state
            .lock()
            .map_err(|_| MalaError::msg("chant session state has been poisoned"))
    }
}

impl fmt::Debug for ChantCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChantCounter")
            .field("round_length", &self.round_length)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Renders a duration as `HH:MM:SS hr`, `MM:SS min` or `SS sec`, whichever is
/// the largest non-zero unit.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02} hr")
    } else if minutes > 0 {
        format!("{minutes:02}:{seconds:02} min")
    } else {
        format!("{seconds:02} sec")
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::{clock::ManualClock, scheduler::AutoAdvanceScheduler, speed::Feedback};

    fn counter_with(round_length: u32) -> (ChantCounter, ManualClock) {
        let clock = ManualClock::new();
        let config = CounterConfig {
            round_length,
            idle_tick_ms: 4_800,
        };
        let counter = ChantCounter::with_clock(&config, Arc::new(clock.clone())).unwrap();
        (counter, clock)
    }

    fn advanced(outcome: AdvanceOutcome) -> Advance {
        match outcome {
            AdvanceOutcome::Advanced(advance) => advance,
            AdvanceOutcome::Suppressed => panic!("advance was suppressed"),
        }
    }

    #[test]
    fn full_round_resets_and_logs_once() {
        let (counter, clock) = counter_with(108);

        for _ in 0..107 {
            clock.advance_millis(4_000);
            let advance = advanced(counter.advance(TickSource::Manual).unwrap());
            assert!(advance.completed.is_none());
        }
        assert_eq!(counter.count(), 107);

        clock.advance_millis(4_000);
        let advance = advanced(counter.advance(TickSource::Manual).unwrap());
        let log = advance.completed.expect("last bead completes the round");

        assert_eq!(advance.count, 0);
        assert_eq!(counter.count(), 0);
        assert_eq!(counter.mala_number(), 1);
        assert_eq!(counter.logs().len(), 1);
        assert_eq!(log.mala_number, 1);
        assert_eq!(log.round_duration, Duration::from_millis(108 * 4_000));
        assert_eq!(log.cumulative_time, log.round_duration);
        assert_eq!(advance.classification, Classification::begin());
    }

    #[test]
    fn count_never_reaches_round_length() {
        let (counter, _clock) = counter_with(5);
        for _ in 0..23 {
            let advance = advanced(counter.advance(TickSource::Auto).unwrap());
            assert!(advance.count < 5);
        }
        assert_eq!(counter.mala_number(), 4);
        assert_eq!(counter.count(), 3);
    }

    #[test]
    fn first_bead_uses_idle_interval() {
        let (counter, clock) = counter_with(108);
        clock.advance_millis(60_000);

        let advance = advanced(counter.advance(TickSource::Manual).unwrap());
        assert_eq!(advance.classification.feedback, Feedback::Good);
        assert_eq!(counter.snapshot().last_tick_ms, 4_800);
    }

    #[test]
    fn completed_round_reports_idle_interval_with_begin() {
        let (counter, clock) = counter_with(2);
        counter.advance(TickSource::Manual).unwrap();
        clock.advance_millis(1_000);
        counter.advance(TickSource::Manual).unwrap();

        let snapshot = counter.snapshot();
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.classification, Classification::begin());
        assert_eq!(snapshot.last_tick_ms, 4_800);
        assert_eq!(counter.classification(), Classification::begin());
    }

    #[test]
    fn later_beads_use_measured_interval() {
        let (counter, clock) = counter_with(108);
        counter.advance(TickSource::Manual).unwrap();

        clock.advance_millis(2_000);
        let fast = advanced(counter.advance(TickSource::Manual).unwrap());
        assert_eq!(fast.classification.feedback, Feedback::VeryFast);

        clock.advance_millis(7_000);
        let slow = advanced(counter.advance(TickSource::Manual).unwrap());
        assert_eq!(slow.classification.feedback, Feedback::Slow);
        assert_eq!(counter.classification(), slow.classification);
        assert_eq!(counter.snapshot().last_tick_ms, 7_000);
    }

    #[test]
    fn cumulative_time_spans_rounds() {
        let (counter, clock) = counter_with(2);

        clock.advance_millis(1_000);
        counter.advance(TickSource::Manual).unwrap();
        clock.advance_millis(1_000);
        counter.advance(TickSource::Manual).unwrap();
        clock.advance_millis(3_000);
        counter.advance(TickSource::Manual).unwrap();
        clock.advance_millis(3_000);
        counter.advance(TickSource::Manual).unwrap();

        let logs = counter.logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].round_duration, Duration::from_secs(2));
        assert_eq!(logs[1].round_duration, Duration::from_secs(6));
        assert_eq!(logs[1].cumulative_time, Duration::from_secs(8));
        assert_eq!(logs[1].mala_number, 2);
    }

    #[test]
    fn retreat_stops_at_zero_and_keeps_history() {
        let (counter, _clock) = counter_with(2);
        assert_eq!(
            counter.retreat(TickSource::Manual).unwrap(),
            RetreatOutcome::AtStart
        );

        counter.advance(TickSource::Manual).unwrap();
        counter.advance(TickSource::Manual).unwrap();
        counter.advance(TickSource::Manual).unwrap();
        let before = counter.snapshot();

        assert_eq!(
            counter.retreat(TickSource::Manual).unwrap(),
            RetreatOutcome::Retreated { count: 0 }
        );
        assert_eq!(
            counter.retreat(TickSource::Manual).unwrap(),
            RetreatOutcome::AtStart
        );

        let after = counter.snapshot();
        assert_eq!(after.count, 0);
        assert_eq!(after.mala_number, before.mala_number);
        assert_eq!(after.logs, before.logs);
        assert_eq!(after.classification, before.classification);
    }

    #[test]
    fn manual_input_is_suppressed_while_auto_runs() {
        let (counter, _clock) = counter_with(108);
        counter.advance(TickSource::Manual).unwrap();
        let scheduler = AutoAdvanceScheduler::new(counter.auto_advance_flag());
        scheduler.start(Duration::from_secs(3_600), || {}).unwrap();

        assert!(counter
            .advance(TickSource::Manual)
            .unwrap()
            .is_suppressed());
        assert_eq!(
            counter.retreat(TickSource::Manual).unwrap(),
            RetreatOutcome::Suppressed
        );
        assert_eq!(counter.count(), 1);

        counter.advance(TickSource::Auto).unwrap();
        assert_eq!(counter.count(), 2);

        scheduler.stop().unwrap();
        counter.advance(TickSource::Manual).unwrap();
        assert_eq!(counter.count(), 3);
    }

    #[test]
    fn clock_running_backwards_is_rejected_without_mutation() {
        let (counter, clock) = counter_with(108);
        let start = clock.now();
        clock.advance_millis(5_000);
        counter.advance(TickSource::Manual).unwrap();

        clock.set(start);
        let err = counter.advance(TickSource::Manual).unwrap_err();
        assert!(matches!(err, MalaError::InvalidDuration { millis: -5_000 }));
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn reseeding_measures_from_now() {
        let (counter, clock) = counter_with(108);
        counter.advance(TickSource::Manual).unwrap();
        clock.advance_millis(30_000);

        counter.reseed_tick_timer().unwrap();
        clock.advance_millis(4_000);
        let advance = advanced(counter.advance(TickSource::Auto).unwrap());
        assert_eq!(advance.classification.feedback, Feedback::Good);
    }

    #[test]
    fn round_length_of_one_completes_every_tick() {
        let (counter, _clock) = counter_with(1);
        let advance = advanced(counter.advance(TickSource::Manual).unwrap());
        assert_eq!(advance.count, 0);
        assert_eq!(advance.completed.map(|log| log.mala_number), Some(1));
    }

    #[test]
    fn rejects_empty_rounds() {
        let config = CounterConfig {
            round_length: 0,
            idle_tick_ms: 4_800,
        };
        assert!(ChantCounter::new(&config).is_err());
    }

    #[test]
    fn concurrent_advances_are_serialised() {
        let (counter, _clock) = counter_with(108);
        let counter = Arc::new(counter);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..108 {
                        counter.advance(TickSource::Auto).unwrap();
                        let snapshot = counter.snapshot();
                        assert!(snapshot.count < snapshot.round_length);
                        assert_eq!(snapshot.logs.len() as u32, snapshot.mala_number);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let snapshot = counter.snapshot();
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.mala_number, 4);
        assert_eq!(snapshot.logs.len(), 4);
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::from_millis(3_661_000)), "01:01:01 hr");
        assert_eq!(format_duration(Duration::from_millis(61_000)), "01:01 min");
        assert_eq!(format_duration(Duration::from_millis(59_000)), "59 sec");
        assert_eq!(format_duration(Duration::ZERO), "00 sec");
    }

    #[test]
    fn log_display_uses_readable_durations() {
        let log = ChantLog {
            mala_number: 3,
            round_duration: Duration::from_secs(520),
            cumulative_time: Duration::from_secs(3_700),
        };
        assert_eq!(log.to_string(), "Mala 3: 08:40 min (total 01:01:40 hr)");
    }
}
