//! Core library for the mala chant counter.
//!
//! The crate is split into small subsystems: pace classification, the
//! round/bead state machine, the auto-advance timer, and the timing track
//! that keeps a highlighted word in step with audio playback. A
//! [`MalaSession`] wires them together for hosts that want a single handle.

pub mod clock;
pub mod config;
pub mod counter;
pub mod error;
pub mod events;
pub mod playback;
pub mod scheduler;
pub mod session;
pub mod speed;
pub mod sync;
pub mod track;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{AppConfig, AutoAdvanceConfig, CounterConfig, SyncConfig};
pub use counter::{
    format_duration, Advance, AdvanceOutcome, ChantCounter, ChantLog, CounterSnapshot,
    RetreatOutcome, TickSource,
};
pub use error::{MalaError, Result};
pub use events::{EventSink, JsonLinesSink, MemorySink, SessionEvent, TapDirection, TracingSink};
pub use playback::{PlaybackMonitor, PositionSource, SimulatedPlayback};
pub use scheduler::{AutoAdvanceScheduler, RunningFlag};
pub use session::MalaSession;
pub use speed::{classify, classify_duration, Classification, Feedback, FeedbackColor};
pub use sync::{mantra_text, AudioWordSynchronizer, TimingEntry, TimingTrack, MANTRA_WORDS};
pub use track::{load_or_synthesize, load_timing_file, parse_timing_track};
