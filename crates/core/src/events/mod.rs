//! Analytics-style events emitted by a [`MalaSession`](crate::MalaSession).

use std::{
    fmt,
    io::Write,
    sync::{Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};

use crate::{ChantLog, MalaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TapDirection {
    Forward,
    Back,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    RoundCompleted { mala_number: u32, duration_ms: u64 },
    AutoAdvanceToggled { enabled: bool },
    /// Only emitted for taps that were not suppressed.
    ManualTick { direction: TapDirection },
}

impl SessionEvent {
    pub fn round_completed(log: &ChantLog) -> Self {
        Self::RoundCompleted {
            mala_number: log.mala_number,
            duration_ms: u64::try_from(log.round_duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::RoundCompleted { .. } => "round_completed",
            SessionEvent::AutoAdvanceToggled { .. } => "auto_advance_toggled",
            SessionEvent::ManualTick { .. } => "manual_tick",
        }
    }
}

/// Receiver for session events. Implementations must not block for long;
/// round completions are delivered from the auto-advance thread.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &SessionEvent);
}

/// Writes every event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &SessionEvent) {
        match event {
            SessionEvent::RoundCompleted {
                mala_number,
                duration_ms,
            } => tracing::info!(event = event.name(), mala_number, duration_ms),
            SessionEvent::AutoAdvanceToggled { enabled } => {
                tracing::info!(event = event.name(), enabled)
            }
            SessionEvent::ManualTick { direction } => {
                tracing::debug!(event = event.name(), ?direction)
            }
        }
    }
}

/// Serialises events as JSON lines into any writer.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_event(&self, event: &SessionEvent) -> Result<()> {
        let line = serde_json::to_string(event)
            .map_err(|err| MalaError::msg(format!("failed to encode event: {err}")))?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| MalaError::msg("event writer has been poisoned"))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn emit(&self, event: &SessionEvent) {
        if let Err(err) = self.write_event(event) {
            tracing::warn!(%err, event = event.name(), "dropping session event");
        }
    }
}

impl<W: Write + Send> fmt::Debug for JsonLinesSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLinesSink").finish()
    }
}

/// Keeps events in memory; handy for tests and embedding hosts that poll.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SessionEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &SessionEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
