use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{MalaError, Result};

/// Beads in one full mala.
pub const DEFAULT_ROUND_LENGTH: u32 = 108;
/// Target time for one bead; also the auto-advance cadence.
pub const DEFAULT_IDLE_TICK_MS: u64 = 4_800;
/// Per-word duration used by the synthetic timing table.
pub const DEFAULT_WORD_DURATION_MS: u64 = 450;
/// How often the playback position is polled.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub counter: CounterConfig,
    #[serde(default)]
    pub auto_advance: AutoAdvanceConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl AppConfig {
    /// Parses and validates a TOML document. Missing sections and fields fall
    /// back to their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML configuration file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.counter.round_length == 0 {
            return Err(MalaError::InvalidConfig(
                "counter.round_length must be at least 1".to_string(),
            ));
        }
        if self.auto_advance.interval_ms == 0 {
            return Err(MalaError::InvalidConfig(
                "auto_advance.interval_ms must be positive".to_string(),
            ));
        }
        if self.sync.poll_interval_ms == 0 {
            return Err(MalaError::InvalidConfig(
                "sync.poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Round and pacing settings for the chant counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterConfig {
    #[serde(default = "default_round_length")]
    pub round_length: u32,
    /// Elapsed time fed to the classifier for the first bead of a round.
    #[serde(default = "default_idle_tick_ms")]
    pub idle_tick_ms: u64,
}

impl CounterConfig {
    pub fn idle_tick(&self) -> Duration {
        Duration::from_millis(self.idle_tick_ms)
    }
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            round_length: DEFAULT_ROUND_LENGTH,
            idle_tick_ms: DEFAULT_IDLE_TICK_MS,
        }
    }
}

/// Settings for timer-driven ticking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoAdvanceConfig {
    #[serde(default = "default_idle_tick_ms")]
    pub interval_ms: u64,
}

impl AutoAdvanceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for AutoAdvanceConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_IDLE_TICK_MS,
        }
    }
}

/// Settings for the audio/word synchroniser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_word_duration_ms")]
    pub word_duration_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Optional `timestamp,wordIndex` track; the synthetic table is used when
    /// unset or unreadable.
    #[serde(default)]
    pub track_path: Option<PathBuf>,
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            word_duration_ms: DEFAULT_WORD_DURATION_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            track_path: None,
        }
    }
}

fn default_round_length() -> u32 {
    DEFAULT_ROUND_LENGTH
}

fn default_idle_tick_ms() -> u64 {
    DEFAULT_IDLE_TICK_MS
}

fn default_word_duration_ms() -> u64 {
    DEFAULT_WORD_DURATION_MS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
