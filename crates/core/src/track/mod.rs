//! Loader for line-oriented `timestamp,wordIndex` timing tracks.
//!
//! ```text
//! # comment
//! 0,0
//! 450,1
//! ```
//!
//! Blank lines and `#` comments are ignored. Lines that do not hold two
//! non-negative integers are skipped with a warning.

use std::{path::Path, time::Duration};

use crate::{
    sync::{TimingEntry, TimingTrack},
    MalaError, Result,
};

/// Parses track text into cues in file order.
pub fn parse_timing_track(source: &str) -> Vec<TimingEntry> {
    source
        .lines()
        .enumerate()
        .filter_map(|(number, line)| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let entry = parse_line(line);
            if entry.is_none() {
                tracing::warn!(line = number + 1, content = line, "skipping malformed timing line");
            }
            entry
        })
        .collect()
}

fn parse_line(line: &str) -> Option<TimingEntry> {
    let mut parts = line.split(',');
    let timestamp_ms = parts.next()?.trim().parse().ok()?;
    let word_index = parts.next()?.trim().parse().ok()?;
    Some(TimingEntry::new(timestamp_ms, word_index))
}

/// Reads and normalises a track file.
///
/// Fails with [`MalaError::TimingDataUnavailable`] when the file cannot be
/// read or holds no usable cue.
pub fn load_timing_file(path: impl AsRef<Path>) -> Result<TimingTrack> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|err| {
        MalaError::TimingDataUnavailable(format!("{}: {err}", path.display()))
    })?;

    let entries = parse_timing_track(&source);
    if entries.is_empty() {
        return Err(MalaError::TimingDataUnavailable(format!(
            "{}: no timing entries",
            path.display()
        )));
    }

    let track = TimingTrack::new(entries);
    tracing::info!(path = %path.display(), entries = track.len(), "loaded timing track");
    Ok(track)
}

/// Loads `path` if given, falling back to an evenly spaced synthetic track
/// for `word_count` words when the file is missing or unusable.
pub fn load_or_synthesize(
    path: Option<&Path>,
    word_count: usize,
    word_duration: Duration,
) -> TimingTrack {
    let loaded = match path {
        Some(path) => load_timing_file(path),
        None => Err(MalaError::TimingDataUnavailable(
            "no timing track configured".to_string(),
        )),
    };

    loaded.unwrap_or_else(|err| {
        tracing::warn!(%err, "using synthetic timing track");
        TimingTrack::synthetic(word_count, word_duration)
    })
}
