//! Maps audio playback positions to the word that should be highlighted.

use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use serde::{Deserialize, Serialize};

/// Words of the default mantra, in recitation order.
pub const MANTRA_WORDS: [&str; 16] = [
    "हरे", "कृष्ण,", "हरे", "कृष्ण,", "कृष्ण", "कृष्ण,", "हरे", "हरे|", "हरे", "राम,", "हरे",
    "राम,", "राम", "राम,", "हरे", "हरे||",
];

/// The default mantra as a single display line.
pub fn mantra_text() -> String {
    MANTRA_WORDS.join(" ")
}

/// A single `timestamp -> word` cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingEntry {
    pub timestamp_ms: u64,
    pub word_index: usize,
}

impl TimingEntry {
    pub fn new(timestamp_ms: u64, word_index: usize) -> Self {
        Self {
            timestamp_ms,
            word_index,
        }
    }
}

/// Immutable cue table sorted by ascending timestamp with unique timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimingTrack {
    entries: Vec<TimingEntry>,
}

impl TimingTrack {
    /// Sorts the entries and drops later duplicates of the same timestamp.
    pub fn new(mut entries: Vec<TimingEntry>) -> Self {
        // Stable sort keeps the first occurrence ahead of its duplicates.
        entries.sort_by_key(|entry| entry.timestamp_ms);
        let before = entries.len();
        entries.dedup_by_key(|entry| entry.timestamp_ms);
        if entries.len() != before {
            tracing::debug!(
                dropped = before - entries.len(),
                "dropped duplicate timing timestamps"
            );
        }
        Self { entries }
    }

    /// Evenly spaced cues, one per word, used when no track is available.
    pub fn synthetic(word_count: usize, word_duration: Duration) -> Self {
        let step = u64::try_from(word_duration.as_millis()).unwrap_or(u64::MAX);
        let entries = (0..word_count)
            .map(|index| TimingEntry::new((index as u64).saturating_mul(step), index))
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[TimingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Word of the last cue at or before `position_ms`.
    pub fn word_index_at(&self, position_ms: u64) -> Option<usize> {
        let after = self
            .entries
            .partition_point(|entry| entry.timestamp_ms <= position_ms);
        after
            .checked_sub(1)
            .map(|index| self.entries[index].word_index)
    }
}

/// Thread-safe holder of the active [`TimingTrack`].
///
/// Loading publishes a whole new table; lookups only clone the current `Arc`
/// and never observe a partially written table.
#[derive(Debug, Default)]
pub struct AudioWordSynchronizer {
    track: RwLock<Option<Arc<TimingTrack>>>,
}

impl AudioWordSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalises `entries` into a track and swaps it in.
    pub fn load(&self, entries: Vec<TimingEntry>) {
        self.install(TimingTrack::new(entries));
    }

    pub fn install(&self, track: impl Into<Arc<TimingTrack>>) {
        let track = track.into();
        tracing::debug!(entries = track.len(), "timing track installed");
        *self.track.write().unwrap_or_else(PoisonError::into_inner) = Some(track);
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }

    /// Currently installed track, if any.
    pub fn current(&self) -> Option<Arc<TimingTrack>> {
        self.track
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Word to highlight at `position_ms`, or `None` before the first cue and
    /// when no track has been loaded.
    pub fn word_index_at(&self, position_ms: u64) -> Option<usize> {
        self.current()?.word_index_at(position_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn three_words() -> Vec<TimingEntry> {
        vec![
            TimingEntry::new(0, 0),
            TimingEntry::new(450, 1),
            TimingEntry::new(900, 2),
        ]
    }

    #[test]
    fn finds_latest_cue_at_or_before_position() {
        let sync = AudioWordSynchronizer::new();
        sync.load(three_words());

        assert_eq!(sync.word_index_at(0), Some(0));
        assert_eq!(sync.word_index_at(449), Some(0));
        assert_eq!(sync.word_index_at(450), Some(1));
        assert_eq!(sync.word_index_at(1_000), Some(2));
    }

    #[test]
    fn unloaded_or_empty_tables_have_no_word() {
        let sync = AudioWordSynchronizer::new();
        assert!(!sync.is_loaded());
        assert_eq!(sync.word_index_at(0), None);

        sync.load(Vec::new());
        assert!(sync.is_loaded());
        assert_eq!(sync.word_index_at(10_000), None);
    }

    #[test]
    fn positions_before_first_cue_have_no_word() {
        let sync = AudioWordSynchronizer::new();
        sync.load(vec![TimingEntry::new(200, 4), TimingEntry::new(600, 5)]);
        assert_eq!(sync.word_index_at(199), None);
        assert_eq!(sync.word_index_at(200), Some(4));
    }

    #[test]
    fn load_sorts_and_keeps_first_duplicate() {
        let track = TimingTrack::new(vec![
            TimingEntry::new(900, 2),
            TimingEntry::new(0, 0),
            TimingEntry::new(450, 1),
            TimingEntry::new(450, 7),
        ]);

        assert_eq!(track.entries(), three_words().as_slice());
    }

    #[test]
    fn synthetic_track_covers_every_word() {
        let track = TimingTrack::synthetic(MANTRA_WORDS.len(), Duration::from_millis(450));

        assert_eq!(track.len(), 16);
        assert_eq!(track.entries()[1], TimingEntry::new(450, 1));
        assert_eq!(track.word_index_at(15 * 450 + 10), Some(15));
    }

    #[test]
    fn reload_swaps_whole_table() {
        let sync = Arc::new(AudioWordSynchronizer::new());
        sync.load(three_words());

        let reader = {
            let sync = sync.clone();
            thread::spawn(move || {
                for _ in 0..1_000 {
                    let word = sync.word_index_at(450);
                    assert!(word == Some(1) || word == Some(9), "torn read: {word:?}");
                }
            })
        };
        for _ in 0..100 {
            sync.load(vec![TimingEntry::new(0, 8), TimingEntry::new(450, 9)]);
            sync.load(three_words());
        }
        reader.join().unwrap();
    }

    #[test]
    fn mantra_text_joins_words() {
        let text = mantra_text();
        assert!(text.starts_with("हरे कृष्ण,"));
        assert_eq!(text.split(' ').count(), MANTRA_WORDS.len());
    }
}
