//! Pace feedback for individual beads.
//!
//! Every non-negative elapsed time maps to exactly one [`Feedback`] band. The
//! band edges are inclusive on their upper side in milliseconds, so `3000`
//! is the first `Fast` value and `8001` the first `VerySlow` value.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{MalaError, Result};

/// Upper bound (inclusive) of the `VeryFast` band.
pub const VERY_FAST_MAX_MS: u64 = 2_999;
/// Upper bound (inclusive) of the `Fast` band.
pub const FAST_MAX_MS: u64 = 3_500;
/// Upper bound (inclusive) of the `Good` band.
pub const GOOD_MAX_MS: u64 = 4_900;
/// Upper bound (inclusive) of the `SlowerThanUsual` band.
pub const SLOWER_THAN_USUAL_MAX_MS: u64 = 6_000;
/// Upper bound (inclusive) of the `Slow` band. Anything above is `VerySlow`.
pub const SLOW_MAX_MS: u64 = 8_000;

/// Named pace category shown to the chanter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feedback {
    /// No bead timed yet in the current round.
    Begin,
    VeryFast,
    Fast,
    Good,
    SlowerThanUsual,
    Slow,
    VerySlow,
}

impl Feedback {
    /// Pace band for a non-negative elapsed time.
    pub fn for_millis(elapsed_ms: u64) -> Self {
        match elapsed_ms {
            0..=VERY_FAST_MAX_MS => Feedback::VeryFast,
            ms if ms <= FAST_MAX_MS => Feedback::Fast,
            ms if ms <= GOOD_MAX_MS => Feedback::Good,
            ms if ms <= SLOWER_THAN_USUAL_MAX_MS => Feedback::SlowerThanUsual,
            ms if ms <= SLOW_MAX_MS => Feedback::Slow,
            _ => Feedback::VerySlow,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Feedback::Begin => "Begin",
            Feedback::VeryFast => "Very fast",
            Feedback::Fast => "Fast",
            Feedback::Good => "Good",
            Feedback::SlowerThanUsual => "Slower than usual",
            Feedback::Slow => "Slow",
            Feedback::VerySlow => "Very slow",
        }
    }

    /// Display colour associated with the band.
    pub fn color(self) -> FeedbackColor {
        match self {
            Feedback::Begin => FeedbackColor::Gray,
            Feedback::VeryFast | Feedback::Fast => FeedbackColor::Red,
            Feedback::Good => FeedbackColor::Green,
            Feedback::SlowerThanUsual | Feedback::Slow | Feedback::VerySlow => {
                FeedbackColor::Yellow
            }
        }
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedbackColor {
    Gray,
    Red,
    Green,
    Yellow,
}

impl FeedbackColor {
    /// sRGB value used by the reference theme.
    pub fn rgb(self) -> [u8; 3] {
        match self {
            FeedbackColor::Gray => [0x88, 0x88, 0x88],
            FeedbackColor::Red => [0xE5, 0x39, 0x35],
            FeedbackColor::Green => [0x43, 0xA0, 0x47],
            FeedbackColor::Yellow => [0xFD, 0xD8, 0x35],
        }
    }
}

/// A feedback category together with its colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub feedback: Feedback,
    pub color: FeedbackColor,
}

impl Classification {
    pub fn new(feedback: Feedback) -> Self {
        Self {
            feedback,
            color: feedback.color(),
        }
    }

    /// State shown before the first timed bead of a round.
    pub fn begin() -> Self {
        Self::new(Feedback::Begin)
    }
}

impl Default for Classification {
    fn default() -> Self {
        Self::begin()
    }
}

/// Classifies a signed elapsed time in milliseconds.
///
/// Negative input is rejected with [`MalaError::InvalidDuration`].
pub fn classify(elapsed_ms: i64) -> Result<Classification> {
    let millis = u64::try_from(elapsed_ms)
        .map_err(|_| MalaError::InvalidDuration { millis: elapsed_ms })?;
    Ok(Classification::new(Feedback::for_millis(millis)))
}

/// Classifies a [`Duration`], which can never be negative.
pub fn classify_duration(elapsed: Duration) -> Classification {
    let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    Classification::new(Feedback::for_millis(millis))
}
