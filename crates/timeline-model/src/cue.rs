//! Subtitle cues.

use serde::{Deserialize, Serialize};

/// One subtitle display interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCue {
    /// 1-based sequence number.
    pub index: usize,

    /// Display start in seconds.
    pub start: f64,

    /// Display end in seconds (`end > start`).
    pub end: f64,

    /// Text shown for the interval.
    pub text: String,
}

impl SubtitleCue {
    pub fn new(index: usize, start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            index,
            start,
            end,
            text: text.into(),
        }
    }

    /// On-screen time in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Copy of this cue with both edges divided by `speed`.
    pub fn retimed(&self, speed: f64) -> Self {
        Self {
            index: self.index,
            start: self.start / speed,
            end: self.end / speed,
            text: self.text.clone(),
        }
    }
}

/// Rescale a cue list to a playback speed. Dividing by a positive factor
/// is monotonic, so ordering and non-overlap carry over.
pub fn retime_cues(cues: &[SubtitleCue], speed: f64) -> Vec<SubtitleCue> {
    if (speed - 1.0).abs() <= f64::EPSILON {
        return cues.to_vec();
    }
    cues.iter().map(|cue| cue.retimed(speed)).collect()
}

/// Whether every adjacent pair satisfies `prev.end <= next.start`.
pub fn is_non_overlapping(cues: &[SubtitleCue]) -> bool {
    cues.windows(2).all(|pair| pair[0].end <= pair[1].start)
}
