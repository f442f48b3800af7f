//! Subtitle cue timeline construction.
//!
//! Recorded step windows overlap whenever the recorder logged a step
//! before the previous one had visibly finished. The builder turns them
//! into a cue list where every cue ends no later than the next one starts:
//!
//! 1. stable sort by start time (ties keep recording order)
//! 2. extend short cues to the minimum duration (never shrink)
//! 3. shorten each overlapped cue to end `gap` before its first overlapper,
//!    keeping at least [`SHORTENED_FLOOR_SECS`], until a pass changes nothing
//! 4. force any remaining overlap down to [`HARD_FLOOR_SECS`]; a cue that
//!    cannot fit even that is squeezed out
//! 5. drop empty cues and renumber from 1
//!
//! Each pass maps an immutable span slice to a fresh vector.

use stepcast_common::config::FinalizeConfig;
use stepcast_common::error::{StepcastError, StepcastResult};
use stepcast_timeline_model::{Step, SubtitleCue};

/// Default iteration cap for both resolution phases.
pub const DEFAULT_MAX_PASSES: usize = 10;

/// Shortest length the first resolution phase leaves a cue.
pub const SHORTENED_FLOOR_SECS: f64 = 0.1;

/// Shortest length any surviving cue may have.
pub const HARD_FLOOR_SECS: f64 = 0.05;

/// Converts steps into a non-overlapping cue list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CueBuilder {
    min_duration: f64,
    gap: f64,
    max_passes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Span {
    start: f64,
    end: f64,
}

impl CueBuilder {
    /// Create a builder.
    ///
    /// `min_duration` below [`HARD_FLOOR_SECS`] is raised to it so that the
    /// floor holds for every surviving cue.
    pub fn new(min_duration: f64, gap: f64) -> StepcastResult<Self> {
        if !min_duration.is_finite() || min_duration <= 0.0 {
            return Err(StepcastError::conflict(format!(
                "cue minimum duration must be positive, got {min_duration}"
            )));
        }
        if !gap.is_finite() || gap < 0.0 {
            return Err(StepcastError::conflict(format!(
                "cue gap must not be negative, got {gap}"
            )));
        }
        Ok(Self {
            min_duration: min_duration.max(HARD_FLOOR_SECS),
            gap,
            max_passes: DEFAULT_MAX_PASSES,
        })
    }

    /// Builder configured from the finalization settings.
    pub fn from_config(config: &FinalizeConfig) -> StepcastResult<Self> {
        Self::new(config.subtitle_min_duration, config.subtitle_gap)
    }

    /// Override the per-phase iteration cap.
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    pub fn min_duration(&self) -> f64 {
        self.min_duration
    }

    pub fn gap(&self) -> f64 {
        self.gap
    }

    /// Build cues from steps whose times are relative to the capture.
    ///
    /// Steps without a label are skipped. A step with a negative or
    /// non-finite duration is rejected with [`StepcastError::InvalidStep`].
    pub fn build(&self, steps: &[Step]) -> StepcastResult<Vec<SubtitleCue>> {
        for (index, step) in steps.iter().enumerate() {
            step.validate(index)?;
        }

        let mut labelled: Vec<(&Step, &str)> = steps
            .iter()
            .filter_map(|step| step.label().map(|text| (step, text)))
            .collect();
        labelled.sort_by(|a, b| a.0.start_time.total_cmp(&b.0.start_time));

        let spans: Vec<Span> = labelled
            .iter()
            .map(|(step, _)| {
                let start = step.start_time;
                let end = step.end().max(start + self.min_duration);
                Span { start, end }
            })
            .collect();

        let (spans, converged) =
            fixed_point(spans, self.max_passes, |spans| shorten_overlaps(spans, self.gap));
        if !converged {
            tracing::warn!(
                cues = spans.len(),
                max_passes = self.max_passes,
                "Cue overlap resolution did not converge; forcing remaining overlaps"
            );
        }

        let (spans, converged) =
            fixed_point(spans, self.max_passes, |spans| force_overlaps(spans, self.gap));
        if !converged {
            tracing::warn!(
                cues = spans.len(),
                max_passes = self.max_passes,
                "Forced cue separation did not converge"
            );
        }

        let cues: Vec<SubtitleCue> = spans
            .iter()
            .zip(labelled.iter())
            .filter(|(span, _)| span.end > span.start)
            .enumerate()
            .map(|(i, (span, (_, text)))| SubtitleCue::new(i + 1, span.start, span.end, *text))
            .collect();

        let dropped = labelled.len() - cues.len();
        if dropped > 0 {
            tracing::debug!(dropped, "Squeezed out crowded cues");
        }

        Ok(cues)
    }
}

/// Build cues with the default iteration cap.
pub fn build_cues(steps: &[Step], min_duration: f64, gap: f64) -> StepcastResult<Vec<SubtitleCue>> {
    CueBuilder::new(min_duration, gap)?.build(steps)
}

/// Apply `pass` until it stops changing the spans or `max_passes` is hit.
/// Returns the last spans and whether a fixed point was reached.
fn fixed_point<F>(spans: Vec<Span>, max_passes: usize, pass: F) -> (Vec<Span>, bool)
where
    F: Fn(&[Span]) -> Vec<Span>,
{
    let mut current = spans;
    for _ in 0..max_passes {
        let next = pass(&current);
        if next == current {
            return (current, true);
        }
        current = next;
    }
    (current, false)
}

fn first_overlapper(spans: &[Span], i: usize) -> Option<&Span> {
    let end = spans[i].end;
    spans[i + 1..].iter().find(|other| other.start <= end)
}

/// Phase 3: end each overlapped cue `gap` before its earliest overlapper.
fn shorten_overlaps(spans: &[Span], gap: f64) -> Vec<Span> {
    (0..spans.len())
        .map(|i| {
            let span = spans[i];
            match first_overlapper(spans, i) {
                Some(next) => Span {
                    start: span.start,
                    end: (span.start + SHORTENED_FLOOR_SECS).max(next.start - gap),
                },
                None => span,
            }
        })
        .collect()
}

/// Phase 4: force separation with the hard floor, squeezing out cues
/// that cannot end at or before their overlapper.
fn force_overlaps(spans: &[Span], gap: f64) -> Vec<Span> {
    (0..spans.len())
        .map(|i| {
            let span = spans[i];
            let Some(next) = first_overlapper(spans, i) else {
                return span;
            };
            let forced = (span.start + HARD_FLOOR_SECS).max(next.start - gap);
            let end = if forced > next.start { span.start } else { forced };
            Span {
                start: span.start,
                end,
            }
        })
        .collect()
}
