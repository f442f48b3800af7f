//! Stepcast Timeline Model
//!
//! Defines the data contracts shared by the finalization pipeline:
//! - **Steps:** Recorded browser interactions with start time, duration, and label
//! - **Step timeline:** The ordered step list plus the moment capture began
//! - **Cues:** Non-overlapping subtitle display intervals derived from steps
//!
//! All times are seconds. Timelines loaded from disk may carry absolute
//! timestamps; [`StepTimeline::relative_to_capture`] rebases them onto the
//! capture file's own clock.

pub mod cue;
pub mod step;

pub use cue::*;
pub use step::*;
