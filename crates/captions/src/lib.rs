//! Stepcast Captions
//!
//! Turns a recorded step timeline into subtitles:
//! - **Cue building:** Non-overlapping, minimum-duration cues from imprecise step timing
//! - **Caption writing:** Atomic SRT/VTT output in the format the transcoder reads

pub mod cues;
pub mod srt;

pub use cues::*;
pub use srt::*;
