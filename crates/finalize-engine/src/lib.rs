//! Stepcast Finalize Engine
//!
//! Turns a raw browser capture plus its step timeline into the finished
//! demonstration video with a single planned transcoder run.
//!
//! # Pipeline Architecture
//!
//! ```text
//! steps.json ── CueBuilder ── captions.srt ──┐
//!                                            │
//! intro.webm ────────────────────────────────┤
//! capture.webm ──────────────────────────────┼── MediaInputSet
//! narration.wav / background.mp3 ────────────┘         │
//!                                                      ▼
//!                                              TranscodePlanner
//!                                        (fast path: copy/concat/remux,
//!                                         full path: filter graph)
//!                                                      │
//!                                                      ▼
//!                                              TranscodeExecutor (ffmpeg)
//!                                                      │
//!                                                      ▼
//!                                    atomic replace of capture.<ext>
//! ```

pub mod container;
pub mod executor;
pub mod inputs;
pub mod intro;
pub mod pipeline;
pub mod plan;
pub mod probe;
pub mod render;
pub mod workdir;

pub use container::*;
pub use executor::*;
pub use inputs::*;
pub use pipeline::*;
pub use plan::*;
pub use probe::*;
pub use workdir::*;
