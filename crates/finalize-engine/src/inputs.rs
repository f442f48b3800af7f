//! Resolution of the transcoder's input list.
//!
//! Input order is fixed: intro, main capture, soft subtitle track,
//! narration, background audio. Filter graphs and stream maps refer to
//! inputs by position, so the same set of active kinds must always yield
//! the same indices.

use std::path::{Path, PathBuf};

use stepcast_common::config::FinalizeConfig;

/// Role of one transcoder input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaKind {
    IntroClip,
    MainVideo,
    SubtitleTrack,
    NarrationAudio,
    BackgroundAudio,
}

impl MediaKind {
    pub fn is_audio(self) -> bool {
        matches!(self, Self::NarrationAudio | Self::BackgroundAudio)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::IntroClip => "intro",
            Self::MainVideo => "main",
            Self::SubtitleTrack => "subtitles",
            Self::NarrationAudio => "narration",
            Self::BackgroundAudio => "background",
        }
    }
}

/// One input to the transcoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInput {
    pub kind: MediaKind,
    pub path: PathBuf,
    /// Position in the transcoder's input list.
    pub index: usize,
}

/// Optional media offered to [`MediaInputSet::resolve`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionalMedia<'a> {
    pub narration: Option<&'a Path>,
    pub intro: Option<&'a Path>,
    pub subtitles: Option<&'a Path>,
}

/// Active inputs in transcoder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInputSet {
    inputs: Vec<MediaInput>,
}

impl MediaInputSet {
    /// Decide which inputs take part in this run.
    ///
    /// Optional media whose file is missing or empty is skipped; that is a
    /// normal outcome, not an error. Burned subtitles are a video filter
    /// and never become an input.
    pub fn resolve(main: &Path, config: &FinalizeConfig, optional: OptionalMedia<'_>) -> Self {
        let mut candidates: Vec<(MediaKind, PathBuf)> = Vec::with_capacity(5);

        if config.intro_enabled {
            if let Some(intro) = optional.intro.filter(|p| is_usable(p)) {
                candidates.push((MediaKind::IntroClip, intro.to_path_buf()));
            }
        }

        candidates.push((MediaKind::MainVideo, main.to_path_buf()));

        if config.soft_subtitles() {
            if let Some(subs) = optional.subtitles.filter(|p| is_usable(p)) {
                candidates.push((MediaKind::SubtitleTrack, subs.to_path_buf()));
            }
        }

        if config.narration_enabled {
            if let Some(narration) = optional.narration.filter(|p| is_usable(p)) {
                candidates.push((MediaKind::NarrationAudio, narration.to_path_buf()));
            }
        }

        if let Some(background) = config
            .background_audio_path
            .as_deref()
            .filter(|p| is_usable(p))
        {
            candidates.push((MediaKind::BackgroundAudio, background.to_path_buf()));
        }

        let inputs: Vec<MediaInput> = candidates
            .into_iter()
            .enumerate()
            .map(|(index, (kind, path))| MediaInput { kind, path, index })
            .collect();

        tracing::debug!(
            inputs = ?inputs.iter().map(|i| i.kind.as_str()).collect::<Vec<_>>(),
            "Resolved media inputs"
        );

        Self { inputs }
    }

    pub fn get(&self, kind: MediaKind) -> Option<&MediaInput> {
        self.inputs.iter().find(|input| input.kind == kind)
    }

    pub fn index_of(&self, kind: MediaKind) -> Option<usize> {
        self.get(kind).map(|input| input.index)
    }

    pub fn has(&self, kind: MediaKind) -> bool {
        self.get(kind).is_some()
    }

    /// The main capture. Always present.
    pub fn main(&self) -> &MediaInput {
        // resolve() always pushes the main capture.
        &self.inputs[self.index_of(MediaKind::MainVideo).unwrap_or(0)]
    }

    /// External audio inputs in input order.
    pub fn audio_inputs(&self) -> impl Iterator<Item = &MediaInput> {
        self.inputs.iter().filter(|input| input.kind.is_audio())
    }

    pub fn has_external_audio(&self) -> bool {
        self.audio_inputs().next().is_some()
    }

    pub fn kinds(&self) -> Vec<MediaKind> {
        self.inputs.iter().map(|input| input.kind).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MediaInput> {
        self.inputs.iter()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

fn is_usable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}
