//! Transcode planning.
//!
//! A [`TranscodePlan`] is a typed description of every transcoder run the
//! finalization needs. Nothing here spawns a process or touches the disk;
//! [`crate::render`] turns stages into argument vectors and
//! [`crate::executor`] runs them.
//!
//! Two shapes exist:
//!
//! - **Fast path**: the intro is joined onto the capture with the concat
//!   demuxer and every stream is copied. Small helper stages may precede
//!   the join (conforming the intro to the capture's codec, rescaling
//!   timestamps for a speed change) and a container remux may follow it.
//! - **Full path**: one run with a filter graph that applies speed,
//!   burned subtitles and audio mixing, re-encoding what the graph touches.
//!
//! A plan with no stages means the capture is already final.

use std::path::{Path, PathBuf};

use stepcast_common::config::FinalizeConfig;
use stepcast_common::error::{StepcastError, StepcastResult};

use crate::container::{encoder_for_audio_codec, encoder_for_video_codec, Codec, Container};
use crate::inputs::{MediaKind, MediaInputSet};
use crate::probe::{AudioPresence, SourceInfo};
use crate::render::{concat_list_line, escape_filter_path, format_factor};

/// Sample layout used for generated silence.
pub const SILENCE_SOURCE: &str = "anullsrc=channel_layout=stereo:sample_rate=48000";

/// Stream type, as used in stream specifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

impl StreamKind {
    pub fn specifier(self) -> char {
        match self {
            Self::Video => 'v',
            Self::Audio => 'a',
            Self::Subtitle => 's',
        }
    }
}

/// Where a mapped output stream comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapSource {
    /// `<index>:<kind>:<ordinal>` of an input.
    Input {
        index: usize,
        kind: StreamKind,
        ordinal: usize,
    },
    /// Output label of the filter graph.
    Label(String),
}

/// One `-map` directive. Output stream indices follow map order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamMap {
    pub source: MapSource,
    /// Missing streams are skipped instead of failing the run.
    pub optional: bool,
}

impl StreamMap {
    pub fn input(index: usize, kind: StreamKind) -> Self {
        Self {
            source: MapSource::Input {
                index,
                kind,
                ordinal: 0,
            },
            optional: false,
        }
    }

    pub fn label(label: &str) -> Self {
        Self {
            source: MapSource::Label(label.to_string()),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InputSource {
    File(PathBuf),
    /// Concat demuxer list; its content travels in the stage's staged files.
    ConcatList(PathBuf),
    /// Generated source, e.g. a solid colour or silence.
    Lavfi(String),
}

/// One `-i` together with the options that precede it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StageInput {
    pub source: InputSource,
    pub options: Vec<String>,
}

impl StageInput {
    pub fn new(source: InputSource) -> Self {
        Self {
            source,
            options: Vec::new(),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(InputSource::File(path.into()))
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.extend(options.into_iter().map(Into::into));
        self
    }
}

/// `[in]...filter,filter[out]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterChain {
    pub inputs: Vec<String>,
    pub filters: Vec<String>,
    pub output: String,
}

impl FilterChain {
    pub fn new<I, F>(inputs: I, filters: F, output: &str) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            filters: filters.into_iter().map(Into::into).collect(),
            output: output.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterGraph {
    pub chains: Vec<FilterChain>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamCodecs {
    pub video: Codec,
    pub audio: Option<Codec>,
    pub subtitle: Option<Codec>,
}

/// A small text file the executor writes before running a stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StagedFile {
    pub path: PathBuf,
    pub contents: String,
}

/// One transcoder run.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeStage {
    pub name: String,
    pub inputs: Vec<StageInput>,
    pub filter_graph: Option<FilterGraph>,
    pub maps: Vec<StreamMap>,
    pub codecs: StreamCodecs,
    pub output_options: Vec<String>,
    pub output: PathBuf,
    /// Output length, for progress reporting.
    pub expected_duration_secs: Option<f64>,
    pub staged_files: Vec<StagedFile>,
}

/// Everything needed to turn the capture into the finalized file.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodePlan {
    pub use_fast_path: bool,
    /// Filters applied to the capture's video, empty on the fast path.
    pub video_filter_chain: Vec<String>,
    pub audio_filter_chain: Vec<String>,
    /// Maps of the stage producing the output.
    pub stream_maps: Vec<StreamMap>,
    pub video_codec: Codec,
    pub audio_codec: Option<Codec>,
    pub subtitle_codec: Option<Codec>,
    pub output_container: Container,
    pub stages: Vec<TranscodeStage>,
    /// Where the last stage writes, inside the working directory.
    pub output_path: PathBuf,
}

impl TranscodePlan {
    /// True when the capture needs no transcoding at all.
    pub fn is_passthrough(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Facts the planner needs beyond the input set.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    pub config: &'a FinalizeConfig,
    /// Probe result for the capture.
    pub source: &'a SourceInfo,
    /// Probe result for the intro clip, when one is present and probed.
    pub intro: Option<&'a SourceInfo>,
    pub intro_duration_secs: f64,
    /// Absolute working directory for intermediates.
    pub work_dir: &'a Path,
    /// Caption file to burn in, relative to the transcoder's working directory.
    pub burn_captions: Option<&'a Path>,
}

/// Builds [`TranscodePlan`]s.
#[derive(Debug, Clone, Copy)]
pub struct TranscodePlanner<'a> {
    ctx: PlanContext<'a>,
}

impl<'a> TranscodePlanner<'a> {
    pub fn new(ctx: PlanContext<'a>) -> Self {
        Self { ctx }
    }

    /// Plan the finalization of `inputs`.
    ///
    /// `extra_video_filters` are appended after speed and burned subtitles
    /// and count as video filters for the fast-path decision.
    pub fn plan(
        &self,
        inputs: &MediaInputSet,
        extra_video_filters: &[String],
    ) -> StepcastResult<TranscodePlan> {
        let config = self.ctx.config;
        config.validate()?;

        let source = self.ctx.source;
        let output_container = Container::for_output(config.output_codec, &source.container);
        let output_path = self
            .ctx
            .work_dir
            .join(format!("finalized.{}", output_container.extension()));

        if inputs.has(MediaKind::SubtitleTrack) && output_container.subtitle_codec().is_none() {
            return Err(StepcastError::conflict(format!(
                "soft subtitles requested but .{} output cannot carry a subtitle track",
                output_container.extension()
            )));
        }

        let video_filters = self.video_filters(extra_video_filters);

        if self.is_passthrough(inputs, &video_filters, &output_container) {
            tracing::info!("Capture needs no transcoding");
            return Ok(TranscodePlan {
                use_fast_path: false,
                video_filter_chain: Vec::new(),
                audio_filter_chain: Vec::new(),
                stream_maps: Vec::new(),
                video_codec: Codec::Copy,
                audio_codec: None,
                subtitle_codec: None,
                output_container,
                stages: Vec::new(),
                output_path: inputs.main().path.clone(),
            });
        }

        // Speed alone can be handled by rescaling timestamps; anything else
        // in the video chain needs decoded frames.
        let has_video_filters = video_filters.len() > usize::from(config.speed_changed());
        let plan = match self.fast_path_blocker(inputs, has_video_filters) {
            None => self.fast_path(inputs, output_container, output_path)?,
            Some(reason) => {
                tracing::debug!(reason, "Fast path not eligible");
                self.full_path(inputs, video_filters, output_container, output_path)?
            }
        };

        tracing::info!(
            fast_path = plan.use_fast_path,
            stages = plan.stages.len(),
            container = plan.output_container.extension(),
            video_codec = plan.video_codec.name(),
            "Planned transcode"
        );
        Ok(plan)
    }

    fn video_filters(&self, extra: &[String]) -> Vec<String> {
        let config = self.ctx.config;
        let mut filters = Vec::new();

        if config.speed_changed() {
            filters.push(format!("setpts={}*PTS", format_factor(1.0 / config.speed)));
        }

        if config.hard_subtitles {
            if let Some(captions) = self.ctx.burn_captions {
                let mut filter = format!("subtitles=filename='{}'", escape_filter_path(captions));
                if let Some(style) = config.subtitle_style.as_deref().filter(|s| !s.is_empty()) {
                    filter.push_str(&format!(":force_style='{}'", style.replace('\'', "")));
                }
                filters.push(filter);
            }
        }

        filters.extend(extra.iter().cloned());
        filters
    }

    fn is_passthrough(
        &self,
        inputs: &MediaInputSet,
        video_filters: &[String],
        output_container: &Container,
    ) -> bool {
        inputs.len() == 1 && video_filters.is_empty() && *output_container == self.ctx.source.container
    }

    /// Why the fast path cannot be used, or `None` when it can.
    fn fast_path_blocker(&self, inputs: &MediaInputSet, has_video_filters: bool) -> Option<&'static str> {
        let config = self.ctx.config;
        let source = self.ctx.source;

        if !inputs.has(MediaKind::IntroClip) {
            return Some("no intro clip to join");
        }
        // Burned subtitles re-encode even when no step carries a label.
        if has_video_filters || config.hard_subtitles {
            return Some("video filters require a re-encode");
        }
        if inputs.has_external_audio() {
            return Some("external audio must be mixed");
        }
        if config.speed_changed() && source.audio.may_exist() {
            return Some("capture audio must be time-stretched");
        }
        let Some(video_codec) = source.video_codec.as_deref() else {
            return Some("capture streams could not be probed");
        };
        if source.audio == AudioPresence::Unknown {
            return Some("capture streams could not be probed");
        }
        if self.intro_needs_conforming() {
            if encoder_for_video_codec(video_codec).is_none() {
                return Some("no encoder produces the capture's video codec");
            }
            if let Some(audio_codec) = source.audio.codec() {
                if encoder_for_audio_codec(audio_codec).is_none() {
                    return Some("no encoder produces the capture's audio codec");
                }
            }
        }
        None
    }

    /// Whether the intro's streams differ from the capture's, which would
    /// break stream-copy concatenation.
    fn intro_needs_conforming(&self) -> bool {
        let source = self.ctx.source;
        let Some(intro) = self.ctx.intro else {
            return true;
        };

        if intro.video_codec.is_none() || intro.video_codec != source.video_codec {
            return true;
        }
        match (intro.dimensions(), source.dimensions()) {
            (Some(a), Some(b)) if a == b => {}
            _ => return true,
        }
        match (&source.audio, &intro.audio) {
            (AudioPresence::Absent, AudioPresence::Absent) => false,
            (AudioPresence::Present(a), AudioPresence::Present(b)) => a != b,
            _ => true,
        }
    }

    fn fast_path(
        &self,
        inputs: &MediaInputSet,
        output_container: Container,
        output_path: PathBuf,
    ) -> StepcastResult<TranscodePlan> {
        let config = self.ctx.config;
        let source = self.ctx.source;
        let work_dir = self.ctx.work_dir;
        let ext = source.container.extension();
        let capture_has_audio = matches!(source.audio, AudioPresence::Present(_));

        let intro = inputs
            .get(MediaKind::IntroClip)
            .ok_or_else(|| StepcastError::conflict("fast path planned without an intro"))?;
        let main = inputs.main();
        let subtitles = inputs.get(MediaKind::SubtitleTrack);

        let mut stages = Vec::new();

        let mut intro_path = intro.path.clone();
        if self.intro_needs_conforming() {
            let conformed = work_dir.join(format!("intro-conformed.{ext}"));
            stages.push(self.conform_intro_stage(&intro.path, &conformed)?);
            intro_path = conformed;
        }

        let mut main_path = main.path.clone();
        if config.speed_changed() {
            let retimed = work_dir.join(format!("retimed.{ext}"));
            stages.push(TranscodeStage {
                name: "retime".to_string(),
                inputs: vec![StageInput::file(&main.path)
                    .with_options(["-itsscale".to_string(), format_factor(1.0 / config.speed)])],
                filter_graph: None,
                maps: vec![StreamMap::input(0, StreamKind::Video)],
                codecs: StreamCodecs {
                    video: Codec::Copy,
                    audio: None,
                    subtitle: None,
                },
                output_options: Vec::new(),
                output: retimed.clone(),
                expected_duration_secs: source.duration_secs.map(|d| d / config.speed),
                staged_files: Vec::new(),
            });
            main_path = retimed;
        }

        let remux = output_container != source.container;
        let joined = if remux {
            work_dir.join(format!("joined.{ext}"))
        } else {
            output_path.clone()
        };
        let total_secs = source
            .duration_secs
            .map(|d| d / config.speed + self.ctx.intro_duration_secs);

        let list_path = work_dir.join("concat.txt");
        let list = format!(
            "{}\n{}\n",
            concat_list_line(&intro_path),
            concat_list_line(&main_path)
        );

        let mut join = TranscodeStage {
            name: "concat".to_string(),
            inputs: vec![StageInput::new(InputSource::ConcatList(list_path.clone()))],
            filter_graph: None,
            maps: vec![StreamMap::input(0, StreamKind::Video)],
            codecs: StreamCodecs {
                video: Codec::Copy,
                audio: None,
                subtitle: None,
            },
            output_options: Vec::new(),
            output: joined.clone(),
            expected_duration_secs: total_secs,
            staged_files: vec![StagedFile {
                path: list_path,
                contents: list,
            }],
        };
        if capture_has_audio {
            join.maps.push(StreamMap::input(0, StreamKind::Audio).optional());
            join.codecs.audio = Some(Codec::Copy);
        }

        let mut last = if remux {
            stages.push(join);
            let video_codec = match source.video_codec.as_deref() {
                Some(codec) if output_container.accepts_video(codec) => Codec::Copy,
                codec => Codec::encode(output_container.video_encoder_for(codec).ok_or_else(
                    || encode_conflict("video", &output_container),
                )?),
            };
            let mut stage = TranscodeStage {
                name: "remux".to_string(),
                inputs: vec![StageInput::file(&joined)],
                filter_graph: None,
                maps: vec![StreamMap::input(0, StreamKind::Video)],
                codecs: StreamCodecs {
                    video: video_codec,
                    audio: None,
                    subtitle: None,
                },
                output_options: output_container.muxer_options(),
                output: output_path.clone(),
                expected_duration_secs: total_secs,
                staged_files: Vec::new(),
            };
            if let Some(audio_codec) = source.audio.codec() {
                stage.maps.push(StreamMap::input(0, StreamKind::Audio).optional());
                stage.codecs.audio = Some(if output_container.accepts_audio(audio_codec) {
                    Codec::Copy
                } else {
                    Codec::encode(
                        output_container
                            .audio_encoder_for(Some(audio_codec))
                            .ok_or_else(|| encode_conflict("audio", &output_container))?,
                    )
                });
            }
            stage
        } else {
            join.output_options = output_container.muxer_options();
            join
        };

        if let Some(subs) = subtitles {
            self.attach_subtitles(&mut last, &subs.path, &output_container)?;
        }

        let stream_maps = last.maps.clone();
        let codecs = last.codecs.clone();
        stages.push(last);

        Ok(TranscodePlan {
            use_fast_path: true,
            video_filter_chain: Vec::new(),
            audio_filter_chain: Vec::new(),
            stream_maps,
            video_codec: codecs.video,
            audio_codec: codecs.audio,
            subtitle_codec: codecs.subtitle,
            output_container,
            stages,
            output_path,
        })
    }

    /// Add the soft subtitle track as the stage's last input.
    fn attach_subtitles(
        &self,
        stage: &mut TranscodeStage,
        path: &Path,
        container: &Container,
    ) -> StepcastResult<()> {
        let codec = container.subtitle_codec().ok_or_else(|| {
            StepcastError::conflict(format!(
                ".{} output cannot carry a subtitle track",
                container.extension()
            ))
        })?;
        let index = stage.inputs.len();
        stage.inputs.push(
            StageInput::file(path)
                .with_options(["-itsoffset".to_string(), format_factor(self.ctx.intro_duration_secs)]),
        );
        stage.maps.push(StreamMap::input(index, StreamKind::Subtitle));
        stage.codecs.subtitle = Some(Codec::encode(codec));
        Ok(())
    }

    /// Re-encode the intro so its streams match the capture's.
    fn conform_intro_stage(&self, intro: &Path, output: &Path) -> StepcastResult<TranscodeStage> {
        let source = self.ctx.source;
        let video_encoder = source
            .video_codec
            .as_deref()
            .and_then(encoder_for_video_codec)
            .ok_or_else(|| encode_conflict("video", &source.container))?;

        let mut stage = TranscodeStage {
            name: "conform-intro".to_string(),
            inputs: vec![StageInput::file(intro)],
            filter_graph: Some(FilterGraph {
                chains: vec![FilterChain::new(["0:v:0"], self.conform_filters(), "v")],
            }),
            maps: vec![StreamMap::label("v")],
            codecs: StreamCodecs {
                video: Codec::encode(video_encoder),
                audio: None,
                subtitle: None,
            },
            output_options: Vec::new(),
            output: output.to_path_buf(),
            expected_duration_secs: Some(self.ctx.intro_duration_secs),
            staged_files: Vec::new(),
        };

        if let Some(audio_codec) = source.audio.codec() {
            let audio_encoder = encoder_for_audio_codec(audio_codec)
                .ok_or_else(|| encode_conflict("audio", &source.container))?;
            stage
                .inputs
                .push(StageInput::new(InputSource::Lavfi(SILENCE_SOURCE.to_string())));
            stage.maps.push(StreamMap::input(1, StreamKind::Audio));
            stage.codecs.audio = Some(Codec::encode(audio_encoder));
            stage.output_options.push("-shortest".to_string());
        }

        Ok(stage)
    }

    /// Filters that bring the intro to the capture's frame size and rate.
    fn conform_filters(&self) -> Vec<String> {
        let source = self.ctx.source;
        let mut filters = Vec::new();
        if let Some((w, h)) = source.dimensions() {
            filters.push(format!("scale={w}:{h}:force_original_aspect_ratio=decrease"));
            filters.push(format!("pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"));
        }
        filters.push("setsar=1".to_string());
        if let Some(rate) = source.frame_rate {
            filters.push(format!("fps={}", format_factor(rate)));
        }
        filters
    }

    fn full_path(
        &self,
        inputs: &MediaInputSet,
        video_filters: Vec<String>,
        output_container: Container,
        output_path: PathBuf,
    ) -> StepcastResult<TranscodePlan> {
        let config = self.ctx.config;
        let source = self.ctx.source;
        let main = inputs.main();
        let intro = inputs.get(MediaKind::IntroClip);
        let intro_secs = intro.map(|_| self.ctx.intro_duration_secs);

        let stage_inputs: Vec<StageInput> = inputs
            .iter()
            .map(|input| {
                let stage_input = StageInput::file(&input.path);
                match (input.kind, intro_secs) {
                    (MediaKind::SubtitleTrack, Some(secs)) => stage_input
                        .with_options(["-itsoffset".to_string(), format_factor(secs)]),
                    _ => stage_input,
                }
            })
            .collect();

        let mut chains = Vec::new();
        let main_video = format!("{}:v:0", main.index);
        let video_map = if let Some(intro) = intro {
            let mut main_filters = video_filters.clone();
            main_filters.push("setsar=1".to_string());
            chains.push(FilterChain::new(
                [format!("{}:v:0", intro.index)],
                self.conform_filters(),
                "vintro",
            ));
            chains.push(FilterChain::new([main_video], main_filters, "vmain"));
            chains.push(FilterChain::new(
                ["vintro", "vmain"],
                ["concat=n=2:v=1:a=0"],
                "v",
            ));
            StreamMap::label("v")
        } else if !video_filters.is_empty() {
            chains.push(FilterChain::new([main_video], video_filters.clone(), "v"));
            StreamMap::label("v")
        } else {
            StreamMap::input(main.index, StreamKind::Video)
        };

        let reencode_video =
            !video_filters.is_empty() || intro.is_some() || output_container != source.container;
        let video_codec = if reencode_video {
            Codec::encode(
                output_container
                    .video_encoder_for(source.video_codec.as_deref())
                    .ok_or_else(|| encode_conflict("video", &output_container))?,
            )
        } else {
            Codec::Copy
        };

        let audio = self.plan_audio(inputs, intro_secs, &output_container)?;
        let audio_filter_chain: Vec<String> = audio
            .chains
            .iter()
            .flat_map(|chain| chain.filters.iter().cloned())
            .collect();
        chains.extend(audio.chains);

        let mut maps = vec![video_map];
        maps.extend(audio.map);
        let mut stage = TranscodeStage {
            name: "transcode".to_string(),
            inputs: stage_inputs,
            filter_graph: (!chains.is_empty()).then_some(FilterGraph { chains }),
            maps,
            codecs: StreamCodecs {
                video: video_codec,
                audio: audio.codec,
                subtitle: None,
            },
            output_options: Vec::new(),
            output: output_path.clone(),
            expected_duration_secs: source
                .duration_secs
                .map(|d| d / config.speed + intro_secs.unwrap_or(0.0)),
            staged_files: Vec::new(),
        };

        if let Some(subs) = inputs.get(MediaKind::SubtitleTrack) {
            let codec = output_container
                .subtitle_codec()
                .ok_or_else(|| encode_conflict("subtitles", &output_container))?;
            stage.maps.push(StreamMap::input(subs.index, StreamKind::Subtitle));
            stage.codecs.subtitle = Some(Codec::encode(codec));
        }

        if audio.external {
            stage.output_options.push("-shortest".to_string());
        }
        stage.output_options.extend(output_container.muxer_options());

        Ok(TranscodePlan {
            use_fast_path: false,
            video_filter_chain: video_filters,
            audio_filter_chain,
            stream_maps: stage.maps.clone(),
            video_codec: stage.codecs.video.clone(),
            audio_codec: stage.codecs.audio.clone(),
            subtitle_codec: stage.codecs.subtitle.clone(),
            output_container,
            stages: vec![stage],
            output_path,
        })
    }

    fn plan_audio(
        &self,
        inputs: &MediaInputSet,
        intro_secs: Option<f64>,
        output_container: &Container,
    ) -> StepcastResult<AudioPlan> {
        let config = self.ctx.config;
        let source = self.ctx.source;
        let main = inputs.main();
        let external = inputs.has_external_audio();
        let needs_graph = config.speed_changed() || intro_secs.is_some() || external;

        let encoder = || {
            output_container
                .audio_encoder_for(source.audio.codec())
                .map(Codec::encode)
                .ok_or_else(|| encode_conflict("audio", output_container))
        };

        if !needs_graph {
            // Nothing touches the capture's own audio: carry it over if it exists.
            return Ok(match &source.audio {
                AudioPresence::Absent => AudioPlan::default(),
                presence => {
                    let copyable = match presence.codec() {
                        Some(codec) => output_container.accepts_audio(codec),
                        None => *output_container == source.container,
                    };
                    AudioPlan {
                        map: Some(StreamMap::input(main.index, StreamKind::Audio).optional()),
                        codec: Some(if copyable { Codec::Copy } else { encoder()? }),
                        ..AudioPlan::default()
                    }
                }
            });
        }

        let tempo: Vec<String> = if config.speed_changed() {
            atempo_chain(config.speed)
                .into_iter()
                .map(|factor| format!("atempo={}", format_factor(factor)))
                .collect()
        } else {
            Vec::new()
        };

        let mut sources: Vec<(String, Vec<String>)> = Vec::new();
        match &source.audio {
            AudioPresence::Present(_) => {
                sources.push((format!("{}:a:0", main.index), tempo.clone()));
            }
            AudioPresence::Unknown => {
                tracing::warn!("Capture audio could not be probed, leaving it out of the filtered output");
            }
            AudioPresence::Absent => {}
        }
        for input in inputs.audio_inputs() {
            let filters = match input.kind {
                MediaKind::BackgroundAudio => {
                    vec![format!("volume={}", format_factor(config.background_volume))]
                }
                _ => tempo.clone(),
            };
            sources.push((format!("{}:a:0", input.index), filters));
        }

        if sources.is_empty() {
            return Ok(AudioPlan::default());
        }

        let mut tail = Vec::new();
        if sources.len() > 1 {
            tail.push(format!(
                "amix=inputs={}:duration=longest:dropout_transition=0:normalize=0",
                sources.len()
            ));
        }
        if let Some(secs) = intro_secs {
            tail.push(format!(
                "adelay=delays={}:all=1",
                (secs * 1000.0).round() as u64
            ));
        }
        if external {
            // Padded audio lets -shortest end the output with the video.
            tail.push("apad".to_string());
        }

        let chains = if sources.len() == 1 {
            let (label, mut filters) = sources.remove(0);
            filters.extend(tail);
            if filters.is_empty() {
                filters.push("anull".to_string());
            }
            vec![FilterChain::new([label], filters, "a")]
        } else {
            let mut chains = Vec::with_capacity(sources.len() + 1);
            let mut labels = Vec::with_capacity(sources.len());
            for (i, (label, mut filters)) in sources.into_iter().enumerate() {
                if filters.is_empty() {
                    filters.push("anull".to_string());
                }
                let out = format!("a{i}");
                chains.push(FilterChain::new([label], filters, &out));
                labels.push(out);
            }
            chains.push(FilterChain::new(labels, tail, "a"));
            chains
        };

        Ok(AudioPlan {
            chains,
            map: Some(StreamMap::label("a")),
            codec: Some(encoder()?),
            external,
        })
    }
}

#[derive(Debug, Default)]
struct AudioPlan {
    chains: Vec<FilterChain>,
    map: Option<StreamMap>,
    codec: Option<Codec>,
    external: bool,
}

fn encode_conflict(stream: &str, container: &Container) -> StepcastError {
    StepcastError::conflict(format!(
        "no encoder can produce {stream} for .{} output",
        container.extension()
    ))
}

/// Split a tempo factor into `atempo` stages that each stay within
/// `[0.5, 2.0]` and multiply to `speed`.
pub fn atempo_chain(speed: f64) -> Vec<f64> {
    if !speed.is_finite() || speed <= 0.0 {
        return Vec::new();
    }

    let mut remaining = speed;
    let mut stages = Vec::new();
    while remaining > 2.0 {
        stages.push(2.0);
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        stages.push(0.5);
        remaining /= 0.5;
    }
    if (remaining - 1.0).abs() > 1e-9 {
        stages.push(remaining);
    }
    stages
}
