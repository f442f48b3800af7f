use std::path::{Path, PathBuf};

use stepcast_common::config::{FinalizeConfig, OutputCodec};
use stepcast_common::error::{StepcastError, StepcastResult};
use stepcast_finalize_engine::render::render_plan;
use stepcast_finalize_engine::{
    atempo_chain, AudioPresence, Codec, Container, InputSource, MapSource, MediaInputSet, MediaKind,
    OptionalMedia, PlanContext, SourceInfo, StreamKind, StreamMap, TranscodePlan, TranscodePlanner,
};

struct Recording {
    dir: tempfile::TempDir,
    capture: PathBuf,
    intro: PathBuf,
    captions: PathBuf,
    narration: PathBuf,
    music: PathBuf,
}

impl Recording {
    fn new(capture_name: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, b"media").unwrap();
            path
        };
        Self {
            capture: write(capture_name),
            intro: write("intro.webm"),
            captions: write("captions.srt"),
            narration: write("narration.wav"),
            music: write("music.mp3"),
            dir,
        }
    }

    fn work_dir(&self) -> PathBuf {
        self.dir.path().join(".stepcast-test")
    }

    fn resolve(&self, config: &FinalizeConfig) -> MediaInputSet {
        MediaInputSet::resolve(
            &self.capture,
            config,
            OptionalMedia {
                narration: Some(&self.narration),
                intro: Some(&self.intro),
                subtitles: Some(&self.captions),
            },
        )
    }

    fn plan(
        &self,
        config: &FinalizeConfig,
        source: &SourceInfo,
        intro: Option<&SourceInfo>,
        burn: Option<&Path>,
    ) -> StepcastResult<TranscodePlan> {
        let work_dir = self.work_dir();
        TranscodePlanner::new(PlanContext {
            config,
            source,
            intro,
            intro_duration_secs: 3.0,
            work_dir: &work_dir,
            burn_captions: burn,
        })
        .plan(&self.resolve(config), &[])
    }
}

fn webm_capture(audio: AudioPresence) -> SourceInfo {
    SourceInfo {
        container: Container::Webm,
        video_codec: Some("vp8".to_string()),
        audio,
        width: Some(1280),
        height: Some(720),
        frame_rate: Some(25.0),
        duration_secs: Some(10.0),
    }
}

fn stage_names(plan: &TranscodePlan) -> Vec<&str> {
    plan.stages.iter().map(|s| s.name.as_str()).collect()
}

#[test]
fn speed_change_with_intro_and_no_audio_stays_on_fast_path() {
    let rec = Recording::new("capture.webm");
    let config = FinalizeConfig {
        speed: 2.0,
        subtitles_enabled: false,
        intro_enabled: true,
        ..FinalizeConfig::default()
    };
    let source = webm_capture(AudioPresence::Absent);

    let plan = rec.plan(&config, &source, Some(&source), None).unwrap();

    assert!(plan.use_fast_path);
    assert!(plan.video_filter_chain.is_empty());
    assert_eq!(stage_names(&plan), vec!["retime", "concat"]);
    assert_eq!(plan.video_codec, Codec::Copy);
    assert_eq!(
        plan.stages[0].inputs[0].options,
        vec!["-itsscale".to_string(), "0.5".to_string()]
    );

    let concat = &plan.stages[1];
    assert!(matches!(concat.inputs[0].source, InputSource::ConcatList(_)));
    let list = &concat.staged_files[0].contents;
    assert!(list.starts_with(&format!("file '{}'", rec.intro.display())));
    assert!(list.contains("retimed.webm"));
    assert_eq!(concat.output, plan.output_path);
    assert_eq!(plan.output_path, rec.work_dir().join("finalized.webm"));
}

#[test]
fn mismatched_intro_is_conformed_before_joining() {
    let rec = Recording::new("capture.webm");
    let config = FinalizeConfig {
        subtitles_enabled: false,
        intro_enabled: true,
        ..FinalizeConfig::default()
    };
    let source = webm_capture(AudioPresence::Present("opus".to_string()));
    let intro = SourceInfo {
        video_codec: Some("vp9".to_string()),
        audio: AudioPresence::Absent,
        ..webm_capture(AudioPresence::Absent)
    };

    let plan = rec.plan(&config, &source, Some(&intro), None).unwrap();
    assert!(plan.use_fast_path);
    assert_eq!(stage_names(&plan), vec!["conform-intro", "concat"]);

    let conform = &plan.stages[0];
    assert_eq!(conform.codecs.video.name(), "libvpx");
    assert_eq!(conform.codecs.audio.as_ref().map(Codec::name), Some("libopus"));
    assert!(matches!(&conform.inputs[1].source, InputSource::Lavfi(src) if src.starts_with("anullsrc")));

    // The capture's audio is copied through the join.
    assert_eq!(plan.audio_codec, Some(Codec::Copy));
    assert!(plan.stream_maps.contains(&StreamMap::input(0, StreamKind::Audio).optional()));
}

#[test]
fn burned_subtitles_never_take_the_fast_path() {
    let rec = Recording::new("capture.webm");
    let config = FinalizeConfig {
        hard_subtitles: true,
        intro_enabled: true,
        ..FinalizeConfig::default()
    };
    let source = webm_capture(AudioPresence::Absent);
    let burn = Path::new(".stepcast-test/captions.srt");

    let plan = rec.plan(&config, &source, Some(&source), Some(burn)).unwrap();

    assert!(!plan.use_fast_path);
    assert_eq!(
        plan.video_filter_chain,
        vec!["subtitles=filename='.stepcast-test/captions.srt'".to_string()]
    );
    assert!(!plan.video_codec.is_copy());
    assert_eq!(plan.subtitle_codec, None);
    // Burned captions are a filter, never an input.
    assert_eq!(plan.stages[0].inputs.len(), 2);
}

#[test]
fn burned_subtitles_without_labels_still_reencode() {
    let rec = Recording::new("capture.webm");
    let config = FinalizeConfig {
        hard_subtitles: true,
        intro_enabled: true,
        ..FinalizeConfig::default()
    };
    let source = webm_capture(AudioPresence::Absent);

    // No labelled step means no caption file to burn.
    let plan = rec.plan(&config, &source, Some(&source), None).unwrap();

    assert!(!plan.use_fast_path);
    assert!(plan.video_filter_chain.is_empty());
    assert!(!stage_names(&plan).contains(&"concat"));
}

#[test]
fn soft_subtitles_ride_along_on_the_fast_path() {
    let rec = Recording::new("capture.webm");
    let config = FinalizeConfig {
        intro_enabled: true,
        ..FinalizeConfig::default()
    };
    let source = webm_capture(AudioPresence::Absent);

    let plan = rec.plan(&config, &source, Some(&source), None).unwrap();

    assert!(plan.use_fast_path);
    assert_eq!(plan.subtitle_codec, Some(Codec::encode("webvtt")));
    let concat = plan.stages.last().unwrap();
    assert_eq!(
        concat.inputs[1].options,
        vec!["-itsoffset".to_string(), "3".to_string()]
    );
    assert_eq!(concat.maps.last(), Some(&StreamMap::input(1, StreamKind::Subtitle)));
}

#[test]
fn mp4_conversion_without_intro_reencodes() {
    let rec = Recording::new("capture.webm");
    let config = FinalizeConfig {
        subtitles_enabled: false,
        output_codec: OutputCodec::Mp4,
        ..FinalizeConfig::default()
    };
    let source = webm_capture(AudioPresence::Present("opus".to_string()));

    let plan = rec.plan(&config, &source, None, None).unwrap();

    assert!(!plan.use_fast_path);
    assert_eq!(stage_names(&plan), vec!["transcode"]);
    assert_eq!(plan.video_codec.name(), "libx264");
    assert_eq!(plan.output_container, Container::Mp4);
    assert_eq!(plan.output_path, rec.work_dir().join("finalized.mp4"));
    assert!(plan.stages[0].output_options.contains(&"+faststart".to_string()));
    // Capture audio is copied, and optional because captures may be silent.
    assert_eq!(
        plan.stream_maps,
        vec![
            StreamMap::input(0, StreamKind::Video),
            StreamMap::input(0, StreamKind::Audio).optional(),
        ]
    );
}

#[test]
fn mp4_conversion_with_intro_joins_then_remuxes() {
    let rec = Recording::new("capture.webm");
    let config = FinalizeConfig {
        subtitles_enabled: false,
        intro_enabled: true,
        output_codec: OutputCodec::Mp4,
        ..FinalizeConfig::default()
    };
    let source = webm_capture(AudioPresence::Absent);

    let plan = rec.plan(&config, &source, Some(&source), None).unwrap();

    assert!(plan.use_fast_path);
    assert_eq!(stage_names(&plan), vec!["concat", "remux"]);
    assert_eq!(plan.stages[0].codecs.video, Codec::Copy);
    assert_eq!(plan.stages[0].output, rec.work_dir().join("joined.webm"));
    // VP8 is not an MP4 codec.
    assert_eq!(plan.video_codec.name(), "libx264");
}

#[test]
fn compatible_codec_is_copied_during_remux() {
    let rec = Recording::new("capture.mkv");
    let config = FinalizeConfig {
        subtitles_enabled: false,
        intro_enabled: true,
        output_codec: OutputCodec::Mp4,
        ..FinalizeConfig::default()
    };
    let source = SourceInfo {
        container: Container::Mkv,
        video_codec: Some("h264".to_string()),
        audio: AudioPresence::Present("aac".to_string()),
        ..webm_capture(AudioPresence::Absent)
    };
    let intro = source.clone();

    let plan = rec.plan(&config, &source, Some(&intro), None).unwrap();
    assert_eq!(stage_names(&plan), vec!["concat", "remux"]);
    assert_eq!(plan.video_codec, Codec::Copy);
    assert_eq!(plan.audio_codec, Some(Codec::Copy));
}

#[test]
fn full_graph_uses_fixed_input_indices() {
    let rec = Recording::new("capture.webm");
    let config = FinalizeConfig {
        intro_enabled: true,
        narration_enabled: true,
        background_audio_path: Some(rec.music.clone()),
        ..FinalizeConfig::default()
    };
    let source = webm_capture(AudioPresence::Present("opus".to_string()));

    let inputs = rec.resolve(&config);
    assert_eq!(
        inputs.kinds(),
        vec![
            MediaKind::IntroClip,
            MediaKind::MainVideo,
            MediaKind::SubtitleTrack,
            MediaKind::NarrationAudio,
            MediaKind::BackgroundAudio,
        ]
    );

    let plan = rec.plan(&config, &source, Some(&source), None).unwrap();
    assert!(!plan.use_fast_path);

    let stage = &plan.stages[0];
    let graph = stage.filter_graph.as_ref().unwrap();
    let chain_for = |output: &str| {
        graph
            .chains
            .iter()
            .find(|c| c.output == output)
            .unwrap_or_else(|| panic!("no chain for [{output}]"))
    };

    assert_eq!(chain_for("vintro").inputs, vec!["0:v:0"]);
    assert_eq!(chain_for("vmain").inputs, vec!["1:v:0"]);
    assert_eq!(chain_for("v").filters, vec!["concat=n=2:v=1:a=0"]);
    assert_eq!(chain_for("a0").inputs, vec!["1:a:0"]);
    assert_eq!(chain_for("a1").inputs, vec!["3:a:0"]);
    assert_eq!(chain_for("a2").filters, vec!["volume=0.3"]);
    assert_eq!(
        chain_for("a").filters,
        vec![
            "amix=inputs=3:duration=longest:dropout_transition=0:normalize=0".to_string(),
            "adelay=delays=3000:all=1".to_string(),
            "apad".to_string(),
        ]
    );

    assert_eq!(
        stage.maps,
        vec![
            StreamMap::label("v"),
            StreamMap::label("a"),
            StreamMap::input(2, StreamKind::Subtitle),
        ]
    );
    assert_eq!(stage.inputs[2].options, vec!["-itsoffset", "3"]);
    assert!(stage.output_options.contains(&"-shortest".to_string()));
    assert_eq!(plan.audio_codec.as_ref().map(Codec::name), Some("libopus"));
}

#[test]
fn large_speed_factors_chain_atempo_stages() {
    let rec = Recording::new("capture.webm");
    let config = FinalizeConfig {
        speed: 4.0,
        subtitles_enabled: false,
        ..FinalizeConfig::default()
    };
    let source = webm_capture(AudioPresence::Present("opus".to_string()));

    let plan = rec.plan(&config, &source, None, None).unwrap();
    assert_eq!(plan.video_filter_chain, vec!["setpts=0.25*PTS"]);
    assert_eq!(plan.audio_filter_chain, vec!["atempo=2", "atempo=2"]);

    for speed in [0.1, 0.3, 0.75, 1.9, 2.5, 7.0, 16.0] {
        let chain = atempo_chain(speed);
        assert!(chain.iter().all(|f| (0.5..=2.0).contains(f)), "{speed}: {chain:?}");
        assert!((chain.iter().product::<f64>() - speed).abs() < 1e-9, "{speed}");
    }
}

#[test]
fn unprobed_capture_plans_conservatively() {
    let rec = Recording::new("capture.webm");
    let config = FinalizeConfig {
        subtitles_enabled: false,
        intro_enabled: true,
        ..FinalizeConfig::default()
    };
    let source = SourceInfo::unprobed(Container::Webm);

    let plan = rec.plan(&config, &source, None, None).unwrap();
    assert!(!plan.use_fast_path);
    assert_eq!(plan.video_codec.name(), "libvpx-vp9");
    // Audio of unknown presence cannot enter a filter graph.
    assert_eq!(plan.audio_codec, None);
    assert!(plan
        .stream_maps
        .iter()
        .all(|m| !matches!(m.source, MapSource::Input { kind: StreamKind::Audio, .. })));
}

#[test]
fn nothing_to_do_yields_passthrough() {
    let rec = Recording::new("capture.webm");
    let config = FinalizeConfig {
        subtitles_enabled: false,
        ..FinalizeConfig::default()
    };
    let source = webm_capture(AudioPresence::Present("opus".to_string()));

    let plan = rec.plan(&config, &source, None, None).unwrap();
    assert!(plan.is_passthrough());
    assert_eq!(plan.output_path, rec.capture);
}

#[test]
fn unsupported_container_conflicts() {
    let rec = Recording::new("capture.avi");
    let source = SourceInfo {
        container: Container::Other("avi".to_string()),
        ..webm_capture(AudioPresence::Absent)
    };

    let soft = FinalizeConfig::default();
    let err = rec.plan(&soft, &source, None, None).unwrap_err();
    assert!(matches!(err, StepcastError::ConfigurationConflict { .. }));

    let hard = FinalizeConfig {
        hard_subtitles: true,
        ..FinalizeConfig::default()
    };
    let err = rec
        .plan(&hard, &source, None, Some(Path::new("w/captions.srt")))
        .unwrap_err();
    assert!(matches!(err, StepcastError::ConfigurationConflict { .. }));

    // The same container can always be converted to MP4 instead.
    let mp4 = FinalizeConfig {
        output_codec: OutputCodec::Mp4,
        ..hard
    };
    assert!(rec
        .plan(&mp4, &source, None, Some(Path::new("w/captions.srt")))
        .is_ok());
}

#[test]
fn planning_is_idempotent() {
    let rec = Recording::new("capture.webm");
    let configs = [
        FinalizeConfig {
            speed: 2.0,
            intro_enabled: true,
            ..FinalizeConfig::default()
        },
        FinalizeConfig {
            speed: 1.5,
            narration_enabled: true,
            output_codec: OutputCodec::Mp4,
            ..FinalizeConfig::default()
        },
    ];
    let sources = [
        webm_capture(AudioPresence::Absent),
        webm_capture(AudioPresence::Present("opus".to_string())),
        SourceInfo::unprobed(Container::Webm),
    ];

    for config in &configs {
        for source in &sources {
            let first = rec.plan(config, source, Some(source), None).unwrap();
            let second = rec.plan(config, source, Some(source), None).unwrap();
            assert_eq!(first, second);
            assert_eq!(render_plan(&first), render_plan(&second));
        }
    }
}

#[test]
fn rendered_retime_stage_scales_input_timestamps() {
    let rec = Recording::new("capture.webm");
    let config = FinalizeConfig {
        speed: 2.0,
        subtitles_enabled: false,
        intro_enabled: true,
        ..FinalizeConfig::default()
    };
    let source = webm_capture(AudioPresence::Absent);
    let plan = rec.plan(&config, &source, Some(&source), None).unwrap();

    let argv = render_plan(&plan);
    let retime = &argv[0];
    let scale = retime.iter().position(|a| a == "-itsscale").unwrap();
    assert_eq!(retime[scale + 1], "0.5");
    assert_eq!(retime[scale + 2], "-i");
    assert_eq!(retime[scale + 3], rec.capture.to_string_lossy());
    assert!(retime.windows(2).any(|w| w[0] == "-c:v" && w[1] == "copy"));

    let concat = &argv[1];
    assert!(concat.windows(4).any(|w| w == ["-f", "concat", "-safe", "0"]));
}
