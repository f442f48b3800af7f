//! Generated intro title card.

use std::path::Path;

use stepcast_common::config::FinalizeConfig;
use stepcast_common::error::{StepcastError, StepcastResult};
use stepcast_timeline_model::StepTimeline;

use crate::container::{encoder_for_audio_codec, Codec};
use crate::plan::{
    FilterChain, FilterGraph, InputSource, StageInput, StagedFile, StreamCodecs, StreamKind,
    StreamMap, TranscodeStage, SILENCE_SOURCE,
};
use crate::probe::SourceInfo;
use crate::render::{escape_filter_path, format_factor};

const BACKGROUND: &str = "0x111827";
const TITLE_COLOR: &str = "white";
const DATE_COLOR: &str = "0xCBD5E1";
const FALLBACK_SIZE: (u32, u32) = (1280, 720);
const FALLBACK_RATE: f64 = 30.0;

/// Text and timing of the title card.
#[derive(Debug, Clone, PartialEq)]
pub struct IntroCard {
    pub title: String,
    /// Second line, usually the recording date.
    pub subtitle: Option<String>,
    pub duration_secs: f64,
}

impl IntroCard {
    /// Title from config, then the timeline name, then `fallback`.
    pub fn new(config: &FinalizeConfig, timeline: &StepTimeline, fallback: &str) -> Self {
        let title = config
            .intro_title
            .as_deref()
            .or(timeline.name.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(fallback)
            .to_string();

        Self {
            title,
            subtitle: timeline
                .recorded_at
                .map(|at| at.format("%B %-d, %Y").to_string()),
            duration_secs: config.intro_duration_secs,
        }
    }

    /// Stage rendering the card at the capture's size and codec.
    ///
    /// `filter_dir` is `work_dir` as seen from the transcoder's working
    /// directory; drawtext reads its text from files there so titles need
    /// no escaping.
    pub fn stage(
        &self,
        source: &SourceInfo,
        work_dir: &Path,
        filter_dir: &Path,
    ) -> StepcastResult<TranscodeStage> {
        let (width, height) = source.dimensions().unwrap_or(FALLBACK_SIZE);
        let rate = source.frame_rate.unwrap_or(FALLBACK_RATE);
        let ext = source.container.extension();

        let encoder = source
            .container
            .video_encoder_for(source.video_codec.as_deref())
            .ok_or_else(|| {
                StepcastError::conflict(format!("cannot render an intro for a .{ext} capture"))
            })?;

        let mut staged_files = vec![StagedFile {
            path: work_dir.join("intro-title.txt"),
            contents: self.title.clone(),
        }];
        let mut filters = vec![drawtext(
            &filter_dir.join("intro-title.txt"),
            TITLE_COLOR,
            (height / 12).max(12),
            "(h-text_h)/2",
        )];
        if let Some(subtitle) = &self.subtitle {
            staged_files.push(StagedFile {
                path: work_dir.join("intro-date.txt"),
                contents: subtitle.clone(),
            });
            filters.push(drawtext(
                &filter_dir.join("intro-date.txt"),
                DATE_COLOR,
                (height / 28).max(10),
                "(h/2)+(h/10)",
            ));
        }

        let duration = format_factor(self.duration_secs);
        let mut stage = TranscodeStage {
            name: "intro".to_string(),
            inputs: vec![StageInput::new(InputSource::Lavfi(format!(
                "color=c={BACKGROUND}:s={width}x{height}:r={}:d={duration}",
                format_factor(rate)
            )))],
            filter_graph: Some(FilterGraph {
                chains: vec![FilterChain::new(["0:v:0"], filters, "v")],
            }),
            maps: vec![StreamMap::label("v")],
            codecs: StreamCodecs {
                video: Codec::encode(encoder),
                audio: None,
                subtitle: None,
            },
            output_options: vec!["-t".to_string(), duration],
            output: work_dir.join(format!("intro.{ext}")),
            expected_duration_secs: Some(self.duration_secs),
            staged_files,
        };

        // Give the card a silent track when the capture has audio, so the
        // two files line up for stream-copy joining.
        if let Some(audio_codec) = source.audio.codec() {
            let encoder = encoder_for_audio_codec(audio_codec)
                .or_else(|| source.container.default_audio_encoder());
            if let Some(encoder) = encoder {
                stage
                    .inputs
                    .push(StageInput::new(InputSource::Lavfi(SILENCE_SOURCE.to_string())));
                stage.maps.push(StreamMap::input(1, StreamKind::Audio));
                stage.codecs.audio = Some(Codec::encode(encoder));
                stage.output_options.push("-shortest".to_string());
            }
        }

        Ok(stage)
    }
}

fn drawtext(textfile: &Path, color: &str, size: u32, y: &str) -> String {
    format!(
        "drawtext=textfile='{}':expansion=none:fontcolor={color}:fontsize={size}:x=(w-text_w)/2:y={y}",
        escape_filter_path(textfile)
    )
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::container::Container;
    use crate::probe::AudioPresence;

    fn capture() -> SourceInfo {
        SourceInfo {
            container: Container::Webm,
            video_codec: Some("vp8".to_string()),
            audio: AudioPresence::Absent,
            width: Some(1920),
            height: Some(1080),
            frame_rate: Some(25.0),
            duration_secs: Some(20.0),
        }
    }

    fn timeline() -> StepTimeline {
        StepTimeline::from_json(
            r#"{"name": "Checkout flow", "recordedAt": "2024-05-01T12:00:00Z", "steps": []}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_title_precedence() {
        let config = FinalizeConfig::default();
        assert_eq!(IntroCard::new(&config, &timeline(), "run").title, "Checkout flow");

        let config = FinalizeConfig {
            intro_title: Some("  Buying a mug ".to_string()),
            ..FinalizeConfig::default()
        };
        let card = IntroCard::new(&config, &timeline(), "run");
        assert_eq!(card.title, "Buying a mug");
        assert_eq!(card.subtitle.as_deref(), Some("May 1, 2024"));

        let card = IntroCard::new(&FinalizeConfig::default(), &StepTimeline::new(vec![]), "run");
        assert_eq!(card.title, "run");
        assert_eq!(card.subtitle, None);
    }

    #[test]
    fn test_card_matches_capture() {
        let card = IntroCard::new(&FinalizeConfig::default(), &timeline(), "run");
        let stage = card
            .stage(&capture(), Path::new("/rec/.stepcast-ab"), Path::new(".stepcast-ab"))
            .unwrap();

        assert_eq!(stage.output, PathBuf::from("/rec/.stepcast-ab/intro.webm"));
        assert_eq!(stage.codecs.video.name(), "libvpx");
        assert!(stage.codecs.audio.is_none());
        match &stage.inputs[0].source {
            InputSource::Lavfi(graph) => assert!(graph.contains("s=1920x1080:r=25:d=3")),
            other => panic!("unexpected input {other:?}"),
        }

        let graph = stage.filter_graph.as_ref().unwrap();
        assert!(graph.chains[0].filters[0].contains("textfile='.stepcast-ab/intro-title.txt'"));
        assert_eq!(stage.staged_files.len(), 2);
        assert_eq!(stage.staged_files[0].contents, "Checkout flow");
    }

    #[test]
    fn test_card_gets_silence_when_capture_has_audio() {
        let source = SourceInfo {
            audio: AudioPresence::Present("opus".to_string()),
            ..capture()
        };
        let stage = IntroCard::new(&FinalizeConfig::default(), &timeline(), "run")
            .stage(&source, Path::new("/w"), Path::new("w"))
            .unwrap();
        assert_eq!(stage.codecs.audio.as_ref().map(|c| c.name()), Some("libopus"));
        assert!(stage.output_options.contains(&"-shortest".to_string()));
        assert_eq!(stage.maps.len(), 2);
    }
}
