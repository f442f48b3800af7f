pub mod batch;
pub mod check;
pub mod cues;
pub mod finalize;
pub mod plan;

use std::path::PathBuf;

use clap::Args;
use stepcast_common::config::{FinalizeConfig, OutputCodec};
use stepcast_finalize_engine::FinalizeJob;
use stepcast_timeline_model::StepTimeline;

/// Command-line overrides for the configured finalization settings.
#[derive(Debug, Default, Args)]
pub struct FinalizeOverrides {
    /// Playback speed factor (2.0 = twice as fast)
    #[arg(long)]
    speed: Option<f64>,

    /// Do not generate subtitles
    #[arg(long)]
    no_subtitles: bool,

    /// Burn subtitles into the picture instead of muxing a subtitle track
    #[arg(long)]
    hard_subtitles: bool,

    /// Minimum on-screen time per cue (seconds)
    #[arg(long)]
    subtitle_min_duration: Option<f64>,

    /// Gap kept between a shortened cue and the next one (seconds)
    #[arg(long)]
    subtitle_gap: Option<f64>,

    /// ASS force_style for burned subtitles, e.g. "FontSize=24"
    #[arg(long)]
    subtitle_style: Option<String>,

    /// Mix the narration track (implied by --narration)
    #[arg(long)]
    narrate: bool,

    /// Background music mixed under the recording
    #[arg(long)]
    background_audio: Option<PathBuf>,

    /// Linear gain of the background music
    #[arg(long)]
    background_volume: Option<f64>,

    /// Prepend a title card
    #[arg(long)]
    intro: bool,

    /// Title shown on the title card
    #[arg(long)]
    intro_title: Option<String>,

    /// Title card length (seconds)
    #[arg(long)]
    intro_duration: Option<f64>,

    /// Output format: source|mp4
    #[arg(long)]
    format: Option<String>,

    /// Fail instead of keeping the raw capture when conversion fails
    #[arg(long)]
    require_output_format: bool,

    /// Keep the caption file next to the finished video
    #[arg(long)]
    keep_captions: bool,

    /// Per-run transcoder time limit (seconds)
    #[arg(long)]
    timeout: Option<u64>,
}

impl FinalizeOverrides {
    /// Apply every flag that was given on top of `config`.
    pub fn apply(&self, config: &mut FinalizeConfig) -> anyhow::Result<()> {
        if let Some(speed) = self.speed {
            config.speed = speed;
        }
        if self.no_subtitles {
            config.subtitles_enabled = false;
        }
        if self.hard_subtitles {
            config.hard_subtitles = true;
        }
        if let Some(min) = self.subtitle_min_duration {
            config.subtitle_min_duration = min;
        }
        if let Some(gap) = self.subtitle_gap {
            config.subtitle_gap = gap;
        }
        if let Some(style) = &self.subtitle_style {
            config.subtitle_style = Some(style.clone());
        }
        if self.narrate {
            config.narration_enabled = true;
        }
        if let Some(path) = &self.background_audio {
            config.background_audio_path = Some(path.clone());
        }
        if let Some(volume) = self.background_volume {
            config.background_volume = volume;
        }
        if self.intro {
            config.intro_enabled = true;
        }
        if let Some(title) = &self.intro_title {
            config.intro_title = Some(title.clone());
        }
        if let Some(secs) = self.intro_duration {
            config.intro_duration_secs = secs;
        }
        if let Some(format) = &self.format {
            config.output_codec = match format.as_str() {
                "source" => OutputCodec::SourceFormat,
                "mp4" => OutputCodec::Mp4,
                _ => {
                    return Err(anyhow::anyhow!(
                        "Unknown format: {format}. Use: source, mp4"
                    ));
                }
            };
        }
        if self.require_output_format {
            config.require_output_format = true;
        }
        if self.keep_captions {
            config.keep_captions = true;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }

        config.validate()?;
        Ok(())
    }
}

/// Build a job from command-line paths.
pub fn load_job(
    capture: PathBuf,
    steps: Option<PathBuf>,
    narration: Option<PathBuf>,
    intro_clip: Option<PathBuf>,
    video_filters: Vec<String>,
) -> anyhow::Result<FinalizeJob> {
    let steps = steps.unwrap_or_else(|| {
        capture
            .parent()
            .map(|dir| dir.join("steps.json"))
            .unwrap_or_else(|| PathBuf::from("steps.json"))
    });
    let timeline = StepTimeline::load(&steps)
        .map_err(|e| anyhow::anyhow!("Failed to load steps {}: {e}", steps.display()))?;

    let mut job = FinalizeJob::new(capture, timeline);
    job.narration_path = narration;
    job.intro_path = intro_clip;
    job.extra_video_filters = video_filters;
    Ok(job)
}
