//! Application and finalization configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{StepcastError, StepcastResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default finalization settings.
    pub finalize: FinalizeConfig,

    /// External tool locations.
    pub tools: ToolPaths,

    /// Maximum number of recordings finalized concurrently.
    pub workers: usize,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Settings consumed by the video finalization pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FinalizeConfig {
    /// Playback speed factor applied to the capture (1.0 = unchanged).
    pub speed: f64,

    /// Whether step texts are turned into subtitles.
    pub subtitles_enabled: bool,

    /// Burn subtitles into the video instead of muxing a soft track.
    pub hard_subtitles: bool,

    /// Minimum on-screen time for one cue, in seconds.
    pub subtitle_min_duration: f64,

    /// Gap kept between a shortened cue and the cue that crowded it.
    pub subtitle_gap: f64,

    /// Optional ASS `force_style` override for burned subtitles.
    pub subtitle_style: Option<String>,

    /// Mix the narration track when one is supplied.
    pub narration_enabled: bool,

    /// Background music mixed under the recording.
    pub background_audio_path: Option<PathBuf>,

    /// Linear gain applied to the background track.
    pub background_volume: f64,

    /// Prepend a title card.
    pub intro_enabled: bool,

    /// Title shown on the generated title card.
    pub intro_title: Option<String>,

    /// Length of the generated title card, in seconds.
    pub intro_duration_secs: f64,

    /// Container/codec family of the finalized file.
    pub output_codec: OutputCodec,

    /// Treat a failed format conversion as fatal instead of falling back
    /// to the unmodified capture.
    pub require_output_format: bool,

    /// Keep the caption file next to the finalized video.
    pub keep_captions: bool,

    /// Hard limit for each transcoder invocation.
    pub timeout_secs: u64,
}

/// Output container/codec family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum OutputCodec {
    /// Keep whatever container the capture layer produced.
    #[default]
    SourceFormat,
    /// Convert to MP4.
    Mp4,
}

/// Names or paths of the external media tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "stepcast=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            finalize: FinalizeConfig::default(),
            tools: ToolPaths::default(),
            workers: 2,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            subtitles_enabled: true,
            hard_subtitles: false,
            subtitle_min_duration: 1.0,
            subtitle_gap: 0.1,
            subtitle_style: None,
            narration_enabled: false,
            background_audio_path: None,
            background_volume: 0.3,
            intro_enabled: false,
            intro_title: None,
            intro_duration_secs: 3.0,
            output_codec: OutputCodec::SourceFormat,
            require_output_format: false,
            keep_captions: false,
            timeout_secs: 600,
        }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl FinalizeConfig {
    /// Reject settings no plan can satisfy.
    pub fn validate(&self) -> StepcastResult<()> {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(StepcastError::conflict(format!(
                "speed must be a positive finite number, got {}",
                self.speed
            )));
        }
        if !self.subtitle_min_duration.is_finite() || self.subtitle_min_duration <= 0.0 {
            return Err(StepcastError::conflict(format!(
                "subtitleMinDuration must be positive, got {}",
                self.subtitle_min_duration
            )));
        }
        if !self.subtitle_gap.is_finite() || self.subtitle_gap < 0.0 {
            return Err(StepcastError::conflict(format!(
                "subtitleGap must not be negative, got {}",
                self.subtitle_gap
            )));
        }
        if !self.background_volume.is_finite() || self.background_volume < 0.0 {
            return Err(StepcastError::conflict(format!(
                "backgroundVolume must not be negative, got {}",
                self.background_volume
            )));
        }
        if self.intro_enabled
            && (!self.intro_duration_secs.is_finite() || self.intro_duration_secs <= 0.0)
        {
            return Err(StepcastError::conflict(format!(
                "introDurationSecs must be positive, got {}",
                self.intro_duration_secs
            )));
        }
        if self.timeout_secs == 0 {
            return Err(StepcastError::conflict("timeoutSecs must be at least 1"));
        }
        if self.hard_subtitles && !self.subtitles_enabled {
            return Err(StepcastError::conflict(
                "hardSubtitles requires subtitlesEnabled",
            ));
        }
        Ok(())
    }

    /// Whether the capture's timing is changed.
    pub fn speed_changed(&self) -> bool {
        (self.speed - 1.0).abs() > f64::EPSILON
    }

    /// Whether subtitles are carried as a separate stream.
    pub fn soft_subtitles(&self) -> bool {
        self.subtitles_enabled && !self.hard_subtitles
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path.
    pub fn load_from(path: &std::path::Path) -> StepcastResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("stepcast").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        FinalizeConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_non_positive_speed() {
        for speed in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = FinalizeConfig {
                speed,
                ..FinalizeConfig::default()
            };
            let err = config.validate().unwrap_err();
            assert!(matches!(err, StepcastError::ConfigurationConflict { .. }));
        }
    }

    #[test]
    fn test_rejects_hard_subtitles_without_subtitles() {
        let config = FinalizeConfig {
            subtitles_enabled: false,
            hard_subtitles: true,
            ..FinalizeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: FinalizeConfig =
            serde_json::from_str(r#"{"speed": 1.5, "outputCodec": "mp4", "hardSubtitles": true}"#)
                .unwrap();
        assert!((config.speed - 1.5).abs() < 1e-9);
        assert_eq!(config.output_codec, OutputCodec::Mp4);
        assert!(config.hard_subtitles);
        assert!(config.subtitles_enabled);
        assert!(config.speed_changed());
        assert!(!config.soft_subtitles());
    }

    #[test]
    fn test_app_config_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"workers": 6, "tools": {"ffmpeg": "/opt/ffmpeg/bin/ffmpeg"}}"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.workers, 6);
        assert_eq!(config.tools.ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.tools.ffprobe, PathBuf::from("ffprobe"));
        assert_eq!(config.logging.level, "info");
    }
}
