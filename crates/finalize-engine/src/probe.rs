//! Media probing via ffprobe.
//!
//! Probing is advisory. When ffprobe is missing or cannot read the file the
//! planner receives an unprobed [`SourceInfo`] and plans conservatively.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use crate::container::Container;

/// Whether the capture carries an audio stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AudioPresence {
    Absent,
    /// Present, with its ffprobe codec name.
    Present(String),
    /// Probe failed; treat as possibly present.
    Unknown,
}

impl AudioPresence {
    /// Whether any audio stream could be in the file.
    pub fn may_exist(&self) -> bool {
        !matches!(self, Self::Absent)
    }

    pub fn codec(&self) -> Option<&str> {
        match self {
            Self::Present(codec) => Some(codec),
            _ => None,
        }
    }
}

/// Stream facts about one media file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub container: Container,
    pub video_codec: Option<String>,
    pub audio: AudioPresence,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub duration_secs: Option<f64>,
}

impl SourceInfo {
    /// Info known without running ffprobe.
    pub fn unprobed(container: Container) -> Self {
        Self {
            container,
            video_codec: None,
            audio: AudioPresence::Unknown,
            width: None,
            height: None,
            frame_rate: None,
            duration_secs: None,
        }
    }

    /// Frame size, when both axes were probed.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }

    /// Parse `ffprobe -print_format json -show_streams -show_format` output.
    pub fn from_ffprobe_json(container: Container, json: &str) -> Option<Self> {
        let parsed: FfprobeOutput = serde_json::from_str(json).ok()?;

        let video = parsed
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));
        let audio = parsed
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("audio"));

        let duration_secs = parsed
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0);

        Some(Self {
            container,
            video_codec: video.and_then(|s| s.codec_name.clone()),
            audio: match audio {
                Some(stream) => {
                    AudioPresence::Present(stream.codec_name.clone().unwrap_or_default())
                }
                None => AudioPresence::Absent,
            },
            width: video.and_then(|s| s.width),
            height: video.and_then(|s| s.height),
            frame_rate: video
                .and_then(|s| s.avg_frame_rate.as_deref())
                .and_then(parse_frame_rate),
            duration_secs,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Parse an ffprobe rational such as `30000/1001`.
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse::<f64>().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Probe `path`, falling back to [`SourceInfo::unprobed`] on any failure.
pub async fn probe_media(ffprobe: &Path, path: &Path) -> SourceInfo {
    let container = Container::from_path(path);

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await;

    let output = match output {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            tracing::warn!(
                path = %path.display(),
                status = %output.status,
                "ffprobe failed, planning without stream info"
            );
            return SourceInfo::unprobed(container);
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "ffprobe could not be started, planning without stream info"
            );
            return SourceInfo::unprobed(container);
        }
    };

    let json = String::from_utf8_lossy(&output.stdout);
    match SourceInfo::from_ffprobe_json(container.clone(), &json) {
        Some(info) => {
            tracing::debug!(
                path = %path.display(),
                video_codec = ?info.video_codec,
                audio = ?info.audio,
                dimensions = ?info.dimensions(),
                "Probed media"
            );
            info
        }
        None => SourceInfo::unprobed(container),
    }
}

/// Whether `tool` can be spawned and answers `-version`.
pub async fn tool_available(tool: &Path) -> bool {
    Command::new(tool)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
