//! Container formats and the codecs they can carry.

use std::path::Path;

use stepcast_common::config::OutputCodec;

/// A media container, identified by file extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Container {
    Webm,
    Mp4,
    Mkv,
    Mov,
    /// Anything else; only ever stream-copied into itself.
    Other(String),
}

/// Codec choice for one stream type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Stream copy, no re-encode.
    Copy,
    /// Re-encode with the named encoder and its options.
    Encode {
        encoder: String,
        options: Vec<String>,
    },
}

impl Codec {
    pub fn encode(encoder: &str) -> Self {
        Self::Encode {
            encoder: encoder.to_string(),
            options: encoder_options(encoder),
        }
    }

    pub fn is_copy(&self) -> bool {
        matches!(self, Self::Copy)
    }

    /// Name as passed to `-c:*`.
    pub fn name(&self) -> &str {
        match self {
            Self::Copy => "copy",
            Self::Encode { encoder, .. } => encoder,
        }
    }
}

impl Container {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "webm" => Self::Webm,
            "mp4" | "m4v" => Self::Mp4,
            "mkv" => Self::Mkv,
            "mov" => Self::Mov,
            _ => Self::Other(ext),
        }
    }

    /// The container the finalized file uses.
    pub fn for_output(codec: OutputCodec, source: &Container) -> Self {
        match codec {
            OutputCodec::SourceFormat => source.clone(),
            OutputCodec::Mp4 => Self::Mp4,
        }
    }

    pub fn extension(&self) -> &str {
        match self {
            Self::Webm => "webm",
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
            Self::Mov => "mov",
            Self::Other(ext) => ext,
        }
    }

    /// Whether a stream of `codec` (ffprobe `codec_name`) can be copied in.
    pub fn accepts_video(&self, codec: &str) -> bool {
        match self {
            Self::Webm => matches!(codec, "vp8" | "vp9" | "av1"),
            Self::Mp4 => matches!(codec, "h264" | "hevc" | "av1" | "vp9" | "mpeg4"),
            Self::Mov => matches!(codec, "h264" | "hevc" | "mpeg4" | "prores"),
            Self::Mkv => true,
            Self::Other(_) => false,
        }
    }

    pub fn accepts_audio(&self, codec: &str) -> bool {
        match self {
            Self::Webm => matches!(codec, "opus" | "vorbis"),
            Self::Mp4 => matches!(codec, "aac" | "mp3" | "opus" | "ac3"),
            Self::Mov => matches!(codec, "aac" | "mp3" | "pcm_s16le"),
            Self::Mkv => true,
            Self::Other(_) => false,
        }
    }

    /// Encoder used when video must be re-encoded into this container.
    pub fn default_video_encoder(&self) -> Option<&'static str> {
        match self {
            Self::Webm => Some("libvpx-vp9"),
            Self::Mp4 | Self::Mkv | Self::Mov => Some("libx264"),
            Self::Other(_) => None,
        }
    }

    pub fn default_audio_encoder(&self) -> Option<&'static str> {
        match self {
            Self::Webm => Some("libopus"),
            Self::Mp4 | Self::Mkv | Self::Mov => Some("aac"),
            Self::Other(_) => None,
        }
    }

    /// Subtitle codec for a soft subtitle track, if the container has one.
    pub fn subtitle_codec(&self) -> Option<&'static str> {
        match self {
            Self::Webm => Some("webvtt"),
            Self::Mp4 | Self::Mov => Some("mov_text"),
            Self::Mkv => Some("srt"),
            Self::Other(_) => None,
        }
    }

    /// Muxer options for the output file.
    pub fn muxer_options(&self) -> Vec<String> {
        match self {
            Self::Mp4 | Self::Mov => vec!["-movflags".to_string(), "+faststart".to_string()],
            _ => vec![],
        }
    }

    /// Video encoder for `source_codec` when it can live in this container,
    /// otherwise the container default.
    pub fn video_encoder_for(&self, source_codec: Option<&str>) -> Option<&'static str> {
        source_codec
            .filter(|codec| self.accepts_video(codec))
            .and_then(encoder_for_video_codec)
            .or_else(|| self.default_video_encoder())
    }

    pub fn audio_encoder_for(&self, source_codec: Option<&str>) -> Option<&'static str> {
        source_codec
            .filter(|codec| self.accepts_audio(codec))
            .and_then(encoder_for_audio_codec)
            .or_else(|| self.default_audio_encoder())
    }
}

/// Encoder producing the given ffprobe video codec name.
pub fn encoder_for_video_codec(codec: &str) -> Option<&'static str> {
    match codec {
        "h264" => Some("libx264"),
        "hevc" => Some("libx265"),
        "vp8" => Some("libvpx"),
        "vp9" => Some("libvpx-vp9"),
        "av1" => Some("libsvtav1"),
        "mpeg4" => Some("mpeg4"),
        _ => None,
    }
}

pub fn encoder_for_audio_codec(codec: &str) -> Option<&'static str> {
    match codec {
        "aac" => Some("aac"),
        "opus" => Some("libopus"),
        "vorbis" => Some("libvorbis"),
        "mp3" => Some("libmp3lame"),
        _ => None,
    }
}

fn encoder_options(encoder: &str) -> Vec<String> {
    let options: &[&str] = match encoder {
        "libx264" => &["-preset", "medium", "-crf", "20", "-pix_fmt", "yuv420p"],
        "libx265" => &["-preset", "medium", "-crf", "24", "-pix_fmt", "yuv420p"],
        "libvpx" => &["-crf", "10", "-b:v", "2M"],
        "libvpx-vp9" => &["-crf", "32", "-b:v", "0", "-row-mt", "1"],
        "libsvtav1" => &["-crf", "35", "-preset", "8"],
        "aac" => &["-b:a", "192k"],
        "libopus" => &["-b:a", "128k"],
        _ => &[],
    };
    options.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_from_extension() {
        assert_eq!(Container::from_path(Path::new("a/b/run.WEBM")), Container::Webm);
        assert_eq!(Container::from_path(Path::new("run.m4v")), Container::Mp4);
        assert_eq!(
            Container::from_path(Path::new("run.avi")),
            Container::Other("avi".to_string())
        );
    }

    #[test]
    fn test_output_container_follows_setting() {
        assert_eq!(
            Container::for_output(OutputCodec::SourceFormat, &Container::Webm),
            Container::Webm
        );
        assert_eq!(
            Container::for_output(OutputCodec::Mp4, &Container::Webm),
            Container::Mp4
        );
    }

    #[test]
    fn test_vp8_capture_needs_new_encoder_for_mp4() {
        assert!(!Container::Mp4.accepts_video("vp8"));
        assert_eq!(Container::Mp4.video_encoder_for(Some("vp8")), Some("libx264"));
        assert_eq!(Container::Webm.video_encoder_for(Some("vp8")), Some("libvpx"));
        assert_eq!(Container::Webm.video_encoder_for(None), Some("libvpx-vp9"));
    }

    #[test]
    fn test_other_container_cannot_be_encoded_into() {
        let avi = Container::Other("avi".to_string());
        assert_eq!(avi.video_encoder_for(Some("h264")), None);
        assert_eq!(avi.subtitle_codec(), None);
    }

    #[test]
    fn test_codec_options() {
        let codec = Codec::encode("libx264");
        assert_eq!(codec.name(), "libx264");
        assert!(!codec.is_copy());
        if let Codec::Encode { options, .. } = codec {
            assert!(options.contains(&"yuv420p".to_string()));
        }
    }
}
