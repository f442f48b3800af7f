//! Caption track writing in SRT and VTT formats.
//!
//! Timestamps are truncated to whole milliseconds. Rounding up could push
//! a cue end past the next cue start and undo the overlap resolution.
//!
//! A blank line ends a cue block, so cue text never contains one.

use std::io::Write;
use std::path::{Path, PathBuf};

use stepcast_common::error::{StepcastError, StepcastResult};
use stepcast_timeline_model::SubtitleCue;

/// On-disk caption format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptionFormat {
    Srt,
    WebVtt,
}

impl CaptionFormat {
    /// Pick the format from a file extension, defaulting to SRT.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("vtt") => Self::WebVtt,
            _ => Self::Srt,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Srt => "srt",
            Self::WebVtt => "vtt",
        }
    }
}

/// Generate SRT subtitle content from cues.
pub fn generate_srt(cues: &[SubtitleCue]) -> String {
    let mut output = String::new();

    for cue in cues {
        output.push_str(&format!("{}\n", cue.index));
        output.push_str(&format!(
            "{} --> {}\n",
            format_srt_time(cue.start),
            format_srt_time(cue.end),
        ));
        output.push_str(&cue_text(&cue.text, CaptionFormat::Srt));
        output.push_str("\n\n");
    }

    output
}

/// Generate WebVTT subtitle content from cues.
pub fn generate_vtt(cues: &[SubtitleCue]) -> String {
    let mut output = String::from("WEBVTT\n\n");

    for cue in cues {
        output.push_str(&format!("{}\n", cue.index));
        output.push_str(&format!(
            "{} --> {}\n",
            format_vtt_time(cue.start),
            format_vtt_time(cue.end),
        ));
        output.push_str(&cue_text(&cue.text, CaptionFormat::WebVtt));
        output.push_str("\n\n");
    }

    output
}

/// Cue payload lines, trimmed, with empty lines and carriage returns
/// dropped. WebVTT payloads may not contain the timing arrow.
fn cue_text(text: &str, format: CaptionFormat) -> String {
    let joined = text
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    match format {
        CaptionFormat::Srt => joined,
        CaptionFormat::WebVtt => joined.replace("-->", "->"),
    }
}

fn split_millis(secs: f64) -> (u64, u64, u64, u64) {
    // `as` saturates: negatives become 0, the fraction is dropped. The
    // nanosecond nudge keeps 4.35 from reading back as 4.349999...
    let total_ms = (secs * 1000.0 + 1e-6) as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    (hours, minutes, seconds, millis)
}

/// Format seconds as SRT timestamp: HH:MM:SS,mmm
pub fn format_srt_time(secs: f64) -> String {
    let (hours, minutes, seconds, millis) = split_millis(secs);
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

/// Format seconds as VTT timestamp: HH:MM:SS.mmm
pub fn format_vtt_time(secs: f64) -> String {
    let (hours, minutes, seconds, millis) = split_millis(secs);
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

/// Write cues to `path`, choosing the format from its extension.
///
/// The content goes to a temporary file in the destination directory and
/// is renamed into place, so a failed write never leaves a partial file.
pub fn write_captions(cues: &[SubtitleCue], path: &Path) -> StepcastResult<PathBuf> {
    let format = CaptionFormat::from_path(path);
    let content = match format {
        CaptionFormat::Srt => generate_srt(cues),
        CaptionFormat::WebVtt => generate_vtt(cues),
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.is_dir() {
        return Err(StepcastError::FileNotFound {
            path: parent.to_path_buf(),
        });
    }

    let mut staged = tempfile::Builder::new()
        .prefix(".captions-")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    staged.write_all(content.as_bytes())?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| StepcastError::Io(e.error))?;

    tracing::debug!(
        path = %path.display(),
        cues = cues.len(),
        format = format.extension(),
        "Wrote caption track"
    );

    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cues() -> Vec<SubtitleCue> {
        vec![
            SubtitleCue::new(1, 0.0, 2.5, "Hello world"),
            SubtitleCue::new(2, 3.0, 5.0, "This is a test"),
        ]
    }

    #[test]
    fn test_srt_generation() {
        let srt = generate_srt(&sample_cues());
        assert!(srt.contains("1\n00:00:00,000 --> 00:00:02,500\nHello world\n\n"));
        assert!(srt.contains("2\n00:00:03,000 --> 00:00:05,000\nThis is a test\n\n"));
    }

    #[test]
    fn test_vtt_generation() {
        let cues = vec![SubtitleCue::new(1, 61.5, 63.0, "One minute in")];
        let vtt = generate_vtt(&cues);
        assert!(vtt.starts_with("WEBVTT\n"));
        assert!(vtt.contains("00:01:01.500 --> 00:01:03.000"));
    }

    #[test]
    fn test_time_formatting() {
        assert_eq!(format_srt_time(0.0), "00:00:00,000");
        assert_eq!(format_srt_time(3661.5), "01:01:01,500");
        assert_eq!(format_vtt_time(3661.5), "01:01:01.500");
    }

    #[test]
    fn test_time_formatting_truncates() {
        assert_eq!(format_srt_time(1.2349), "00:00:01,234");
        assert_eq!(format_srt_time(59.9999), "00:00:59,999");
        assert_eq!(format_srt_time(-3.0), "00:00:00,000");
        assert_eq!(format_srt_time(1.9999), "00:00:01,999");
    }

    #[test]
    fn test_time_formatting_survives_float_error() {
        assert_eq!(format_srt_time(4.35), "00:00:04,350");
        assert_eq!(format_srt_time(0.29), "00:00:00,290");
        assert_eq!(format_vtt_time(1.1 + 2.2), "00:00:03.300");
        assert_eq!(format_srt_time(3600.0 + 7.01), "01:00:07,010");
    }

    #[test]
    fn test_blank_lines_in_text_do_not_start_new_cues() {
        let cues = vec![
            SubtitleCue::new(1, 0.0, 2.0, "Type note\n\n2\n00:00:09,000 --> 00:00:10,000\ninjected"),
            SubtitleCue::new(2, 3.0, 4.0, "Submit\r\n\r\n"),
        ];

        let srt = generate_srt(&cues);
        let blocks: Vec<&str> = srt.trim_end().split("\n\n").collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            blocks[0],
            "1\n00:00:00,000 --> 00:00:02,000\nType note\n2\n00:00:09,000 --> 00:00:10,000\ninjected"
        );
        assert_eq!(blocks[1], "2\n00:00:03,000 --> 00:00:04,000\nSubmit");
        assert!(!srt.contains('\r'));
    }

    #[test]
    fn test_vtt_text_cannot_carry_a_timing_arrow() {
        let cues = vec![SubtitleCue::new(1, 0.0, 2.0, "Go to Settings --> Billing")];
        let vtt = generate_vtt(&cues);
        assert_eq!(vtt.matches("-->").count(), 1);
        assert!(vtt.contains("Go to Settings -> Billing\n\n"));
    }

    #[test]
    fn test_write_captions_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("captions.srt");
        let written = write_captions(&sample_cues(), &path).unwrap();
        assert_eq!(written, path);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("1\n00:00:00,000"));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_vtt_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("captions.VTT");
        write_captions(&sample_cues(), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("WEBVTT"));
    }

    #[test]
    fn test_write_into_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("captions.srt");
        let err = write_captions(&sample_cues(), &path).unwrap_err();
        assert!(matches!(err, StepcastError::FileNotFound { .. }));
        assert!(!path.exists());
    }
}
