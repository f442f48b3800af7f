//! Finalization driver.
//!
//! One run goes cues → caption file → inputs → plan → transcode → replace.
//! All intermediates live in a [`WorkDir`] that is removed on every exit
//! path. The capture itself is only touched after the finalized file
//! exists, and then only by a rename on the same filesystem.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use stepcast_captions::{write_captions, CaptionFormat, CueBuilder};
use stepcast_common::config::{FinalizeConfig, ToolPaths};
use stepcast_common::error::{StepcastError, StepcastResult};
use stepcast_timeline_model::{retime_cues, StepTimeline, SubtitleCue};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::container::Container;
use crate::executor::{PipelineResult, ProgressCallback, TranscodeExecutor};
use crate::inputs::{MediaInputSet, MediaKind, OptionalMedia};
use crate::intro::IntroCard;
use crate::plan::{PlanContext, TranscodePlan, TranscodePlanner};
use crate::probe::{probe_media, tool_available, SourceInfo};
use crate::workdir::WorkDir;

/// One capture to finalize.
#[derive(Debug, Clone)]
pub struct FinalizeJob {
    pub capture_path: PathBuf,
    pub timeline: StepTimeline,
    pub narration_path: Option<PathBuf>,
    /// Pre-rendered intro clip; when absent and intros are enabled a title
    /// card is generated.
    pub intro_path: Option<PathBuf>,
    /// Additional video filters appended after speed and subtitles.
    pub extra_video_filters: Vec<String>,
}

impl FinalizeJob {
    pub fn new(capture_path: impl Into<PathBuf>, timeline: StepTimeline) -> Self {
        Self {
            capture_path: capture_path.into(),
            timeline,
            narration_path: None,
            intro_path: None,
            extra_video_filters: Vec::new(),
        }
    }

    pub fn with_narration(mut self, path: impl Into<PathBuf>) -> Self {
        self.narration_path = Some(path.into());
        self
    }

    pub fn with_intro(mut self, path: impl Into<PathBuf>) -> Self {
        self.intro_path = Some(path.into());
        self
    }

    /// Name used for the title card when nothing better is known.
    fn display_name(&self) -> String {
        self.capture_path
            .file_stem()
            .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
            .unwrap_or_else(|| "Recording".to_string())
    }
}

/// Batch manifest (`batch.json`). Relative paths resolve against the
/// manifest's directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchManifest {
    pub jobs: Vec<BatchEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub capture: PathBuf,
    pub steps: PathBuf,
    #[serde(default)]
    pub narration: Option<PathBuf>,
    #[serde(default)]
    pub intro: Option<PathBuf>,
}

impl BatchManifest {
    /// Load a manifest and every timeline it references.
    pub fn load(path: &Path) -> StepcastResult<Vec<FinalizeJob>> {
        if !path.is_file() {
            return Err(StepcastError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let manifest: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        manifest
            .jobs
            .into_iter()
            .map(|entry| {
                let timeline = StepTimeline::load(base.join(&entry.steps))?;
                let mut job = FinalizeJob::new(base.join(&entry.capture), timeline);
                job.narration_path = entry.narration.map(|p| base.join(p));
                job.intro_path = entry.intro.map(|p| base.join(p));
                Ok(job)
            })
            .collect()
    }
}

/// Drives finalization for one or many captures.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    config: FinalizeConfig,
    tools: ToolPaths,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("config", &self.config)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

/// What planning produced, kept for inspection by the `plan` command.
#[derive(Debug)]
pub struct PreparedRun {
    pub work_dir: WorkDir,
    pub source: SourceInfo,
    pub cues: Vec<SubtitleCue>,
    pub captions_path: Option<PathBuf>,
    /// Length of the intro joined before the capture, 0 without one.
    pub intro_offset_secs: f64,
    pub inputs: MediaInputSet,
    pub plan: TranscodePlan,
}

impl PipelineOrchestrator {
    pub fn new(config: FinalizeConfig, tools: ToolPaths) -> Self {
        Self {
            config,
            tools,
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &FinalizeConfig {
        &self.config
    }

    fn executor(&self) -> TranscodeExecutor {
        let executor = TranscodeExecutor::new(&self.tools.ffmpeg);
        match &self.progress {
            Some(cb) => executor.with_progress(Arc::clone(cb)),
            None => executor,
        }
    }

    /// Finalize one capture.
    ///
    /// Transcoder problems degrade to returning the untouched capture
    /// unless `requireOutputFormat` is set; invalid input or settings are
    /// always fatal.
    pub async fn finalize(&self, job: &FinalizeJob) -> PipelineResult {
        let started = std::time::Instant::now();
        match self.run(job).await {
            Ok(output) => {
                tracing::info!(
                    capture = %job.capture_path.display(),
                    output = %output.display(),
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Finalized recording"
                );
                PipelineResult::success(output)
            }
            Err(error) if error.is_degradable() && !self.config.require_output_format => {
                tracing::warn!(
                    capture = %job.capture_path.display(),
                    error = %error,
                    "Finalization failed, keeping the original capture"
                );
                PipelineResult::degraded(job.capture_path.clone(), error)
            }
            Err(error) => {
                tracing::error!(
                    capture = %job.capture_path.display(),
                    error = %error,
                    "Finalization failed"
                );
                PipelineResult::failure(job.capture_path.clone(), error)
            }
        }
    }

    /// Finalize independent captures concurrently, at most `workers` at a
    /// time. Results are in job order.
    pub async fn finalize_all(&self, jobs: Vec<FinalizeJob>, workers: usize) -> Vec<PipelineResult> {
        let permits = Arc::new(Semaphore::new(workers.max(1)));
        let captures: Vec<PathBuf> = jobs.iter().map(|job| job.capture_path.clone()).collect();
        let mut tasks = JoinSet::new();

        for (index, job) in jobs.into_iter().enumerate() {
            let permits = Arc::clone(&permits);
            let orchestrator = self.clone();
            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let error = StepcastError::Other(anyhow::anyhow!("worker pool closed: {e}"));
                        return (index, PipelineResult::failure(job.capture_path.clone(), error));
                    }
                };
                (index, orchestrator.finalize(&job).await)
            });
        }

        let mut results: Vec<Option<PipelineResult>> = captures.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => tracing::error!(error = %e, "Finalization task aborted"),
            }
        }

        results
            .into_iter()
            .zip(captures)
            .map(|(result, capture)| {
                result.unwrap_or_else(|| {
                    PipelineResult::failure(
                        capture,
                        StepcastError::Other(anyhow::anyhow!("finalization task aborted")),
                    )
                })
            })
            .collect()
    }

    async fn run(&self, job: &FinalizeJob) -> StepcastResult<PathBuf> {
        let prepared = self.prepare(job).await?;
        let capture = absolute(&job.capture_path)?;

        if prepared.plan.is_passthrough() {
            prepared.work_dir.close()?;
            return Ok(capture);
        }

        let result = self
            .executor()
            .execute(&prepared.plan, prepared.work_dir.parent(), self.config.timeout_secs)
            .await;
        let produced = result.into_result()?;

        let final_path = finalized_path(&capture, &prepared.plan.output_container);
        let sidecar = if self.config.keep_captions {
            stage_sidecar(&prepared)
        } else {
            None
        };
        replace_capture(&produced, &capture, &final_path).await?;

        // The video is in place; a sidecar that cannot be kept is only a warning.
        if let Some(staged) = sidecar {
            let kept = final_path.with_extension(CaptionFormat::from_path(&staged).extension());
            match tokio::fs::rename(&staged, &kept).await {
                Ok(()) => tracing::debug!(path = %kept.display(), "Kept caption track"),
                Err(e) => tracing::warn!(
                    path = %kept.display(),
                    error = %e,
                    "Failed to keep caption track"
                ),
            }
        }

        if let Err(e) = prepared.work_dir.close() {
            tracing::warn!(error = %e, "Failed to remove working directory");
        }
        Ok(final_path)
    }

    /// Everything up to, but not including, the transcode: cues, caption
    /// file, probing, intro rendering, input resolution and planning.
    ///
    /// Dropping the returned value removes its working directory.
    pub async fn prepare(&self, job: &FinalizeJob) -> StepcastResult<PreparedRun> {
        let config = &self.config;
        config.validate()?;

        if !job.capture_path.is_file() {
            return Err(StepcastError::FileNotFound {
                path: job.capture_path.clone(),
            });
        }
        let capture = absolute(&job.capture_path)?;
        let capture_dir = capture
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StepcastError::conflict("capture has no parent directory"))?;

        // Invalid steps are fatal before anything is spawned.
        let cues = if config.subtitles_enabled {
            let built = CueBuilder::from_config(config)?.build(&job.timeline.relative_to_capture())?;
            retime_cues(&built, config.speed)
        } else {
            Vec::new()
        };

        if !tool_available(&self.tools.ffmpeg).await {
            return Err(StepcastError::tool_unavailable(
                self.tools.ffmpeg.display().to_string(),
            ));
        }

        let work_dir = WorkDir::create_in(&capture_dir)?;
        let source = probe_media(&self.tools.ffprobe, &capture).await;
        let output_container = Container::for_output(config.output_codec, &source.container);

        let captions_path = if cues.is_empty() {
            None
        } else {
            let ext = match output_container {
                Container::Webm if config.soft_subtitles() => CaptionFormat::WebVtt,
                _ => CaptionFormat::Srt,
            }
            .extension();
            Some(write_captions(&cues, &work_dir.join(format!("captions.{ext}")))?)
        };

        let (intro_path, intro_info, intro_secs) = if config.intro_enabled {
            self.resolve_intro(job, &source, &work_dir).await?
        } else {
            (None, None, 0.0)
        };

        let narration = job.narration_path.as_deref().map(absolute_or_given);
        let mut effective = config.clone();
        effective.background_audio_path = config
            .background_audio_path
            .as_deref()
            .map(absolute_or_given);

        let inputs = MediaInputSet::resolve(
            &capture,
            &effective,
            OptionalMedia {
                narration: narration.as_deref(),
                intro: intro_path.as_deref(),
                subtitles: captions_path.as_deref(),
            },
        );

        let burn_captions = match (&captions_path, config.hard_subtitles) {
            (Some(path), true) => path
                .file_name()
                .map(|name| work_dir.relative().join(name)),
            _ => None,
        };

        let plan = TranscodePlanner::new(PlanContext {
            config: &effective,
            source: &source,
            intro: intro_info.as_ref(),
            intro_duration_secs: intro_secs,
            work_dir: work_dir.path(),
            burn_captions: burn_captions.as_deref(),
        })
        .plan(&inputs, &job.extra_video_filters)?;

        let intro_offset_secs = if inputs.has(MediaKind::IntroClip) {
            intro_secs
        } else {
            0.0
        };

        Ok(PreparedRun {
            work_dir,
            source,
            cues,
            captions_path,
            intro_offset_secs,
            inputs,
            plan,
        })
    }

    /// Use the caller's intro clip or render a title card.
    async fn resolve_intro(
        &self,
        job: &FinalizeJob,
        source: &SourceInfo,
        work_dir: &WorkDir,
    ) -> StepcastResult<(Option<PathBuf>, Option<SourceInfo>, f64)> {
        if let Some(given) = &job.intro_path {
            let given = absolute_or_given(given);
            let info = probe_media(&self.tools.ffprobe, &given).await;
            let secs = info
                .duration_secs
                .unwrap_or(self.config.intro_duration_secs);
            return Ok((Some(given), Some(info), secs));
        }

        let card = IntroCard::new(&self.config, &job.timeline, &job.display_name());
        let stage = card.stage(source, work_dir.path(), &work_dir.relative())?;
        self.executor()
            .execute_stage(&stage, work_dir.parent(), self.config.timeout_secs)
            .await?;

        let info = probe_media(&self.tools.ffprobe, &stage.output).await;
        tracing::debug!(title = %card.title, path = %stage.output.display(), "Rendered intro card");
        Ok((Some(stage.output), Some(info), card.duration_secs))
    }
}

/// Write the caption track to keep beside the finished file into the work
/// dir, shifted past the intro so it plays against the joined video.
fn stage_sidecar(prepared: &PreparedRun) -> Option<PathBuf> {
    let captions = prepared.captions_path.as_ref()?;
    let ext = CaptionFormat::from_path(captions).extension();
    let offset = prepared.intro_offset_secs;
    let shifted: Vec<SubtitleCue> = prepared
        .cues
        .iter()
        .map(|cue| SubtitleCue::new(cue.index, cue.start + offset, cue.end + offset, cue.text.clone()))
        .collect();
    match write_captions(&shifted, &prepared.work_dir.join(format!("kept.{ext}"))) {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to write caption track to keep");
            None
        }
    }
}

/// Where the finalized file lands. A capture whose extension already names
/// the output container keeps its exact path, whatever the letter case, so
/// `capture.WEBM` is never renamed onto itself through a case-folding
/// filesystem and then removed.
fn finalized_path(capture: &Path, container: &Container) -> PathBuf {
    let wanted = container.extension();
    let same = capture
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted));
    if same {
        capture.to_path_buf()
    } else {
        capture.with_extension(wanted)
    }
}

/// Move the finalized file over the capture.
///
/// The rename happens first; the original is only removed afterwards and
/// only when the extension changed.
async fn replace_capture(produced: &Path, capture: &Path, final_path: &Path) -> StepcastResult<()> {
    let size = tokio::fs::metadata(produced).await?.len();
    if size == 0 {
        return Err(StepcastError::transcode(
            "verify",
            "empty output",
            &format!("{} is empty", produced.display()),
        ));
    }

    tokio::fs::rename(produced, final_path).await?;
    if final_path != capture {
        tokio::fs::remove_file(capture).await?;
    }
    tracing::debug!(
        output = %final_path.display(),
        bytes = size,
        "Replaced capture with finalized output"
    );
    Ok(())
}

fn absolute(path: &Path) -> StepcastResult<PathBuf> {
    Ok(std::fs::canonicalize(path)?)
}

/// Paths handed to the transcoder must survive its working-directory change.
fn absolute_or_given(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_from_capture() {
        let job = FinalizeJob::new("/rec/checkout_flow-1.webm", StepTimeline::default());
        assert_eq!(job.display_name(), "checkout flow 1");
    }

    #[test]
    fn test_batch_manifest_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("steps.json"),
            r#"{"steps": [{"text": "Open", "startTime": 0.0, "duration": 1.0}]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("batch.json"),
            r#"{"jobs": [{"capture": "a.webm", "steps": "steps.json", "narration": "a.wav"}]}"#,
        )
        .unwrap();

        let jobs = BatchManifest::load(&dir.path().join("batch.json")).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].capture_path, dir.path().join("a.webm"));
        assert_eq!(jobs[0].narration_path, Some(dir.path().join("a.wav")));
        assert_eq!(jobs[0].timeline.steps.len(), 1);
    }

    #[test]
    fn test_batch_manifest_missing_timeline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("batch.json"),
            r#"{"jobs": [{"capture": "a.webm", "steps": "missing.json"}]}"#,
        )
        .unwrap();
        let err = BatchManifest::load(&dir.path().join("batch.json")).unwrap_err();
        assert!(matches!(err, StepcastError::FileNotFound { .. }));
    }

    #[test]
    fn test_finalized_path_keeps_extension_case() {
        let upper = Path::new("/rec/capture.WEBM");
        assert_eq!(finalized_path(upper, &Container::Webm), upper);
        assert_eq!(
            finalized_path(upper, &Container::Mp4),
            PathBuf::from("/rec/capture.mp4")
        );
        assert_eq!(
            finalized_path(Path::new("/rec/capture"), &Container::Mkv),
            PathBuf::from("/rec/capture.mkv")
        );
    }

    #[tokio::test]
    async fn test_replace_capture_with_differently_cased_extension() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("capture.WEBM");
        std::fs::write(&capture, b"raw").unwrap();
        let produced = dir.path().join("finalized.webm");
        std::fs::write(&produced, b"finalized").unwrap();

        let final_path = finalized_path(&capture, &Container::Webm);
        replace_capture(&produced, &capture, &final_path).await.unwrap();

        assert_eq!(final_path, capture);
        assert_eq!(std::fs::read(&capture).unwrap(), b"finalized");
        assert!(!produced.exists());
    }

    #[tokio::test]
    async fn test_missing_capture_is_fatal() {
        let orchestrator = PipelineOrchestrator::new(FinalizeConfig::default(), ToolPaths::default());
        let job = FinalizeJob::new("/definitely/not/here.webm", StepTimeline::default());
        let result = orchestrator.finalize(&job).await;
        assert!(result.is_fatal());
        assert!(matches!(result.error, Some(StepcastError::FileNotFound { .. })));
    }
}
