//! Runs planned stages through ffmpeg.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use stepcast_common::error::{StepcastError, StepcastResult};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::Instant;

use crate::plan::{TranscodePlan, TranscodeStage};
use crate::render::{display_command, render_stage_args};

/// Progress callback for finalization runs.
pub type ProgressCallback = Arc<dyn Fn(FinalizeProgress) + Send + Sync>;

/// Progress of the running stage.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeProgress {
    /// Stage name, e.g. `concat` or `transcode`.
    pub stage: String,
    /// 0-based position of the stage in the plan.
    pub stage_index: usize,
    pub stage_count: usize,
    /// Stage progress [0.0, 1.0]; 0 while the length is unknown.
    pub progress: f64,
    /// Output time written so far.
    pub out_time_secs: f64,
}

/// Outcome of a finalization run.
#[derive(Debug)]
pub struct PipelineResult {
    /// The finalized file on success, otherwise the file the caller should use.
    pub output_path: PathBuf,
    pub succeeded: bool,
    /// The run failed but the unmodified capture is being returned.
    pub degraded: bool,
    pub error: Option<StepcastError>,
}

impl PipelineResult {
    pub fn success(output_path: PathBuf) -> Self {
        Self {
            output_path,
            succeeded: true,
            degraded: false,
            error: None,
        }
    }

    pub fn failure(output_path: PathBuf, error: StepcastError) -> Self {
        Self {
            output_path,
            succeeded: false,
            degraded: false,
            error: Some(error),
        }
    }

    pub fn degraded(output_path: PathBuf, error: StepcastError) -> Self {
        Self {
            output_path,
            succeeded: false,
            degraded: true,
            error: Some(error),
        }
    }

    /// Failed without a usable fallback.
    pub fn is_fatal(&self) -> bool {
        !self.succeeded && !self.degraded
    }

    pub fn error_detail(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// The usable output path, or the error for fatal failures.
    pub fn into_result(self) -> StepcastResult<PathBuf> {
        match self.error {
            Some(error) if !self.succeeded && !self.degraded => Err(error),
            _ => Ok(self.output_path),
        }
    }
}

/// Executes [`TranscodePlan`]s.
#[derive(Clone)]
pub struct TranscodeExecutor {
    ffmpeg: PathBuf,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for TranscodeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeExecutor")
            .field("ffmpeg", &self.ffmpeg)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl TranscodeExecutor {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    /// Run every stage of `plan` in order with `work_dir` as the current
    /// directory. `timeout_secs` bounds the whole plan; on expiry the
    /// running transcoder and its process group are killed.
    pub async fn execute(&self, plan: &TranscodePlan, work_dir: &Path, timeout_secs: u64) -> PipelineResult {
        if plan.is_passthrough() {
            return PipelineResult::success(plan.output_path.clone());
        }

        let started = std::time::Instant::now();
        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        let count = plan.stages.len();

        for (index, stage) in plan.stages.iter().enumerate() {
            if let Err(error) = self
                .run_stage(stage, index, count, work_dir, deadline, timeout_secs)
                .await
            {
                tracing::error!(stage = %stage.name, error = %error, "Transcode stage failed");
                return PipelineResult::failure(plan.output_path.clone(), error);
            }
        }

        if !plan.output_path.is_file() {
            return PipelineResult::failure(
                plan.output_path.clone(),
                StepcastError::transcode(
                    "verify",
                    "missing output",
                    &format!("{} was not produced", plan.output_path.display()),
                ),
            );
        }

        tracing::info!(
            stages = count,
            elapsed_secs = started.elapsed().as_secs_f64(),
            output = %plan.output_path.display(),
            "Transcode plan complete"
        );
        PipelineResult::success(plan.output_path.clone())
    }

    /// Run one stage on its own, e.g. rendering an intro card.
    pub async fn execute_stage(
        &self,
        stage: &TranscodeStage,
        work_dir: &Path,
        timeout_secs: u64,
    ) -> StepcastResult<()> {
        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        self.run_stage(stage, 0, 1, work_dir, deadline, timeout_secs)
            .await
    }

    async fn run_stage(
        &self,
        stage: &TranscodeStage,
        index: usize,
        count: usize,
        work_dir: &Path,
        deadline: Instant,
        timeout_secs: u64,
    ) -> StepcastResult<()> {
        for file in &stage.staged_files {
            tokio::fs::write(&file.path, &file.contents).await?;
        }

        let args = render_stage_args(stage);
        tracing::debug!(
            stage = %stage.name,
            command = %display_command(&self.ffmpeg, &args),
            "Running ffmpeg"
        );

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(&args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout can take down anything ffmpeg spawned.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StepcastError::tool_unavailable(self.ffmpeg.display().to_string())
            } else {
                StepcastError::Io(e)
            }
        })?;

        tracing::info!(
            stage = %stage.name,
            pid = child.id(),
            args_len = args.len(),
            "ffmpeg process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StepcastError::transcode(&stage.name, "spawn", "stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| StepcastError::transcode(&stage.name, "spawn", "stderr was not captured"))?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        // Filenames and localized messages are not always UTF-8.
        let stderr_task = tokio::spawn(async move {
            let mut raw = Vec::new();
            let read = BufReader::new(stderr).read_to_end(&mut raw).await;
            let output = String::from_utf8_lossy(&raw).into_owned();
            match read {
                Ok(_) => output,
                Err(err) => format!("{output}\n<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let outcome = tokio::time::timeout_at(deadline, async {
            self.follow_progress(stdout, stage, index, count).await;
            child.wait().await
        })
        .await;

        let status = match outcome {
            Ok(status) => status?,
            Err(_) => {
                terminate(&mut child).await;
                let diagnostics = collect_stderr(stderr_task).await;
                return Err(StepcastError::timeout(&stage.name, timeout_secs, &diagnostics));
            }
        };

        let diagnostics = collect_stderr(stderr_task).await;
        if !status.success() {
            return Err(StepcastError::transcode(&stage.name, status.to_string(), &diagnostics));
        }
        if !stage.output.is_file() {
            return Err(StepcastError::transcode(
                &stage.name,
                status.to_string(),
                &format!("{} was not produced\n{diagnostics}", stage.output.display()),
            ));
        }

        self.report(FinalizeProgress {
            stage: stage.name.clone(),
            stage_index: index,
            stage_count: count,
            progress: 1.0,
            out_time_secs: stage.expected_duration_secs.unwrap_or(0.0),
        });
        Ok(())
    }

    async fn follow_progress(
        &self,
        stdout: ChildStdout,
        stage: &TranscodeStage,
        index: usize,
        count: usize,
    ) {
        let mut lines = BufReader::new(stdout).lines();
        let mut state = ProgressState::default();
        let mut last_progress_secs = 0.0f64;
        let mut last_progress_wall = std::time::Instant::now();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "Stopped reading ffmpeg progress");
                    break;
                }
            };

            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            state.update(key, value);
            if key != "progress" {
                continue;
            }

            if state.out_time_secs > last_progress_secs + 0.001 {
                last_progress_secs = state.out_time_secs;
                last_progress_wall = std::time::Instant::now();
            }
            if last_progress_wall.elapsed().as_secs() >= 10 {
                tracing::warn!(
                    stage = %stage.name,
                    out_time_secs = state.out_time_secs,
                    "No ffmpeg progress advancement for 10s"
                );
                last_progress_wall = std::time::Instant::now();
            }

            self.report(FinalizeProgress {
                stage: stage.name.clone(),
                stage_index: index,
                stage_count: count,
                progress: state.fraction(stage.expected_duration_secs),
                out_time_secs: state.out_time_secs,
            });
        }
    }

    fn report(&self, progress: FinalizeProgress) {
        if let Some(cb) = &self.progress {
            cb(progress);
        }
    }
}

/// Kill the transcoder's whole process group and reap it.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: plain syscall; the group was created for this child.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "ffmpeg already exited");
    }
    if let Err(e) = child.wait().await {
        tracing::warn!(error = %e, "Failed to reap timed-out ffmpeg");
    }
}

async fn collect_stderr(task: tokio::task::JoinHandle<String>) -> String {
    match tokio::time::timeout(Duration::from_secs(5), task).await {
        Ok(Ok(output)) => output,
        Ok(Err(_)) => "<failed to join stderr reader>".to_string(),
        Err(_) => "<stderr still open after ffmpeg exited>".to_string(),
    }
}

/// Accumulated `-progress` key/value state.
#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // Despite the name, out_time_ms is reported in microseconds.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    fn fraction(&self, expected_secs: Option<f64>) -> f64 {
        if self.complete {
            return 1.0;
        }
        match expected_secs {
            Some(expected) if expected > 0.0 => (self.out_time_secs / expected).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}
