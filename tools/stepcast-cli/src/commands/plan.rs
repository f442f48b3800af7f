//! Print the transcoder commands a finalize run would execute.
//!
//! Planning probes the capture and, when a title card is requested, renders
//! it, so ffmpeg and ffprobe are still invoked. The capture is never touched.

use stepcast_common::config::AppConfig;
use stepcast_finalize_engine::render::{display_command, render_stage_args};
use stepcast_finalize_engine::{FinalizeJob, PipelineOrchestrator};

pub async fn run(app: AppConfig, job: FinalizeJob) -> anyhow::Result<()> {
    let ffmpeg = app.tools.ffmpeg.clone();
    let orchestrator = PipelineOrchestrator::new(app.finalize, app.tools);
    let prepared = orchestrator.prepare(&job).await?;

    let source = &prepared.source;
    println!("Capture: {}", job.capture_path.display());
    println!(
        "  Source: {} {} {}",
        source.container.extension(),
        source.video_codec.as_deref().unwrap_or("unknown codec"),
        match source.dimensions() {
            Some((w, h)) => format!("{w}x{h}"),
            None => "unknown size".to_string(),
        }
    );
    println!("  Audio: {:?}", source.audio);
    println!("  Cues: {}", prepared.cues.len());
    println!();

    println!("Inputs:");
    for input in prepared.inputs.iter() {
        println!("  {}: {} {}", input.index, input.kind.as_str(), input.path.display());
    }
    println!();

    let plan = &prepared.plan;
    if plan.is_passthrough() {
        println!("Nothing to do: the capture is already final.");
        return Ok(());
    }

    println!(
        "Plan: {} -> {}",
        if plan.use_fast_path { "stream copy" } else { "transcode" },
        plan.output_container.extension()
    );
    for (i, stage) in plan.stages.iter().enumerate() {
        println!();
        println!("# {}. {}", i + 1, stage.name);
        for staged in &stage.staged_files {
            println!("#   writes {}", staged.path.display());
        }
        println!("{}", display_command(&ffmpeg, &render_stage_args(stage)));
    }

    Ok(())
}
