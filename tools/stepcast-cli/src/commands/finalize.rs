//! Finalize one capture in place.

use std::sync::Arc;

use stepcast_common::config::AppConfig;
use stepcast_finalize_engine::{FinalizeJob, FinalizeProgress, PipelineOrchestrator};

pub async fn run(app: AppConfig, job: FinalizeJob) -> anyhow::Result<()> {
    println!("Finalizing capture: {}", job.capture_path.display());
    println!("  Steps: {}", job.timeline.steps.len());
    println!("  Speed: {}x", app.finalize.speed);

    let orchestrator = PipelineOrchestrator::new(app.finalize, app.tools)
        .with_progress(Arc::new(|p: FinalizeProgress| {
            print!(
                "\r  [{}/{}] {}: {:.1}% ({:.1}s written)  ",
                p.stage_index + 1,
                p.stage_count,
                p.stage,
                p.progress * 100.0,
                p.out_time_secs,
            );
        }));

    let result = orchestrator.finalize(&job).await;
    println!();

    if result.succeeded {
        println!("Finalized: {}", result.output_path.display());
        return Ok(());
    }

    let detail = result.error_detail().unwrap_or_default();
    if result.degraded {
        println!("Kept the original capture: {}", result.output_path.display());
        println!("  Reason: {detail}");
        Ok(())
    } else {
        Err(anyhow::anyhow!("Finalization failed: {detail}"))
    }
}
