//! Finalize every capture listed in a batch manifest.

use std::path::PathBuf;

use stepcast_common::config::AppConfig;
use stepcast_finalize_engine::{BatchManifest, PipelineOrchestrator};

pub async fn run(app: AppConfig, manifest: PathBuf) -> anyhow::Result<()> {
    let jobs = BatchManifest::load(&manifest)
        .map_err(|e| anyhow::anyhow!("Failed to load manifest: {e}"))?;
    println!(
        "Finalizing {} capture(s) with {} worker(s)",
        jobs.len(),
        app.workers.max(1)
    );

    let orchestrator = PipelineOrchestrator::new(app.finalize, app.tools);
    let results = orchestrator.finalize_all(jobs, app.workers).await;

    let mut failed = 0;
    for result in &results {
        let status = if result.succeeded {
            "OK"
        } else if result.degraded {
            "KEPT"
        } else {
            failed += 1;
            "FAIL"
        };
        println!("[{status:>4}] {}", result.output_path.display());
        if let Some(detail) = result.error_detail() {
            println!("       {detail}");
        }
    }

    println!();
    if failed == 0 {
        println!("All captures processed.");
        Ok(())
    } else {
        Err(anyhow::anyhow!("{failed} of {} capture(s) failed", results.len()))
    }
}
