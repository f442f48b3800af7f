//! Check transcoder availability and effective settings.

use std::path::PathBuf;

use stepcast_common::config::{config_file_path, AppConfig};
use stepcast_finalize_engine::tool_available;

pub async fn run(app: &AppConfig, config: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Stepcast System Check");
    println!("{}", "=".repeat(50));

    let config_path = config.unwrap_or_else(config_file_path);
    if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!("[INFO] Config: {} (not found, using defaults)", config_path.display());
    }

    let mut all_ok = true;
    for (name, path) in [("ffmpeg", &app.tools.ffmpeg), ("ffprobe", &app.tools.ffprobe)] {
        if tool_available(path).await {
            println!("[OK] {name}: {}", path.display());
        } else {
            println!("[FAIL] {name}: {} not runnable", path.display());
            all_ok = false;
        }
    }

    match app.finalize.validate() {
        Ok(()) => println!("[OK] Finalize settings are consistent"),
        Err(e) => {
            println!("[FAIL] {e}");
            all_ok = false;
        }
    }

    println!();
    println!("Effective finalize settings:");
    println!("{}", serde_json::to_string_pretty(&app.finalize)?);

    println!();
    if all_ok {
        println!("Stepcast is ready.");
    } else {
        println!("Captures will be kept unmodified until the problems above are fixed.");
    }

    Ok(())
}
