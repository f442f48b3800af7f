//! Stepcast CLI: finalize recorded browser sessions into demo videos.
//!
//! Usage:
//!   stepcast finalize <CAPTURE>   Finalize one capture in place
//!   stepcast batch <MANIFEST>     Finalize every capture listed in a manifest
//!   stepcast plan <CAPTURE>       Print the transcoder commands without running them
//!   stepcast cues <STEPS>         Write the caption track for a step timeline
//!   stepcast check                Check transcoder availability and settings

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stepcast_common::config::AppConfig;

mod commands;

use commands::FinalizeOverrides;

#[derive(Parser)]
#[command(
    name = "stepcast",
    about = "Turn recorded browser sessions into captioned demo videos",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the standard location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// ffmpeg executable
    #[arg(long, global = true)]
    ffmpeg: Option<PathBuf>,

    /// ffprobe executable
    #[arg(long, global = true)]
    ffprobe: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Finalize one capture, replacing it with the finished video
    Finalize {
        /// Path to the raw capture
        capture: PathBuf,

        /// Step timeline (defaults to steps.json next to the capture)
        #[arg(short, long)]
        steps: Option<PathBuf>,

        /// Narration audio track
        #[arg(long)]
        narration: Option<PathBuf>,

        /// Pre-rendered intro clip used instead of a generated title card
        #[arg(long)]
        intro_clip: Option<PathBuf>,

        /// Extra ffmpeg video filter, may be repeated
        #[arg(long = "vf")]
        video_filters: Vec<String>,

        #[command(flatten)]
        overrides: FinalizeOverrides,
    },

    /// Finalize every capture listed in a batch manifest
    Batch {
        /// Path to batch.json
        manifest: PathBuf,

        /// Captures finalized concurrently
        #[arg(short, long)]
        workers: Option<usize>,

        #[command(flatten)]
        overrides: FinalizeOverrides,
    },

    /// Print the transcoder commands a finalize run would execute
    Plan {
        /// Path to the raw capture
        capture: PathBuf,

        /// Step timeline (defaults to steps.json next to the capture)
        #[arg(short, long)]
        steps: Option<PathBuf>,

        /// Narration audio track
        #[arg(long)]
        narration: Option<PathBuf>,

        /// Pre-rendered intro clip
        #[arg(long)]
        intro_clip: Option<PathBuf>,

        /// Extra ffmpeg video filter, may be repeated
        #[arg(long = "vf")]
        video_filters: Vec<String>,

        #[command(flatten)]
        overrides: FinalizeOverrides,
    },

    /// Build subtitle cues from a step timeline
    Cues {
        /// Path to steps.json
        steps: PathBuf,

        /// Output file (.srt or .vtt); prints SRT to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        overrides: FinalizeOverrides,
    },

    /// Check transcoder availability and effective settings
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut app = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()))?,
        None => AppConfig::load(),
    };
    if let Some(ffmpeg) = cli.ffmpeg {
        app.tools.ffmpeg = ffmpeg;
    }
    if let Some(ffprobe) = cli.ffprobe {
        app.tools.ffprobe = ffprobe;
    }

    // Initialize logging
    if cli.verbose {
        app.logging.level = "debug".to_string();
    }
    stepcast_common::logging::init_logging(&app.logging)?;

    match cli.command {
        Commands::Finalize {
            capture,
            steps,
            narration,
            intro_clip,
            video_filters,
            overrides,
        } => {
            overrides.apply(&mut app.finalize)?;
            if narration.is_some() {
                app.finalize.narration_enabled = true;
            }
            let job = commands::load_job(capture, steps, narration, intro_clip, video_filters)?;
            commands::finalize::run(app, job).await
        }
        Commands::Batch {
            manifest,
            workers,
            overrides,
        } => {
            overrides.apply(&mut app.finalize)?;
            if let Some(workers) = workers {
                app.workers = workers;
            }
            commands::batch::run(app, manifest).await
        }
        Commands::Plan {
            capture,
            steps,
            narration,
            intro_clip,
            video_filters,
            overrides,
        } => {
            overrides.apply(&mut app.finalize)?;
            if narration.is_some() {
                app.finalize.narration_enabled = true;
            }
            let job = commands::load_job(capture, steps, narration, intro_clip, video_filters)?;
            commands::plan::run(app, job).await
        }
        Commands::Cues {
            steps,
            output,
            overrides,
        } => {
            overrides.apply(&mut app.finalize)?;
            commands::cues::run(&app.finalize, steps, output)
        }
        Commands::Check => commands::check::run(&app, cli.config).await,
    }
}
