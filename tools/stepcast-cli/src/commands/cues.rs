//! Write the caption track for a step timeline.

use std::path::PathBuf;

use stepcast_captions::{generate_srt, write_captions, CueBuilder};
use stepcast_common::config::FinalizeConfig;
use stepcast_timeline_model::{retime_cues, StepTimeline};

pub fn run(config: &FinalizeConfig, steps: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    let timeline = StepTimeline::load(&steps)
        .map_err(|e| anyhow::anyhow!("Failed to load steps: {e}"))?;

    let cues = CueBuilder::from_config(config)?.build(&timeline.relative_to_capture())?;
    let cues = retime_cues(&cues, config.speed);

    match output {
        Some(path) => {
            let written = write_captions(&cues, &path)?;
            println!("Wrote {} cue(s) to {}", cues.len(), written.display());
        }
        None => print!("{}", generate_srt(&cues)),
    }

    Ok(())
}
