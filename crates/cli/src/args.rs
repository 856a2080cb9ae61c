use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clip_engine::ProcessOptions;

#[derive(Parser, Debug)]
#[command(name = "clipper", version, about = "Detect eliminations and edit the kept clip list")]
pub struct Cli {
    /// JSON file holding the persisted input, options and timeline.
    #[arg(long, global = true, default_value = "clipper-state.json")]
    pub state: PathBuf,

    /// Detector executable invoked for processing and export runs.
    #[arg(long, global = true, env = "CLIPPER_DETECTOR", default_value = "elim-detector")]
    pub detector: PathBuf,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the detector on the selected input and store the resulting clips.
    Process(ProcessArgs),
    /// Print the stored timeline with edited playhead times.
    Show,
    /// Delete one clip from the stored timeline.
    Delete {
        /// Zero-based clip index as printed by `show`.
        index: usize,
    },
    /// Write the stored clips of the selected input into a new video.
    Export {
        output: PathBuf,
    },
}

/// Overrides applied on top of the persisted processing options.
#[derive(Args, Debug, Default)]
pub struct ProcessArgs {
    /// Input video; defaults to the previously selected one.
    #[arg(long)]
    pub input: Option<PathBuf>,

    #[arg(long)]
    pub threads: Option<usize>,

    #[arg(long, value_name = "BOOL")]
    pub include_assists: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    pub include_spectating: Option<bool>,

    /// Seconds kept before each elimination.
    #[arg(long, value_name = "SECONDS")]
    pub elim_clip_duration: Option<f64>,

    #[arg(long, value_name = "BOOL")]
    pub hw_accel: Option<bool>,
}

impl ProcessArgs {
    pub fn apply(&self, mut options: ProcessOptions) -> ProcessOptions {
        if let Some(threads) = self.threads {
            options.thread_count = threads;
        }
        if let Some(include_assists) = self.include_assists {
            options.include_assists = include_assists;
        }
        if let Some(include_spectating) = self.include_spectating {
            options.include_spectating = include_spectating;
        }
        if let Some(seconds) = self.elim_clip_duration {
            options.elim_clip_duration = seconds;
        }
        if let Some(hw_accel) = self.hw_accel {
            options.hardware_acceleration = hw_accel;
        }
        options
    }
}
