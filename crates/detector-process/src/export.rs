use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::info;

use crate::error::{DetectorError, Result};

/// Request to write the kept clips of `input` into `output`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub clips: Vec<[f64; 2]>,
    pub keyframes: Vec<f64>,
}

impl ExportArgs {
    /// Builds `--write-clips --input <in> --output <out> --clips <json> --keyframes <json>`.
    pub fn to_command_args(&self) -> Result<Vec<OsString>> {
        let clips = serde_json::to_string(&self.clips).map_err(|_| DetectorError::Parse {
            context: "export clip list",
            value: format!("{:?}", self.clips),
        })?;
        let keyframes = serde_json::to_string(&self.keyframes).map_err(|_| DetectorError::Parse {
            context: "export keyframe list",
            value: format!("{:?}", self.keyframes),
        })?;

        Ok(vec![
            "--write-clips".into(),
            "--input".into(),
            self.input.clone().into_os_string(),
            "--output".into(),
            self.output.clone().into_os_string(),
            "--clips".into(),
            clips.into(),
            "--keyframes".into(),
            keyframes.into(),
        ])
    }
}

/// Asks the detector to cut `args.clips` out of the input and write them to
/// `args.output`. Blocks until the detector exits.
pub fn run_export(program: &Path, args: &ExportArgs) -> Result<()> {
    let command_args = args.to_command_args()?;
    let command_line = crate::run::command_for_display(program, &command_args);
    info!(
        command = %command_line,
        clip_count = args.clips.len(),
        "spawning detector export"
    );

    let output = Command::new(program)
        .args(&command_args)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| DetectorError::Io {
            context: "run detector export",
            source,
        })?;
    if !output.status.success() {
        return Err(DetectorError::CommandFailed {
            command: command_line,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    info!(output = ?args.output, "export finished");
    Ok(())
}
