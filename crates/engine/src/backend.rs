use std::path::{Path, PathBuf};

use detector_process::{DetectorArgs, DetectorEvent, ExportArgs};

use crate::error::Result;
use crate::session::{ExportRequest, ProcessRequest, ProcessResult, ProgressSample};
use crate::timeline::Clip;

/// Intermediate output of a running backend job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    Progress(ProgressSample),
    Log(String),
}

/// Backend that turns one processing request into a clip list and writes
/// edited clip lists out.
///
/// Both calls block until the job resolves. `process` reports progress
/// through `on_update` while it runs. The bridge calls them from dedicated
/// threads.
pub trait ProcessBackend {
    fn process(
        &self,
        request: &ProcessRequest,
        on_update: &mut dyn FnMut(JobUpdate),
    ) -> Result<ProcessResult>;

    fn export(&self, request: &ExportRequest) -> Result<()>;
}

/// Backend that runs the external detector executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorBackend {
    program: PathBuf,
}

impl DetectorBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl ProcessBackend for DetectorBackend {
    fn process(
        &self,
        request: &ProcessRequest,
        on_update: &mut dyn FnMut(JobUpdate),
    ) -> Result<ProcessResult> {
        let args = DetectorArgs {
            input: request.input.clone(),
            threads: request.threads,
            include_assists: request.include_assists,
            include_spectating: request.include_spectating,
            elim_clip_duration: request.elim_clip_duration,
            hw_accel: request.hw_accel,
        };

        let output = detector_process::run_detector(&self.program, &args, |event| match event {
            DetectorEvent::Progress { progress, speed } => {
                on_update(JobUpdate::Progress(ProgressSample { progress, speed }));
            }
            DetectorEvent::Log(text) => on_update(JobUpdate::Log(text)),
        })?;

        Ok(ProcessResult {
            clips: output.clips.into_iter().map(Clip::from).collect(),
            keyframes: output.keyframes,
            input_duration: output.input_duration,
        })
    }

    fn export(&self, request: &ExportRequest) -> Result<()> {
        let args = ExportArgs {
            input: request.input.clone(),
            output: request.output.clone(),
            clips: request.clips.iter().copied().map(<[f64; 2]>::from).collect(),
            keyframes: request.keyframes.clone(),
        };
        detector_process::run_export(&self.program, &args)?;
        Ok(())
    }
}
