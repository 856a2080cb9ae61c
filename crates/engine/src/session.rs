use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::timeline::Clip;

/// Lifecycle of the processing session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Detection settings sent with every processing request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessOptions {
    pub thread_count: usize,
    pub include_assists: bool,
    pub include_spectating: bool,
    /// Seconds kept before each elimination.
    pub elim_clip_duration: f64,
    pub hardware_acceleration: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            thread_count: detector_process::max_thread_count(),
            include_assists: true,
            include_spectating: false,
            elim_clip_duration: 4.0,
            hardware_acceleration: true,
        }
    }
}

/// Payload of the backend `process` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub input: PathBuf,
    pub threads: usize,
    pub include_assists: bool,
    pub include_spectating: bool,
    pub elim_clip_duration: f64,
    pub hw_accel: bool,
}

impl ProcessRequest {
    pub fn new(input: &Path, options: &ProcessOptions) -> Self {
        Self {
            input: input.to_path_buf(),
            threads: options.thread_count.max(1),
            include_assists: options.include_assists,
            include_spectating: options.include_spectating,
            elim_clip_duration: options.elim_clip_duration,
            hw_accel: options.hardware_acceleration,
        }
    }
}

/// Successful reply of the backend `process` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    pub clips: Vec<Clip>,
    pub keyframes: Vec<f64>,
    #[serde(default, alias = "input_duration")]
    pub input_duration: Option<f64>,
}

impl ProcessResult {
    /// Reported input duration, falling back to the last keyframe.
    pub fn resolved_input_duration(&self) -> Option<f64> {
        self.input_duration.or_else(|| self.keyframes.last().copied())
    }
}

/// Payload of the backend `write_clips` call: the edited timeline to cut out
/// of `input`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub clips: Vec<Clip>,
    pub keyframes: Vec<f64>,
}

/// One sample from the backend `progress` stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    /// Fraction of the input processed, `0.0..=1.0`.
    pub progress: f64,
    /// Processing speed relative to realtime.
    pub speed: f64,
}

/// State machine wrapping one backend processing job at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingSession {
    phase: SessionPhase,
    progress: f64,
    speed: f64,
    elapsed: Duration,
    started_at: Option<Instant>,
    options: ProcessOptions,
    last_error: Option<String>,
}

impl ProcessingSession {
    pub fn new(options: ProcessOptions) -> Self {
        Self {
            phase: SessionPhase::Idle,
            progress: 0.0,
            speed: 0.0,
            elapsed: Duration::ZERO,
            started_at: None,
            options,
            last_error: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_processing(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Replaces the options used by the next run. Rejected while running.
    pub fn set_options(&mut self, options: ProcessOptions) -> bool {
        if self.is_processing() {
            warn!("options change ignored: processing in progress");
            return false;
        }
        self.options = options;
        true
    }

    /// Arms a new run and returns the request to issue.
    ///
    /// Returns `None` without touching any state when a run is already in
    /// progress; concurrent starts are dropped, not queued.
    ///
    /// # Example
    /// ```
    /// use std::path::Path;
    /// use std::time::Instant;
    ///
    /// use clip_engine::{ProcessOptions, ProcessingSession};
    ///
    /// let mut session = ProcessingSession::new(ProcessOptions::default());
    /// let now = Instant::now();
    /// assert!(session.start(Path::new("match.mp4"), now).is_some());
    /// assert!(session.start(Path::new("match.mp4"), now).is_none());
    /// ```
    pub fn start(&mut self, input: &Path, now: Instant) -> Option<ProcessRequest> {
        if self.is_processing() {
            debug!(input = ?input, "start ignored: already processing");
            return None;
        }

        self.phase = SessionPhase::Running;
        self.progress = 0.0;
        self.speed = 0.0;
        self.elapsed = Duration::ZERO;
        self.started_at = Some(now);
        self.last_error = None;

        let request = ProcessRequest::new(input, &self.options);
        info!(
            input = ?request.input,
            threads = request.threads,
            include_assists = request.include_assists,
            include_spectating = request.include_spectating,
            elim_clip_duration = request.elim_clip_duration,
            hw_accel = request.hw_accel,
            "processing started"
        );
        Some(request)
    }

    /// Applies one progress sample. Ignored unless running.
    ///
    /// Speed is last-write-wins; progress never moves backwards within a run.
    pub fn apply_progress(&mut self, sample: ProgressSample) -> bool {
        if !self.is_processing() {
            debug!(progress = sample.progress, "progress ignored: not processing");
            return false;
        }

        let incoming = if sample.progress.is_finite() {
            sample.progress.clamp(0.0, 1.0)
        } else {
            self.progress
        };
        if incoming < self.progress {
            debug!(
                previous = self.progress,
                incoming, "progress regression clamped"
            );
        }
        self.progress = self.progress.max(incoming);
        if sample.speed.is_finite() {
            self.speed = sample.speed;
        }
        true
    }

    /// Marks the running job as succeeded and records the elapsed time.
    pub fn succeed(&mut self, now: Instant) -> bool {
        if !self.is_processing() {
            warn!("completion ignored: not processing");
            return false;
        }

        self.phase = SessionPhase::Succeeded;
        self.elapsed = self
            .started_at
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default();
        info!(elapsed_secs = self.elapsed.as_secs_f64(), "processing succeeded");
        true
    }

    /// Marks the running job as failed. Progress, speed and elapsed keep their
    /// last values.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        let message = message.into();
        if !self.is_processing() {
            warn!(%message, "failure ignored: not processing");
            return false;
        }

        warn!(%message, progress = self.progress, "processing failed");
        self.phase = SessionPhase::Failed;
        self.last_error = Some(message);
        true
    }
}

impl Default for ProcessingSession {
    fn default() -> Self {
        Self::new(ProcessOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::{Duration, Instant};

    use super::{
        ProcessOptions, ProcessRequest, ProcessResult, ProcessingSession, ProgressSample,
        SessionPhase,
    };
    use crate::timeline::Clip;

    fn options() -> ProcessOptions {
        ProcessOptions {
            thread_count: 6,
            include_assists: false,
            include_spectating: true,
            elim_clip_duration: 3.5,
            hardware_acceleration: false,
        }
    }

    #[test]
    fn start_twice_while_running_issues_one_request() {
        let mut session = ProcessingSession::new(options());
        let now = Instant::now();

        let first = session.start(Path::new("a.mp4"), now);
        let second = session.start(Path::new("b.mp4"), now);

        assert_eq!(
            first,
            Some(ProcessRequest {
                input: "a.mp4".into(),
                threads: 6,
                include_assists: false,
                include_spectating: true,
                elim_clip_duration: 3.5,
                hw_accel: false,
            })
        );
        assert!(second.is_none());
        assert_eq!(session.phase(), SessionPhase::Running);
    }

    #[test]
    fn start_resets_live_fields_from_previous_run() {
        let mut session = ProcessingSession::new(options());
        let t0 = Instant::now();
        session.start(Path::new("a.mp4"), t0);
        session.apply_progress(ProgressSample {
            progress: 0.8,
            speed: 4.0,
        });
        session.succeed(t0 + Duration::from_secs(3));

        session.start(Path::new("a.mp4"), t0 + Duration::from_secs(5));

        assert_eq!(session.progress(), 0.0);
        assert_eq!(session.speed(), 0.0);
        assert_eq!(session.elapsed(), Duration::ZERO);
        assert!(session.is_processing());
    }

    #[test]
    fn progress_is_last_write_wins_but_never_regresses() {
        let mut session = ProcessingSession::new(options());
        session.start(Path::new("a.mp4"), Instant::now());

        session.apply_progress(ProgressSample {
            progress: 0.4,
            speed: 2.0,
        });
        session.apply_progress(ProgressSample {
            progress: 0.3,
            speed: 1.5,
        });

        assert_eq!(session.progress(), 0.4);
        assert_eq!(session.speed(), 1.5);

        session.apply_progress(ProgressSample {
            progress: 7.0,
            speed: 1.0,
        });
        assert_eq!(session.progress(), 1.0);
    }

    #[test]
    fn progress_is_ignored_when_idle() {
        let mut session = ProcessingSession::new(options());

        let applied = session.apply_progress(ProgressSample {
            progress: 0.5,
            speed: 1.0,
        });

        assert!(!applied);
        assert_eq!(session.progress(), 0.0);
    }

    #[test]
    fn succeed_records_elapsed_since_start() {
        let mut session = ProcessingSession::new(options());
        let t0 = Instant::now();
        session.start(Path::new("a.mp4"), t0);

        assert!(session.succeed(t0 + Duration::from_millis(2_500)));

        assert_eq!(session.phase(), SessionPhase::Succeeded);
        assert_eq!(session.elapsed(), Duration::from_millis(2_500));
        assert!(!session.is_processing());
    }

    #[test]
    fn fail_keeps_progress_for_diagnostics_and_allows_restart() {
        let mut session = ProcessingSession::new(options());
        let t0 = Instant::now();
        session.start(Path::new("a.mp4"), t0);
        session.apply_progress(ProgressSample {
            progress: 0.25,
            speed: 3.0,
        });

        assert!(session.fail("decoder crashed"));

        assert_eq!(session.phase(), SessionPhase::Failed);
        assert_eq!(session.progress(), 0.25);
        assert_eq!(session.speed(), 3.0);
        assert_eq!(session.last_error(), Some("decoder crashed"));
        assert!(session.start(Path::new("a.mp4"), t0).is_some());
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn completion_without_running_job_is_ignored() {
        let mut session = ProcessingSession::new(options());

        assert!(!session.succeed(Instant::now()));
        assert!(!session.fail("late failure"));
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn options_are_frozen_while_running() {
        let mut session = ProcessingSession::new(options());
        session.start(Path::new("a.mp4"), Instant::now());

        assert!(!session.set_options(ProcessOptions::default()));
        assert_eq!(session.options(), &options());
    }

    #[test]
    fn result_input_duration_defaults_to_last_keyframe() {
        let result: ProcessResult =
            serde_json::from_str(r#"{"clips":[[1,2]],"keyframes":[0,2,4.5]}"#)
                .expect("parse result");

        assert_eq!(result.clips, vec![Clip::new(1.0, 2.0)]);
        assert_eq!(result.resolved_input_duration(), Some(4.5));
    }

    #[test]
    fn result_accepts_snake_case_input_duration() {
        let result: ProcessResult = serde_json::from_str(
            r#"{"clips":[],"keyframes":[0,2],"input_duration":9.0}"#,
        )
        .expect("parse result");

        assert_eq!(result.resolved_input_duration(), Some(9.0));
    }

    #[test]
    fn request_serializes_with_rpc_field_names() {
        let request = ProcessRequest::new(Path::new("in.mp4"), &options());

        let value = serde_json::to_value(&request).expect("serialize request");

        assert_eq!(value["input"], "in.mp4");
        assert_eq!(value["threads"], 6);
        assert_eq!(value["includeAssists"], false);
        assert_eq!(value["includeSpectating"], true);
        assert_eq!(value["elimClipDuration"], 3.5);
        assert_eq!(value["hwAccel"], false);
    }
}
