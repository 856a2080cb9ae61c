use std::path::PathBuf;
use std::time::Instant;

use crate::error::{EngineError, Result};
use crate::persist::{
    KeyValueStore, load_input, load_options, load_timeline, save_clips, save_input, save_options,
    save_timeline,
};
use crate::session::{
    ExportRequest, ProcessOptions, ProcessRequest, ProcessResult, ProcessingSession, ProgressSample,
    SessionPhase,
};
use crate::time::{to_absolute_time, to_edited_time};
use crate::timeline::{Clip, ClipTimeline};
use tracing::{debug, info, warn};

/// Commands accepted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Selects the input video, or clears the selection with `None`.
    SetInput {
        path: Option<PathBuf>,
    },
    /// Replaces the options used by the next processing run.
    ///
    /// Ignored while a run is in progress.
    SetOptions {
        options: ProcessOptions,
    },
    /// Starts processing the selected input.
    ///
    /// Dropped silently while a run is already in progress. On success the
    /// engine emits `Event::ProcessRequested`, which the bridge turns into
    /// exactly one backend call.
    ///
    /// # Example
    /// ```
    /// use clip_engine::{Command, Engine, Event, MemoryStore};
    ///
    /// let mut engine = Engine::open(MemoryStore::new());
    /// engine
    ///     .handle_command(Command::SetInput {
    ///         path: Some("match.mp4".into()),
    ///     })
    ///     .expect("input accepted");
    ///
    /// let first = engine.handle_command(Command::StartProcessing).expect("start");
    /// let second = engine.handle_command(Command::StartProcessing).expect("start");
    /// assert!(first.iter().any(|event| matches!(event, Event::ProcessRequested(_))));
    /// assert!(second.is_empty());
    /// ```
    StartProcessing,
    /// One sample from the backend progress stream.
    ProgressReported {
        sample: ProgressSample,
    },
    ProcessingSucceeded {
        result: ProcessResult,
    },
    ProcessingFailed {
        message: String,
    },
    /// Diagnostic text for the log view.
    AppendLog {
        text: String,
    },
    /// Deletes one clip that is currently on the timeline.
    DeleteClip {
        clip: Clip,
    },
    /// Replaces the whole clip list as a single undoable edit.
    ReplaceClips {
        clips: Vec<Clip>,
    },
    Undo,
    /// Writes the current clip list to `output`.
    ///
    /// Requires a selected input and a non-empty timeline. Dropped while an
    /// export is already pending.
    Export {
        output: PathBuf,
    },
    ExportSucceeded {
        output: PathBuf,
    },
    ExportFailed {
        message: String,
    },
}

/// Events emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    InputChanged { path: Option<PathBuf> },
    SessionChanged(SessionSnapshot),
    TimelineChanged(TimelineSnapshot),
    /// A backend `process` call must be issued for this request.
    ProcessRequested(ProcessRequest),
    /// A backend `export` call must be issued for this request.
    ExportRequested(ExportRequest),
    Exported { output: PathBuf },
    ExportFailed { message: String },
    Log { text: String },
    NothingToUndo,
    Error(EngineErrorEvent),
}

/// User-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    InvalidTimelineState,
    InputNotSelected,
    BackendCallFailed,
    Other,
}

impl From<&EngineError> for EngineErrorKind {
    fn from(value: &EngineError) -> Self {
        match value {
            EngineError::InvalidTimelineState { .. } => Self::InvalidTimelineState,
            EngineError::InputNotSelected => Self::InputNotSelected,
            EngineError::BackendCallFailed { .. } | EngineError::Detector(_) => {
                Self::BackendCallFailed
            }
            _ => Self::Other,
        }
    }
}

/// User-facing error payload emitted as an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineErrorEvent {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineErrorEvent {
    pub fn from_error(error: &EngineError) -> Self {
        Self {
            kind: EngineErrorKind::from(error),
            message: error.to_string(),
        }
    }
}

/// Immutable processing state consumed by the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub processing: bool,
    pub progress: f64,
    pub speed: f64,
    pub elapsed_secs: f64,
    pub options: ProcessOptions,
    pub input: Option<PathBuf>,
    pub last_error: Option<String>,
}

/// Immutable timeline state consumed by the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineSnapshot {
    pub clips: Vec<Clip>,
    pub keyframes: Vec<f64>,
    pub input_duration: Option<f64>,
    pub edited_duration: f64,
    pub undo_depth: usize,
}

impl TimelineSnapshot {
    /// Maps absolute source time onto the edited playhead.
    pub fn edited_time(&self, absolute: f64) -> f64 {
        to_edited_time(absolute, &self.clips)
    }

    /// Maps an edited playhead position back onto source time.
    pub fn absolute_time(&self, edited: f64) -> f64 {
        to_absolute_time(edited, &self.clips)
    }
}

/// Owner of the single processing session and clip timeline.
///
/// Every mutation goes through `handle_command`; the resulting clip list is
/// written to the store before the command returns.
#[derive(Debug)]
pub struct Engine<S> {
    store: S,
    input: Option<PathBuf>,
    session: ProcessingSession,
    timeline: ClipTimeline,
    exporting: bool,
}

impl<S> Engine<S>
where
    S: KeyValueStore,
{
    /// Creates the engine and restores the previous session from `store`.
    ///
    /// Damaged timeline data is discarded with a warning rather than blocking
    /// startup.
    pub fn open(store: S) -> Self {
        let input = load_input(&store).unwrap_or_else(|error| {
            warn!(%error, "stored input ignored");
            None
        });
        let options = load_options(&store);

        let mut timeline = ClipTimeline::new();
        let restored = load_timeline(&store).and_then(|stored| {
            timeline.load(stored.clips, stored.keyframes, stored.input_duration)
        });
        match restored {
            Ok(()) => debug!(
                input = ?input,
                clip_count = timeline.clips().len(),
                "session restored"
            ),
            Err(error) => warn!(%error, "stored timeline discarded"),
        }

        Self {
            store,
            input,
            session: ProcessingSession::new(options),
            timeline,
            exporting: false,
        }
    }

    pub fn session(&self) -> &ProcessingSession {
        &self.session
    }

    pub fn timeline(&self) -> &ClipTimeline {
        &self.timeline
    }

    pub fn input(&self) -> Option<&std::path::Path> {
        self.input.as_deref()
    }

    pub fn is_exporting(&self) -> bool {
        self.exporting
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Events describing the current state, sent once when a UI attaches.
    pub fn initial_events(&self) -> Vec<Event> {
        vec![
            Event::InputChanged {
                path: self.input.clone(),
            },
            Event::SessionChanged(self.session_snapshot()),
            Event::TimelineChanged(self.timeline_snapshot()),
        ]
    }

    pub fn session_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.session.phase(),
            processing: self.session.is_processing(),
            progress: self.session.progress(),
            speed: self.session.speed(),
            elapsed_secs: self.session.elapsed().as_secs_f64(),
            options: *self.session.options(),
            input: self.input.clone(),
            last_error: self.session.last_error().map(str::to_owned),
        }
    }

    pub fn timeline_snapshot(&self) -> TimelineSnapshot {
        TimelineSnapshot {
            clips: self.timeline.clips().to_vec(),
            keyframes: self.timeline.keyframes().to_vec(),
            input_duration: self.timeline.input_duration(),
            edited_duration: self.timeline.edited_duration(),
            undo_depth: self.timeline.undo_depth(),
        }
    }

    /// Applies one command and returns emitted events.
    pub fn handle_command(&mut self, command: Command) -> Result<Vec<Event>> {
        match command {
            Command::SetInput { path } => self.set_input(path),
            Command::SetOptions { options } => self.set_options(options),
            Command::StartProcessing => self.start_processing(),
            Command::ProgressReported { sample } => Ok(self.progress_reported(sample)),
            Command::ProcessingSucceeded { result } => Ok(self.processing_succeeded(result)),
            Command::ProcessingFailed { message } => Ok(self.processing_failed(message)),
            Command::AppendLog { text } => Ok(vec![Event::Log { text }]),
            Command::DeleteClip { clip } => self.delete_clip(clip),
            Command::ReplaceClips { clips } => self.replace_clips(clips),
            Command::Undo => Ok(self.undo()),
            Command::Export { output } => self.export(output),
            Command::ExportSucceeded { output } => Ok(self.export_succeeded(output)),
            Command::ExportFailed { message } => Ok(self.export_failed(message)),
        }
    }

    fn set_input(&mut self, path: Option<PathBuf>) -> Result<Vec<Event>> {
        save_input(&mut self.store, path.as_deref())?;
        info!(input = ?path, "input selected");
        self.input = path.clone();
        Ok(vec![Event::InputChanged { path }])
    }

    fn set_options(&mut self, options: ProcessOptions) -> Result<Vec<Event>> {
        if !self.session.set_options(options) {
            return Ok(Vec::new());
        }
        save_options(&mut self.store, &options)?;
        Ok(vec![Event::SessionChanged(self.session_snapshot())])
    }

    fn start_processing(&mut self) -> Result<Vec<Event>> {
        if self.session.is_processing() {
            debug!("start ignored: already processing");
            return Ok(Vec::new());
        }
        let input = self.input.clone().ok_or(EngineError::InputNotSelected)?;

        let Some(request) = self.session.start(&input, Instant::now()) else {
            return Ok(Vec::new());
        };
        Ok(vec![
            Event::SessionChanged(self.session_snapshot()),
            Event::ProcessRequested(request),
        ])
    }

    fn progress_reported(&mut self, sample: ProgressSample) -> Vec<Event> {
        if self.session.apply_progress(sample) {
            vec![Event::SessionChanged(self.session_snapshot())]
        } else {
            Vec::new()
        }
    }

    fn processing_succeeded(&mut self, result: ProcessResult) -> Vec<Event> {
        if !self.session.is_processing() {
            warn!("result ignored: no run in progress");
            return Vec::new();
        }

        let input_duration = result.resolved_input_duration();
        if let Err(error) = self
            .timeline
            .load(result.clips, result.keyframes, input_duration)
        {
            return self.processing_failed(error.to_string());
        }
        self.session.succeed(Instant::now());
        info!(
            clip_count = self.timeline.clips().len(),
            edited_duration = self.timeline.edited_duration(),
            "timeline loaded from processing run"
        );

        let mut events = vec![
            Event::SessionChanged(self.session_snapshot()),
            Event::TimelineChanged(self.timeline_snapshot()),
        ];
        if let Err(error) = save_timeline(
            &mut self.store,
            self.timeline.clips(),
            self.timeline.keyframes(),
            self.timeline.input_duration(),
        ) {
            warn!(%error, "failed to persist processing result");
            events.push(Event::Error(EngineErrorEvent::from_error(&error)));
        }
        events
    }

    fn processing_failed(&mut self, message: String) -> Vec<Event> {
        if !self.session.fail(message.clone()) {
            return Vec::new();
        }
        vec![
            Event::Log {
                text: format!("{message}\n"),
            },
            Event::SessionChanged(self.session_snapshot()),
        ]
    }

    fn delete_clip(&mut self, clip: Clip) -> Result<Vec<Event>> {
        self.timeline.delete_clip(clip)?;
        Ok(self.timeline_changed())
    }

    fn replace_clips(&mut self, clips: Vec<Clip>) -> Result<Vec<Event>> {
        self.timeline.replace_all(clips)?;
        Ok(self.timeline_changed())
    }

    fn undo(&mut self) -> Vec<Event> {
        match self.timeline.undo() {
            Some(item) => {
                info!(kind = item.label(), "undo applied");
                self.timeline_changed()
            }
            None => {
                info!("nothing to undo");
                vec![Event::NothingToUndo]
            }
        }
    }

    fn export(&mut self, output: PathBuf) -> Result<Vec<Event>> {
        if self.exporting {
            debug!(output = ?output, "export ignored: already exporting");
            return Ok(Vec::new());
        }
        if self.session.is_processing() {
            return Err(EngineError::InvalidTimelineState {
                reason: String::from("cannot export while processing"),
            });
        }
        let input = self.input.clone().ok_or(EngineError::InputNotSelected)?;
        if self.timeline.is_empty() {
            return Err(EngineError::InvalidTimelineState {
                reason: String::from("timeline has no clips to export"),
            });
        }

        self.exporting = true;
        info!(
            input = ?input,
            output = ?output,
            clip_count = self.timeline.clips().len(),
            "export requested"
        );
        Ok(vec![Event::ExportRequested(ExportRequest {
            input,
            output,
            clips: self.timeline.clips().to_vec(),
            keyframes: self.timeline.keyframes().to_vec(),
        })])
    }

    fn export_succeeded(&mut self, output: PathBuf) -> Vec<Event> {
        if !self.exporting {
            warn!(output = ?output, "export result ignored: no export pending");
            return Vec::new();
        }
        self.exporting = false;
        info!(output = ?output, "export finished");
        vec![Event::Exported { output }]
    }

    fn export_failed(&mut self, message: String) -> Vec<Event> {
        if !self.exporting {
            warn!(%message, "export failure ignored: no export pending");
            return Vec::new();
        }
        self.exporting = false;
        warn!(%message, "export failed");
        vec![
            Event::Log {
                text: format!("{message}\n"),
            },
            Event::ExportFailed { message },
        ]
    }

    fn timeline_changed(&mut self) -> Vec<Event> {
        let mut events = vec![Event::TimelineChanged(self.timeline_snapshot())];
        if let Err(error) = save_clips(&mut self.store, self.timeline.clips()) {
            warn!(%error, "failed to persist clips");
            events.push(Event::Error(EngineErrorEvent::from_error(&error)));
        }
        events
    }
}
