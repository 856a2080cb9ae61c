use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use tracing::{debug, warn};

use crate::api::{Command, Engine, EngineErrorEvent, Event};
use crate::backend::{JobUpdate, ProcessBackend};
use crate::persist::KeyValueStore;
use crate::session::{ExportRequest, ProcessRequest};

const COMMAND_CHANNEL_CAPACITY: usize = 32;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Sender used by the UI thread to dispatch commands to the engine thread.
pub type EngineCommandSender = mpsc::SyncSender<Command>;

/// Receiver used by the UI thread to read events emitted by the engine thread.
pub type EngineEventReceiver = mpsc::Receiver<Event>;

enum WorkerInput {
    Command(Command),
    JobFinished(Command),
    CommandsClosed,
}

/// Spawns the engine thread and wires backend jobs to it.
///
/// The engine thread first emits `Engine::initial_events`, then applies
/// commands in arrival order. Each `Event::ProcessRequested` or
/// `Event::ExportRequested` starts one backend job on its own thread; the
/// job's progress, log lines and outcome are fed back as commands. Once every
/// command sender is dropped the engine thread finishes the running jobs and
/// exits. It exits at once when the event receiver goes away.
pub fn spawn_engine_bridge<S, B>(
    engine: Engine<S>,
    backend: B,
) -> (EngineCommandSender, EngineEventReceiver)
where
    S: KeyValueStore + Send + 'static,
    B: ProcessBackend + Send + Sync + 'static,
{
    let (command_tx, command_rx) = mpsc::sync_channel::<Command>(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::sync_channel::<Event>(EVENT_CHANNEL_CAPACITY);
    let (input_tx, input_rx) = mpsc::channel::<WorkerInput>();

    let forward_tx = input_tx.clone();
    thread::spawn(move || {
        while let Ok(command) = command_rx.recv() {
            if forward_tx.send(WorkerInput::Command(command)).is_err() {
                return;
            }
        }
        let _ = forward_tx.send(WorkerInput::CommandsClosed);
    });

    let backend = Arc::new(backend);
    thread::spawn(move || {
        let mut engine = engine;
        for event in engine.initial_events() {
            if event_tx.send(event).is_err() {
                return;
            }
        }

        let mut running_jobs = 0_usize;
        let mut commands_closed = false;
        while let Ok(input) = input_rx.recv() {
            let command = match input {
                WorkerInput::Command(command) => command,
                WorkerInput::JobFinished(command) => {
                    running_jobs = running_jobs.saturating_sub(1);
                    command
                }
                WorkerInput::CommandsClosed if running_jobs == 0 => {
                    debug!("command channel closed, stopping engine thread");
                    return;
                }
                WorkerInput::CommandsClosed => {
                    debug!(running_jobs, "command channel closed, waiting for running jobs");
                    commands_closed = true;
                    continue;
                }
            };

            let events = match engine.handle_command(command) {
                Ok(events) => events,
                Err(error) => vec![Event::Error(EngineErrorEvent::from_error(&error))],
            };
            for event in events {
                match &event {
                    Event::ProcessRequested(request) => {
                        running_jobs += 1;
                        spawn_process_job(Arc::clone(&backend), request.clone(), input_tx.clone());
                    }
                    Event::ExportRequested(request) => {
                        running_jobs += 1;
                        spawn_export_job(Arc::clone(&backend), request.clone(), input_tx.clone());
                    }
                    _ => {}
                }
                if event_tx.send(event).is_err() {
                    return;
                }
            }

            if commands_closed && running_jobs == 0 {
                debug!("running jobs finished, stopping engine thread");
                return;
            }
        }
    });

    (command_tx, event_rx)
}

fn spawn_process_job<B>(
    backend: Arc<B>,
    request: ProcessRequest,
    input_tx: mpsc::Sender<WorkerInput>,
) where
    B: ProcessBackend + Send + Sync + 'static,
{
    thread::spawn(move || {
        let updates_tx = input_tx.clone();
        let mut on_update = move |update: JobUpdate| {
            let command = match update {
                JobUpdate::Progress(sample) => Command::ProgressReported { sample },
                JobUpdate::Log(text) => Command::AppendLog { text },
            };
            let _ = updates_tx.send(WorkerInput::Command(command));
        };

        let command = match backend.process(&request, &mut on_update) {
            Ok(result) => Command::ProcessingSucceeded { result },
            Err(error) => {
                warn!(%error, input = ?request.input, "backend call failed");
                Command::ProcessingFailed {
                    message: error.to_string(),
                }
            }
        };
        if input_tx.send(WorkerInput::JobFinished(command)).is_err() {
            debug!("engine thread gone before job finished");
        }
    });
}

fn spawn_export_job<B>(backend: Arc<B>, request: ExportRequest, input_tx: mpsc::Sender<WorkerInput>)
where
    B: ProcessBackend + Send + Sync + 'static,
{
    thread::spawn(move || {
        let command = match backend.export(&request) {
            Ok(()) => Command::ExportSucceeded {
                output: request.output,
            },
            Err(error) => {
                warn!(%error, output = ?request.output, "export call failed");
                Command::ExportFailed {
                    message: error.to_string(),
                }
            }
        };
        if input_tx.send(WorkerInput::JobFinished(command)).is_err() {
            debug!("engine thread gone before export finished");
        }
    });
}
