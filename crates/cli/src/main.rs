mod args;

use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clip_engine::{
    Command, DetectorBackend, Engine, EngineError, EngineErrorEvent, Event, JsonFileStore,
    SessionPhase, TimelineSnapshot, spawn_engine_bridge,
};
use tracing::debug;

use args::{Cli, CliCommand, ProcessArgs};

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Debug)]
enum CliError {
    Engine(EngineError),
    Rejected(EngineErrorEvent),
    ProcessingFailed(String),
    ExportFailed(String),
    ClipIndexOutOfRange { index: usize, len: usize },
    Disconnected,
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Engine(err) => write!(f, "{err}"),
            Self::Rejected(event) => write!(f, "{}", event.message),
            Self::ProcessingFailed(message) => write!(f, "processing failed: {message}"),
            Self::ExportFailed(message) => write!(f, "export failed: {message}"),
            Self::ClipIndexOutOfRange { index, len } => {
                write!(f, "clip index {index} out of range (timeline has {len} clips)")
            }
            Self::Disconnected => write!(f, "engine stopped before the job finished"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<EngineError> for CliError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    debug!(state = ?cli.state, "opening state file");
    let engine = Engine::open(JsonFileStore::open(&cli.state)?);

    match cli.command {
        CliCommand::Process(args) => process(engine, DetectorBackend::new(cli.detector), &args),
        CliCommand::Show => {
            print_timeline(&engine.timeline_snapshot());
            Ok(())
        }
        CliCommand::Delete { index } => delete(engine, index),
        CliCommand::Export { output } => export(engine, DetectorBackend::new(cli.detector), output),
    }
}

fn process(
    engine: Engine<JsonFileStore>,
    backend: DetectorBackend,
    args: &ProcessArgs,
) -> Result<(), CliError> {
    let options = args.apply(*engine.session().options());
    let (commands, events) = spawn_engine_bridge(engine, backend);

    let mut startup = Vec::new();
    if let Some(path) = &args.input {
        startup.push(Command::SetInput {
            path: Some(path.clone()),
        });
    }
    startup.push(Command::SetOptions { options });
    startup.push(Command::StartProcessing);
    for command in startup {
        commands.send(command).map_err(|_| CliError::Disconnected)?;
    }

    let mut succeeded = false;
    while let Ok(event) = events.recv() {
        match event {
            Event::SessionChanged(snapshot) => match snapshot.phase {
                SessionPhase::Running => {
                    eprint!(
                        "\r{:>5.1}% at {:.2}x",
                        snapshot.progress * 100.0,
                        snapshot.speed
                    );
                }
                SessionPhase::Succeeded => {
                    eprintln!("\rdone in {:.1}s", snapshot.elapsed_secs);
                    succeeded = true;
                }
                SessionPhase::Failed => {
                    eprintln!();
                    let message = snapshot.last_error.unwrap_or_default();
                    return Err(CliError::ProcessingFailed(message));
                }
                SessionPhase::Idle => {}
            },
            Event::TimelineChanged(snapshot) if succeeded => {
                print_timeline(&snapshot);
                return Ok(());
            }
            Event::Log { text } => eprintln!("\r{}", text.trim_end()),
            Event::Error(error) => return Err(CliError::Rejected(error)),
            _ => {}
        }
    }
    Err(CliError::Disconnected)
}

fn export(
    engine: Engine<JsonFileStore>,
    backend: DetectorBackend,
    output: PathBuf,
) -> Result<(), CliError> {
    let (commands, events) = spawn_engine_bridge(engine, backend);
    commands
        .send(Command::Export { output })
        .map_err(|_| CliError::Disconnected)?;

    while let Ok(event) = events.recv() {
        match event {
            Event::Exported { output } => {
                println!("exported to {}", output.display());
                return Ok(());
            }
            Event::ExportFailed { message } => return Err(CliError::ExportFailed(message)),
            Event::Log { text } => eprintln!("{}", text.trim_end()),
            Event::Error(error) => return Err(CliError::Rejected(error)),
            _ => {}
        }
    }
    Err(CliError::Disconnected)
}

fn delete(mut engine: Engine<JsonFileStore>, index: usize) -> Result<(), CliError> {
    let clips = engine.timeline().clips();
    let clip = *clips.get(index).ok_or(CliError::ClipIndexOutOfRange {
        index,
        len: clips.len(),
    })?;

    for event in engine.handle_command(Command::DeleteClip { clip })? {
        match event {
            Event::TimelineChanged(snapshot) => print_timeline(&snapshot),
            Event::Error(error) => return Err(CliError::Rejected(error)),
            _ => {}
        }
    }
    Ok(())
}

fn print_timeline(snapshot: &TimelineSnapshot) {
    if snapshot.clips.is_empty() {
        println!("no clips");
        return;
    }

    for (index, clip) in snapshot.clips.iter().enumerate() {
        println!(
            "{index:>3}  {:>9.2} - {:<9.2}  edited {:>9.2} - {:.2}",
            clip.start,
            clip.end,
            snapshot.edited_time(clip.start),
            snapshot.edited_time(clip.end),
        );
    }
    match snapshot.input_duration {
        Some(duration) => println!(
            "{} clips, {:.2}s kept of {:.2}s",
            snapshot.clips.len(),
            snapshot.edited_duration,
            duration
        ),
        None => println!(
            "{} clips, {:.2}s kept",
            snapshot.clips.len(),
            snapshot.edited_duration
        ),
    }
}
