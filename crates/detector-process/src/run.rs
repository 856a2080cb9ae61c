use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, info, warn};

use crate::error::{DetectorError, Result};
use crate::protocol::{DetectorMessage, DetectorOutput, parse_message};

/// Command-line arguments passed to the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorArgs {
    pub input: PathBuf,
    pub threads: usize,
    pub include_assists: bool,
    pub include_spectating: bool,
    pub elim_clip_duration: f64,
    pub hw_accel: bool,
}

impl DetectorArgs {
    /// Builds the argument list in the detector's flag syntax.
    pub fn to_command_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--input".into(),
            self.input.clone().into_os_string(),
            "--threads".into(),
            self.threads.max(1).to_string().into(),
            "--elim-clip-duration".into(),
            self.elim_clip_duration.to_string().into(),
        ];
        if self.include_assists {
            args.push("--include-assists".into());
        }
        if self.include_spectating {
            args.push("--include-spectating".into());
        }
        if self.hw_accel {
            args.push("--hw-accel".into());
        }
        args
    }
}

/// Streamed output reported while the detector runs.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorEvent {
    Progress { progress: f64, speed: f64 },
    Log(String),
}

/// Runs the detector to completion, reporting progress and log lines.
///
/// Lines that are not protocol messages are forwarded as log text. The run
/// fails when the process exits unsuccessfully or never emits a result.
///
/// # Example
/// ```no_run
/// use std::path::Path;
///
/// use detector_process::{DetectorArgs, run_detector};
///
/// let args = DetectorArgs {
///     input: "match.mp4".into(),
///     threads: 8,
///     include_assists: true,
///     include_spectating: false,
///     elim_clip_duration: 4.0,
///     hw_accel: true,
/// };
/// let output = run_detector(Path::new("elim-detector"), &args, |_| {}).expect("run");
/// println!("{} clips", output.clips.len());
/// ```
pub fn run_detector<F>(program: &Path, args: &DetectorArgs, mut on_event: F) -> Result<DetectorOutput>
where
    F: FnMut(DetectorEvent),
{
    let command_args = args.to_command_args();
    let command_line = command_for_display(program, &command_args);
    info!(command = %command_line, "spawning detector");

    let mut child = Command::new(program)
        .args(&command_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| DetectorError::Io {
            context: "spawn detector",
            source,
        })?;

    let stderr_reader = child.stderr.take().map(|mut stderr| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = stderr.read_to_end(&mut buffer);
            String::from_utf8_lossy(&buffer).into_owned()
        })
    });

    let read = match child.stdout.take() {
        Some(stdout) => read_messages(stdout, &mut on_event),
        None => Err(DetectorError::Io {
            context: "capture detector stdout",
            source: std::io::Error::other("stdout was not piped"),
        }),
    };
    let output = match read {
        Ok(output) => output,
        Err(error) => {
            warn!(%error, command = %command_line, "stopping detector");
            let _ = child.kill();
            let _ = child.wait();
            let _ = stderr_reader.map(|handle| handle.join());
            return Err(error);
        }
    };

    let status = child.wait().map_err(|source| DetectorError::Io {
        context: "wait for detector",
        source,
    })?;
    let stderr = stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    if !status.success() {
        return Err(DetectorError::CommandFailed {
            command: command_line,
            status,
            stderr,
        });
    }

    let output = output.ok_or_else(|| DetectorError::MissingResult {
        command: command_line.clone(),
        stderr,
    })?;
    info!(
        clip_count = output.clips.len(),
        keyframe_count = output.keyframes.len(),
        input_duration = ?output.input_duration,
        "detector finished"
    );
    Ok(output)
}

/// Reads stdout to the end. Bytes that are not valid UTF-8 are replaced, so a
/// stray diagnostic line never loses the result.
fn read_messages<R, F>(stdout: R, on_event: &mut F) -> Result<Option<DetectorOutput>>
where
    R: Read,
    F: FnMut(DetectorEvent),
{
    let mut reader = BufReader::new(stdout);
    let mut buffer = Vec::new();
    let mut output = None;
    loop {
        buffer.clear();
        let read = reader
            .read_until(b'\n', &mut buffer)
            .map_err(|source| DetectorError::Io {
                context: "read detector stdout",
                source,
            })?;
        if read == 0 {
            return Ok(output);
        }

        let line = String::from_utf8_lossy(&buffer);
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }

        match parse_message(line) {
            Ok(DetectorMessage::Progress { progress, speed }) => {
                on_event(DetectorEvent::Progress { progress, speed });
            }
            Ok(DetectorMessage::Log { text }) => on_event(DetectorEvent::Log(text)),
            Ok(DetectorMessage::Result(result)) => {
                if output.is_some() {
                    warn!("detector emitted more than one result; keeping the last");
                }
                output = Some(result);
            }
            Err(_) => {
                debug!(%line, "unstructured detector output");
                on_event(DetectorEvent::Log(line.to_owned()));
            }
        }
    }
}

pub(crate) fn command_for_display(program: &Path, args: &[OsString]) -> String {
    let mut display = program.display().to_string();
    for arg in args {
        display.push(' ');
        display.push_str(&arg.to_string_lossy());
    }
    display
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::{DetectorArgs, DetectorEvent, read_messages};

    #[test]
    fn command_args_include_only_enabled_flags() {
        let args = DetectorArgs {
            input: "clips/match.mp4".into(),
            threads: 0,
            include_assists: true,
            include_spectating: false,
            elim_clip_duration: 4.5,
            hw_accel: false,
        };

        let expected: Vec<OsString> = [
            "--input",
            "clips/match.mp4",
            "--threads",
            "1",
            "--elim-clip-duration",
            "4.5",
            "--include-assists",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        assert_eq!(args.to_command_args(), expected);
    }

    #[test]
    fn invalid_utf8_line_is_forwarded_as_lossy_log() {
        let stdout: &[u8] = b"caf\xe9 frame\r\n{\"type\":\"result\",\"clips\":[[1.0,2.0]],\"keyframes\":[0.0]}\n";
        let mut events = Vec::new();

        let output = read_messages(stdout, &mut |event| events.push(event))
            .expect("stdout should be readable");

        assert_eq!(output.map(|output| output.clips), Some(vec![[1.0, 2.0]]));
        assert_eq!(
            events,
            vec![DetectorEvent::Log(String::from("caf\u{fffd} frame"))]
        );
    }
}
