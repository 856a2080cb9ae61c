#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use detector_process::{
    DetectorArgs, DetectorError, DetectorEvent, ExportArgs, run_detector, run_export,
};

// Serializes script writes and spawns to avoid ETXTBSY.
static SCRIPT_LOCK: Mutex<()> = Mutex::new(());

fn script_lock() -> MutexGuard<'static, ()> {
    SCRIPT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_fake_detector(name: &str, body: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "clipper-{name}-{}-{}.sh",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock must be after unix epoch")
            .as_nanos()
    ));
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fake detector");
    let mut permissions = std::fs::metadata(&path)
        .expect("fake detector metadata")
        .permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).expect("make fake detector executable");
    path
}

fn sample_args() -> DetectorArgs {
    DetectorArgs {
        input: "match.mp4".into(),
        threads: 2,
        include_assists: true,
        include_spectating: false,
        elim_clip_duration: 4.0,
        hw_accel: false,
    }
}

#[test]
fn run_detector_streams_progress_and_returns_result() {
    let _guard = script_lock();
    let script = write_fake_detector(
        "ok",
        r#"echo '{"type":"progress","progress":0.5,"speed":2.0}'
echo 'plain diagnostic line'
echo '{"type":"log","text":"elimination at 12.0"}'
echo '{"type":"progress","progress":1.0,"speed":2.5}'
echo '{"type":"result","clips":[[8.0,12.0]],"keyframes":[0.0,10.0],"input_duration":20.0}'"#,
    );

    let mut events = Vec::new();
    let output = run_detector(&script, &sample_args(), |event| events.push(event))
        .expect("fake detector should succeed");

    assert_eq!(output.clips, vec![[8.0, 12.0]]);
    assert_eq!(output.keyframes, vec![0.0, 10.0]);
    assert_eq!(output.input_duration, Some(20.0));
    assert_eq!(
        events,
        vec![
            DetectorEvent::Progress {
                progress: 0.5,
                speed: 2.0
            },
            DetectorEvent::Log(String::from("plain diagnostic line")),
            DetectorEvent::Log(String::from("elimination at 12.0")),
            DetectorEvent::Progress {
                progress: 1.0,
                speed: 2.5
            },
        ]
    );

    let _ = std::fs::remove_file(script);
}

#[test]
fn run_detector_receives_flags_as_arguments() {
    let _guard = script_lock();
    let script = write_fake_detector(
        "args",
        r#"echo "{\"type\":\"log\",\"text\":\"$*\"}"
echo '{"type":"result","clips":[],"keyframes":[]}'"#,
    );

    let mut logs = Vec::new();
    run_detector(&script, &sample_args(), |event| {
        if let DetectorEvent::Log(text) = event {
            logs.push(text);
        }
    })
    .expect("fake detector should succeed");

    assert_eq!(
        logs,
        vec![String::from(
            "--input match.mp4 --threads 2 --elim-clip-duration 4 --include-assists"
        )]
    );

    let _ = std::fs::remove_file(script);
}

#[test]
fn run_detector_keeps_result_after_non_utf8_output() {
    let _guard = script_lock();
    let script = write_fake_detector(
        "latin1",
        r#"printf 'caf\351 frame\n'
echo '{"type":"result","clips":[[3.0,7.0]],"keyframes":[0.0,5.0]}'"#,
    );

    let mut events = Vec::new();
    let output = run_detector(&script, &sample_args(), |event| events.push(event))
        .expect("non-UTF-8 output must not fail the run");

    assert_eq!(output.clips, vec![[3.0, 7.0]]);
    assert_eq!(
        events,
        vec![DetectorEvent::Log(String::from("caf\u{fffd} frame"))]
    );

    let _ = std::fs::remove_file(script);
}

#[test]
fn run_detector_reports_non_zero_exit_with_stderr() {
    let _guard = script_lock();
    let script = write_fake_detector("fail", "echo 'cannot open input' >&2\nexit 3");

    let result = run_detector(&script, &sample_args(), |_| {});

    let Err(DetectorError::CommandFailed { stderr, .. }) = result else {
        panic!("expected CommandFailed");
    };
    assert!(stderr.contains("cannot open input"));

    let _ = std::fs::remove_file(script);
}

#[test]
fn run_detector_without_result_line_fails() {
    let _guard = script_lock();
    let script = write_fake_detector("noresult", r#"echo '{"type":"progress","progress":0.1,"speed":1.0}'"#);

    let result = run_detector(&script, &sample_args(), |_| {});

    assert!(matches!(result, Err(DetectorError::MissingResult { .. })));

    let _ = std::fs::remove_file(script);
}

#[test]
fn run_detector_reports_missing_program() {
    let _guard = script_lock();
    let result = run_detector(
        Path::new("/nonexistent/clipper-detector"),
        &sample_args(),
        |_| {},
    );

    assert!(matches!(result, Err(DetectorError::Io { .. })));
}

#[test]
fn run_export_passes_clip_list_to_detector() {
    let _guard = script_lock();
    let script = write_fake_detector("export", r#"echo "$*" > "$5""#);
    let output = std::env::temp_dir().join(format!("clipper-export-{}.txt", std::process::id()));

    run_export(
        &script,
        &ExportArgs {
            input: "match.mp4".into(),
            output: output.clone(),
            clips: vec![[8.0, 12.0]],
            keyframes: vec![0.0, 10.0],
        },
    )
    .expect("fake export should succeed");

    let written = std::fs::read_to_string(&output).expect("export output written");
    assert_eq!(
        written.trim(),
        format!(
            "--write-clips --input match.mp4 --output {} --clips [[8.0,12.0]] --keyframes [0.0,10.0]",
            output.display()
        )
    );

    let _ = std::fs::remove_file(script);
    let _ = std::fs::remove_file(output);
}

#[test]
fn run_export_reports_failure_with_stderr() {
    let _guard = script_lock();
    let script = write_fake_detector("export-fail", "echo 'disk full' >&2\nexit 1");

    let result = run_export(
        &script,
        &ExportArgs {
            input: "match.mp4".into(),
            output: "out.mp4".into(),
            clips: vec![[0.0, 1.0]],
            keyframes: vec![],
        },
    );

    let Err(DetectorError::CommandFailed { stderr, .. }) = result else {
        panic!("expected CommandFailed");
    };
    assert!(stderr.contains("disk full"));

    let _ = std::fs::remove_file(script);
}
