//! Command orchestration against `sh`, standing in for the git binary.

#![cfg(unix)]

use parking_lot::Mutex;
use plumbline_process::{
    CancellationToken, Command, Environment, GitConfig, GitError, ProcessError, Tracer,
    EXIT_CANCELED,
};
use pretty_assertions::assert_eq;
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn shell() -> Command {
    let config = GitConfig {
        git_path: "sh".to_string(),
        ..GitConfig::default()
    };
    Command::new(config)
}

#[test]
fn test_execute_captures_both_streams() {
    let output = shell()
        .execute(["-c", "printf 'hello'; printf 'oops' >&2; exit 4"])
        .unwrap();
    assert_eq!(output.stdout, b"hello");
    assert_eq!(output.result.exit_code, 4);
    assert_eq!(output.result.error_text, "oops");
    assert!(!output.result.success());
}

#[test]
fn test_large_output_on_both_pipes_does_not_deadlock() {
    let script = "yes stderr-line | head -n 200000 >&2; yes stdout-line | head -n 200000";
    let output = shell().execute(["-c", script]).unwrap();
    assert!(output.result.success());
    assert_eq!(output.stdout.len(), "stdout-line\n".len() * 200_000);
    assert_eq!(output.result.error_text.len(), "stderr-line\n".len() * 200_000);
}

#[test]
fn test_environment_and_working_dir_are_applied() {
    let dir = tempfile::tempdir().unwrap();
    let config = GitConfig {
        git_path: "sh".to_string(),
        ..GitConfig::default()
    }
    .with_working_dir(dir.path());
    let command =
        Command::new(config).with_environment(Environment::default().with("PLUMBLINE_X", "42"));
    let output = command
        .execute(["-c", "printf '%s %s %s' \"$PLUMBLINE_X\" \"$LC_ALL\" \"$(pwd -P)\""])
        .unwrap();
    let text = String::from_utf8(output.stdout).unwrap();
    let expected_dir = dir.path().canonicalize().unwrap();
    assert_eq!(text, format!("42 C {}", expected_dir.display()));
}

#[test]
fn test_output_categorizes_failures() {
    let err = shell()
        .output(["-c", "echo 'fatal: not a git repository' >&2; exit 128"])
        .unwrap_err();
    match err {
        ProcessError::Git(GitError::NotARepository { exit_code, .. }) => assert_eq!(exit_code, 128),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_progress_streams_stdout_to_sink() {
    let token = CancellationToken::new();
    let mut seen = Vec::new();
    let result = shell()
        .execute_progress(
            ["-c", "echo one; echo two; echo warn >&2"],
            |stdout| {
                stdout.read_to_end(&mut seen)?;
                Ok::<_, ProcessError>(())
            },
            &token,
        )
        .unwrap();
    assert_eq!(seen, b"one\ntwo\n");
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.error_text, "warn\n");
}

#[test]
fn test_cancel_before_start_returns_sentinel() {
    let token = CancellationToken::new();
    token.cancel();
    let mut ran = false;
    let result = shell()
        .execute_progress(
            ["-c", "exit 0"],
            |_| {
                ran = true;
                Ok::<_, ProcessError>(())
            },
            &token,
        )
        .unwrap();
    assert!(!ran);
    assert!(result.is_canceled());
    assert_eq!(result.exit_code, EXIT_CANCELED);
}

#[test]
fn test_cancel_wins_over_clean_exit() {
    let token = CancellationToken::new();
    let result = shell()
        .execute_progress(
            ["-c", "echo done"],
            |stdout| {
                let mut sink = Vec::new();
                stdout.read_to_end(&mut sink)?;
                token.cancel();
                Ok::<_, ProcessError>(())
            },
            &token,
        )
        .unwrap();
    assert!(result.is_canceled());
}

#[test]
fn test_cancel_seen_before_kill_callback_runs() {
    let token = CancellationToken::new();
    let (release, gate) = std::sync::mpsc::channel::<()>();
    // Runs ahead of the command's own callback and holds it back.
    let _blocker = token.register(move || {
        let _ = gate.recv();
    });

    let mut canceler = None;
    let result = shell()
        .execute_progress(
            ["-c", "echo done"],
            |stdout| {
                let trigger = token.clone();
                canceler = Some(std::thread::spawn(move || trigger.cancel()));
                while !token.is_canceled() {
                    std::thread::yield_now();
                }
                let mut sink = Vec::new();
                stdout.read_to_end(&mut sink)?;
                Ok::<_, ProcessError>(())
            },
            &token,
        )
        .unwrap();
    release.send(()).unwrap();
    canceler.expect("sink ran").join().unwrap();

    assert!(result.is_canceled());
}

#[test]
fn test_cancel_kills_long_running_process() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let canceler = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        trigger.cancel();
    });

    let started = Instant::now();
    let result = shell()
        .execute_progress(
            ["-c", "sleep 30"],
            |stdout| {
                let mut sink = Vec::new();
                stdout.read_to_end(&mut sink)?;
                Ok::<_, ProcessError>(())
            },
            &token,
        )
        .unwrap();
    canceler.join().unwrap();

    assert!(result.is_canceled());
    assert!(started.elapsed() < Duration::from_secs(20));
}

#[test]
fn test_cancel_wins_over_sink_error() {
    let token = CancellationToken::new();
    let result = shell().execute_progress(
        ["-c", "echo data"],
        |_| {
            token.cancel();
            Err(ProcessError::Signal("sink failed".to_string()))
        },
        &token,
    );
    assert!(result.unwrap().is_canceled());
}

#[test]
fn test_sink_error_propagates() {
    let token = CancellationToken::new();
    let result = shell().execute_progress(
        ["-c", "echo data"],
        |_| Err(ProcessError::Signal("sink failed".to_string())),
        &token,
    );
    match result {
        Err(ProcessError::Signal(message)) => assert_eq!(message, "sink failed"),
        other => panic!("unexpected {other:?}"),
    }
}

#[derive(Default)]
struct RecordingTracer {
    events: Mutex<Vec<(Option<String>, String, Option<i32>)>>,
}

impl Tracer for RecordingTracer {
    fn before(&self, tag: Option<&str>, command: &str) {
        self.events
            .lock()
            .push((tag.map(str::to_string), command.to_string(), None));
    }

    fn after(&self, tag: Option<&str>, command: &str, _elapsed: Duration, exit_code: i32) {
        self.events
            .lock()
            .push((tag.map(str::to_string), command.to_string(), Some(exit_code)));
    }
}

#[test]
fn test_tracer_sees_tagged_events() {
    let tracer = Arc::new(RecordingTracer::default());
    let command = shell().with_tag("refresh").with_tracer(tracer.clone());
    command.execute(["-c", "exit 2"]).unwrap();

    let events = tracer.events.lock();
    assert_eq!(
        *events,
        vec![
            (Some("refresh".to_string()), "sh -c exit 2".to_string(), None),
            (Some("refresh".to_string()), "sh -c exit 2".to_string(), Some(2)),
        ]
    );
}
