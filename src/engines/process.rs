//! Running engine runtimes as child processes.

use std::io::{Read, Write};
use std::process::{ChildStdin, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::EngineError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run `command` to completion, feeding `stdin` if given.
///
/// Stdout is discarded (runtimes write their audio to a file); stderr is kept for
/// the error message. The child is killed once `timeout` elapses.
pub fn run(command: &mut Command, stdin: Option<&str>, timeout: Duration) -> Result<(), EngineError> {
    execute(command, stdin, timeout, false).map(drop)
}

/// Like [`run`], but collect and return stdout.
pub fn output(command: &mut Command, stdin: Option<&str>, timeout: Duration) -> Result<String, EngineError> {
    execute(command, stdin, timeout, true)
}

fn execute(
    command: &mut Command,
    stdin: Option<&str>,
    timeout: Duration,
    capture_stdout: bool,
) -> Result<String, EngineError> {
    let program = command.get_program().to_string_lossy().into_owned();
    log::debug!("Running {command:?}");

    let mut child = command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(if capture_stdout {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::Process(format!("`{program}` not found on PATH"))
            } else {
                EngineError::Io(e)
            }
        })?;

    // Drain before feeding stdin: a child that fills its stdout while we are
    // still writing would otherwise block both sides past the deadline.
    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());
    let stdin_writer = feed(child.stdin.take(), stdin);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(EngineError::Process(format!(
                "`{program}` timed out after {}s",
                timeout.as_secs()
            )));
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();
    match stdin_writer.join() {
        Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
            return Err(EngineError::Io(e));
        }
        Ok(Err(_)) => log::debug!("`{program}` exited before reading all of stdin"),
        _ => {}
    }
    if !status.success() {
        return Err(EngineError::Process(format!(
            "`{program}` exited with code {:?}: {}",
            status.code(),
            stderr.trim()
        )));
    }

    Ok(stdout)
}

/// Read a child pipe to the end on its own thread so the child never blocks on a
/// full pipe buffer.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut captured = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut captured);
        }
        String::from_utf8_lossy(&captured).into_owned()
    })
}

/// Write `input` to the child's stdin on its own thread, then close the pipe.
///
/// The writer ends with a broken pipe once the child exits or is killed, so it
/// never outlives the timeout.
fn feed(pipe: Option<ChildStdin>, input: Option<&str>) -> thread::JoinHandle<std::io::Result<()>> {
    // Line-oriented readers under-process a final line without a terminator.
    let payload = input.map(|input| {
        if input.ends_with('\n') {
            input.to_string()
        } else {
            format!("{input}\n")
        }
    });
    thread::spawn(move || match (pipe, payload) {
        (Some(mut pipe), Some(payload)) => pipe.write_all(payload.as_bytes()),
        _ => Ok(()),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn reports_non_zero_exit_with_stderr() {
        let err = run(
            Command::new("sh").args(["-c", "echo broken >&2; exit 3"]),
            None,
            Duration::from_secs(10),
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("code Some(3)"), "{message}");
        assert!(message.contains("broken"), "{message}");
    }

    #[test]
    fn feeds_stdin() {
        run(
            Command::new("sh").args(["-c", "read line; test \"$line\" = hello"]),
            Some("hello"),
            Duration::from_secs(10),
        )
        .unwrap();
    }

    #[test]
    fn captures_stdout() {
        let out = output(
            Command::new("sh").args(["-c", "tr a-z A-Z"]),
            Some("ipa"),
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(out, "IPA\n");
    }

    #[test]
    fn kills_on_timeout() {
        let err = run(
            Command::new("sh").args(["-c", "sleep 5"]),
            None,
            Duration::from_millis(100),
        )
        .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn large_stdin_round_trips_through_cat() {
        let payload = "a".repeat(1 << 20);
        let out = output(&mut Command::new("cat"), Some(&payload), Duration::from_secs(20)).unwrap();
        assert_eq!(out.len(), payload.len() + 1);
    }

    #[test]
    fn timeout_holds_while_child_ignores_stdin() {
        let started = Instant::now();
        let err = output(
            Command::new("sh").args(["-c", "sleep 30"]),
            Some(&"a".repeat(1 << 20)),
            Duration::from_millis(300),
        )
        .unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn invalid_utf8_output_is_kept_lossily() {
        let out = output(
            Command::new("sh").args(["-c", "printf '\\377ok'"]),
            None,
            Duration::from_secs(10),
        )
        .unwrap();
        assert!(out.ends_with("ok"), "{out:?}");
    }

    #[test]
    fn missing_program_is_a_process_error() {
        let err = run(
            &mut Command::new("hearme-definitely-not-installed"),
            None,
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Process(_)));
    }
}
