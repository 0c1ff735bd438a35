//! Blocking child-process execution with captured output and an optional deadline.

use std::collections::BTreeMap;
use std::io::{self, Read};
#[cfg(unix)]
use std::os::unix::process::CommandExt as _;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::{BenchError, BenchResult};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long output may keep arriving once the child is gone.
const READER_GRACE: Duration = Duration::from_secs(2);
const READ_CHUNK: usize = 8192;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutcome {
    /// Exit code, or -1 when the process was killed by a signal or by the deadline.
    pub return_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.return_code == 0 && !self.timed_out
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions<'a> {
    pub working_dir: Option<&'a Path>,
    pub env: Option<&'a BTreeMap<String, String>>,
    pub timeout: Option<Duration>,
}

/// Runs `program args..` to completion. Only a failure to launch is an error.
///
/// On unix the child leads its own process group; the deadline kills the whole group so
/// helpers it forked cannot keep writing after the call returns.
pub fn run_captured(
    program: &str,
    args: &[String],
    opts: ProcessOptions<'_>,
) -> BenchResult<ProcessOutcome> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);
    if let Some(dir) = opts.working_dir {
        cmd.current_dir(dir);
    }
    if let Some(env) = opts.env {
        cmd.envs(env);
    }

    let started = Instant::now();
    let mut child = {
        let _span = tracing::info_span!("subprocess.spawn").entered();
        cmd.spawn()
            .map_err(|e| BenchError::Process(format!("failed to launch {program}: {e}")))?
    };

    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let (status, timed_out) = {
        let _span = tracing::info_span!("subprocess.wait").entered();
        wait_child(&mut child, opts.timeout)?
    };

    let (stdout, stderr) = {
        let _span = tracing::info_span!("subprocess.read_output").entered();
        let deadline = Instant::now() + READER_GRACE;
        (
            collect_output(stdout_reader, deadline),
            collect_output(stderr_reader, deadline),
        )
    };

    Ok(ProcessOutcome {
        return_code: if timed_out {
            -1
        } else {
            status.and_then(|s| s.code()).unwrap_or(-1)
        },
        stdout,
        stderr,
        timed_out,
        elapsed: started.elapsed(),
    })
}

fn wait_child(
    child: &mut Child,
    timeout: Option<Duration>,
) -> BenchResult<(Option<ExitStatus>, bool)> {
    let Some(timeout) = timeout else {
        return Ok((Some(child.wait()?), false));
    };
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((Some(status), false));
        }
        if Instant::now() >= deadline {
            tracing::warn!("process {} exceeded {:?}; killing", child.id(), timeout);
            kill_tree(child);
            let status = child.wait().ok();
            return Ok((status, true));
        }
        let _span = tracing::info_span!("subprocess.poll_sleep").entered();
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    // process_group(0) makes the group id equal to the child's pid.
    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(err) = killpg(pgid, Signal::SIGKILL) {
        tracing::warn!("failed to kill process group {pgid}: {err}");
        kill_child(child);
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    kill_child(child);
}

fn kill_child(child: &mut Child) {
    if let Err(err) = child.kill() {
        tracing::warn!("failed to kill process {}: {err}", child.id());
    }
}

/// Forwards everything read from `pipe` in chunks until EOF.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<Vec<u8>>> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(chunk[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                    Err(err) => {
                        tracing::debug!("pipe read failed: {err}");
                        break;
                    }
                }
            }
        });
        rx
    })
}

/// Output received before EOF or `deadline`, whichever comes first.
fn collect_output(reader: Option<Receiver<Vec<u8>>>, deadline: Instant) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    let mut buf = Vec::new();
    loop {
        match reader.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(chunk) => buf.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "output pipe still open {READER_GRACE:?} after the process ended; keeping what was read"
                );
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// First `max` characters of `text`, with a marker when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
