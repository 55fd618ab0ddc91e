//! Helpers for running child processes with timeouts and bounded output.

use std::io::{Read, Write};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Exit code, or -1 when killed by a signal or the timeout.
    pub fn returncode(&self) -> i32 {
        if self.timed_out {
            return -1;
        }
        self.status.code().unwrap_or(-1)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// What to run and how to bound it.
#[derive(Debug, Clone)]
pub struct ProcessRequest<'a> {
    /// Program followed by its arguments.
    pub argv: &'a [String],
    pub workdir: Option<&'a Path>,
    pub stdin: Option<&'a [u8]>,
    pub env: &'a [(&'a str, String)],
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl<'a> ProcessRequest<'a> {
    pub fn new(argv: &'a [String], timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            argv,
            workdir: None,
            stdin: None,
            env: &[],
            timeout,
            output_limit_bytes,
        }
    }
}

/// Grace period for output pipes after the child is gone or killed.
const PIPE_GRACE: Duration = Duration::from_secs(2);

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Stdin is fed and both output pipes are drained on separate threads while the
/// child runs. `output_limit_bytes` bounds what is kept in memory per stream;
/// bytes beyond it are discarded while the pipe is still drained.
///
/// The timeout covers descendants too: on Unix the child leads its own process
/// group, and a group still holding the output pipes at the deadline is killed.
#[instrument(skip_all, fields(program = request.argv.first().map(String::as_str), timeout_secs = request.timeout.as_secs()))]
pub fn run_captured(request: &ProcessRequest<'_>) -> Result<CommandOutput> {
    let (program, args) = request
        .argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command"))?;
    if program.trim().is_empty() {
        bail!("empty command");
    }

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if request.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = request.workdir {
        cmd.current_dir(dir);
    }
    for (key, value) in request.env {
        cmd.env(key, value);
    }
    #[cfg(unix)]
    cmd.process_group(0);

    debug!("spawning child process");
    let started = Instant::now();
    let mut child = cmd.spawn().with_context(|| format!("spawn {program}"))?;

    let writer = match request.stdin {
        Some(input) => {
            let mut pipe = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            let input = input.to_vec();
            Some(thread::spawn(move || pipe.write_all(&input)))
        }
        None => None,
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let limit = request.output_limit_bytes;
    let mut stdout_reader = StreamReader::spawn(stdout, limit);
    let mut stderr_reader = StreamReader::spawn(stderr, limit);

    let mut timed_out = false;
    let status = match child
        .wait_timeout(request.timeout)
        .context("wait for command")?
    {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = request.timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_process_group(&child);
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    // Descendants may still hold the pipes after the child itself is gone.
    let deadline = started + request.timeout;
    let wait = deadline.saturating_duration_since(Instant::now()).max(PIPE_GRACE);
    if !(stdout_reader.wait(wait)? && stderr_reader.wait(PIPE_GRACE)?) {
        warn!("descendant processes still hold the output pipes, killing the group");
        timed_out = true;
        kill_process_group(&child);
        let closed = stdout_reader.wait(PIPE_GRACE)? && stderr_reader.wait(PIPE_GRACE)?;
        if !closed {
            warn!("abandoning output pipes held by surviving processes");
        }
    }

    if let Some(handle) = writer {
        if handle.is_finished() {
            match handle.join() {
                // A child that exits without reading all of stdin closes the pipe early.
                Ok(Err(err)) if err.kind() != std::io::ErrorKind::BrokenPipe => {
                    warn!(err = %err, "failed to write stdin");
                }
                Ok(_) => {}
                Err(_) => return Err(anyhow!("stdin writer thread panicked")),
            }
        } else {
            warn!("stdin writer still blocked, detaching it");
        }
    }

    let (stdout, stdout_truncated) = stdout_reader.take();
    let (stderr, stderr_truncated) = stderr_reader.take();
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// SIGKILL the child's process group. The child is the group leader, so the
/// group id is its pid; the id stays reserved while any member is alive.
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    let group = format!("-{}", child.id());
    let result = Command::new("kill")
        .args(["-KILL", "--", group.as_str()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(err) = result {
        warn!(err = %err, "failed to signal process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

#[derive(Debug, Default)]
struct Captured {
    kept: Vec<u8>,
    dropped: usize,
}

/// One output pipe drained on its own thread into a shared buffer.
///
/// The buffer stays readable even when the pipe never closes.
struct StreamReader {
    buffer: Arc<Mutex<Captured>>,
    done: Receiver<Result<()>>,
    finished: bool,
}

impl StreamReader {
    fn spawn<R: Read + Send + 'static>(reader: R, limit: usize) -> Self {
        let buffer = Arc::new(Mutex::new(Captured::default()));
        let (tx, done) = mpsc::channel();
        let shared = Arc::clone(&buffer);
        thread::spawn(move || {
            // The receiver is gone only if the caller abandoned this pipe.
            let _ = tx.send(read_limited(reader, limit, &shared));
        });
        Self {
            buffer,
            done,
            finished: false,
        }
    }

    /// True once the pipe reached EOF, waiting at most `wait`.
    fn wait(&mut self, wait: Duration) -> Result<bool> {
        if self.finished {
            return Ok(true);
        }
        match self.done.recv_timeout(wait) {
            Ok(result) => {
                self.finished = true;
                result.map(|()| true)
            }
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!("output reader thread panicked")),
        }
    }

    fn take(&self) -> (Vec<u8>, usize) {
        let mut captured = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        (std::mem::take(&mut captured.kept), captured.dropped)
    }
}

fn read_limited<R: Read>(mut reader: R, limit: usize, buffer: &Mutex<Captured>) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let mut captured = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let room = limit.saturating_sub(captured.kept.len());
        let keep = n.min(room);
        captured.kept.extend_from_slice(&chunk[..keep]);
        captured.dropped += n - keep;
    }

    Ok(())
}
