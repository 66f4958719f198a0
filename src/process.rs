//! Subprocess invocation with deterministic output capture.
//!
//! The child gets a null stdin. Both pipes are drained on reader threads
//! while the parent polls for exit, so a child writing large amounts to
//! stdout and stderr at once can never block on a full pipe.

use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{HarnessError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long a killed process group gets to close its pipes.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Tri-state view of a captured stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Zero bytes were written.
    Absent,
    /// Bytes were written but every line is empty (only line breaks).
    Empty,
    /// At least one line has content.
    NonEmpty,
}

/// A captured stream whose absence is distinct from an empty line.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum CapturedStream {
    Absent,
    Present(Vec<String>),
}

impl CapturedStream {
    fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            Self::Absent
        } else {
            Self::Present(split_lines(bytes))
        }
    }

    pub fn state(&self) -> StreamState {
        match self {
            Self::Absent => StreamState::Absent,
            Self::Present(lines) if lines.iter().all(String::is_empty) => StreamState::Empty,
            Self::Present(_) => StreamState::NonEmpty,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// The captured lines, or an empty slice when absent.
    pub fn lines(&self) -> &[String] {
        match self {
            Self::Absent => &[],
            Self::Present(lines) => lines,
        }
    }
}

impl std::fmt::Display for CapturedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => write!(f, "<absent>"),
            Self::Present(lines) => write!(f, "{lines:?}"),
        }
    }
}

/// Split on line breaks (`\n`, `\r\n` or a lone `\r`). A trailing break
/// yields a trailing empty element and empty input yields a single empty
/// element.
pub fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .map(String::from)
        .collect()
}

/// Immutable record of one finished subprocess.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InvocationResult {
    stdout: Vec<String>,
    stderr: CapturedStream,
    exit_code: i32,
    signal: Option<i32>,
    working_dir: PathBuf,
    #[serde(skip)]
    duration: Duration,
}

impl InvocationResult {
    pub fn stdout(&self) -> &[String] {
        &self.stdout
    }

    pub fn stderr(&self) -> &CapturedStream {
        &self.stderr
    }

    /// Exit code; a process terminated by signal `n` reports `-n`.
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Signal number if the process was terminated by a signal (Unix only).
    pub fn signal(&self) -> Option<i32> {
        self.signal
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Builder for a single subprocess call.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
    env: HashMap<String, String>,
    inherit_env: bool,
    timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: HashMap::new(),
            inherit_env: true,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, env: &HashMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    /// Bound the call by a wall-clock limit. `None` waits indefinitely.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Render the command line for logs and reports.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Spawn the process, drain both streams and wait for it to exit.
    ///
    /// The wall-clock limit covers the whole call: a descendant that keeps
    /// the pipes open after the direct child exits still counts against it.
    pub fn run(&self) -> Result<InvocationResult> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if !self.inherit_env {
            cmd.env_clear();
        }
        cmd.envs(&self.env);

        // Own process group so a timeout can take down the whole tree.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        debug!(command = %self.command_line(), cwd = %self.cwd.display(), "spawning");

        let start = Instant::now();
        let deadline = self.timeout.map(|limit| start + limit);
        let mut child = cmd.spawn().map_err(|source| HarnessError::Launch {
            program: self.program.clone(),
            source,
        })?;

        let (done_tx, done_rx) = mpsc::channel();
        let stdout = child
            .stdout
            .take()
            .map(|pipe| Reader::spawn(pipe, Stream::Stdout, done_tx.clone()));
        let stderr = child
            .stderr
            .take()
            .map(|pipe| Reader::spawn(pipe, Stream::Stderr, done_tx.clone()));
        drop(done_tx);
        let mut pending = usize::from(stdout.is_some()) + usize::from(stderr.is_some());

        let finished = match self.wait(&mut child, deadline)? {
            Some(status) => match drain(&done_rx, &mut pending, deadline) {
                Drain::Expired => None,
                Drain::Complete | Drain::ReaderLost => Some(status),
            },
            None => None,
        };
        let Some(status) = finished else {
            return Err(self.expire(
                &mut child,
                &done_rx,
                &mut pending,
                [stdout.as_ref(), stderr.as_ref()],
            ));
        };

        let stdout = collect(stdout, &self.program)?;
        let stderr = collect(stderr, &self.program)?;
        let duration = start.elapsed();

        let (exit_code, signal) = decode_status(status);
        debug!(
            command = %self.command_line(),
            exit_code,
            elapsed_ms = duration.as_millis() as u64,
            "finished"
        );

        Ok(InvocationResult {
            stdout: split_lines(&stdout),
            stderr: CapturedStream::from_bytes(&stderr),
            exit_code,
            signal,
            working_dir: self.cwd.clone(),
            duration,
        })
    }

    /// Poll for exit. `None` means the deadline passed first.
    fn wait(&self, child: &mut Child, deadline: Option<Instant>) -> Result<Option<ExitStatus>> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(Some(status)),
                Ok(None) if deadline.is_some_and(|d| Instant::now() >= d) => return Ok(None),
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    kill_tree(child);
                    return Err(HarnessError::Wait {
                        program: self.program.clone(),
                        source,
                    });
                }
            }
        }
    }

    /// Kill the process group and report what it wrote before the limit.
    fn expire(
        &self,
        child: &mut Child,
        done: &mpsc::Receiver<Stream>,
        pending: &mut usize,
        [stdout, stderr]: [Option<&Reader>; 2],
    ) -> HarnessError {
        warn!(command = %self.command_line(), "timed out, killing process tree");
        kill_tree(child);
        // Reap so no zombie outlives the call.
        let _ = child.wait();
        // The pipes close once the group is gone.
        let _ = drain(done, pending, Some(Instant::now() + KILL_GRACE));

        let captured = |reader: Option<&Reader>| reader.map(Reader::snapshot).unwrap_or_default();
        HarnessError::Timeout {
            program: self.program.clone(),
            limit: self.timeout.unwrap_or_default(),
            stdout: split_lines(&captured(stdout)),
            stderr: CapturedStream::from_bytes(&captured(stderr)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn name(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// A pipe drained on its own thread into a shared buffer. The thread
/// announces end of stream on `done`; a panicking reader drops its sender
/// without sending.
struct Reader {
    stream: Stream,
    buf: Arc<Mutex<Vec<u8>>>,
    handle: thread::JoinHandle<()>,
}

impl Reader {
    fn spawn<R: Read + Send + 'static>(mut pipe: R, stream: Stream, done: mpsc::Sender<Stream>) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let handle = thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => lock(&sink).extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    // A read error leaves whatever was captured so far.
                    Err(_) => break,
                }
            }
            let _ = done.send(stream);
        });
        Self {
            stream,
            buf,
            handle,
        }
    }

    /// Bytes captured so far, without waiting for end of stream.
    fn snapshot(&self) -> Vec<u8> {
        lock(&self.buf).clone()
    }

    fn finish(self, program: &str) -> Result<Vec<u8>> {
        self.handle.join().map_err(|_| HarnessError::Capture {
            program: program.to_string(),
            stream: self.stream.name(),
        })?;
        Ok(std::mem::take(&mut *lock(&self.buf)))
    }
}

fn lock(buf: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    buf.lock().unwrap_or_else(PoisonError::into_inner)
}

fn collect(reader: Option<Reader>, program: &str) -> Result<Vec<u8>> {
    reader.map_or_else(|| Ok(Vec::new()), |reader| reader.finish(program))
}

enum Drain {
    Complete,
    Expired,
    /// Every reader is gone but not all reported end of stream.
    ReaderLost,
}

/// Wait for the remaining readers to reach end of stream.
fn drain(done: &mpsc::Receiver<Stream>, pending: &mut usize, deadline: Option<Instant>) -> Drain {
    while *pending > 0 {
        let received = match deadline {
            Some(d) => done.recv_timeout(d.saturating_duration_since(Instant::now())),
            None => done.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(_) => *pending -= 1,
            Err(RecvTimeoutError::Timeout) => return Drain::Expired,
            Err(RecvTimeoutError::Disconnected) => return Drain::ReaderLost,
        }
    }
    Drain::Complete
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    // SAFETY: killpg only sends a signal; the group id is the child's pid
    // because it was spawned with process_group(0).
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

fn decode_status(status: ExitStatus) -> (i32, Option<i32>) {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    let code = status
        .code()
        .or_else(|| signal.map(|s| -s))
        .unwrap_or(-1);
    (code, signal)
}
