//! Child process lifecycle.
//!
//! A [`Process`] moves through three phases:
//! - Created: program, arguments, environment and stdio can be configured
//! - Started: configuration is frozen, pipes are available
//! - Exited: the exit code has been observed and recorded
//!
//! On Unix every child is placed in its own process group so that
//! [`Process::kill`] and [`Process::exit`] reach anything it spawned.

use crate::platform::capabilities;
use crate::{ProcessError, Result};
use parking_lot::Mutex;
use plumbline_core::StringUtf8;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const MAX_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Least time given to output readers after exit, even on a zero timeout.
const READER_GRACE: Duration = Duration::from_millis(100);

/// How a standard stream is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    /// A pipe readable or writable by the parent.
    Piped,
    /// The null device.
    Null,
    /// The parent's own stream.
    Inherit,
}

impl Redirect {
    fn stdio(self) -> Stdio {
        match self {
            Self::Piped => Stdio::piped(),
            Self::Null => Stdio::null(),
            Self::Inherit => Stdio::inherit(),
        }
    }
}

/// Which stream produced a [`ProcessOutput`] line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// One line of process output, without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Stream the line was read from.
    pub source: OutputSource,
    /// Line bytes.
    pub line: StringUtf8,
}

type OutputHandler = Arc<dyn Fn(ProcessOutput) + Send + Sync>;
type ExitHandler = Box<dyn FnOnce(i32) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Started,
    Exited,
}

struct Config {
    program: OsString,
    args: Vec<OsString>,
    env: Vec<(OsString, Option<OsString>)>,
    current_dir: Option<PathBuf>,
    stdin: Redirect,
    stdout: Redirect,
    stderr: Redirect,
    stdout_handler: Option<OutputHandler>,
    stderr_handler: Option<OutputHandler>,
}

struct State {
    phase: Phase,
    config: Config,
    child: Option<Child>,
    pid: Option<u32>,
    exit_code: Option<i32>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    readers: Vec<JoinHandle<()>>,
    exit_handlers: Vec<ExitHandler>,
}

struct Inner {
    state: Mutex<State>,
}

/// Handle to one operating system process.
///
/// Clones share the same process.
#[derive(Clone)]
pub struct Process {
    inner: Arc<Inner>,
}

impl Process {
    /// Creates an unstarted process for `program`.
    ///
    /// All three streams default to [`Redirect::Inherit`].
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        let config = Config {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
            stdin: Redirect::Inherit,
            stdout: Redirect::Inherit,
            stderr: Redirect::Inherit,
            stdout_handler: None,
            stderr_handler: None,
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    phase: Phase::Created,
                    config,
                    child: None,
                    pid: None,
                    exit_code: None,
                    stdin: None,
                    stdout: None,
                    stderr: None,
                    readers: Vec::new(),
                    exit_handlers: Vec::new(),
                }),
            }),
        }
    }

    fn configure(&self, f: impl FnOnce(&mut Config)) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.phase != Phase::Created {
            return Err(ProcessError::AlreadyStarted);
        }
        f(&mut state.config);
        Ok(())
    }

    /// Appends arguments.
    pub fn args<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        self.configure(|c| c.args.extend(args))
    }

    /// Sets an environment variable.
    pub fn env(&self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Result<()> {
        let entry = (
            key.as_ref().to_os_string(),
            Some(value.as_ref().to_os_string()),
        );
        self.configure(|c| c.env.push(entry))
    }

    /// Removes an inherited environment variable.
    pub fn env_remove(&self, key: impl AsRef<OsStr>) -> Result<()> {
        let entry = (key.as_ref().to_os_string(), None);
        self.configure(|c| c.env.push(entry))
    }

    /// Sets the working directory.
    pub fn current_dir(&self, dir: impl Into<PathBuf>) -> Result<()> {
        let dir = dir.into();
        self.configure(|c| c.current_dir = Some(dir))
    }

    /// Connects standard input.
    pub fn stdin(&self, redirect: Redirect) -> Result<()> {
        self.configure(|c| c.stdin = redirect)
    }

    /// Connects standard output.
    pub fn stdout(&self, redirect: Redirect) -> Result<()> {
        self.configure(|c| c.stdout = redirect)
    }

    /// Connects standard error.
    pub fn stderr(&self, redirect: Redirect) -> Result<()> {
        self.configure(|c| c.stderr = redirect)
    }

    /// Delivers every line of both piped streams to `handler`.
    ///
    /// Streams with a handler are read by background threads and are not
    /// available through [`take_stdout`](Self::take_stdout) or
    /// [`take_stderr`](Self::take_stderr).
    pub fn on_output<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(ProcessOutput) + Send + Sync + 'static,
    {
        let handler: OutputHandler = Arc::new(handler);
        self.configure(|c| {
            c.stdout_handler = Some(Arc::clone(&handler));
            c.stderr_handler = Some(handler);
        })
    }

    /// Delivers every line of piped stderr to `handler`, leaving stdout alone.
    pub fn on_stderr<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(ProcessOutput) + Send + Sync + 'static,
    {
        let handler: OutputHandler = Arc::new(handler);
        self.configure(|c| c.stderr_handler = Some(handler))
    }

    /// Registers a callback fired once, with the exit code, when exit is observed.
    ///
    /// A callback registered after exit runs immediately.
    pub fn on_exit<F>(&self, handler: F)
    where
        F: FnOnce(i32) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        let exited = if state.phase == Phase::Exited {
            state.exit_code
        } else {
            None
        };
        match exited {
            Some(code) => {
                drop(state);
                handler(code);
            }
            None => state.exit_handlers.push(Box::new(handler)),
        }
    }

    /// The program and arguments, space separated.
    pub fn command_line(&self) -> String {
        let state = self.inner.state.lock();
        std::iter::once(&state.config.program)
            .chain(state.config.args.iter())
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Spawns the process.
    pub fn start(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.phase != Phase::Created {
            return Err(ProcessError::AlreadyStarted);
        }

        let config = &state.config;
        let mut cmd = std::process::Command::new(&config.program);
        cmd.args(&config.args)
            .stdin(config.stdin.stdio())
            .stdout(config.stdout.stdio())
            .stderr(config.stderr.stdio());
        for (key, value) in &config.env {
            match value {
                Some(value) => cmd.env(key, value),
                None => cmd.env_remove(key),
            };
        }
        if let Some(dir) = &config.current_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        if capabilities().process_groups {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let program = config.program.to_string_lossy().into_owned();
        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;
        let pid = child.id();
        debug!(pid, program = %program, "started process");

        let stdout_handler = state.config.stdout_handler.clone();
        let stderr_handler = state.config.stderr_handler.clone();

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        state.stdin = child.stdin.take();
        state.child = Some(child);
        state.pid = Some(pid);
        state.phase = Phase::Started;

        match (stdout, stdout_handler) {
            (Some(stdout), Some(handler)) => state
                .readers
                .push(spawn_reader(stdout, OutputSource::Stdout, handler, pid)?),
            (stdout, _) => state.stdout = stdout,
        }
        match (stderr, stderr_handler) {
            (Some(stderr), Some(handler)) => state
                .readers
                .push(spawn_reader(stderr, OutputSource::Stderr, handler, pid)?),
            (stderr, _) => state.stderr = stderr,
        }
        Ok(())
    }

    /// Takes the stdin pipe, if stdin was piped and not yet taken.
    pub fn take_stdin(&self) -> Option<ChildStdin> {
        self.inner.state.lock().stdin.take()
    }

    /// Takes the stdout pipe, if stdout was piped without a line handler.
    pub fn take_stdout(&self) -> Option<ChildStdout> {
        self.inner.state.lock().stdout.take()
    }

    /// Takes the stderr pipe, if stderr was piped without a line handler.
    pub fn take_stderr(&self) -> Option<ChildStderr> {
        self.inner.state.lock().stderr.take()
    }

    /// OS process id once started.
    pub fn id(&self) -> Option<u32> {
        self.inner.state.lock().pid
    }

    /// Whether exit has been observed.
    ///
    /// This polls the child without blocking.
    pub fn has_exited(&self) -> Result<bool> {
        self.wait_for_exit(Some(Duration::ZERO))
    }

    /// Exit code of a process that has exited.
    ///
    /// A process ended by a signal reports `128 + signal`.
    pub fn exit_code(&self) -> Result<i32> {
        let state = self.inner.state.lock();
        match state.phase {
            Phase::Created => Err(ProcessError::NotStarted),
            Phase::Started => Err(ProcessError::NotExited),
            Phase::Exited => state.exit_code.ok_or(ProcessError::NotExited),
        }
    }

    /// Blocks until the process exits or `timeout` elapses.
    ///
    /// Returns whether the process has exited. `None` waits indefinitely.
    /// Exit callbacks have run by the time this returns `true` on the thread
    /// that observed the exit. Line handlers have seen all output too, unless
    /// a descendant still holds a pipe when the timeout runs out; such
    /// readers are detached.
    pub fn wait_for_exit(&self, timeout: Option<Duration>) -> Result<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut interval = Duration::from_millis(1);

        loop {
            {
                let mut state = self.inner.state.lock();
                match state.phase {
                    Phase::Created => return Err(ProcessError::NotStarted),
                    Phase::Exited => return Ok(true),
                    Phase::Started => {}
                }
                let child = state.child.as_mut().ok_or(ProcessError::NotStarted)?;
                if let Some(status) = child.try_wait()? {
                    let code = exit_code_of(status);
                    debug!(pid = state.pid, code, "process exited");
                    state.exit_code = Some(code);
                    state.phase = Phase::Exited;
                    state.child = None;
                    let readers = std::mem::take(&mut state.readers);
                    let handlers = std::mem::take(&mut state.exit_handlers);
                    drop(state);

                    let budget = deadline.map(|d| d.max(Instant::now() + READER_GRACE));
                    join_readers(readers, budget, code);
                    for handler in handlers {
                        handler(code);
                    }
                    return Ok(true);
                }
            }

            let now = Instant::now();
            let sleep = match deadline {
                Some(deadline) if now >= deadline => return Ok(false),
                Some(deadline) => interval.min(deadline - now),
                None => interval,
            };
            thread::sleep(sleep);
            interval = (interval * 2).min(MAX_POLL_INTERVAL);
        }
    }

    /// Hard-terminates the process and everything in its group, then reaps it.
    pub fn kill(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            match state.phase {
                Phase::Created => return Err(ProcessError::NotStarted),
                Phase::Exited => return Ok(()),
                Phase::Started => {}
            }
            debug!(pid = state.pid, "killing process");
            terminate(&mut state, Termination::Kill)?;
        }
        self.wait_for_exit(None)?;
        Ok(())
    }

    /// Asks the process to stop, on a background thread.
    ///
    /// An interrupt is sent to the process group. If the process has not
    /// exited within `timeout` it is killed and the handle resolves to `false`.
    pub fn exit(&self, timeout: Duration) -> Result<ExitHandle> {
        let process = self.clone();
        let handle = thread::Builder::new()
            .name("plumbline-exit".to_string())
            .spawn(move || match process.exit_blocking(timeout) {
                Ok(exited) => exited,
                Err(e) => {
                    warn!(error = %e, "graceful exit failed");
                    false
                }
            })?;
        Ok(ExitHandle { handle })
    }

    fn exit_blocking(&self, timeout: Duration) -> Result<bool> {
        {
            let mut state = self.inner.state.lock();
            match state.phase {
                Phase::Created => return Err(ProcessError::NotStarted),
                Phase::Exited => return Ok(true),
                Phase::Started => {}
            }
            debug!(pid = state.pid, "interrupting process");
            terminate(&mut state, Termination::Interrupt)?;
        }
        if self.wait_for_exit(Some(timeout))? {
            return Ok(true);
        }
        warn!(pid = self.id(), "process ignored interrupt, killing");
        self.kill()?;
        Ok(false)
    }
}

/// Joins reader threads until `deadline`, detaching any still running then.
fn join_readers(readers: Vec<JoinHandle<()>>, deadline: Option<Instant>, code: i32) {
    for reader in readers {
        if let Some(deadline) = deadline {
            while !reader.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            if !reader.is_finished() {
                warn!(code, "output pipe still open after exit, detaching reader");
                continue;
            }
        }
        if reader.join().is_err() {
            warn!(code, "output reader thread panicked");
        }
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Process")
            .field("program", &state.config.program)
            .field("phase", &state.phase)
            .field("pid", &state.pid)
            .field("exit_code", &state.exit_code)
            .finish()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.phase != Phase::Started {
            return;
        }
        let still_running = state
            .child
            .as_mut()
            .map(|child| matches!(child.try_wait(), Ok(None)))
            .unwrap_or(false);
        if still_running {
            warn!(pid = state.pid, "process handle dropped while running, killing");
            let _ = terminate(state, Termination::Kill);
        }
        if let Some(mut child) = state.child.take() {
            let _ = child.wait();
        }
    }
}

/// Resolves when a graceful [`Process::exit`] finishes.
pub struct ExitHandle {
    handle: JoinHandle<bool>,
}

impl ExitHandle {
    /// Blocks until the exit attempt finishes.
    ///
    /// Returns `true` if the process exited within the grace period.
    pub fn wait(self) -> bool {
        self.handle.join().unwrap_or(false)
    }

    /// Whether the exit attempt has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[derive(Debug, Clone, Copy)]
enum Termination {
    Interrupt,
    Kill,
}

/// Signals the process group. Called with the state lock held so the
/// child cannot be reaped, and its pid reused, in between.
#[cfg(unix)]
fn terminate(state: &mut State, how: Termination) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = state.pid else {
        return Err(ProcessError::NotStarted);
    };
    let signal = match how {
        Termination::Interrupt => Signal::SIGINT,
        Termination::Kill => Signal::SIGKILL,
    };
    let target = if capabilities().process_groups {
        Pid::from_raw(-(pid as i32))
    } else {
        Pid::from_raw(pid as i32)
    };
    match signal::kill(target, signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => {
            warn!(pid, error = ?e, ?signal, "signal to process group failed");
            Err(ProcessError::Signal(e.to_string()))
        }
    }
}

#[cfg(not(unix))]
fn terminate(state: &mut State, _how: Termination) -> Result<()> {
    match state.child.as_mut() {
        Some(child) => Ok(child.kill()?),
        None => Err(ProcessError::NotStarted),
    }
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn spawn_reader<R>(
    stream: R,
    source: OutputSource,
    handler: OutputHandler,
    pid: u32,
) -> Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let handle = thread::Builder::new()
        .name(format!("plumbline-{pid}-{source:?}").to_lowercase())
        .spawn(move || {
            let mut reader = BufReader::new(stream);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if line.last() == Some(&b'\n') {
                            line.pop();
                            if line.last() == Some(&b'\r') {
                                line.pop();
                            }
                        }
                        handler(ProcessOutput {
                            source,
                            line: StringUtf8::from(line.as_slice()),
                        });
                    }
                    Err(e) => {
                        warn!(pid, ?source, error = %e, "error reading process output");
                        break;
                    }
                }
            }
        })?;
    Ok(handle)
}
