//! Running git commands.

use crate::{
    CancellationToken, Environment, GitConfig, GitError, Process, ProcessError, Redirect, Result,
    Tracer, TracingTracer,
};
use parking_lot::Mutex;
use std::ffi::OsStr;
use std::fmt;
use std::io::{self, Read};
use std::process::ChildStdout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

/// Exit code reported for a canceled command.
pub const EXIT_CANCELED: i32 = -1;

/// Outcome of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteResult {
    /// Process exit code, or [`EXIT_CANCELED`].
    pub exit_code: i32,
    /// Everything the process wrote to stderr.
    pub error_text: String,
}

impl ExecuteResult {
    /// The result reported for a canceled command.
    pub fn canceled() -> Self {
        Self {
            exit_code: EXIT_CANCELED,
            error_text: String::new(),
        }
    }

    /// Whether this is the canceled result.
    pub fn is_canceled(&self) -> bool {
        self.exit_code == EXIT_CANCELED
    }

    /// Whether the command exited with 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Converts a non-zero exit into a categorized [`GitError`].
    pub fn check(self, command: &str) -> std::result::Result<Self, GitError> {
        if self.success() {
            Ok(self)
        } else {
            Err(GitError::categorize(command, self.exit_code, self.error_text))
        }
    }
}

/// Outcome of [`Command::execute`]: the result plus captured stdout.
#[derive(Debug, Clone)]
pub struct ExecuteOutput {
    /// The command line that ran.
    pub command: String,
    /// Exit code and stderr.
    pub result: ExecuteResult,
    /// Everything the process wrote to stdout.
    pub stdout: Vec<u8>,
}

impl ExecuteOutput {
    /// Returns stdout if the command succeeded.
    pub fn check(self) -> std::result::Result<Vec<u8>, GitError> {
        self.result.check(&self.command)?;
        Ok(self.stdout)
    }
}

/// Runs git with a fixed configuration, environment and trace tag.
#[derive(Clone)]
pub struct Command {
    config: Arc<GitConfig>,
    environment: Environment,
    tag: Option<String>,
    tracer: Arc<dyn Tracer>,
}

impl Command {
    /// Creates a command runner with the default environment.
    pub fn new(config: GitConfig) -> Self {
        Self {
            config: Arc::new(config),
            environment: Environment::default(),
            tag: None,
            tracer: Arc::new(TracingTracer),
        }
    }

    /// Replaces the environment.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Sets the opaque tag passed to the tracer.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Replaces the tracer.
    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// The configuration processes are spawned with.
    pub fn config(&self) -> &GitConfig {
        &self.config
    }

    /// Builds an unstarted git process: stdin null, stdout and stderr piped.
    pub fn process<I, S>(&self, args: I) -> Result<Process>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let process = Process::new(&self.config.git_path);
        process.args(args)?;
        self.environment.apply(&process)?;
        for (key, value) in &self.config.env {
            process.env(key, value)?;
        }
        if let Some(dir) = &self.config.working_dir {
            process.current_dir(dir)?;
        }
        process.stdin(Redirect::Null)?;
        process.stdout(Redirect::Piped)?;
        process.stderr(Redirect::Piped)?;
        Ok(process)
    }

    /// Runs to completion, capturing stdout and stderr.
    ///
    /// Both pipes are drained concurrently so a process that fills either
    /// one cannot stall.
    pub fn execute<I, S>(&self, args: I) -> Result<ExecuteOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let process = self.process(args)?;
        let command = process.command_line();
        let tag = self.tag.as_deref();

        self.tracer.before(tag, &command);
        let started = Instant::now();
        process.start()?;

        let mut stdout = pipe(process.take_stdout(), "stdout")?;
        let mut stderr = pipe(process.take_stderr(), "stderr")?;

        let (stdout_result, stderr_result) = thread::scope(|scope| {
            let stderr_reader = scope.spawn(move || {
                let mut buf = Vec::new();
                stderr.read_to_end(&mut buf).map(|_| buf)
            });
            let mut buf = Vec::new();
            let stdout_result = stdout.read_to_end(&mut buf).map(|_| buf);
            let stderr_result = stderr_reader
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stderr reader panicked")));
            (stdout_result, stderr_result)
        });

        process.wait_for_exit(None)?;
        let exit_code = process.exit_code()?;
        self.tracer.after(tag, &command, started.elapsed(), exit_code);

        let stdout = stdout_result?;
        let stderr = stderr_result?;
        Ok(ExecuteOutput {
            command,
            result: ExecuteResult {
                exit_code,
                error_text: String::from_utf8_lossy(&stderr).into_owned(),
            },
            stdout,
        })
    }

    /// Runs to completion and returns stdout, failing on a non-zero exit.
    pub fn output<I, S>(&self, args: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Ok(self.execute(args)?.check()?)
    }

    /// Runs with stdout handed to `sink` while it is produced.
    ///
    /// Only stderr is captured. Canceling `cancel` kills the process from a
    /// background thread. Once `sink` returns, the process is always waited
    /// for; failures of that wait are logged and never replace the sink's
    /// error. If cancellation fired, [`ExecuteResult::canceled`] is returned
    /// whatever the process or the sink did.
    pub fn execute_progress<I, S, F, E>(
        &self,
        args: I,
        sink: F,
        cancel: &CancellationToken,
    ) -> std::result::Result<ExecuteResult, E>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
        F: FnOnce(&mut ChildStdout) -> std::result::Result<(), E>,
        E: From<ProcessError>,
    {
        let process = self.process(args)?;
        let command = process.command_line();
        let tag = self.tag.as_deref();

        let error_text = Arc::new(Mutex::new(String::new()));
        let collector = Arc::clone(&error_text);
        process.on_stderr(move |output| {
            let mut text = collector.lock();
            text.push_str(&output.line.to_str_lossy());
            text.push('\n');
        })?;

        if cancel.is_canceled() {
            debug!(command = %command, "canceled before start");
            return Ok(ExecuteResult::canceled());
        }

        self.tracer.before(tag, &command);
        let started = Instant::now();
        process.start()?;

        let canceled = Arc::new(AtomicBool::new(false));
        let registration = {
            let flag = Arc::clone(&canceled);
            let target = process.clone();
            cancel.register(move || {
                flag.store(true, Ordering::SeqCst);
                debug!(pid = target.id(), "canceling command");
                let spawned = thread::Builder::new()
                    .name("plumbline-cancel".to_string())
                    .spawn(move || {
                        if let Err(e) = target.kill() {
                            warn!(error = %e, "failed to kill canceled process");
                        }
                    });
                if let Err(e) = spawned {
                    warn!(error = %e, "failed to spawn cancellation thread");
                }
            })
        };

        let sink_result = match pipe(process.take_stdout(), "stdout") {
            Ok(mut stdout) => sink(&mut stdout),
            Err(e) => Err(E::from(e)),
        };

        match process.wait_for_exit(Some(self.config.wait_timeout())) {
            Ok(true) => {}
            Ok(false) => {
                warn!(command = %command, "process still running after output closed, killing");
                if let Err(e) = process.kill() {
                    warn!(error = %e, "failed to kill process");
                }
            }
            Err(e) => warn!(error = %e, "failed waiting for process exit"),
        }
        drop(registration);

        if canceled.load(Ordering::SeqCst) || cancel.is_canceled() {
            self.tracer
                .after(tag, &command, started.elapsed(), EXIT_CANCELED);
            return Ok(ExecuteResult::canceled());
        }

        sink_result?;
        let exit_code = process.exit_code()?;
        self.tracer.after(tag, &command, started.elapsed(), exit_code);
        let error_text = error_text.lock().clone();
        Ok(ExecuteResult {
            exit_code,
            error_text,
        })
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("config", &self.config)
            .field("environment", &self.environment)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

fn pipe<T>(handle: Option<T>, name: &str) -> Result<T> {
    handle.ok_or_else(|| {
        ProcessError::Io(io::Error::new(
            io::ErrorKind::BrokenPipe,
            format!("{name} pipe unavailable"),
        ))
    })
}
