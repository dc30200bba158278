//! # Plumbline Process
//!
//! Process lifecycle and git command orchestration.
//!
//! - [`Process`] wraps one child process: configuration, pipes, line
//!   events, waiting with a timeout, graceful exit and group kill.
//! - [`Command`] runs git with a shared [`GitConfig`] and [`Environment`],
//!   either buffering all output ([`Command::execute`]) or streaming stdout
//!   to a sink under a [`CancellationToken`] ([`Command::execute_progress`]).
//! - [`GitError`] categorizes failed commands from their stderr.
//!
//! ```no_run
//! use plumbline_process::{Command, GitConfig};
//!
//! let command = Command::new(GitConfig::default().with_working_dir("."));
//! let output = command.execute(["rev-parse", "HEAD"]).unwrap();
//! assert!(output.result.success());
//! ```

mod cancel;
mod command;
mod config;
mod environment;
mod error;
pub mod platform;
mod process;
mod trace;

pub use cancel::{CancellationRegistration, CancellationToken};
pub use command::{Command, ExecuteOutput, ExecuteResult, EXIT_CANCELED};
pub use config::GitConfig;
pub use environment::Environment;
pub use error::{GitError, ProcessError, Result};
pub use process::{ExitHandle, OutputSource, Process, ProcessOutput, Redirect};
pub use trace::{NoopTracer, Tracer, TracingTracer};
