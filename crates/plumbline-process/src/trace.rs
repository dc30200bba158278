//! Command timing hooks.

use std::time::Duration;
use tracing::{debug, info};

/// Receives before/after events for every command a [`Command`](crate::Command) runs.
///
/// `tag` is the opaque caller-supplied label, if any.
pub trait Tracer: Send + Sync {
    /// Called just before the process is started.
    fn before(&self, tag: Option<&str>, command: &str);

    /// Called once the process has exited or been abandoned.
    fn after(&self, tag: Option<&str>, command: &str, elapsed: Duration, exit_code: i32);
}

/// Emits timing events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTracer;

impl Tracer for TracingTracer {
    fn before(&self, tag: Option<&str>, command: &str) {
        debug!(tag = tag.unwrap_or(""), command, "running git command");
    }

    fn after(&self, tag: Option<&str>, command: &str, elapsed: Duration, exit_code: i32) {
        info!(
            tag = tag.unwrap_or(""),
            command,
            elapsed_ms = elapsed.as_millis() as u64,
            exit_code,
            "git command finished"
        );
    }
}

/// Discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn before(&self, _tag: Option<&str>, _command: &str) {}

    fn after(&self, _tag: Option<&str>, _command: &str, _elapsed: Duration, _exit_code: i32) {}
}
