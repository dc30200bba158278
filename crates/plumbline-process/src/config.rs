//! Git invocation configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Settings shared by every git process a [`Command`](crate::Command) spawns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GitConfig {
    /// Git executable name or path.
    pub git_path: String,
    /// Working directory for spawned processes.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
    /// Bytes requested per pipe read when paging output into parsers.
    pub chunk_size: usize,
    /// Upper bound on waiting for a process after its output closes.
    pub wait_timeout_ms: u64,
    /// Grace period for an interrupted process before it is killed.
    pub exit_timeout_ms: u64,
    /// Parsed object cache capacity; 0 disables the cache.
    pub cache_capacity: usize,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            git_path: "git".to_string(),
            working_dir: None,
            env: BTreeMap::new(),
            chunk_size: 64 * 1024,
            wait_timeout_ms: 30_000,
            exit_timeout_ms: 5_000,
            cache_capacity: 1024,
        }
    }
}

impl GitConfig {
    /// Default configuration overlaid with `PLUMBLINE_*` variables.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Applies `PLUMBLINE_GIT`, `PLUMBLINE_CHUNK_SIZE` and
    /// `PLUMBLINE_EXIT_TIMEOUT_MS` from `lookup`. Unparsable numbers are ignored.
    pub fn overlay<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(git) = lookup("PLUMBLINE_GIT").filter(|v| !v.is_empty()) {
            self.git_path = git;
        }
        if let Some(size) = lookup("PLUMBLINE_CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            self.chunk_size = size;
        }
        if let Some(ms) = lookup("PLUMBLINE_EXIT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.exit_timeout_ms = ms;
        }
        self
    }

    /// Sets the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Wait timeout as a [`Duration`].
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    /// Exit grace period as a [`Duration`].
    pub fn exit_timeout(&self) -> Duration {
        Duration::from_millis(self.exit_timeout_ms)
    }
}
