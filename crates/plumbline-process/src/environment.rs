//! Environment applied to spawned git processes.

use crate::{Process, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Variables set on, or removed from, every process a command spawns.
///
/// The default disables credential prompts and pins the C locale so that
/// output stays machine-parsable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Environment {
    vars: BTreeMap<String, String>,
    removed: BTreeSet<String>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::empty()
            .with("GIT_TERMINAL_PROMPT", "0")
            .with("LC_ALL", "C")
    }
}

impl Environment {
    /// An environment with no overrides.
    pub fn empty() -> Self {
        Self {
            vars: BTreeMap::new(),
            removed: BTreeSet::new(),
        }
    }

    /// Sets a variable.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.removed.remove(&key);
        self.vars.insert(key, value.into());
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Removes a variable from the inherited environment.
    pub fn remove(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.vars.remove(&key);
        self.removed.insert(key);
    }

    /// Value set for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Iterates over set variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Applies this environment to a process that has not started.
    pub fn apply(&self, process: &Process) -> Result<()> {
        for key in &self.removed {
            process.env_remove(key)?;
        }
        for (key, value) in &self.vars {
            process.env(key, value)?;
        }
        Ok(())
    }
}
