//! Error types for process control and git command failures.

use thiserror::Error;

/// Errors raised by [`Process`](crate::Process) and [`Command`](crate::Command).
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The executable could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration was changed after `start()`.
    #[error("process already started")]
    AlreadyStarted,

    /// The operation needs a started process.
    #[error("process not started")]
    NotStarted,

    /// The exit code was requested before the process exited.
    #[error("process has not exited")]
    NotExited,

    /// Delivering a signal failed.
    #[error("signal delivery failed: {0}")]
    Signal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The command ran and failed.
    #[error(transparent)]
    Git(#[from] GitError),
}

/// A git command that exited unsuccessfully, categorized from its stderr.
///
/// Every variant keeps the exit code and the verbatim stderr text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GitError {
    /// `fatal:` message not matched by a more specific category.
    #[error("{command}: fatal error (exit {exit_code}): {}", summary(.stderr))]
    Fatal {
        /// Command line that failed.
        command: String,
        /// Process exit code.
        exit_code: i32,
        /// Verbatim stderr.
        stderr: String,
    },

    /// The arguments were rejected.
    #[error("{command}: invalid usage (exit {exit_code}): {}", summary(.stderr))]
    Usage {
        /// Command line that failed.
        command: String,
        /// Process exit code.
        exit_code: i32,
        /// Verbatim stderr.
        stderr: String,
    },

    /// A hook exists but cannot be executed.
    #[error("{command}: hook misconfigured (exit {exit_code}): {}", summary(.stderr))]
    HookMisconfigured {
        /// Command line that failed.
        command: String,
        /// Process exit code.
        exit_code: i32,
        /// Verbatim stderr.
        stderr: String,
    },

    /// A hook tried to talk to a terminal.
    #[error("{command}: hook needs a terminal (exit {exit_code}): {}", summary(.stderr))]
    HookNeedsTerminal {
        /// Command line that failed.
        command: String,
        /// Process exit code.
        exit_code: i32,
        /// Verbatim stderr.
        stderr: String,
    },

    /// A merge stopped with conflicts.
    #[error("{command}: merge conflict in {} path(s)", .paths.len())]
    MergeConflict {
        /// Command line that failed.
        command: String,
        /// Process exit code.
        exit_code: i32,
        /// Verbatim stderr.
        stderr: String,
        /// Conflicted paths in reported order.
        paths: Vec<String>,
    },

    /// A checkout would overwrite local changes.
    #[error("{command}: checkout would overwrite {} path(s)", .paths.len())]
    CheckoutConflict {
        /// Command line that failed.
        command: String,
        /// Process exit code.
        exit_code: i32,
        /// Verbatim stderr.
        stderr: String,
        /// Paths that would be overwritten.
        paths: Vec<String>,
    },

    /// The working directory is not inside a repository.
    #[error("{command}: not a git repository")]
    NotARepository {
        /// Command line that failed.
        command: String,
        /// Process exit code.
        exit_code: i32,
        /// Verbatim stderr.
        stderr: String,
    },

    /// Any other non-zero exit.
    #[error("{command}: exited with {exit_code}: {}", summary(.stderr))]
    Failed {
        /// Command line that failed.
        command: String,
        /// Process exit code.
        exit_code: i32,
        /// Verbatim stderr.
        stderr: String,
    },
}

fn summary(stderr: &str) -> &str {
    stderr
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

impl GitError {
    /// Picks a category by matching known stderr patterns.
    pub fn categorize(command: impl Into<String>, exit_code: i32, stderr: impl Into<String>) -> Self {
        let command = command.into();
        let stderr = stderr.into();

        if stderr.contains("not a git repository") {
            return Self::NotARepository {
                command,
                exit_code,
                stderr,
            };
        }
        if stderr.trim_start().starts_with("usage:") {
            return Self::Usage {
                command,
                exit_code,
                stderr,
            };
        }
        if stderr.contains("hook was ignored because it's not set as executable")
            || (stderr.contains("hook") && stderr.contains("cannot exec"))
        {
            return Self::HookMisconfigured {
                command,
                exit_code,
                stderr,
            };
        }
        if stderr.contains("/dev/tty") {
            return Self::HookNeedsTerminal {
                command,
                exit_code,
                stderr,
            };
        }

        let merge_paths: Vec<String> = stderr
            .lines()
            .filter_map(|line| line.split_once("Merge conflict in "))
            .map(|(_, path)| path.trim().to_string())
            .collect();
        if !merge_paths.is_empty() {
            return Self::MergeConflict {
                command,
                exit_code,
                stderr,
                paths: merge_paths,
            };
        }

        if stderr.contains("would be overwritten by") {
            let paths = stderr
                .lines()
                .filter(|line| line.starts_with('\t'))
                .map(|line| line.trim().to_string())
                .collect();
            return Self::CheckoutConflict {
                command,
                exit_code,
                stderr,
                paths,
            };
        }

        if stderr.contains("fatal:") {
            return Self::Fatal {
                command,
                exit_code,
                stderr,
            };
        }

        Self::Failed {
            command,
            exit_code,
            stderr,
        }
    }

    /// Process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Fatal { exit_code, .. }
            | Self::Usage { exit_code, .. }
            | Self::HookMisconfigured { exit_code, .. }
            | Self::HookNeedsTerminal { exit_code, .. }
            | Self::MergeConflict { exit_code, .. }
            | Self::CheckoutConflict { exit_code, .. }
            | Self::NotARepository { exit_code, .. }
            | Self::Failed { exit_code, .. } => *exit_code,
        }
    }

    /// Verbatim stderr text.
    pub fn stderr(&self) -> &str {
        match self {
            Self::Fatal { stderr, .. }
            | Self::Usage { stderr, .. }
            | Self::HookMisconfigured { stderr, .. }
            | Self::HookNeedsTerminal { stderr, .. }
            | Self::MergeConflict { stderr, .. }
            | Self::CheckoutConflict { stderr, .. }
            | Self::NotARepository { stderr, .. }
            | Self::Failed { stderr, .. } => stderr,
        }
    }

    /// Conflicting paths, empty for categories without any.
    pub fn paths(&self) -> &[String] {
        match self {
            Self::MergeConflict { paths, .. } | Self::CheckoutConflict { paths, .. } => paths,
            _ => &[],
        }
    }
}

/// Result type for process operations.
pub type Result<T> = std::result::Result<T, ProcessError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_categorize_not_a_repository() {
        let err = GitError::categorize(
            "git status",
            128,
            "fatal: not a git repository (or any of the parent directories): .git\n",
        );
        assert!(matches!(err, GitError::NotARepository { .. }));
        assert_eq!(err.exit_code(), 128);
    }

    #[test]
    fn test_categorize_usage() {
        let err = GitError::categorize("git log --bogus", 129, "usage: git log [<options>]\n");
        assert!(matches!(err, GitError::Usage { .. }));
    }

    #[test]
    fn test_categorize_hooks() {
        let ignored = GitError::categorize(
            "git commit",
            1,
            "hint: The '.git/hooks/pre-commit' hook was ignored because it's not set as executable.\n",
        );
        assert!(matches!(ignored, GitError::HookMisconfigured { .. }));

        let tty = GitError::categorize("git commit", 1, "error: cannot open /dev/tty\n");
        assert!(matches!(tty, GitError::HookNeedsTerminal { .. }));
    }

    #[test]
    fn test_categorize_merge_conflict_paths() {
        let stderr = "Auto-merging a.txt\nCONFLICT (content): Merge conflict in a.txt\n\
CONFLICT (content): Merge conflict in dir/b.txt\n";
        let err = GitError::categorize("git merge topic", 1, stderr);
        assert_eq!(err.paths(), &["a.txt".to_string(), "dir/b.txt".to_string()]);
        assert_eq!(err.stderr(), stderr);
    }

    #[test]
    fn test_categorize_checkout_conflict_paths() {
        let stderr = "error: Your local changes to the following files would be overwritten by checkout:\n\
\tREADME.md\n\tsrc/lib.rs\nPlease commit your changes or stash them before you switch branches.\nAborting\n";
        let err = GitError::categorize("git checkout main", 1, stderr);
        assert!(matches!(err, GitError::CheckoutConflict { .. }));
        assert_eq!(
            err.paths(),
            &["README.md".to_string(), "src/lib.rs".to_string()]
        );
    }

    #[test]
    fn test_categorize_fallbacks() {
        let fatal = GitError::categorize("git show nope", 128, "fatal: bad object nope\n");
        assert!(matches!(fatal, GitError::Fatal { .. }));
        assert_eq!(
            fatal.to_string(),
            "git show nope: fatal error (exit 128): fatal: bad object nope"
        );

        let failed = GitError::categorize("git diff --exit-code", 1, "");
        assert!(matches!(failed, GitError::Failed { .. }));
        assert!(failed.paths().is_empty());
    }
}
