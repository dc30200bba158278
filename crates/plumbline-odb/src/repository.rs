//! High-level repository commands built on streaming parsers.

use crate::{ObjectDatabase, OdbError, Result};
use plumbline_core::ObjectId;
use plumbline_parse::{
    DiffFormat, LsTreeParser, RecordParser, RecordReader, Reference, ReferenceParser,
    StatusParser, StatusSnapshot, TreeDifference, TreeDifferenceParser, TreeEntry,
    REFERENCE_FORMAT,
};
use plumbline_process::{CancellationToken, Command, GitConfig};
use tracing::debug;

/// Options for [`Repository::diff_tree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    /// Output format to request and parse.
    pub format: DiffFormat,
    /// Pass `-M` to detect renames.
    pub detect_renames: bool,
    /// Pass `-C` to detect copies.
    pub detect_copies: bool,
    /// Limit the diff to these paths.
    pub paths: Vec<String>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            format: DiffFormat::Raw,
            detect_renames: true,
            detect_copies: false,
            paths: Vec::new(),
        }
    }
}

/// Options for [`Repository::status`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusOptions {
    /// Report ignored files.
    pub ignored: bool,
    /// Report the stash entry count.
    pub show_stash: bool,
    /// List individual files in untracked directories.
    pub all_untracked: bool,
}

/// A working copy: git commands plus an [`ObjectDatabase`].
#[derive(Debug, Clone)]
pub struct Repository {
    command: Command,
    odb: ObjectDatabase,
    cancel: CancellationToken,
}

impl Repository {
    /// Opens the repository at `config.working_dir`.
    pub fn open(config: GitConfig) -> Self {
        Self::new(Command::new(config))
    }

    /// Wraps an existing command runner.
    pub fn new(command: Command) -> Self {
        Self {
            odb: ObjectDatabase::new(command.clone()),
            command,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `cancel` for every streaming command run by this handle.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The object database.
    pub fn odb(&self) -> &ObjectDatabase {
        &self.odb
    }

    /// The command runner.
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Runs git and feeds stdout through `parser` as it arrives.
    fn run_parser<P>(&self, operation: &'static str, args: Vec<String>, parser: P) -> Result<P::Output>
    where
        P: RecordParser,
    {
        let chunk_size = self.command.config().chunk_size;
        let command_line = format!("git {}", args.join(" "));
        debug!(operation, command = %command_line, "streaming command");

        let mut output = None;
        let result = self.command.execute_progress(
            &args,
            |stdout| {
                let parsed = RecordReader::new(stdout)
                    .with_chunk_size(chunk_size)
                    .read_to_end(parser)
                    .map_err(|e| e.with_context(operation, None, None))?;
                output = Some(parsed);
                Ok::<_, OdbError>(())
            },
            &self.cancel,
        )?;

        if result.is_canceled() {
            return Err(OdbError::Canceled);
        }
        result.check(&command_line).map_err(plumbline_process::ProcessError::from)?;
        output.ok_or(OdbError::Canceled)
    }

    /// `git status --porcelain=v2 -z --branch`.
    pub fn status(&self, options: &StatusOptions) -> Result<StatusSnapshot> {
        let mut args = vec![
            "status".to_string(),
            "--porcelain=v2".to_string(),
            "-z".to_string(),
            "--branch".to_string(),
        ];
        if options.ignored {
            args.push("--ignored".to_string());
        }
        if options.show_stash {
            args.push("--show-stash".to_string());
        }
        if options.all_untracked {
            args.push("--untracked-files=all".to_string());
        }
        self.run_parser("status", args, StatusParser::new())
    }

    /// Differences between two trees or commits.
    pub fn diff_tree(&self, from: &ObjectId, to: &ObjectId, options: &DiffOptions) -> Result<TreeDifference> {
        let mut args = diff_args(options);
        args.push(from.to_hex());
        args.push(to.to_hex());
        push_paths(&mut args, &options.paths);
        self.run_parser("diff_tree", args, TreeDifferenceParser::new(options.format, true))
    }

    /// Changes introduced by one commit.
    ///
    /// Merge commits are diffed against all parents with `-c`, yielding
    /// merged entries. Root commits are diffed against the empty tree.
    pub fn diff_commit(&self, id: &ObjectId) -> Result<TreeDifference> {
        let options = DiffOptions::default();
        let mut args = diff_args(&options);
        args.extend(["-c".to_string(), "--root".to_string(), "--no-commit-id".to_string()]);
        args.push(id.to_hex());
        self.run_parser("diff_commit", args, TreeDifferenceParser::raw(true))
    }

    /// `git ls-tree -z` for a tree-ish, optionally recursive and path-limited.
    pub fn ls_tree(&self, treeish: &str, recursive: bool, paths: &[String]) -> Result<Vec<TreeEntry>> {
        let mut args = vec!["ls-tree".to_string(), "-z".to_string()];
        if recursive {
            args.push("-r".to_string());
        }
        args.push(treeish.to_string());
        push_paths(&mut args, paths);
        self.run_parser("ls_tree", args, LsTreeParser::new())
    }

    /// References under `prefix` (all references when `None`).
    pub fn references(&self, prefix: Option<&str>) -> Result<Vec<Reference>> {
        let mut args = vec![
            "for-each-ref".to_string(),
            format!("--format={REFERENCE_FORMAT}"),
        ];
        if let Some(prefix) = prefix {
            args.push(prefix.to_string());
        }
        self.run_parser("references", args, ReferenceParser::new())
    }

    /// Resolves a revision to an object id.
    pub fn resolve(&self, revision: &str) -> Result<ObjectId> {
        let stdout = self
            .command
            .output(["rev-parse", "--verify", revision])?;
        let text = String::from_utf8_lossy(&stdout);
        let hex = text.trim();
        ObjectId::from_hex(hex).map_err(|_| OdbError::ObjectNotFound(revision.to_string()))
    }

    /// The git version string, e.g. `2.43.0`.
    pub fn git_version(&self) -> Result<String> {
        let stdout = self.command.output(["--version"])?;
        let text = String::from_utf8_lossy(&stdout);
        let text = text.trim();
        Ok(text.strip_prefix("git version ").unwrap_or(text).to_string())
    }
}

fn diff_args(options: &DiffOptions) -> Vec<String> {
    let mut args = vec!["diff-tree".to_string(), "-r".to_string(), "-z".to_string()];
    args.push(
        match options.format {
            DiffFormat::Raw => "--raw",
            DiffFormat::NameStatus => "--name-status",
        }
        .to_string(),
    );
    if options.detect_renames {
        args.push("-M".to_string());
    }
    if options.detect_copies {
        args.push("-C".to_string());
    }
    args
}

fn push_paths(args: &mut Vec<String>, paths: &[String]) {
    if !paths.is_empty() {
        args.push("--".to_string());
        args.extend(paths.iter().cloned());
    }
}
